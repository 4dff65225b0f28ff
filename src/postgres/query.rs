use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::{TryStreamExt, pin_mut};
use serde_json::Value as JsonValue;
use tokio_postgres::error::ErrorPosition;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Row, RowStream, Statement};
use uuid::Uuid;

use super::numeric::PgNumeric;
use crate::driver::DriverError;
use crate::results::ResultSet;
use crate::types::SqlValue;

/// Drain a row stream into a result set, using statement metadata for column names.
///
/// # Errors
/// Returns the driver error if the stream fails or a cell cannot be read.
pub async fn build_result_set(
    stmt: &Statement,
    stream: RowStream,
) -> Result<ResultSet, DriverError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();
    let mut result_set = ResultSet::with_columns(column_names, 0);

    pin_mut!(stream);
    while let Some(row) = stream.try_next().await.map_err(|e| driver_error(&e))? {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(&row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    let rows_affected = stream.rows_affected().unwrap_or(0);
    Ok(result_set.with_rows_affected(rows_affected))
}

/// Extracts a `SqlValue` from a `tokio_postgres` Row at the given index.
///
/// `numeric`, `uuid`, `time` and `interval` come back as text; one-dimensional arrays of
/// the supported scalars come back as a JSON array.
///
/// # Errors
/// Returns the driver error if the cell cannot be decoded or its type is not supported.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<SqlValue, DriverError> {
    let column = &row.columns()[idx];
    let ty = column.type_();

    let value = match *ty {
        Type::INT2 => cell::<i16>(row, idx)?.map(|v| SqlValue::Int(i64::from(v))),
        Type::INT4 => cell::<i32>(row, idx)?.map(|v| SqlValue::Int(i64::from(v))),
        Type::INT8 => cell::<i64>(row, idx)?.map(SqlValue::Int),
        Type::OID => cell::<u32>(row, idx)?.map(|v| SqlValue::Int(i64::from(v))),
        Type::FLOAT4 => cell::<f32>(row, idx)?.map(|v| SqlValue::Float(f64::from(v))),
        Type::FLOAT8 => cell::<f64>(row, idx)?.map(SqlValue::Float),
        Type::NUMERIC => cell::<PgNumeric>(row, idx)?.map(|n| SqlValue::Text(n.0)),
        Type::BOOL => cell::<bool>(row, idx)?.map(SqlValue::Bool),
        Type::TIMESTAMP => cell::<NaiveDateTime>(row, idx)?.map(SqlValue::Timestamp),
        Type::TIMESTAMPTZ => cell::<DateTime<Utc>>(row, idx)?.map(SqlValue::TimestampTz),
        Type::DATE => cell::<NaiveDate>(row, idx)?.map(SqlValue::Date),
        Type::TIME => cell::<NaiveTime>(row, idx)?
            .map(|t| SqlValue::Text(t.format("%H:%M:%S%.f").to_string())),
        Type::INTERVAL => cell::<PgInterval>(row, idx)?.map(|i| SqlValue::Text(i.0)),
        Type::UUID => cell::<Uuid>(row, idx)?.map(|u| SqlValue::Text(u.to_string())),
        Type::JSON | Type::JSONB => cell::<JsonValue>(row, idx)?.map(SqlValue::Json),
        Type::BYTEA => cell::<Vec<u8>>(row, idx)?.map(SqlValue::Blob),
        _ if TextLike::accepts(ty) => cell::<TextLike>(row, idx)?.map(|t| SqlValue::Text(t.0)),
        _ => match ty.kind() {
            Kind::Array(member) => array_cell(row, idx, member)?.map(SqlValue::Json),
            _ => return Err(unsupported(column.name(), ty)),
        },
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, DriverError> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| driver_error(&e))
}

fn array_cell(row: &Row, idx: usize, member: &Type) -> Result<Option<JsonValue>, DriverError> {
    let items = match *member {
        Type::INT2 => json_items(cell::<Vec<Option<i16>>>(row, idx)?, JsonValue::from),
        Type::INT4 => json_items(cell::<Vec<Option<i32>>>(row, idx)?, JsonValue::from),
        Type::INT8 => json_items(cell::<Vec<Option<i64>>>(row, idx)?, JsonValue::from),
        Type::OID => json_items(cell::<Vec<Option<u32>>>(row, idx)?, JsonValue::from),
        Type::FLOAT4 => json_items(cell::<Vec<Option<f32>>>(row, idx)?, JsonValue::from),
        Type::FLOAT8 => json_items(cell::<Vec<Option<f64>>>(row, idx)?, JsonValue::from),
        Type::BOOL => json_items(cell::<Vec<Option<bool>>>(row, idx)?, JsonValue::from),
        Type::NUMERIC => json_items(cell::<Vec<Option<PgNumeric>>>(row, idx)?, |n| {
            JsonValue::String(n.0)
        }),
        Type::UUID => json_items(cell::<Vec<Option<Uuid>>>(row, idx)?, |u| {
            JsonValue::String(u.to_string())
        }),
        Type::TIMESTAMP => json_items(cell::<Vec<Option<NaiveDateTime>>>(row, idx)?, |v| {
            SqlValue::Timestamp(v).to_json()
        }),
        Type::TIMESTAMPTZ => json_items(cell::<Vec<Option<DateTime<Utc>>>>(row, idx)?, |v| {
            SqlValue::TimestampTz(v).to_json()
        }),
        Type::DATE => json_items(cell::<Vec<Option<NaiveDate>>>(row, idx)?, |v| {
            SqlValue::Date(v).to_json()
        }),
        Type::JSON | Type::JSONB => json_items(cell::<Vec<Option<JsonValue>>>(row, idx)?, |v| v),
        _ if TextLike::accepts(member) => {
            json_items(cell::<Vec<Option<TextLike>>>(row, idx)?, |t| JsonValue::String(t.0))
        }
        _ => {
            let column = &row.columns()[idx];
            return Err(unsupported(column.name(), column.type_()));
        }
    };
    Ok(items)
}

fn json_items<T>(
    items: Option<Vec<Option<T>>>,
    to_json: impl Fn(T) -> JsonValue,
) -> Option<JsonValue> {
    items.map(|items| {
        JsonValue::Array(
            items
                .into_iter()
                .map(|item| item.map_or(JsonValue::Null, &to_json))
                .collect(),
        )
    })
}

fn unsupported(column: &str, ty: &Type) -> DriverError {
    DriverError::new(format!(
        "unsupported column type {ty} for column \"{column}\""
    ))
}

/// Text family, enum labels and `citext`, all sent as UTF-8 on the wire.
struct TextLike(String);

impl<'a> FromSql<'a> for TextLike {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Self(std::str::from_utf8(raw)?.to_owned()))
    }

    fn accepts(ty: &Type) -> bool {
        <&str as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_))
    }
}

/// An `interval` in the server's default output style, e.g. `1 year 2 mons 3 days 04:05:06.5`.
struct PgInterval(String);

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let &[m0, m1, m2, m3, m4, m5, m6, m7, d0, d1, d2, d3, n0, n1, n2, n3] = raw else {
            return Err("interval value must be 16 bytes".into());
        };
        let micros = i64::from_be_bytes([m0, m1, m2, m3, m4, m5, m6, m7]);
        let days = i32::from_be_bytes([d0, d1, d2, d3]);
        let months = i32::from_be_bytes([n0, n1, n2, n3]);
        Ok(Self(render_interval(months, days, micros)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn render_interval(months: i32, days: i32, micros: i64) -> String {
    fn unit(n: i32, name: &str) -> String {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(unit(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(unit(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(unit(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            abs / 3_600_000_000,
            abs / 60_000_000 % 60,
            abs / 1_000_000 % 60
        );
        let fraction = abs % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

/// Keep the server's message and cursor position; fall back to the client error text.
#[must_use]
pub fn driver_error(err: &tokio_postgres::Error) -> DriverError {
    let Some(db_err) = err.as_db_error() else {
        return DriverError::new(err.to_string());
    };
    let base = DriverError::new(db_err.message());
    match db_err.position() {
        Some(ErrorPosition::Original(position)) => base.with_position(*position),
        Some(ErrorPosition::Internal { position, .. }) => base.with_position(*position),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_render_like_the_server() {
        let hms = 4 * 3_600_000_000 + 5 * 60_000_000 + 6_500_000;
        assert_eq!(render_interval(14, 3, hms), "1 year 2 mons 3 days 04:05:06.5");
        assert_eq!(render_interval(0, 0, 0), "00:00:00");
        assert_eq!(render_interval(1, 1, 0), "1 mon 1 day");
        assert_eq!(render_interval(-24, 0, -90_000_000), "-2 years -00:01:30");
    }

    #[test]
    fn interval_wire_layout() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1_500_000_i64.to_be_bytes());
        raw.extend_from_slice(&2_i32.to_be_bytes());
        raw.extend_from_slice(&0_i32.to_be_bytes());
        let decoded = PgInterval::from_sql(&Type::INTERVAL, &raw).unwrap();
        assert_eq!(decoded.0, "2 days 00:00:01.5");
        assert!(PgInterval::from_sql(&Type::INTERVAL, &raw[..8]).is_err());
    }

    #[test]
    fn text_like_covers_enums_but_not_numbers() {
        assert!(TextLike::accepts(&Type::TEXT));
        assert!(TextLike::accepts(&Type::BPCHAR));
        assert!(!TextLike::accepts(&Type::NUMERIC));
        assert!(!TextLike::accepts(&Type::UUID));
        let label = TextLike::from_sql(&Type::TEXT, b"queued").unwrap();
        assert_eq!(label.0, "queued");
    }

    #[test]
    fn unsupported_type_names_the_column() {
        let err = unsupported("span", &Type::TSTZ_RANGE);
        assert_eq!(err.message, "unsupported column type tstzrange for column \"span\"");
    }
}
