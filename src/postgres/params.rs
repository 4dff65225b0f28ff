use std::borrow::Cow;
use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes::{self, BufMut};
use uuid::Uuid;

use super::numeric::encode_numeric;
use crate::types::SqlValue;

const JSONB_VERSION: u8 = 1;

/// Container for Postgres parameters with lifetime tracking
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    /// Borrow a slice of `SqlValue`s as Postgres parameters
    #[must_use]
    pub fn convert(params: &'a [SqlValue]) -> Params<'a> {
        let mut references = Vec::with_capacity(params.len());
        for p in params {
            references.push(p as &(dyn ToSql + Sync));
        }
        Params { references }
    }

    /// Get a reference to the underlying parameter array
    #[must_use]
    pub fn as_refs(&self) -> &[&'a (dyn ToSql + Sync)] {
        &self.references
    }
}

type BoxError = Box<dyn Error + Sync + Send>;

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME
    )
}

fn kind_name(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Int(_) => "integer",
        SqlValue::Float(_) => "float",
        SqlValue::Text(_) => "text",
        SqlValue::Bool(_) => "bool",
        SqlValue::Timestamp(_) => "timestamp",
        SqlValue::TimestampTz(_) => "timestamptz",
        SqlValue::Date(_) => "date",
        SqlValue::Null => "null",
        SqlValue::Json(_) => "json",
        SqlValue::Blob(_) => "bytes",
    }
}

fn mismatch(value: &SqlValue, ty: &Type) -> BoxError {
    format!("cannot bind {} to {ty}", kind_name(value)).into()
}

fn parse_text<T: std::str::FromStr>(s: &str, ty: &Type) -> Result<T, BoxError> {
    s.trim()
        .parse()
        .map_err(|_| format!("cannot bind text {s:?} to {ty}").into())
}

fn parse_bool(s: &str, ty: &Type) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("cannot bind text {s:?} to {ty}").into()),
    }
}

fn parse_timestamp(s: &str, ty: &Type) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| format!("cannot bind text {s:?} to {ty}").into())
}

fn parse_timestamptz(s: &str, ty: &Type) -> Result<DateTime<Utc>, BoxError> {
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        // no offset given: read as UTC
        Err(_) => parse_timestamp(s, ty).map(|naive| naive.and_utc()),
    }
}

impl SqlValue {
    /// Text form used when the server expects a text-family parameter.
    fn text_form(&self, ty: &Type) -> Result<Cow<'_, str>, BoxError> {
        match self {
            SqlValue::Text(s) => Ok(Cow::Borrowed(s)),
            SqlValue::Json(v) => Ok(Cow::Owned(v.to_string())),
            SqlValue::Blob(_) | SqlValue::Null => Err(mismatch(self, ty)),
            other => Ok(Cow::Owned(other.to_string())),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        if is_text_type(ty) {
            let text = self.text_form(ty)?;
            let text: &str = &text;
            return text.to_sql(ty, out);
        }

        match *ty {
            Type::INT2 | Type::INT4 | Type::INT8 => {
                let n: i64 = match self {
                    SqlValue::Int(i) => *i,
                    SqlValue::Text(s) => parse_text(s, ty)?,
                    _ => return Err(mismatch(self, ty)),
                };
                match *ty {
                    Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
                    Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
                    _ => n.to_sql(ty, out),
                }
            }
            Type::FLOAT4 | Type::FLOAT8 => {
                #[allow(clippy::cast_precision_loss)]
                let f: f64 = match self {
                    SqlValue::Float(f) => *f,
                    SqlValue::Int(i) => *i as f64,
                    SqlValue::Text(s) => parse_text(s, ty)?,
                    _ => return Err(mismatch(self, ty)),
                };
                if *ty == Type::FLOAT4 {
                    #[allow(clippy::cast_possible_truncation)]
                    let narrow = f as f32;
                    narrow.to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Type::NUMERIC => {
                match self {
                    SqlValue::Int(i) => encode_numeric(&i.to_string(), out)?,
                    SqlValue::Float(f) => encode_numeric(&f.to_string(), out)?,
                    SqlValue::Text(s) => encode_numeric(s, out)?,
                    _ => return Err(mismatch(self, ty)),
                }
                Ok(IsNull::No)
            }
            Type::BOOL => match self {
                SqlValue::Bool(b) => b.to_sql(ty, out),
                SqlValue::Text(s) => parse_bool(s, ty)?.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Type::TIMESTAMP => match self {
                SqlValue::Timestamp(dt) => dt.to_sql(ty, out),
                SqlValue::TimestampTz(dt) => dt.naive_utc().to_sql(ty, out),
                SqlValue::Date(d) => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                SqlValue::Text(s) => parse_timestamp(s, ty)?.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Type::TIMESTAMPTZ => match self {
                SqlValue::TimestampTz(dt) => dt.to_sql(ty, out),
                SqlValue::Timestamp(dt) => dt.and_utc().to_sql(ty, out),
                SqlValue::Date(d) => d.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out),
                SqlValue::Text(s) => parse_timestamptz(s, ty)?.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Type::DATE => match self {
                SqlValue::Date(d) => d.to_sql(ty, out),
                SqlValue::Timestamp(dt) => dt.date().to_sql(ty, out),
                SqlValue::TimestampTz(dt) => dt.date_naive().to_sql(ty, out),
                SqlValue::Text(s) => parse_timestamp(s, ty)?.date().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Type::UUID => match self {
                SqlValue::Text(s) => Uuid::parse_str(s.trim())?.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Type::JSON | Type::JSONB => match self {
                // text sent to a json column is taken as already-serialized json
                SqlValue::Text(s) => {
                    if *ty == Type::JSONB {
                        out.put_u8(JSONB_VERSION);
                    }
                    out.put_slice(s.as_bytes());
                    Ok(IsNull::No)
                }
                SqlValue::Json(v) => v.to_sql(ty, out),
                SqlValue::Blob(_) => Err(mismatch(self, ty)),
                other => other.to_json().to_sql(ty, out),
            },
            Type::BYTEA => match self {
                SqlValue::Blob(bytes) => bytes.to_sql(ty, out),
                SqlValue::Text(s) => s.as_bytes().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            _ => Err(mismatch(self, ty)),
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_text_type(ty)
            || matches!(
                *ty,
                Type::INT2
                    | Type::INT4
                    | Type::INT8
                    | Type::FLOAT4
                    | Type::FLOAT8
                    | Type::NUMERIC
                    | Type::BOOL
                    | Type::TIMESTAMP
                    | Type::TIMESTAMPTZ
                    | Type::DATE
                    | Type::UUID
                    | Type::JSON
                    | Type::JSONB
                    | Type::BYTEA
            )
    }

    to_sql_checked!();
}
