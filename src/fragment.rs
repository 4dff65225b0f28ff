//! Composable parameterized SQL.
//!
//! A [`Fragment`] is built from alternating literal text and [`Arg`]s, normally through the
//! [`sql!`](crate::sql) macro. Values always become positional parameters; only [`Literal`]
//! snippets are spliced into the statement text.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::SqlFragmentsError;
use crate::sanitize::sanitize_value;
use crate::statement_name::statement_name;
use crate::types::SqlValue;

const EMPTY_SEQUENCE: &str = "empty sequence not allowed";

/// Raw SQL text that is inserted verbatim, never parameterized.
///
/// Build one with [`sql_lit!`](crate::sql_lit) or [`Literal::identifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    text: String,
}

impl Literal {
    /// Wrap compile-time text. Used by [`sql_lit!`](crate::sql_lit).
    #[must_use]
    pub fn from_static(text: &'static str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    /// Runtime counterpart of [`sql_lit!`](crate::sql_lit): exactly one text part and no values.
    ///
    /// # Errors
    /// Returns `SqlFragmentsError::ConstructionError` when values are supplied or the text is
    /// split into more than one part.
    pub fn from_parts(parts: &[&'static str], args: Vec<Arg>) -> Result<Self, SqlFragmentsError> {
        match (parts, args.is_empty()) {
            ([text], true) => Ok(Self::from_static(text)),
            _ => Err(SqlFragmentsError::ConstructionError(format!(
                "sql_lit does not allow values (received {} values and {} strings)",
                args.len(),
                parts.len()
            ))),
        }
    }

    /// Quote a column or table name for dynamic use, e.g. an `ORDER BY` target.
    ///
    /// Embedded double quotes are doubled, but the name still becomes raw SQL. Only pass names
    /// taken from an allow-list; feeding user input here is an injection risk.
    #[must_use]
    pub fn identifier(name: &str) -> Self {
        Self {
            text: format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// One interpolated argument of a fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A single positional parameter.
    Value(SqlValue),
    /// A comma-joined run of parameters, e.g. for `IN (...)`. Must not be empty.
    List(Vec<SqlValue>),
    /// A nested fragment, spliced in place.
    Fragment(Fragment),
    /// Nested fragments joined with `, `, e.g. several `VALUES` rows. Must not be empty.
    Fragments(Vec<Fragment>),
    /// Raw SQL text.
    Literal(Literal),
    /// Raw SQL snippets joined with `, `, e.g. a dynamic column list. Must not be empty.
    Literals(Vec<Literal>),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Param(SqlValue),
    List(Vec<SqlValue>),
}

/// A parameterized statement, possibly composed of other fragments.
///
/// Immutable once built. Parameter numbering happens in [`Fragment::parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    segments: Vec<Segment>,
}

impl Fragment {
    /// Build a fragment from `n + 1` text parts and `n` arguments.
    ///
    /// # Errors
    /// Returns `SqlFragmentsError::ConstructionError` if the part count is not one more than the
    /// argument count, or if any sequence argument is empty.
    pub fn from_parts<S: AsRef<str>>(
        parts: &[S],
        args: Vec<Arg>,
    ) -> Result<Self, SqlFragmentsError> {
        if parts.len() != args.len() + 1 {
            return Err(SqlFragmentsError::ConstructionError(format!(
                "expected {} text parts for {} values, got {}",
                args.len() + 1,
                args.len(),
                parts.len()
            )));
        }
        let Some((first, rest)) = parts.split_first() else {
            return Err(SqlFragmentsError::ConstructionError(
                "fragment needs at least one text part".into(),
            ));
        };

        let mut segments = Vec::with_capacity(parts.len() + args.len());
        segments.push(Segment::Text(first.as_ref().to_string()));

        for (arg, text) in args.into_iter().zip(rest) {
            match arg {
                Arg::Value(value) => segments.push(Segment::Param(sanitize_text_value(value))),
                Arg::List(values) => {
                    if values.is_empty() {
                        return Err(SqlFragmentsError::ConstructionError(EMPTY_SEQUENCE.into()));
                    }
                    segments.push(Segment::List(
                        values.into_iter().map(sanitize_text_value).collect(),
                    ));
                }
                Arg::Fragment(fragment) => segments.extend(fragment.segments),
                Arg::Fragments(fragments) => {
                    if fragments.is_empty() {
                        return Err(SqlFragmentsError::ConstructionError(EMPTY_SEQUENCE.into()));
                    }
                    for (idx, fragment) in fragments.into_iter().enumerate() {
                        if idx > 0 {
                            segments.push(Segment::Text(", ".into()));
                        }
                        segments.extend(fragment.segments);
                    }
                }
                Arg::Literal(literal) => segments.push(Segment::Text(literal.text)),
                Arg::Literals(literals) => {
                    if literals.is_empty() {
                        return Err(SqlFragmentsError::ConstructionError(EMPTY_SEQUENCE.into()));
                    }
                    let joined = literals
                        .iter()
                        .map(Literal::as_str)
                        .collect::<Vec<_>>()
                        .join(", ");
                    segments.push(Segment::Text(joined));
                }
            }
            segments.push(Segment::Text(text.as_ref().to_string()));
        }

        Ok(Self { segments })
    }

    /// Flatten into final text with `$1..$n` placeholders and the ordered values.
    ///
    /// Structured (JSON) values are sanitized here; text was already sanitized on construction.
    #[must_use]
    pub fn parse(&self) -> ParsedStatement {
        let mut text = String::new();
        let mut values = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Param(value) => push_param(&mut text, &mut values, value),
                Segment::List(items) => {
                    for (idx, value) in items.iter().enumerate() {
                        if idx > 0 {
                            text.push_str(", ");
                        }
                        push_param(&mut text, &mut values, value);
                    }
                }
            }
        }

        let name = statement_name(&text);
        ParsedStatement { name, text, values }
    }
}

fn sanitize_text_value(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(_) => sanitize_value(value),
        other => other,
    }
}

fn push_param(text: &mut String, values: &mut Vec<SqlValue>, value: &SqlValue) {
    values.push(sanitize_value(value.clone()));
    text.push('$');
    text.push_str(&values.len().to_string());
}

/// Flattened view of a [`Fragment`]: what the driver actually receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    name: Arc<str>,
    text: String,
    values: Vec<SqlValue>,
}

impl ParsedStatement {
    /// Memoized statement name derived from [`ParsedStatement::text`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

impl From<Literal> for Fragment {
    fn from(literal: Literal) -> Self {
        Self {
            segments: vec![Segment::Text(literal.text)],
        }
    }
}

macro_rules! impl_value_args {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(value.into())
                }
            }

            impl From<Vec<$ty>> for Arg {
                fn from(values: Vec<$ty>) -> Self {
                    Arg::List(values.into_iter().map(Into::into).collect())
                }
            }

            impl From<&[$ty]> for Arg {
                fn from(values: &[$ty]) -> Self {
                    Arg::List(values.iter().cloned().map(Into::into).collect())
                }
            }

            impl<const N: usize> From<[$ty; N]> for Arg {
                fn from(values: [$ty; N]) -> Self {
                    Arg::List(values.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

impl_value_args!(
    i64,
    i32,
    i16,
    u32,
    f64,
    f32,
    bool,
    String,
    &str,
    NaiveDateTime,
    NaiveDate,
    DateTime<Utc>,
    JsonValue,
    SqlValue,
);

impl<T: Into<SqlValue>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        Arg::Value(SqlValue::from(value))
    }
}

impl From<Fragment> for Arg {
    fn from(fragment: Fragment) -> Self {
        Arg::Fragment(fragment)
    }
}

impl From<Vec<Fragment>> for Arg {
    fn from(fragments: Vec<Fragment>) -> Self {
        Arg::Fragments(fragments)
    }
}

impl From<Literal> for Arg {
    fn from(literal: Literal) -> Self {
        Arg::Literal(literal)
    }
}

impl From<Vec<Literal>> for Arg {
    fn from(literals: Vec<Literal>) -> Self {
        Arg::Literals(literals)
    }
}
