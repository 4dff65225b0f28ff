//! Decoders that turn untyped row data into typed values.
//!
//! A row shape receives the row as a JSON object keyed by column name; a scalar shape
//! receives the single cell. Any `serde` type works through [`decode`]; hand-written
//! validation goes through [`shape_fn`].

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use serde_path_to_error::Segment;

/// One validation problem, located by a path into the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeIssue {
    pub path: Vec<String>,
    pub message: String,
}

impl ShapeIssue {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Prefix the path with `segment` (builders nest outward).
    #[must_use]
    pub fn at(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for ShapeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(message={})", self.message)
        } else {
            write!(f, "(path={}; message={})", self.path.join("."), self.message)
        }
    }
}

/// Validation failure with every issue found, most relevant first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShapeError {
    pub issues: Vec<ShapeIssue>,
}

impl ShapeError {
    #[must_use]
    pub fn first(&self) -> Option<&ShapeIssue> {
        self.issues.first()
    }

    /// The first issue rendered for error messages.
    #[must_use]
    pub fn describe_first(&self) -> String {
        self.first()
            .map_or_else(|| "(no issues reported)".to_string(), ToString::to_string)
    }
}

impl From<ShapeIssue> for ShapeError {
    fn from(issue: ShapeIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe_first())
    }
}

impl std::error::Error for ShapeError {}

/// Validator/decoder for one row or one scalar cell.
pub trait Shape {
    type Output;

    /// Decode `value`, or report why it does not fit.
    ///
    /// # Errors
    /// Returns `ShapeError` when the value does not match the expected structure.
    fn parse(&self, value: &JsonValue) -> Result<Self::Output, ShapeError>;
}

impl<S: Shape + ?Sized> Shape for &S {
    type Output = S::Output;

    fn parse(&self, value: &JsonValue) -> Result<Self::Output, ShapeError> {
        (**self).parse(value)
    }
}

/// Shape backed by a `serde` deserialization.
pub struct Decode<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Decode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Decode")
    }
}

impl<T> Clone for Decode<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Decode<T> {}

/// Decode into any `serde` type.
///
/// ```rust
/// use serde::Deserialize;
/// use sql_fragments::shape::{decode, Shape};
///
/// #[derive(Deserialize)]
/// struct User { id: i64, name: String }
///
/// let user = decode::<User>().parse(&serde_json::json!({"id": 1, "name": "ada"})).unwrap();
/// assert_eq!(user.name, "ada");
/// ```
#[must_use]
pub fn decode<T: DeserializeOwned>() -> Decode<T> {
    Decode {
        _marker: PhantomData,
    }
}

impl<T: DeserializeOwned> Shape for Decode<T> {
    type Output = T;

    fn parse(&self, value: &JsonValue) -> Result<T, ShapeError> {
        serde_path_to_error::deserialize(value).map_err(|err| {
            let path = err.path().iter().map(segment_name).collect();
            ShapeIssue {
                path,
                message: err.into_inner().to_string(),
            }
            .into()
        })
    }
}

fn segment_name(segment: &Segment) -> String {
    match segment {
        Segment::Seq { index } => index.to_string(),
        Segment::Map { key } => key.clone(),
        Segment::Enum { variant } => variant.clone(),
        Segment::Unknown => "?".to_string(),
    }
}

/// Shape backed by a closure.
pub struct FnShape<F, T> {
    parse: F,
    _marker: PhantomData<fn() -> T>,
}

/// Build a shape from a closure.
pub fn shape_fn<T, F>(parse: F) -> FnShape<F, T>
where
    F: Fn(&JsonValue) -> Result<T, ShapeError>,
{
    FnShape {
        parse,
        _marker: PhantomData,
    }
}

impl<T, F> Shape for FnShape<F, T>
where
    F: Fn(&JsonValue) -> Result<T, ShapeError>,
{
    type Output = T;

    fn parse(&self, value: &JsonValue) -> Result<T, ShapeError> {
        (self.parse)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Run {
        id: i64,
        status: String,
        #[serde(default)]
        note: Option<String>,
    }

    #[test]
    fn serde_shape_decodes_rows() {
        let run = decode::<Run>()
            .parse(&json!({"id": 3, "status": "done", "note": null}))
            .unwrap();
        assert_eq!(
            run,
            Run {
                id: 3,
                status: "done".into(),
                note: None
            }
        );
    }

    #[test]
    fn serde_shape_reports_issue() {
        let err = decode::<Run>().parse(&json!({"id": "x"})).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.describe_first().contains("invalid type"));
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Owner {
        name: String,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Doc {
        owners: Vec<Owner>,
    }

    #[test]
    fn serde_issue_carries_the_field_path() {
        let err = decode::<Doc>()
            .parse(&json!({"owners": [{"name": "ada"}, {"name": 7}]}))
            .unwrap_err();
        let issue = err.first().unwrap();
        assert_eq!(issue.path, vec!["owners", "1", "name"]);
        assert!(
            err.describe_first()
                .starts_with("(path=owners.1.name; message=invalid type: integer `7`")
        );
    }

    #[test]
    fn top_level_issue_has_no_path() {
        let err = decode::<i64>().parse(&json!("x")).unwrap_err();
        assert!(err.first().unwrap().path.is_empty());
        assert!(err.describe_first().starts_with("(message=invalid type"));
    }

    #[test]
    fn closure_shape_with_path() {
        let positive = shape_fn(|v: &JsonValue| match v.as_i64() {
            Some(n) if n > 0 => Ok(n),
            _ => Err(ShapeIssue::new("expected a positive integer").at("count").into()),
        });
        assert_eq!(positive.parse(&json!(4)).unwrap(), 4);
        let err = positive.parse(&json!(-1)).unwrap_err();
        assert_eq!(
            err.describe_first(),
            "(path=count; message=expected a positive integer)"
        );
    }

    #[test]
    fn empty_error_still_describes() {
        assert_eq!(ShapeError::default().describe_first(), "(no issues reported)");
    }
}
