//! NUL handling for bound values.
//!
//! Postgres `text` and `jsonb` cannot store `\0`, so every NUL is swapped for
//! U+2400 (SYMBOL FOR NULL) before a value reaches the driver.

use std::borrow::Cow;

use serde_json::{Map, Value as JsonValue};

use crate::types::SqlValue;

/// Visible stand-in for `\0`.
pub const NUL_PLACEHOLDER: char = '\u{2400}';

/// Replace every NUL in `text`. Borrows when there is nothing to replace.
#[must_use]
pub fn sanitize_text(text: &str) -> Cow<'_, str> {
    if text.contains('\0') {
        Cow::Owned(text.replace('\0', "\u{2400}"))
    } else {
        Cow::Borrowed(text)
    }
}

fn sanitize_string(text: String) -> String {
    match sanitize_text(&text) {
        Cow::Borrowed(_) => text,
        Cow::Owned(replaced) => replaced,
    }
}

/// Recursively sanitize every string leaf and object key of a JSON document.
#[must_use]
pub fn sanitize_json(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(sanitize_string(s)),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sanitize_json).collect()),
        JsonValue::Object(entries) => JsonValue::Object(
            entries
                .into_iter()
                .map(|(key, value)| (sanitize_string(key), sanitize_json(value)))
                .collect::<Map<String, JsonValue>>(),
        ),
        other => other,
    }
}

/// Sanitize a parameter value. Only text and JSON are touched.
#[must_use]
pub fn sanitize_value(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(s) => SqlValue::Text(sanitize_string(s)),
        SqlValue::Json(v) => SqlValue::Json(sanitize_json(v)),
        other => other,
    }
}
