//! Serialization Codec
//!
//! Storage holds strings; variables hold typed values. Every stored value is
//! a plain JSON document with no envelope, so anything that edits storage by
//! hand (devtools, another app, an older build) stays readable.
//!
//! # Encoding
//!
//! A type's `Serialize` impl is its JSON representation. Types that want a
//! different stored form than their in-memory layout project themselves,
//! e.g. with `#[serde(into = "...")]`.
//!
//! # Decoding
//!
//! 1. Stored strings are parsed as JSON. Text that is not JSON is kept as a
//!    JSON string and the parse failure is logged; decoding continues.
//! 2. An optional [`TypeHint`] reshapes the parsed document:
//!    - [`TypeHint::Scalar`] coerces a mismatched value to the scalar kind,
//!    - [`TypeHint::FromJson`] hands the document to a rehydration function,
//!    - [`TypeHint::Structural`] (or no hint) reads it as the target type.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::error;

use crate::error::{Result, StatelyError};

/// Scalar kinds a stored value can be coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
}

impl ScalarKind {
    /// Kind of a decoded value, if it is a scalar.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self::String),
            Value::Number(_) => Some(Self::Number),
            Value::Bool(_) => Some(Self::Boolean),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert `value` to this kind.
    ///
    /// Conversions follow the loose rules web storage values are usually
    /// written under: numbers print without a trailing `.0`, blank strings
    /// count as zero, `0x`/`0o`/`0b` literals are read in their radix, and
    /// empty strings, zero and null are falsy. A number that cannot be
    /// represented in JSON, including infinities, becomes `null`.
    pub fn coerce(self, value: Value) -> Value {
        match self {
            Self::String => Value::String(to_display_string(&value)),
            Self::Number => to_number(&value).map_or(Value::Null, number_value),
            Self::Boolean => Value::Bool(truthy(&value)),
        }
    }
}

fn to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f == 0.0 => "0".to_owned(),
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_display_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_owned(),
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else if let Some(radix) = radix_literal(trimmed) {
                radix
            } else {
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        Value::Array(items) => match items.as_slice() {
            [] => Some(0.0),
            [single] => to_number(&Value::String(to_display_string(single))),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

/// `0x`, `0o` and `0b` literals. Signs are not allowed in front of them.
/// Returns `None` when `s` has no such prefix.
fn radix_literal(s: &str) -> Option<Option<f64>> {
    let prefix = s.get(..2)?.to_ascii_lowercase();
    let radix = match prefix.as_str() {
        "0x" => 16,
        "0o" => 8,
        "0b" => 2,
        _ => return None,
    };
    let digits = &s[2..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Some(None);
    }
    Some(
        digits
            .chars()
            .try_fold(0f64, |acc, c| c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))),
    )
}

fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < (i64::MAX as f64) {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

type Rehydrate<T> = dyn Fn(Value) -> std::result::Result<T, serde_json::Error> + Send + Sync;

/// How to turn a decoded JSON document into a `T`.
pub enum TypeHint<T> {
    /// Coerce to a scalar kind when the stored kind differs.
    Scalar(ScalarKind),
    /// Rebuild the value with a dedicated function.
    FromJson(Arc<Rehydrate<T>>),
    /// Read the document's fields straight into `T`.
    Structural,
}

impl<T> TypeHint<T> {
    /// Hint with a rehydration function.
    pub fn from_json<F>(rehydrate: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<T, serde_json::Error> + Send + Sync + 'static,
    {
        Self::FromJson(Arc::new(rehydrate))
    }
}

impl<T> Clone for TypeHint<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Scalar(kind) => Self::Scalar(*kind),
            Self::FromJson(f) => Self::FromJson(Arc::clone(f)),
            Self::Structural => Self::Structural,
        }
    }
}

impl<T> fmt::Debug for TypeHint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => f.debug_tuple("Scalar").field(kind).finish(),
            Self::FromJson(_) => f.write_str("FromJson(..)"),
            Self::Structural => f.write_str("Structural"),
        }
    }
}

/// Input to [`deserialize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Raw<'a> {
    /// Text read from storage.
    Stored(&'a str),
    /// An already decoded document; it is not parsed again.
    Value(Value),
}

/// Encode a value for storage.
pub fn serialize<T>(value: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string(value).map_err(StatelyError::Encode)
}

/// Parse stored text, keeping it verbatim when it is not JSON.
pub fn parse_stored(raw: &str, key: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            error!(key, value = raw, error = %err, "error parsing stored value");
            Value::String(raw.to_owned())
        }
    }
}

/// Decode a stored value into `T`.
///
/// Malformed JSON never fails here; see the module docs. The only error is a
/// document that cannot take the shape of `T` after hinting.
pub fn deserialize<T>(raw: Raw<'_>, hint: Option<&TypeHint<T>>, key: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let value = match raw {
        Raw::Stored(text) => parse_stored(text, key),
        Raw::Value(value) => value,
    };

    let decoded = match hint {
        Some(TypeHint::Scalar(kind)) => {
            let value = if ScalarKind::of(&value) == Some(*kind) {
                value
            } else {
                kind.coerce(value)
            };
            serde_json::from_value(value)
        }
        Some(TypeHint::FromJson(rehydrate)) => rehydrate(value),
        Some(TypeHint::Structural) | None => serde_json::from_value(value),
    };

    decoded.map_err(|source| StatelyError::decode(key, source))
}
