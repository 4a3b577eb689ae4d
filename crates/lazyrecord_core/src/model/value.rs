//! Scalar attribute values and attribute coercion.
//!
//! # Responsibility
//! - Define the stored representation of attribute fields.
//! - Coerce raw inbound values according to field declarations.
//!
//! # Invariants
//! - `Undefined` and `Bool(false)` are distinct empty states and are never
//!   folded into each other.
//! - Markup is trusted only when the field allows it *and* the caller asked
//!   for it on this call; trust is never inferred from content.
//! - Coercion never fails: unusable input is stored as `Undefined`.

use chrono::{NaiveDate, NaiveDateTime};
use log::warn;
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];
const DATE_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stored value of an attribute field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value. Default for attributes without a declared default.
    #[default]
    Undefined,
    /// Explicit null coming from raw payloads.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// String explicitly trusted as markup by the caller.
    Markup(Markup),
    DateTime(NaiveDateTime),
}

/// Trusted markup string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Markup(String);

impl Markup {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Markup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared coercion for an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    /// Parse strings into `NaiveDateTime`; keep `false` and `Undefined`.
    DateTime,
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns whether the value counts as "set" for boolean checks.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0 && !value.is_nan(),
            Self::Str(value) => !value.is_empty(),
            Self::Markup(value) => !value.as_str().is_empty(),
            Self::DateTime(_) => true,
        }
    }

    pub fn is_markup(&self) -> bool {
        matches!(self, Self::Markup(_))
    }

    /// Returns string content for plain and markup strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            Self::Markup(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
            Self::Markup(value) => write!(f, "{value}"),
            Self::DateTime(value) => write!(f, "{}", value.format(DISPLAY_DATETIME_FORMAT)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_none(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Str(value) => serializer.serialize_str(value),
            Self::Markup(value) => serializer.serialize_str(value.as_str()),
            Self::DateTime(value) => serializer
                .serialize_str(&value.format(DISPLAY_DATETIME_FORMAT).to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Markup> for Value {
    fn from(value: Markup) -> Self {
        Self::Markup(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Parses the date-time string shapes accepted by `AttrType::DateTime`.
///
/// Date-only input resolves to midnight.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Coerces one raw value for an attribute field.
///
/// `html_field` is the field declaration, `trusted` is the per-call request.
pub(crate) fn coerce_attr(
    raw: Value,
    attr_type: Option<AttrType>,
    html_field: bool,
    trusted: bool,
) -> Value {
    match attr_type {
        Some(AttrType::DateTime) => coerce_datetime(raw),
        None if html_field && trusted => match raw {
            Value::Str(content) => Value::Markup(Markup(content)),
            other => other,
        },
        None => raw,
    }
}

fn coerce_datetime(raw: Value) -> Value {
    match raw {
        Value::DateTime(_) | Value::Bool(false) | Value::Undefined => raw,
        Value::Null => Value::Undefined,
        Value::Str(text) => match parse_datetime(&text) {
            Some(parsed) => Value::DateTime(parsed),
            None => {
                warn!(
                    "event=attr_coerce module=model status=fallback attr_type=datetime reason=unparsable_string"
                );
                Value::Undefined
            }
        },
        _ => {
            warn!(
                "event=attr_coerce module=model status=fallback attr_type=datetime reason=unsupported_value"
            );
            Value::Undefined
        }
    }
}
