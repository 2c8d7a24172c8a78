//! Dynamic values produced by literals, attributes and functions, and the
//! coercions between them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use geo_types::Geometry;
use geozero::ToWkt;

use crate::color::Rgb;
use crate::error::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Color(Rgb),
    Geometry(Geometry<f64>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Color(_) => "colour",
            Value::Geometry(_) => "geometry",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Parse numeric token text, dropping any unit suffix (`1px` -> 1).
    pub fn parse_number(text: &str) -> Option<Value> {
        let numeric = numeric_prefix(text);
        if numeric.is_empty() {
            return None;
        }
        if !numeric.contains('.') {
            if let Ok(i) = numeric.parse::<i64>() {
                return Some(Value::Int(i));
            }
        }
        numeric.parse::<f64>().ok().map(Value::Double)
    }

    /// Numeric view of the value, if it has one. Strings are parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Equality with numeric and string coercion. Null equals nothing.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
                s.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
            }
            (Value::Color(a), Value::Color(b)) => a == b,
            (Value::Color(c), Value::String(s)) | (Value::String(s), Value::Color(c)) => {
                s.parse::<Rgb>().is_ok_and(|parsed| parsed == *c)
            }
            (Value::Geometry(a), Value::Geometry(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Ordering with numeric coercion. `None` when the values are not comparable.
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => Some(a.cmp(b)),
            },
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::Color(c) => write!(f, "{}", c),
            Value::Geometry(g) => match g.to_wkt() {
                Ok(wkt) => write!(f, "{}", wkt),
                Err(_) => write!(f, "{:?}", g),
            },
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Map(_) => write!(f, "{}", serde_json::Value::from(self)),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f32 => Double,
    f64 => Double,
    String => String,
    &str => String,
    Rgb => Color,
    Geometry<f64> => Geometry,
    Vec<Value> => List,
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Double),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Color(_) | Value::Geometry(_) => serde_json::Value::String(value.to_string()),
            Value::List(items) => items.iter().map(serde_json::Value::from).collect(),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Conversion from a dynamic value into a concrete Rust type.
pub trait FromValue: Sized {
    const TYPE_NAME: &'static str;

    fn from_value(value: Value) -> Result<Self, EvaluationError>;
}

fn mismatch<T: FromValue>(value: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        expected: T::TYPE_NAME,
        found: format!("{} {:?}", value.type_name(), value.to_string()),
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        Ok(value)
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match value {
            Value::String(s) => Ok(s),
            Value::Map(_) => Err(mismatch::<Self>(&value)),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match &value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Double(d) => Ok(*d != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(mismatch::<Self>(&value)),
            },
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "double";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match &value {
            Value::Int(_) | Value::Double(_) | Value::Bool(_) | Value::String(_) => {
                value.as_f64().ok_or_else(|| mismatch::<Self>(&value))
            }
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl FromValue for f32 {
    const TYPE_NAME: &'static str = "float";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        f64::from_value(value).map(|d| d as f32)
    }
}

impl FromValue for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match &value {
            Value::Int(i) => Ok(*i),
            // truncates toward zero
            Value::Double(d) if d.is_finite() => Ok(d.trunc() as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::String(s) => parse_numeric(s)
                .filter(|d| d.is_finite())
                .map(|d| d.trunc() as i64)
                .ok_or_else(|| mismatch::<Self>(&value)),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl FromValue for i32 {
    const TYPE_NAME: &'static str = "integer";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| mismatch::<Self>(&Value::Int(wide)))
    }
}

impl FromValue for Rgb {
    const TYPE_NAME: &'static str = "colour";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match &value {
            Value::Color(c) => Ok(*c),
            Value::String(s) => s.parse().map_err(|_| mismatch::<Self>(&value)),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl FromValue for Geometry<f64> {
    const TYPE_NAME: &'static str = "geometry";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match value {
            Value::Geometry(g) => Ok(g),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

/// Number arrays such as `line-dasharray: 1.0 2.0 3.0`.
impl FromValue for Vec<f64> {
    const TYPE_NAME: &'static str = "number array";

    fn from_value(value: Value) -> Result<Self, EvaluationError> {
        match value {
            Value::List(items) => items.into_iter().map(f64::from_value).collect(),
            Value::String(ref s) => s
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|part| !part.is_empty())
                .map(|part| parse_numeric(part).ok_or_else(|| mismatch::<Self>(&value)))
                .collect(),
            Value::Int(_) | Value::Double(_) => Ok(vec![f64::from_value(value)?]),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

fn numeric_prefix(text: &str) -> &str {
    let text = text.trim();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '-' | '+' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            c if c.is_ascii_digit() => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }
    &text[..end]
}

/// Parse a number, tolerating a trailing unit ("2px", "50 mph").
pub(crate) fn parse_numeric(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(d) = text.parse::<f64>() {
        return Some(d);
    }
    let prefix = numeric_prefix(text);
    if prefix.chars().any(|c| c.is_ascii_digit()) {
        prefix.parse::<f64>().ok()
    } else {
        None
    }
}
