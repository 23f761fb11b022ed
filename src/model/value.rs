//! Form field values and the ordered name → value mapping.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{FormError, Result};

/// A primitive value accepted as a scalar form field.
///
/// Everything except raw bytes is rendered through its canonical text form:
/// - `Null` → `""`
/// - `Bool(true)` → `"true"`, `Bool(false)` → `"false"`
/// - `Int(42)` → `"42"`
/// - `Float(1.0)` → `"1.0"`, `Float(1e20)` → `"1e+20"`
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// Absent value, rendered as an empty body.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw bytes, passed through unchanged.
    Bytes(Bytes),
}

impl PrimitiveValue {
    /// The value's encoded body bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Bytes(b) => b.clone(),
            Self::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
            other => Bytes::from(other.canonical_text()),
        }
    }

    /// Canonical text form. Raw bytes are decoded lossily.
    pub fn canonical_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "true".to_string(),
            Self::Bool(false) => "false".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => format_float(*f),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Convert a JSON scalar. Arrays and objects are rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(u) = n.as_u64() {
                    // Beyond i64: keep the exact decimal digits.
                    Ok(Self::Text(u.to_string()))
                } else {
                    Ok(Self::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(FormError::validation(format!(
                "expected a primitive value (text, bytes, integer, float, bool or null), got {}",
                json_kind(value)
            ))),
        }
    }
}

/// Shortest round-trip float text with a signed, two-digit exponent
/// (`1e+20`, `1.5e-07`), `inf`, `-inf` and `nan`.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let text = format!("{f:?}");
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<&str> for PrimitiveValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PrimitiveValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&[u8]> for PrimitiveValue {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for PrimitiveValue {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for PrimitiveValue {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<bool> for PrimitiveValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for PrimitiveValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for PrimitiveValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for PrimitiveValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f32> for PrimitiveValue {
    fn from(f: f32) -> Self {
        Self::Float(f64::from(f))
    }
}

impl From<f64> for PrimitiveValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl<T: Into<PrimitiveValue>> From<Option<T>> for PrimitiveValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// The value side of a form mapping entry: one scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Single(PrimitiveValue),
    /// Expanded into one field per element, in list order.
    List(Vec<PrimitiveValue>),
}

/// Ordered form data: `name → scalar | list-of-scalar`.
///
/// Iteration order is insertion order; it decides the order of the
/// rendered parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single-valued field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<PrimitiveValue>) -> Self {
        self.push(name, FormValue::Single(value.into()));
        self
    }

    /// Append a list-valued field.
    pub fn list<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PrimitiveValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push(name, FormValue::List(values));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: FormValue) {
        self.entries.push((name.into(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build form data from a JSON object, keeping key order.
    ///
    /// Arrays become list-valued entries; any other nesting is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(FormError::validation(format!(
                "form data must be a JSON object, got {}",
                json_kind(value)
            )));
        };

        let mut data = Self::new();
        for (name, value) in map {
            let form_value = match value {
                Value::Array(items) => FormValue::List(
                    items
                        .iter()
                        .map(PrimitiveValue::from_json)
                        .collect::<Result<Vec<_>>>()?,
                ),
                other => FormValue::Single(PrimitiveValue::from_json(other)?),
            };
            data.push(name.clone(), form_value);
        }
        Ok(data)
    }
}

impl IntoIterator for FormData {
    type Item = (String, FormValue);
    type IntoIter = std::vec::IntoIter<(String, FormValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
