//! Tagged value representation of attribute data.
//!
//! Attribute values arrive as loosely typed JSON. They are converted once into
//! [`Value`] and the writer renders that sum type, so every shape the compiler
//! can emit is visible in one place.

use std::collections::BTreeMap;

use serde_json::Number;

use crate::error::{ConfigError, ConfigResult};

/// A literal expression in the generated configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(Number),
    Bool(bool),
    List(Vec<Value>),
    /// Object keyed by arbitrary strings, rendered with quoted keys where needed.
    Map(BTreeMap<String, Value>),
    /// Object keyed by identifiers.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Convert a JSON value. Nulls are dropped, including nested ones.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => Some(Value::Number(n.clone())),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(items) => {
                Some(Value::List(items.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let entries: BTreeMap<String, Value> = map
                    .iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect();

                if entries.keys().all(|k| is_identifier(k)) {
                    Some(Value::Object(entries))
                } else {
                    Some(Value::Map(entries))
                }
            }
        }
    }

    /// Convert a float, rejecting values that have no literal form.
    pub fn float(name: &str, value: f64) -> ConfigResult<Self> {
        Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| ConfigError::UnsupportedValue {
                name: name.to_string(),
                reason: format!("{} is not a finite number", value),
            })
    }

    /// A raw expression such as `module.db.endpoint` or `string`.
    ///
    /// The expression is carried as a `{{...}}` placeholder string and the
    /// quotes are removed when the file is formatted.
    pub fn expression(expr: impl AsRef<str>) -> Self {
        Value::String(format!("{{{{{}}}}}", expr.as_ref()))
    }

    /// Build an identifier-keyed object from pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether rendering this value spans more than one line.
    pub fn is_multiline(&self) -> bool {
        match self {
            Value::Map(m) | Value::Object(m) => !m.is_empty(),
            Value::List(items) => items.iter().any(Value::is_multiline),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

/// Check whether a name is a valid HCL identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Convert a JSON attribute map, dropping null entries.
pub fn from_json_map(
    attributes: &BTreeMap<String, serde_json::Value>,
) -> ConfigResult<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (name, value) in attributes {
        if !is_identifier(name) {
            return Err(ConfigError::InvalidAttributeName(name.clone()));
        }
        if let Some(v) = Value::from_json(value) {
            out.insert(name.clone(), v);
        }
    }
    Ok(out)
}
