use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl PreferenceValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PreferenceValue::Bool(_) => "bool",
            PreferenceValue::Int(_) => "int",
            PreferenceValue::Float(_) => "float",
            PreferenceValue::Text(_) => "text",
            PreferenceValue::Json(_) => "json",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PreferenceValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PreferenceValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PreferenceValue::Float(value) => Some(*value),
            PreferenceValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PreferenceValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Plain JSON form, used by the JSON serializer and template consumers.
    pub fn to_json(&self) -> Value {
        match self {
            PreferenceValue::Bool(value) => Value::Bool(*value),
            PreferenceValue::Int(value) => Value::from(*value),
            PreferenceValue::Float(value) => Value::from(*value),
            PreferenceValue::Text(value) => Value::String(value.clone()),
            PreferenceValue::Json(value) => value.clone(),
        }
    }
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceValue::Bool(value) => write!(f, "{value}"),
            PreferenceValue::Int(value) => write!(f, "{value}"),
            PreferenceValue::Float(value) => write!(f, "{value}"),
            PreferenceValue::Text(value) => f.write_str(value),
            PreferenceValue::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        PreferenceValue::Bool(value)
    }
}

impl From<i64> for PreferenceValue {
    fn from(value: i64) -> Self {
        PreferenceValue::Int(value)
    }
}

impl From<i32> for PreferenceValue {
    fn from(value: i32) -> Self {
        PreferenceValue::Int(i64::from(value))
    }
}

impl From<f64> for PreferenceValue {
    fn from(value: f64) -> Self {
        PreferenceValue::Float(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        PreferenceValue::Text(value.to_string())
    }
}

impl From<String> for PreferenceValue {
    fn from(value: String) -> Self {
        PreferenceValue::Text(value)
    }
}

impl From<Value> for PreferenceValue {
    fn from(value: Value) -> Self {
        PreferenceValue::Json(value)
    }
}
