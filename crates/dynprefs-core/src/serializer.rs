use crate::value::PreferenceValue;
use std::fmt;
use thiserror::Error;

const TRUE_VALUES: &[&str] = &["True", "true", "TRUE", "1", "YES", "Yes", "yes"];
const FALSE_VALUES: &[&str] = &["False", "false", "FALSE", "0", "NO", "No", "no"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{serializer} serializer rejected value: {reason}")]
pub struct SerializationError {
    pub serializer: &'static str,
    pub reason: String,
}

impl SerializationError {
    pub fn new(serializer: &'static str, reason: impl Into<String>) -> Self {
        Self {
            serializer,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{serializer} serializer cannot decode {raw:?}: {reason}")]
pub struct DeserializationError {
    pub serializer: &'static str,
    pub raw: String,
    pub reason: String,
}

impl DeserializationError {
    pub fn new(serializer: &'static str, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            serializer,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Converts between typed preference values and their stored text form.
///
/// Implementations must round-trip: every value accepted by `serialize`
/// decodes back to an equal value.
pub trait PreferenceSerializer: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError>;

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanSerializer;

impl PreferenceSerializer for BooleanSerializer {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError> {
        match value {
            PreferenceValue::Bool(true) => Ok("True".to_string()),
            PreferenceValue::Bool(false) => Ok("False".to_string()),
            other => Err(SerializationError::new(
                self.name(),
                format!("expected bool, got {}", other.type_name()),
            )),
        }
    }

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError> {
        if TRUE_VALUES.contains(&raw) {
            return Ok(PreferenceValue::Bool(true));
        }
        if FALSE_VALUES.contains(&raw) {
            return Ok(PreferenceValue::Bool(false));
        }
        Err(DeserializationError::new(
            self.name(),
            raw,
            "not a recognised boolean literal",
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerSerializer {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl IntegerSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    fn check_range(&self, value: i64) -> Result<(), String> {
        if let Some(min) = self.min {
            if value < min {
                return Err(format!("{value} is below minimum {min}"));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(format!("{value} is above maximum {max}"));
            }
        }
        Ok(())
    }
}

impl PreferenceSerializer for IntegerSerializer {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError> {
        let PreferenceValue::Int(number) = value else {
            return Err(SerializationError::new(
                self.name(),
                format!("expected int, got {}", value.type_name()),
            ));
        };
        self.check_range(*number)
            .map_err(|reason| SerializationError::new(self.name(), reason))?;
        Ok(number.to_string())
    }

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError> {
        let number = raw
            .trim()
            .parse::<i64>()
            .map_err(|err| DeserializationError::new(self.name(), raw, err.to_string()))?;
        self.check_range(number)
            .map_err(|reason| DeserializationError::new(self.name(), raw, reason))?;
        Ok(PreferenceValue::Int(number))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatSerializer;

impl PreferenceSerializer for FloatSerializer {
    fn name(&self) -> &'static str {
        "float"
    }

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError> {
        // Ints are refused: they would read back as `Float`.
        let PreferenceValue::Float(number) = *value else {
            return Err(SerializationError::new(
                self.name(),
                format!("expected float, got {}", value.type_name()),
            ));
        };
        if !number.is_finite() {
            return Err(SerializationError::new(
                self.name(),
                format!("{number} is not finite"),
            ));
        }
        // `{:?}` keeps a trailing `.0` so the text always reads back as a float.
        Ok(format!("{number:?}"))
    }

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError> {
        let number = raw
            .trim()
            .parse::<f64>()
            .map_err(|err| DeserializationError::new(self.name(), raw, err.to_string()))?;
        if !number.is_finite() {
            return Err(DeserializationError::new(self.name(), raw, "not finite"));
        }
        Ok(PreferenceValue::Float(number))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer {
    pub max_length: Option<usize>,
}

impl StringSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
        }
    }

    fn check_length(&self, text: &str) -> Result<(), String> {
        match self.max_length {
            Some(max) if text.chars().count() > max => {
                Err(format!("length exceeds maximum of {max} characters"))
            }
            _ => Ok(()),
        }
    }
}

impl PreferenceSerializer for StringSerializer {
    fn name(&self) -> &'static str {
        "string"
    }

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError> {
        let PreferenceValue::Text(text) = value else {
            return Err(SerializationError::new(
                self.name(),
                format!("expected text, got {}", value.type_name()),
            ));
        };
        self.check_length(text)
            .map_err(|reason| SerializationError::new(self.name(), reason))?;
        Ok(text.clone())
    }

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError> {
        self.check_length(raw)
            .map_err(|reason| DeserializationError::new(self.name(), raw, reason))?;
        Ok(PreferenceValue::Text(raw.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChoiceSerializer {
    choices: Vec<String>,
}

impl ChoiceSerializer {
    pub fn new<I, T>(choices: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    fn is_choice(&self, text: &str) -> bool {
        self.choices.iter().any(|choice| choice == text)
    }
}

impl PreferenceSerializer for ChoiceSerializer {
    fn name(&self) -> &'static str {
        "choice"
    }

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError> {
        let PreferenceValue::Text(text) = value else {
            return Err(SerializationError::new(
                self.name(),
                format!("expected text, got {}", value.type_name()),
            ));
        };
        if !self.is_choice(text) {
            return Err(SerializationError::new(
                self.name(),
                format!("{text:?} is not one of {:?}", self.choices),
            ));
        }
        Ok(text.clone())
    }

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError> {
        if !self.is_choice(raw) {
            return Err(DeserializationError::new(
                self.name(),
                raw,
                "not an allowed choice",
            ));
        }
        Ok(PreferenceValue::Text(raw.to_string()))
    }
}

/// Stores any value as JSON text; decodes back into `PreferenceValue::Json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl PreferenceSerializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, value: &PreferenceValue) -> Result<String, SerializationError> {
        let PreferenceValue::Json(json) = value else {
            return Err(SerializationError::new(
                self.name(),
                format!("expected json, got {}", value.type_name()),
            ));
        };
        serde_json::to_string(json)
            .map_err(|err| SerializationError::new(self.name(), err.to_string()))
    }

    fn deserialize(&self, raw: &str) -> Result<PreferenceValue, DeserializationError> {
        serde_json::from_str(raw)
            .map(PreferenceValue::Json)
            .map_err(|err| DeserializationError::new(self.name(), raw, err.to_string()))
    }
}
