use crate::serializer::PreferenceSerializer;
use crate::value::PreferenceValue;
use crate::PreferenceError;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Joins section and name into the flat identifier used by forms and lookups.
pub const IDENTIFIER_SEPARATOR: &str = "__";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreferenceKey {
    pub section: Option<String>,
    pub name: String,
}

impl PreferenceKey {
    pub fn new(section: Option<&str>, name: &str) -> Self {
        Self {
            section: section.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn identifier(&self) -> String {
        match &self.section {
            Some(section) => format!("{section}{IDENTIFIER_SEPARATOR}{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Splits an identifier on the first separator; no separator means no section.
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier.split_once(IDENTIFIER_SEPARATOR) {
            Some((section, name)) => Self::new(Some(section), name),
            None => Self::new(None, identifier),
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{section}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreferenceDefinition {
    key: PreferenceKey,
    default: PreferenceValue,
    serializer: Arc<dyn PreferenceSerializer>,
    help_text: Option<String>,
}

impl PreferenceDefinition {
    pub fn builder(
        section: Option<&str>,
        name: &str,
        serializer: impl PreferenceSerializer + 'static,
    ) -> PreferenceDefinitionBuilder {
        PreferenceDefinitionBuilder {
            key: PreferenceKey::new(section, name),
            default: None,
            serializer: Arc::new(serializer),
            help_text: None,
        }
    }

    pub fn key(&self) -> &PreferenceKey {
        &self.key
    }

    pub fn section(&self) -> Option<&str> {
        self.key.section.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn identifier(&self) -> String {
        self.key.identifier()
    }

    pub fn default_value(&self) -> &PreferenceValue {
        &self.default
    }

    pub fn serializer(&self) -> &dyn PreferenceSerializer {
        self.serializer.as_ref()
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help_text.as_deref()
    }

    pub fn serialize(&self, value: &PreferenceValue) -> Result<String, PreferenceError> {
        self.serializer
            .serialize(value)
            .map_err(|source| PreferenceError::Serialization {
                key: self.key.clone(),
                source,
            })
    }

    pub fn deserialize(&self, raw: &str) -> Result<PreferenceValue, PreferenceError> {
        self.serializer
            .deserialize(raw)
            .map_err(|source| PreferenceError::Deserialization {
                key: self.key.clone(),
                source,
            })
    }

    pub fn serialized_default(&self) -> Result<String, PreferenceError> {
        self.serialize(&self.default)
    }
}

#[derive(Debug)]
pub struct PreferenceDefinitionBuilder {
    key: PreferenceKey,
    default: Option<PreferenceValue>,
    serializer: Arc<dyn PreferenceSerializer>,
    help_text: Option<String>,
}

impl PreferenceDefinitionBuilder {
    pub fn default_value(mut self, value: impl Into<PreferenceValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = Some(text.into());
        self
    }

    pub fn build(self) -> Result<PreferenceDefinition, PreferenceError> {
        let invalid = |reason: String| PreferenceError::InvalidDefinition {
            key: self.key.to_string(),
            reason,
        };

        validate_part("name", &self.key.name).map_err(invalid)?;
        if let Some(section) = &self.key.section {
            validate_part("section", section).map_err(invalid)?;
        }
        let Some(default) = self.default.clone() else {
            return Err(invalid("missing default value".to_string()));
        };
        self.serializer
            .serialize(&default)
            .map_err(|err| invalid(format!("default rejected: {}", err.reason)))?;

        Ok(PreferenceDefinition {
            key: self.key,
            default,
            serializer: self.serializer,
            help_text: self.help_text,
        })
    }
}

fn validate_part(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.contains(IDENTIFIER_SEPARATOR) {
        return Err(format!(
            "{field} {value:?} cannot contain {IDENTIFIER_SEPARATOR:?}"
        ));
    }
    if !identifier_pattern().is_match(value) {
        return Err(format!("{field} {value:?} is not a valid identifier"));
    }
    Ok(())
}
