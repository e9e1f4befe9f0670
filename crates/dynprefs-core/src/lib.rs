//! Preference definitions, registries and the record entity that maps a
//! stored `raw_value` onto a typed value through its registry definition.

pub mod definition;
pub mod record;
pub mod registry;
pub mod scope;
pub mod serializer;
pub mod value;

pub use definition::{PreferenceDefinition, PreferenceDefinitionBuilder, PreferenceKey};
pub use record::{GlobalPreference, PreferenceRecord, SitePreference, UserPreference};
pub use registry::{PreferenceRegistries, PreferenceRegistry};
pub use scope::{GlobalScope, Scope, ScopeKind, SiteId, SiteScope, UserId, UserScope};
pub use serializer::{
    BooleanSerializer, ChoiceSerializer, DeserializationError, FloatSerializer,
    IntegerSerializer, JsonSerializer, PreferenceSerializer, SerializationError,
    StringSerializer,
};
pub use value::PreferenceValue;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("no {scope} preference registered for {key}")]
    UnknownPreference { scope: ScopeKind, key: PreferenceKey },
    #[error("cannot serialize value for {key}: {source}")]
    Serialization {
        key: PreferenceKey,
        #[source]
        source: SerializationError,
    },
    #[error("cannot deserialize stored value for {key}: {source}")]
    Deserialization {
        key: PreferenceKey,
        #[source]
        source: DeserializationError,
    },
    #[error("{scope} preference {key} is already registered")]
    DuplicateDefinition { scope: ScopeKind, key: PreferenceKey },
    #[error("invalid preference definition {key}: {reason}")]
    InvalidDefinition { key: String, reason: String },
    #[error("registry scope mismatch: expected {expected}, found {found}")]
    ScopeMismatch { expected: ScopeKind, found: ScopeKind },
}
