//! Error types for stately.

use std::sync::Arc;

use thiserror::Error;

use crate::storage::Storage;

/// Result type alias for stately operations.
pub type Result<T> = std::result::Result<T, StatelyError>;

/// Errors raised by the registry, factories and codec.
///
/// Malformed JSON in storage is not an error: the codec logs it and keeps
/// the raw string. Everything here points at a wiring bug or at a value that
/// cannot take the requested shape.
#[derive(Debug, Error)]
pub enum StatelyError {
    /// A variable was requested against a storage no namespace owns.
    ///
    /// Carries the request as given: key, whether a default was supplied,
    /// and the rendered type hint.
    #[error("storage {storage:?} is not registered with any namespace (key: {key}, default given: {has_default}, hint: {hint:?})")]
    UnregisteredStorage {
        storage: Arc<dyn Storage>,
        key: String,
        has_default: bool,
        hint: Option<String>,
    },

    /// No namespace with this name exists in the registry.
    #[error("unknown storage namespace: {0}")]
    UnknownNamespace(String),

    /// A global storage the environment does not provide.
    #[error("Global \"{name}\" is not available in this environment. Maybe you need a polyfill?")]
    MissingGlobal { name: String },

    /// Neither the options nor the registry supplied a storage.
    #[error("no storage given for key {key} and no default namespace configured")]
    NoStorage { key: String },

    /// A key already holds a variable of another value type.
    #[error("variable {namespace}/{key} already exists with a different value type (requested {requested})")]
    TypeMismatch {
        namespace: String,
        key: String,
        requested: &'static str,
    },

    /// A store was asked for a field its schema does not declare.
    #[error("store field not declared: {0}")]
    UnknownField(String),

    /// A value could not be encoded as JSON.
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    /// Write-backs that failed to encode during a flush. `source` is the
    /// failure for the first key.
    #[error("failed to write back {keys:?}: {source}")]
    WriteBack {
        keys: Vec<String>,
        #[source]
        source: Box<StatelyError>,
    },

    /// Decoded JSON could not take the shape of the requested type.
    #[error("failed to decode value for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),
}

impl StatelyError {
    /// Create a decode error for a key.
    pub fn decode(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            key: key.into(),
            source,
        }
    }

    /// Create a missing-global error.
    pub fn missing_global(name: impl Into<String>) -> Self {
        Self::MissingGlobal { name: name.into() }
    }

    /// Whether the error reflects wiring (registry setup) rather than data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredStorage { .. }
                | Self::UnknownNamespace(_)
                | Self::MissingGlobal { .. }
                | Self::NoStorage { .. }
                | Self::Config(_)
        )
    }
}
