//! Registry configuration.
//!
//! A [`StatelyConfig`] binds namespace names to global storages:
//!
//! ```json
//! {
//!   "namespaces": [
//!     { "name": "session", "global": "sessionStorage" },
//!     { "name": "local", "global": "localStorage", "optional": true }
//!   ],
//!   "default_namespace": "session"
//! }
//! ```
//!
//! Optional bindings are skipped when their global is not installed; any
//! other missing global fails the build.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StatelyError};
use crate::registry::{Stately, StatelyBuilder};
use crate::storage::{global, LOCAL_STORAGE, SESSION_STORAGE};

/// One namespace binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,
    /// Name in the global storage table.
    pub global: String,
    #[serde(default)]
    pub optional: bool,
}

impl NamespaceConfig {
    pub fn new(name: impl Into<String>, global: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            global: global.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Namespace bindings for a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatelyConfig {
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
    #[serde(default)]
    pub default_namespace: Option<String>,
}

impl Default for StatelyConfig {
    /// `session` always, `local` when the environment has one.
    fn default() -> Self {
        Self {
            namespaces: vec![
                NamespaceConfig::new("session", SESSION_STORAGE),
                NamespaceConfig::new("local", LOCAL_STORAGE).optional(),
            ],
            default_namespace: Some("session".to_string()),
        }
    }
}

impl StatelyConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(StatelyError::Config)
    }

    /// Add this configuration's bindings to a builder.
    pub fn apply(&self, mut builder: StatelyBuilder) -> Result<StatelyBuilder> {
        for ns in &self.namespaces {
            match global(&ns.global) {
                Ok(storage) => builder = builder.storage(ns.name.clone(), storage),
                Err(_) if ns.optional => {
                    debug!(namespace = %ns.name, global = %ns.global, "skipping optional namespace");
                }
                Err(err) => return Err(err),
            }
        }
        if let Some(name) = &self.default_namespace {
            builder = builder.default_namespace(name.clone());
        }
        Ok(builder)
    }
}

impl StatelyBuilder {
    /// Bind the default session and local namespaces.
    pub fn default_storages(self) -> Result<Self> {
        StatelyConfig::default().apply(self)
    }

    /// Bind the namespaces of `config`.
    pub fn config(self, config: &StatelyConfig) -> Result<Self> {
        config.apply(self)
    }
}

impl Stately {
    /// Build a registry from a configuration.
    pub fn from_config(config: &StatelyConfig) -> Result<Self> {
        Stately::builder().config(config)?.build()
    }
}
