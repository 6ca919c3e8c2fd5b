//! Environment-provided storages and lazy references to them.
//!
//! Browsers expose `sessionStorage` and `localStorage` as globals; other
//! environments may not. The global table plays that role here: hosts (or
//! tests) install storages under those names, and [`LazyStorage`] looks them
//! up only when a variable is first created. A factory bound to a missing
//! global therefore fails on first use, not when it is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use super::{MemoryStorage, Storage};
use crate::error::{Result, StatelyError};

/// Global name of the session-scoped storage.
pub const SESSION_STORAGE: &str = "sessionStorage";

/// Global name of the durable storage.
pub const LOCAL_STORAGE: &str = "localStorage";

static GLOBALS: OnceLock<RwLock<HashMap<String, Arc<dyn Storage>>>> = OnceLock::new();

fn globals() -> &'static RwLock<HashMap<String, Arc<dyn Storage>>> {
    GLOBALS.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Install a storage under a global name, returning the one it replaced.
pub fn install_global(name: impl Into<String>, storage: Arc<dyn Storage>) -> Option<Arc<dyn Storage>> {
    let name = name.into();
    debug!(global = %name, "installing global storage");
    globals().write().insert(name, storage)
}

/// Remove a global storage.
pub fn remove_global(name: &str) -> Option<Arc<dyn Storage>> {
    globals().write().remove(name)
}

/// Look up a global storage.
pub fn global(name: &str) -> Result<Arc<dyn Storage>> {
    globals()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| StatelyError::missing_global(name))
}

/// Install in-memory session and local storages where none exist yet.
///
/// Existing globals are left alone, so calling this repeatedly is harmless.
pub fn install_polyfills() {
    let mut table = globals().write();
    for name in [SESSION_STORAGE, LOCAL_STORAGE] {
        table
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(MemoryStorage::named(name)) as Arc<dyn Storage>);
    }
}

type Resolver = dyn Fn() -> Result<Arc<dyn Storage>> + Send + Sync;

/// A storage resolved on first use and remembered afterwards.
///
/// Failed resolutions are not remembered; the next use tries again.
#[derive(Clone)]
pub struct LazyStorage {
    label: Arc<str>,
    resolve: Arc<Resolver>,
    resolved: Arc<OnceLock<Arc<dyn Storage>>>,
}

impl LazyStorage {
    /// Defer to an arbitrary resolver.
    pub fn new<F>(label: impl Into<Arc<str>>, resolve: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Storage>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            resolve: Arc::new(resolve),
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// Defer to the global table entry `name`.
    pub fn global(name: &'static str) -> Self {
        Self::new(name, move || global(name))
    }

    /// Resolve the storage, running the resolver on first success only.
    pub fn resolve(&self) -> Result<Arc<dyn Storage>> {
        if let Some(storage) = self.resolved.get() {
            return Ok(Arc::clone(storage));
        }
        let storage = (self.resolve)()?;
        Ok(Arc::clone(self.resolved.get_or_init(|| storage)))
    }

    /// Whether a previous resolution succeeded.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl fmt::Debug for LazyStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyStorage")
            .field("label", &self.label)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Where a variable's storage comes from.
#[derive(Clone, Debug)]
pub enum StorageRef {
    /// A storage already in hand.
    Eager(Arc<dyn Storage>),
    /// A storage looked up on first use.
    Lazy(LazyStorage),
}

impl StorageRef {
    /// Produce the storage, resolving lazily bound ones.
    pub fn resolve(&self) -> Result<Arc<dyn Storage>> {
        match self {
            Self::Eager(storage) => Ok(Arc::clone(storage)),
            Self::Lazy(lazy) => lazy.resolve(),
        }
    }
}

impl From<Arc<dyn Storage>> for StorageRef {
    fn from(storage: Arc<dyn Storage>) -> Self {
        Self::Eager(storage)
    }
}

impl From<&Arc<dyn Storage>> for StorageRef {
    fn from(storage: &Arc<dyn Storage>) -> Self {
        Self::Eager(Arc::clone(storage))
    }
}

impl From<LazyStorage> for StorageRef {
    fn from(lazy: LazyStorage) -> Self {
        Self::Lazy(lazy)
    }
}
