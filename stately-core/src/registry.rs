//! Signal Registry
//!
//! [`Stately`] is the single source of truth for "does a variable already
//! exist for this storage and key". Each registered storage gets a named
//! namespace; each namespace maps keys to the one [`StorageVar`] that
//! mirrors them, created on first request and kept for the registry's
//! lifetime.
//!
//! # Guarantees
//!
//! - One variable, and therefore one write-back effect, per (storage, key).
//!   Everyone asking for the pair gets a handle to the same cell.
//! - The first request decides the default and type hint. Later requests
//!   get the existing variable unchanged.
//! - Creating a variable never writes to storage unless asked to with
//!   `force`.
//!
//! Variables belong to the storage, not to the name. Binding one storage
//! under two names makes the names aliases: both see the same variables.
//!
//! Registries are plain values: an application keeps one, a test builds a
//! fresh one. Nothing is shared between two registries except the storages
//! themselves.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::codec::TypeHint;
use crate::error::{Result, StatelyError};
use crate::reactive::Signal;
use crate::storage::{same_storage, Storage};
use crate::var::{attach, load_initial, AttachMode, MaybeSynced, StorageValue, StorageVar, VarMeta};

/// Options for [`Stately::get_or_create`].
pub struct GetOrCreate<T> {
    pub default: Option<T>,
    pub hint: Option<TypeHint<T>>,
    /// Persist the initial value right away instead of skipping the first
    /// write-back.
    pub force: bool,
}

impl<T> Default for GetOrCreate<T> {
    fn default() -> Self {
        Self {
            default: None,
            hint: None,
            force: false,
        }
    }
}

impl<T> GetOrCreate<T> {
    pub fn with_default(default: T) -> Self {
        Self {
            default: Some(default),
            ..Self::default()
        }
    }

    pub fn hint(mut self, hint: TypeHint<T>) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Variables of one storage instance, shared by every name bound to it.
struct Namespace {
    storage: Arc<dyn Storage>,
    signals: DashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Namespace {
    fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            signals: DashMap::new(),
        }
    }
}

/// The signal registry.
pub struct Stately {
    namespaces: IndexMap<String, Arc<Namespace>>,
    default_namespace: Option<String>,
}

impl Stately {
    /// An empty registry. Storages are added with [`Stately::register_storage`].
    pub fn new() -> Self {
        Self {
            namespaces: IndexMap::new(),
            default_namespace: None,
        }
    }

    /// Start building a registry.
    pub fn builder() -> StatelyBuilder {
        StatelyBuilder::default()
    }

    /// Bind `storage` to the namespace `name`.
    ///
    /// A storage already bound under another name keeps its variables and
    /// the new name becomes an alias. Re-binding a name to a different
    /// storage leaves it with that storage's variables. The name moves to the
    /// end of the registration order and the previous storage is returned.
    pub fn register_storage(&mut self, name: impl Into<String>, storage: Arc<dyn Storage>) -> Option<Arc<dyn Storage>> {
        let name = name.into();
        let previous = self.namespaces.shift_remove(&name);

        let existing = self
            .namespaces
            .values()
            .chain(previous.iter())
            .find(|ns| same_storage(&ns.storage, &storage))
            .map(Arc::clone);
        debug!(namespace = %name, storage = ?storage, alias = existing.is_some(), "registering storage");

        let ns = existing.unwrap_or_else(|| Arc::new(Namespace::new(storage)));
        self.namespaces.insert(name, ns);
        previous.map(|ns| Arc::clone(&ns.storage))
    }

    /// Namespace used when a variable is requested without a storage.
    pub fn set_default_namespace(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.namespaces.contains_key(&name) {
            return Err(StatelyError::UnknownNamespace(name));
        }
        self.default_namespace = Some(name);
        Ok(())
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Storage bound to the default namespace, if one is configured.
    pub fn default_storage(&self) -> Option<Arc<dyn Storage>> {
        let name = self.default_namespace.as_deref()?;
        self.namespaces.get(name).map(|ns| Arc::clone(&ns.storage))
    }

    /// Storage bound to a namespace.
    pub fn storage(&self, namespace: &str) -> Option<Arc<dyn Storage>> {
        self.namespaces.get(namespace).map(|ns| Arc::clone(&ns.storage))
    }

    /// Namespace names in registration order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Reverse lookup from a storage instance to its namespace.
    ///
    /// Matches by identity. When one storage is bound to several names, the
    /// last registered wins.
    pub fn get_storage_name(&self, storage: &Arc<dyn Storage>) -> Option<&str> {
        self.namespaces
            .iter()
            .rev()
            .find(|(_, ns)| same_storage(&ns.storage, storage))
            .map(|(name, _)| name.as_str())
    }

    /// Whether a variable exists for `key` in `namespace`.
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|ns| ns.signals.contains_key(key))
    }

    /// Number of variables in a namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, |ns| ns.signals.len())
    }

    /// Whether a namespace holds no variables.
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Return the variable for `key`, creating it on first request.
    ///
    /// A new variable starts from the decoded stored value, or from
    /// `options.default` when the key is absent, and gets its write-back
    /// effect before it is returned.
    pub fn get_or_create<T>(&self, namespace: &str, key: &str, options: GetOrCreate<T>) -> Result<StorageVar<T>>
    where
        T: StorageValue,
    {
        let ns = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| StatelyError::UnknownNamespace(namespace.to_owned()))?;

        match ns.signals.entry(key.to_owned()) {
            Entry::Occupied(entry) => entry
                .get()
                .downcast_ref::<StorageVar<T>>()
                .cloned()
                .ok_or_else(|| StatelyError::TypeMismatch {
                    namespace: namespace.to_owned(),
                    key: key.to_owned(),
                    requested: type_name::<T>(),
                }),
            Entry::Vacant(entry) => {
                let GetOrCreate { default, hint, force } = options;
                let value = load_initial(ns.storage.as_ref(), key, hint.as_ref(), default.clone());

                let var = attach(
                    Signal::new(value),
                    VarMeta::new(key, Arc::clone(&ns.storage), default),
                    AttachMode::Deferred,
                );
                debug!(namespace, key, force, "creating storage variable");
                self.register(&var, force);

                entry.insert(Box::new(var.clone()));
                Ok(var)
            }
        }
    }

    /// Install the write-back effect for a variable.
    ///
    /// Does nothing for plain signals and for variables that already persist.
    /// Unless `force` is set, the effect's first firing is skipped so the
    /// current value is not written back.
    pub fn register(&self, var: &dyn MaybeSynced, force: bool) {
        let Some(synced) = var.as_synced() else {
            return;
        };
        if synced.is_initialized() {
            return;
        }

        if synced.install_persistence(!force) {
            let storage = synced.storage();
            debug!(
                key = %synced.key(),
                namespace = self.get_storage_name(&storage).unwrap_or("<unregistered>"),
                force,
                "registered storage variable"
            );
        }
    }

    /// Read a key's current value, creating its variable if needed.
    pub fn get<T>(&self, namespace: &str, key: &str) -> Result<Option<T>>
    where
        T: StorageValue,
    {
        Ok(self.get_or_create::<T>(namespace, key, GetOrCreate::default())?.get())
    }

    /// Read a key with a type hint, creating its variable if needed.
    pub fn get_hinted<T>(&self, namespace: &str, key: &str, hint: TypeHint<T>) -> Result<Option<T>>
    where
        T: StorageValue,
    {
        Ok(self
            .get_or_create(namespace, key, GetOrCreate::default().hint(hint))?
            .get())
    }

    /// Set a key's value, creating its variable if needed.
    ///
    /// A variable created here persists its first value without waiting for
    /// a change.
    pub fn set<T>(&self, namespace: &str, key: &str, value: T) -> Result<()>
    where
        T: StorageValue,
    {
        self.get_or_create::<T>(namespace, key, GetOrCreate::default().force(true))?
            .set(value);
        Ok(())
    }
}

impl Default for Stately {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stately {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, ns) in &self.namespaces {
            map.entry(name, &ns.signals.len());
        }
        map.finish()
    }
}

/// Builder for [`Stately`].
#[derive(Default)]
pub struct StatelyBuilder {
    storages: Vec<(String, Arc<dyn Storage>)>,
    default_namespace: Option<String>,
}

impl StatelyBuilder {
    /// Bind a storage to a namespace name.
    pub fn storage(mut self, name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        self.storages.push((name.into(), storage));
        self
    }

    /// Namespace used for variables requested without a storage.
    pub fn default_namespace(mut self, name: impl Into<String>) -> Self {
        self.default_namespace = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Stately> {
        let mut stately = Stately::new();
        for (name, storage) in self.storages {
            stately.register_storage(name, storage);
        }
        if let Some(name) = self.default_namespace {
            stately.set_default_namespace(name)?;
        }
        Ok(stately)
    }
}
