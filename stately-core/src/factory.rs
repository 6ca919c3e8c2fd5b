//! Variable Factory
//!
//! The user-facing way to make variables. [`Stately::create_var`] routes a
//! request through the registry so repeated requests share one variable;
//! [`VarFactory`] fixes the storage up front so call sites only name a key
//! and a default.
//!
//! ```ignore
//! let prefs = stately.bind(&local);
//! let theme = prefs.var("theme", Some("dark".to_string()))?;
//! ```
//!
//! Factories bound to a [`LazyStorage`] look their storage up on each
//! creation until the lookup succeeds, so binding to a global that does not
//! exist yet is fine as long as it is installed before the first variable.

use tracing::debug;

use crate::error::{Result, StatelyError};
use crate::registry::{GetOrCreate, Stately};
use crate::storage::{LazyStorage, StorageRef, LOCAL_STORAGE, SESSION_STORAGE};
use crate::var::{storage_var, StorageValue, StorageVar, VarOptions};

impl Stately {
    /// Create (or fetch) the registry variable described by `options`.
    ///
    /// Without an explicit storage the default namespace is used. The
    /// storage must be registered; otherwise the call fails and the registry
    /// is left untouched.
    pub fn create_var<T>(&self, options: VarOptions<T>) -> Result<StorageVar<T>>
    where
        T: StorageValue,
    {
        let VarOptions {
            key,
            storage,
            default,
            hint,
        } = options;

        let storage = match storage {
            Some(storage) => storage.resolve()?,
            None => self
                .default_storage()
                .ok_or_else(|| StatelyError::NoStorage { key: key.clone() })?,
        };

        let Some(namespace) = self.get_storage_name(&storage) else {
            debug!(key = %key, storage = ?storage, "refusing variable for unregistered storage");
            return Err(StatelyError::UnregisteredStorage {
                storage,
                key,
                has_default: default.is_some(),
                hint: hint.as_ref().map(|hint| format!("{hint:?}")),
            });
        };

        self.get_or_create(
            namespace,
            &key,
            GetOrCreate {
                default,
                hint,
                force: false,
            },
        )
    }

    /// A factory whose variables live in `storage`.
    pub fn bind(&self, storage: impl Into<StorageRef>) -> VarFactory<'_> {
        VarFactory {
            registry: Some(self),
            storage: storage.into(),
        }
    }

    /// A factory bound to the `sessionStorage` global.
    pub fn session_var(&self) -> VarFactory<'_> {
        self.bind(LazyStorage::global(SESSION_STORAGE))
    }

    /// A factory bound to the `localStorage` global.
    pub fn local_var(&self) -> VarFactory<'_> {
        self.bind(LazyStorage::global(LOCAL_STORAGE))
    }
}

/// A variable constructor with its storage already chosen.
///
/// Registry-backed factories deduplicate by key; standalone ones create a
/// fresh self-persisting variable on every call.
#[derive(Clone, Debug)]
pub struct VarFactory<'a> {
    registry: Option<&'a Stately>,
    storage: StorageRef,
}

impl VarFactory<'static> {
    /// A factory that bypasses any registry.
    pub fn standalone(storage: impl Into<StorageRef>) -> Self {
        Self {
            registry: None,
            storage: storage.into(),
        }
    }
}

impl<'a> VarFactory<'a> {
    pub fn storage_ref(&self) -> &StorageRef {
        &self.storage
    }

    pub fn is_standalone(&self) -> bool {
        self.registry.is_none()
    }

    /// Create a variable for `key` with an optional default.
    pub fn var<T>(&self, key: impl Into<String>, default: Option<T>) -> Result<StorageVar<T>>
    where
        T: StorageValue,
    {
        let mut options = VarOptions::new(key);
        options.default = default;
        self.create(options)
    }

    /// Create a variable from full options. The bound storage overrides any
    /// storage in `options`.
    pub fn create<T>(&self, mut options: VarOptions<T>) -> Result<StorageVar<T>>
    where
        T: StorageValue,
    {
        options.storage = Some(self.storage.clone());
        match self.registry {
            Some(registry) => registry.create_var(options),
            None => storage_var(options),
        }
    }
}

/// A standalone factory for the `sessionStorage` global.
pub fn session_var() -> VarFactory<'static> {
    VarFactory::standalone(LazyStorage::global(SESSION_STORAGE))
}

/// A standalone factory for the `localStorage` global.
pub fn local_var() -> VarFactory<'static> {
    VarFactory::standalone(LazyStorage::global(LOCAL_STORAGE))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::{ScalarKind, TypeHint};
    use crate::reactive::Runtime;
    use crate::storage::{global, install_polyfills, MemoryStorage, Storage};

    fn registry() -> (Stately, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::named("session"));
        let stately = Stately::builder()
            .storage("session", Arc::clone(&storage))
            .default_namespace("session")
            .build()
            .unwrap();
        (stately, storage)
    }

    #[test]
    fn create_var_uses_default_namespace() {
        let (stately, storage) = registry();
        let var = stately
            .create_var(VarOptions::new("breed").default_value("corgi".to_string()))
            .unwrap();

        assert_eq!(var.get().as_deref(), Some("corgi"));
        assert!(stately.contains("session", "breed"));

        var.set("husky".to_string());
        Runtime::flush();
        assert_eq!(storage.get_item("breed").as_deref(), Some("\"husky\""));
    }

    #[test]
    fn create_var_without_any_storage_fails() {
        let stately = Stately::new();
        let err = stately.create_var::<u32>(VarOptions::new("k")).unwrap_err();
        assert!(matches!(err, StatelyError::NoStorage { ref key } if key == "k"));
    }

    #[test]
    fn unregistered_storage_fails_without_creating() {
        let (stately, _) = registry();
        let stranger: Arc<dyn Storage> = Arc::new(MemoryStorage::named("stranger"));

        let err = stately
            .create_var(
                VarOptions::new("orphan")
                    .storage(&stranger)
                    .default_value(5u32)
                    .hint(TypeHint::Scalar(ScalarKind::Number)),
            )
            .unwrap_err();
        match err {
            StatelyError::UnregisteredStorage {
                ref storage,
                ref key,
                has_default,
                ref hint,
            } => {
                assert!(crate::storage::same_storage(storage, &stranger));
                assert_eq!(key, "orphan");
                assert!(has_default);
                assert_eq!(hint.as_deref(), Some("Scalar(Number)"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!stately.contains("session", "orphan"));
        assert!(stately.is_empty("session"));
    }

    #[test]
    fn bound_factory_deduplicates() {
        let (stately, storage) = registry();
        let factory = stately.bind(&storage);

        let a = factory.var("count", Some(1u32)).unwrap();
        let b = factory.var("count", Some(9u32)).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(b.get(), Some(1));
        assert!(!factory.is_standalone());
    }

    #[test]
    fn bound_factory_applies_hints() {
        let (stately, storage) = registry();
        storage.set_item("flag", "1");

        let var = stately
            .bind(&storage)
            .create(VarOptions::<bool>::new("flag").hint(TypeHint::Scalar(ScalarKind::Boolean)))
            .unwrap();
        assert_eq!(var.get(), Some(true));
    }

    #[test]
    fn standalone_factories_do_not_deduplicate() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let factory = VarFactory::standalone(&storage);

        let a = factory.var("k", Some(1u32)).unwrap();
        let b = factory.var("k", Some(1u32)).unwrap();
        assert!(!a.ptr_eq(&b));
        assert!(a.is_initialized());

        a.set(2);
        Runtime::flush();
        assert_eq!(storage.get_item("k").as_deref(), Some("2"));
    }

    #[test]
    fn factory_bound_to_missing_global_fails_on_first_use() {
        let factory = VarFactory::standalone(LazyStorage::global("storageNobodyInstalled"));
        let err = factory.var::<u32>("k", None).unwrap_err();
        assert!(matches!(err, StatelyError::MissingGlobal { .. }));
        assert!(factory.storage_ref().resolve().is_err());
    }

    #[test]
    fn session_helpers_resolve_the_installed_global() {
        install_polyfills();
        let session = global(SESSION_STORAGE).unwrap();
        let stately = Stately::builder()
            .storage("session", Arc::clone(&session))
            .build()
            .unwrap();

        let var = stately
            .session_var()
            .var("factory-session-helper", Some(3u32))
            .unwrap();
        assert!(stately.contains("session", "factory-session-helper"));

        var.set(4);
        Runtime::flush();
        assert_eq!(session.get_item("factory-session-helper").as_deref(), Some("4"));

        let standalone = session_var().var::<u32>("factory-session-helper", None).unwrap();
        assert_eq!(standalone.get(), Some(4));
    }

    #[test]
    fn local_helper_needs_local_registered() {
        install_polyfills();
        let stately = Stately::builder()
            .storage("session", global(SESSION_STORAGE).unwrap())
            .build()
            .unwrap();

        let err = stately.local_var().var::<u32>("factory-local-helper", None).unwrap_err();
        assert!(matches!(err, StatelyError::UnregisteredStorage { .. }));
        assert!(local_var().var::<u32>("factory-local-helper", None).is_ok());
    }
}
