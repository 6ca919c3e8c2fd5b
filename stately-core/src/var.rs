//! Storage-synced variables.
//!
//! A [`StorageVar`] is a signal of `Option<T>` with attached metadata: the
//! storage and key it mirrors, the default it was created with, and whether
//! a write-back effect has been installed. `None` means "no value", and
//! writing `None` removes the key from storage.
//!
//! Attaching metadata never installs persistence by itself
//! ([`AttachMode::Deferred`]); the registry or a store does that exactly once.
//! [`AttachMode::Standalone`] is for variables that live outside any
//! registry and persist on their own.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::codec::{self, Raw, TypeHint};
use crate::error::{Result, StatelyError};
use crate::reactive::{Effect, Runtime, Signal};
use crate::storage::{Storage, StorageRef};

/// Values a storage variable can hold.
pub trait StorageValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StorageValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Options for creating a variable.
pub struct VarOptions<T> {
    pub key: String,
    /// Storage to bind; falls back to the registry's default namespace.
    pub storage: Option<StorageRef>,
    /// Initial value when storage has no entry for the key.
    pub default: Option<T>,
    pub hint: Option<TypeHint<T>>,
}

impl<T> VarOptions<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            storage: None,
            default: None,
            hint: None,
        }
    }

    pub fn storage(mut self, storage: impl Into<StorageRef>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    pub fn default_value(mut self, default: T) -> Self {
        self.default = Some(default);
        self
    }

    pub fn hint(mut self, hint: TypeHint<T>) -> Self {
        self.hint = Some(hint);
        self
    }
}

impl<T> Clone for VarOptions<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            storage: self.storage.clone(),
            default: self.default.clone(),
            hint: self.hint.clone(),
        }
    }
}

impl<T> fmt::Debug for VarOptions<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarOptions")
            .field("key", &self.key)
            .field("storage", &self.storage)
            .field("default", &self.default)
            .field("hint", &self.hint)
            .finish()
    }
}

/// Metadata attached to a variable's signal.
pub struct VarMeta<T> {
    pub key: String,
    pub storage: Arc<dyn Storage>,
    pub default: Option<T>,
    initialized: bool,
    persistence: Option<Effect>,
}

impl<T> VarMeta<T> {
    pub fn new(key: impl Into<String>, storage: Arc<dyn Storage>, default: Option<T>) -> Self {
        Self {
            key: key.into(),
            storage,
            default,
            initialized: false,
            persistence: None,
        }
    }
}

/// How [`attach`] treats persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// Leave persistence to whoever owns the variable.
    Deferred,
    /// Install the write-back effect now.
    Standalone,
}

/// A signal mirrored into a storage key.
///
/// Clones are handles to the same variable.
pub struct StorageVar<T>
where
    T: StorageValue,
{
    signal: Signal<Option<T>>,
    meta: Arc<RwLock<VarMeta<T>>>,
}

impl<T> StorageVar<T>
where
    T: StorageValue,
{
    /// Current value. Tracked when read inside an effect.
    pub fn get(&self) -> Option<T> {
        self.signal.get()
    }

    /// Current value, never tracked.
    pub fn get_untracked(&self) -> Option<T> {
        self.signal.get_untracked()
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.signal.set(Some(value));
    }

    /// Replace the value with `value`, which may be `None`.
    pub fn set_option(&self, value: Option<T>) {
        self.signal.set(value);
    }

    /// Drop the value. The key is removed on the next write-back.
    pub fn clear(&self) {
        self.signal.set(None);
    }

    /// Replace the value with a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Option<T>) -> Option<T>,
    {
        self.signal.update(f);
    }

    /// The underlying signal.
    pub fn signal(&self) -> &Signal<Option<T>> {
        &self.signal
    }

    pub fn key(&self) -> String {
        self.meta.read().key.clone()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.meta.read().storage)
    }

    pub fn default_value(&self) -> Option<T> {
        self.meta.read().default.clone()
    }

    /// Whether the write-back effect has been installed.
    pub fn is_initialized(&self) -> bool {
        self.meta.read().initialized
    }

    /// Whether both handles refer to the same variable.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.signal.ptr_eq(&other.signal)
    }

    /// Install the write-back effect unless one already exists.
    ///
    /// The effect fires once immediately; with `skip_first` that firing only
    /// records the dependency, so a freshly loaded or defaulted value is not
    /// written straight back. Returns whether an effect was installed.
    fn install_persistence(&self, skip_first: bool) -> bool {
        let mut meta = self.meta.write();
        if meta.initialized {
            return false;
        }

        let signal = self.signal.clone();
        let storage = Arc::clone(&meta.storage);
        let key = meta.key.clone();
        let first = AtomicBool::new(skip_first);

        let effect = Effect::new(move || {
            let value = signal.get();
            if first.swap(false, Ordering::SeqCst) {
                return;
            }
            persist(storage.as_ref(), &key, value.as_ref());
        });

        meta.persistence = Some(effect);
        meta.initialized = true;
        true
    }
}

thread_local! {
    // Keys whose latest write-back failed to encode, with the failure.
    static FAILED_WRITES: RefCell<IndexMap<String, StatelyError>> = RefCell::new(IndexMap::new());
}

fn persist<T: Serialize>(storage: &dyn Storage, key: &str, value: Option<&T>) {
    let Some(value) = value else {
        trace!(key, "removing cleared value");
        storage.remove_item(key);
        forget_failure(key);
        return;
    };
    match codec::serialize(value) {
        Ok(raw) => {
            trace!(key, "persisting value");
            storage.set_item(key, &raw);
            forget_failure(key);
        }
        Err(err) => {
            error!(key, error = %err, "failed to persist value");
            FAILED_WRITES.with(|failed| failed.borrow_mut().insert(key.to_owned(), err));
        }
    }
}

fn forget_failure(key: &str) {
    FAILED_WRITES.with(|failed| failed.borrow_mut().shift_remove(key));
}

/// Flush pending effects, then report write-backs that could not be encoded.
///
/// [`Runtime::flush`] has no caller to hand errors to; this wrapper does.
/// Failures left over from earlier plain flushes are reported too, unless a
/// later write for the same key succeeded. Returns the number of effect runs.
pub fn flush_writes() -> Result<usize> {
    let ran = Runtime::flush();
    let failed = FAILED_WRITES.with(|failed| std::mem::take(&mut *failed.borrow_mut()));

    let mut failed = failed.into_iter();
    let Some((first_key, source)) = failed.next() else {
        return Ok(ran);
    };
    let keys = std::iter::once(first_key).chain(failed.map(|(key, _)| key)).collect();
    Err(StatelyError::WriteBack {
        keys,
        source: Box::new(source),
    })
}

impl<T> Clone for StorageVar<T>
where
    T: StorageValue,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            meta: Arc::clone(&self.meta),
        }
    }
}

impl<T> fmt::Debug for StorageVar<T>
where
    T: StorageValue + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.meta.read();
        f.debug_struct("StorageVar")
            .field("key", &meta.key)
            .field("storage", &meta.storage)
            .field("value", &self.signal.get_untracked())
            .field("initialized", &meta.initialized)
            .field("persistence", &meta.persistence)
            .finish()
    }
}

/// Type-erased view of a storage variable, used by registration.
pub trait SyncedVar: Send + Sync {
    fn key(&self) -> String;
    fn storage(&self) -> Arc<dyn Storage>;
    fn is_initialized(&self) -> bool;
    /// See [`StorageVar`]'s persistence docs.
    fn install_persistence(&self, skip_first: bool) -> bool;
}

impl<T> SyncedVar for StorageVar<T>
where
    T: StorageValue,
{
    fn key(&self) -> String {
        StorageVar::key(self)
    }

    fn storage(&self) -> Arc<dyn Storage> {
        StorageVar::storage(self)
    }

    fn is_initialized(&self) -> bool {
        StorageVar::is_initialized(self)
    }

    fn install_persistence(&self, skip_first: bool) -> bool {
        StorageVar::install_persistence(self, skip_first)
    }
}

/// Anything that may or may not carry storage metadata.
pub trait MaybeSynced {
    fn as_synced(&self) -> Option<&dyn SyncedVar>;
}

impl<T> MaybeSynced for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn as_synced(&self) -> Option<&dyn SyncedVar> {
        None
    }
}

impl<T> MaybeSynced for StorageVar<T>
where
    T: StorageValue,
{
    fn as_synced(&self) -> Option<&dyn SyncedVar> {
        Some(self)
    }
}

/// Whether `value` is a signal carrying storage metadata.
pub fn is_storage_var(value: &dyn MaybeSynced) -> bool {
    value.as_synced().is_some()
}

/// Stamp metadata onto a signal.
pub fn attach<T>(signal: Signal<Option<T>>, meta: VarMeta<T>, mode: AttachMode) -> StorageVar<T>
where
    T: StorageValue,
{
    let var = StorageVar {
        signal,
        meta: Arc::new(RwLock::new(meta)),
    };
    if mode == AttachMode::Standalone {
        var.install_persistence(true);
    }
    var
}

/// Read a key's initial value: the decoded stored value, or `default`.
///
/// A stored document that cannot take the shape of `T` is logged and
/// replaced by the default rather than failing creation.
pub(crate) fn load_initial<T>(
    storage: &dyn Storage,
    key: &str,
    hint: Option<&TypeHint<T>>,
    default: Option<T>,
) -> Option<T>
where
    T: StorageValue,
{
    let Some(raw) = storage.get_item(key) else {
        return default;
    };
    match codec::deserialize(Raw::Stored(&raw), hint, key) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, ty = type_name::<T>(), "stored value has the wrong shape, using default");
            default
        }
    }
}

/// Create a variable that persists itself, outside any registry.
///
/// Nothing deduplicates standalone variables: two calls for one key give two
/// independent variables writing the same key.
pub fn storage_var<T>(options: VarOptions<T>) -> Result<StorageVar<T>>
where
    T: StorageValue,
{
    let VarOptions {
        key,
        storage,
        default,
        hint,
    } = options;

    let storage = storage
        .ok_or_else(|| StatelyError::NoStorage { key: key.clone() })?
        .resolve()?;

    let value = load_initial(storage.as_ref(), &key, hint.as_ref(), default.clone());
    debug!(key = %key, storage = ?storage, "creating standalone storage variable");

    Ok(attach(
        Signal::new(value),
        VarMeta::new(key, storage, default),
        AttachMode::Standalone,
    ))
}
