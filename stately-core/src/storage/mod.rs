//! Storage Backends
//!
//! The [`Storage`] trait is the key/value contract variables persist into:
//! string keys, string values, synchronous access. It mirrors the browser's
//! Web Storage interface so any conforming backend can sit behind it.
//!
//! Storages are compared by identity, never by content or name. Two
//! `MemoryStorage` values holding the same entries are still two storages.

mod global;
mod memory;

pub use global::{
    global, install_global, install_polyfills, remove_global, LazyStorage, StorageRef,
    LOCAL_STORAGE, SESSION_STORAGE,
};
pub use memory::MemoryStorage;

use std::fmt::Debug;
use std::sync::Arc;

/// A synchronous string key/value store.
pub trait Storage: Debug + Send + Sync {
    /// Read the value stored under `key`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str);

    /// Remove `key`. Removing a missing key is a no-op.
    fn remove_item(&self, key: &str);

    /// Remove every key.
    fn clear(&self);

    /// Name of the key at `index`, in the backend's enumeration order.
    fn key(&self, index: usize) -> Option<String>;

    /// Number of stored keys.
    fn length(&self) -> usize;

    /// Whether the storage holds no keys.
    fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

/// Identity comparison for shared storages.
///
/// Compares the data pointers only, so two handles to one storage match even
/// when they were coerced to `dyn Storage` in different places.
pub fn same_storage(a: &Arc<dyn Storage>, b: &Arc<dyn Storage>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
