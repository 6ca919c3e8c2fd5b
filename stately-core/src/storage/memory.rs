//! In-memory storage.
//!
//! Used as the test double and as the polyfill for environments without a
//! native session or local storage.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::Storage;

/// A [`Storage`] backed by an insertion-ordered map.
///
/// `key(index)` follows insertion order; removing a key shifts later keys
/// down by one, like the browser implementation.
#[derive(Default)]
pub struct MemoryStorage {
    name: Option<String>,
    items: RwLock<IndexMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty storage with a name shown in `Debug` output.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Number of `set_item` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of all entries, in enumeration order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.items
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.items.write().insert(key.to_owned(), value.to_owned());
    }

    fn remove_item(&self, key: &str) {
        self.items.write().shift_remove(key);
    }

    fn clear(&self) {
        self.items.write().clear();
    }

    fn key(&self, index: usize) -> Option<String> {
        self.items.read().get_index(index).map(|(k, _)| k.clone())
    }

    fn length(&self) -> usize {
        self.items.read().len()
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("name", &self.name.as_deref().unwrap_or("anonymous"))
            .field("length", &self.length())
            .finish()
    }
}
