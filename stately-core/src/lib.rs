//! Stately Core
//!
//! Reactive variables that mirror themselves into key/value storage.
//!
//! A storage variable is a signal whose value is loaded from a storage key
//! when it is created and written back whenever it changes. It provides:
//!
//! - Bootstrap from storage, falling back to a default
//! - Deferred, coalesced write-back after every change
//! - One shared variable per (storage, key) through the registry
//! - Factories and declarative stores bound to a storage
//!
//! # Architecture
//!
//! - `reactive`: signals, effects and the flush scheduler
//! - `storage`: the storage contract, in-memory backend and global table
//! - `codec`: JSON encoding with type-hinted decoding
//! - `var`: storage variables and the attach protocol
//! - `registry`: the [`Stately`] registry of namespaces and variables
//! - `factory`: [`VarFactory`] and the session/local helpers
//! - `store`: schema-driven stores
//! - `config`: serde-backed registry configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use stately_core::{Runtime, Stately, VarOptions};
//!
//! stately_core::storage::install_polyfills();
//! let stately = Stately::builder().default_storages()?.build()?;
//!
//! let breed = stately.create_var(VarOptions::new("breed").default_value("corgi".to_string()))?;
//! breed.set("husky".to_string());
//!
//! // Write-back happens on the next flush.
//! Runtime::flush();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod factory;
pub mod reactive;
pub mod registry;
pub mod storage;
pub mod store;
pub mod var;

pub use codec::{ScalarKind, TypeHint};
pub use config::{NamespaceConfig, StatelyConfig};
pub use error::{Result, StatelyError};
pub use factory::{local_var, session_var, VarFactory};
pub use reactive::{Effect, Runtime, Signal};
pub use registry::{GetOrCreate, Stately, StatelyBuilder};
pub use storage::{LazyStorage, MemoryStorage, Storage, StorageRef};
pub use store::{FieldSpec, Store, StoreSchema};
pub use var::{flush_writes, is_storage_var, storage_var, StorageValue, StorageVar, VarOptions};
