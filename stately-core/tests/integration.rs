//! Integration Tests for Storage Variables
//!
//! These tests drive the public API end to end: registry, factories, stores
//! and the flush that writes changes back to storage.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stately_core::codec::{self, Raw};
use stately_core::{
    is_storage_var, storage_var, Effect, FieldSpec, GetOrCreate, MemoryStorage, Runtime, ScalarKind, Signal,
    Stately, StatelyError, Storage, StoreSchema, TypeHint, VarOptions,
};

struct Env {
    stately: Stately,
    session: Arc<MemoryStorage>,
    local: Arc<MemoryStorage>,
}

impl Env {
    fn new() -> Self {
        let session = Arc::new(MemoryStorage::named("session"));
        let local = Arc::new(MemoryStorage::named("local"));
        let stately = Stately::builder()
            .storage("session", session.clone())
            .storage("local", local.clone())
            .default_namespace("session")
            .build()
            .unwrap();
        Self { stately, session, local }
    }

    fn session(&self) -> Arc<dyn Storage> {
        self.session.clone()
    }
}

/// Changing a variable writes the new value once the scheduler flushes.
#[test]
fn breed_default_then_mutation_is_persisted() {
    let env = Env::new();
    let breed = env
        .stately
        .create_var(VarOptions::new("breed").default_value("corgi".to_string()))
        .unwrap();

    assert_eq!(breed.get().as_deref(), Some("corgi"));
    assert_eq!(env.session.get_item("breed"), None);

    breed.set("husky".to_string());
    Runtime::flush();

    assert_eq!(env.session.get_item("breed").as_deref(), Some("\"husky\""));
}

/// A stored value takes precedence over the default.
#[test]
fn stored_breed_wins_over_default() {
    let env = Env::new();
    env.session.set_item("breed", "\"husky\"");

    let breed = env
        .stately
        .create_var(VarOptions::new("breed").default_value("corgi".to_string()))
        .unwrap();

    assert_eq!(breed.get().as_deref(), Some("husky"));
}

/// Absent keys fall back to the default, or to `None` without one.
#[test]
fn absent_keys_use_default_or_none() {
    let env = Env::new();
    let with_default = env
        .stately
        .create_var(VarOptions::new("count").default_value(7u32))
        .unwrap();
    let without = env.stately.create_var::<u32>(VarOptions::new("other")).unwrap();

    assert_eq!(with_default.get(), Some(7));
    assert_eq!(without.get(), None);
}

/// Every request for a key gets the same variable.
#[test]
fn repeated_requests_share_one_variable() {
    let env = Env::new();
    let session = env.session();
    let a = env
        .stately
        .create_var(VarOptions::new("same").storage(&session).default_value(1u32))
        .unwrap();
    let b = env.stately.bind(&session).var("same", Some(2u32)).unwrap();
    let c = env
        .stately
        .get_or_create::<u32>("session", "same", GetOrCreate::default())
        .unwrap();

    assert!(a.ptr_eq(&b));
    assert!(b.ptr_eq(&c));
    assert_eq!(c.get(), Some(1));
    assert_eq!(env.stately.len("session"), 1);
}

/// Creating and flushing without a change never writes.
#[test]
fn creation_alone_never_writes() {
    let env = Env::new();
    env.session.set_item("seeded", "[1,2,3]");

    env.stately
        .create_var(VarOptions::<Vec<u32>>::new("seeded"))
        .unwrap();
    env.stately
        .create_var(VarOptions::new("fresh").default_value(false))
        .unwrap();
    Runtime::flush();
    Runtime::flush();

    assert_eq!(env.session.writes(), 1);
    assert_eq!(env.session.get_item("fresh"), None);
}

/// Several changes before a flush produce one write of the final value.
#[test]
fn writes_follow_mutation_order() {
    let env = Env::new();
    let n = env
        .stately
        .create_var(VarOptions::new("n").default_value(0i64))
        .unwrap();

    n.set(1);
    n.update(|v| (*v).map(|v| v + 10));
    Runtime::flush();
    assert_eq!(env.session.get_item("n").as_deref(), Some("11"));

    n.clear();
    Runtime::flush();
    assert_eq!(env.session.get_item("n"), None);
}

/// A persisted value reloads unchanged in a fresh registry.
#[test]
fn persisted_values_round_trip_across_registries() {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dog {
        name: String,
        tags: Vec<String>,
    }

    let env = Env::new();
    let dog = Dog {
        name: "Rex".into(),
        tags: vec!["good".into()],
    };
    env.stately
        .create_var::<Dog>(VarOptions::new("dog"))
        .unwrap()
        .set(dog.clone());
    Runtime::flush();

    let reloaded = Stately::builder()
        .storage("session", env.session())
        .build()
        .unwrap()
        .get::<Dog>("session", "dog")
        .unwrap();
    assert_eq!(reloaded, Some(dog));

    let raw = env.session.get_item("dog").unwrap();
    let again: Dog = codec::deserialize(Raw::Stored(&raw), None, "dog").unwrap();
    assert_eq!(codec::serialize(&again).unwrap(), raw);
}

/// An unregistered storage is refused and leaves the registry untouched.
#[test]
fn unregistered_storage_creates_nothing() {
    let env = Env::new();
    let stranger: Arc<dyn Storage> = Arc::new(MemoryStorage::named("stranger"));

    let err = env
        .stately
        .create_var::<u32>(VarOptions::new("k").storage(&stranger))
        .unwrap_err();

    assert!(matches!(err, StatelyError::UnregisteredStorage { .. }));
    assert!(err.is_configuration());
    assert!(env.stately.is_empty("session"));
    assert!(env.stately.is_empty("local"));
    assert_eq!(stranger.length(), 0);
}

/// Malformed stored text reads back as the raw string.
#[test]
fn malformed_json_is_kept_as_text() {
    let env = Env::new();
    env.session.set_item("note", "not json {");

    let note = env.stately.get::<String>("session", "note").unwrap();
    assert_eq!(note.as_deref(), Some("not json {"));
}

/// Scalar hints coerce stored values of another kind.
#[test]
fn hints_coerce_stored_scalars() {
    let env = Env::new();
    env.local.set_item("visits", "\"12\"");

    let visits = env
        .stately
        .get_hinted::<f64>("local", "visits", TypeHint::Scalar(ScalarKind::Number))
        .unwrap();
    assert_eq!(visits, Some(12.0));
}

/// Namespaced `set` persists without waiting for a later change.
#[test]
fn namespace_set_writes_on_flush() {
    let env = Env::new();
    env.stately.set("local", "theme", "dark".to_string()).unwrap();
    Runtime::flush();

    assert_eq!(env.local.get_item("theme").as_deref(), Some("\"dark\""));
    assert_eq!(env.session.length(), 0);
}

/// Stores and direct variables see the same cells.
#[test]
fn stores_share_state_with_factories() {
    let env = Env::new();
    env.session.set_item("breed", "\"husky\"");
    let schema = StoreSchema::new()
        .field(FieldSpec::new("breed").default_value("corgi"))
        .field(FieldSpec::new("age").default_value(2).hint(ScalarKind::Number));

    let store = env.stately.store(env.session(), &schema).unwrap();
    assert_eq!(store.get::<String>("breed").unwrap().as_deref(), Some("husky"));

    store.set("age", 4).unwrap();
    let age = env.stately.get::<serde_json::Value>("session", "age").unwrap();
    assert_eq!(age, Some(serde_json::json!(4)));

    Runtime::flush();
    assert_eq!(env.session.get_item("age").as_deref(), Some("4"));
}

/// Standalone variables persist on their own and are not deduplicated.
#[test]
fn standalone_variables_persist_themselves() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let a = storage_var(VarOptions::new("k").storage(&storage).default_value(1u8)).unwrap();
    let b = storage_var(VarOptions::<u8>::new("k").storage(&storage)).unwrap();

    assert!(!a.ptr_eq(&b));
    assert!(is_storage_var(&a));
    assert!(!is_storage_var(a.signal()));

    a.set(9);
    Runtime::flush();
    assert_eq!(storage.get_item("k").as_deref(), Some("9"));
}

/// Effects re-run on flush after a signal they read changes.
#[test]
fn effects_track_signal_reads() {
    let signal = Signal::new(0);
    let observed = Arc::new(AtomicI32::new(-1));

    let effect = {
        let signal = signal.clone();
        let observed = Arc::clone(&observed);
        Effect::new(move || observed.store(signal.get(), Ordering::SeqCst))
    };
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    signal.set(3);
    signal.set(4);
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    Runtime::flush();
    assert_eq!(observed.load(Ordering::SeqCst), 4);
    assert_eq!(effect.run_count(), 2);
}
