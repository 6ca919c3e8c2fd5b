//! Declarative stores.
//!
//! A [`StoreSchema`] names a group of fields, each with an optional default
//! and scalar hint. [`Stately::store`] turns the schema into a [`Store`]
//! whose fields are ordinary registry variables in the storage's namespace,
//! keyed by field name. Two stores over the same storage that declare the
//! same field share its variable.
//!
//! Values are held as JSON documents and converted at the accessors, so one
//! store can mix field types.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::codec::{ScalarKind, TypeHint};
use crate::error::{Result, StatelyError};
use crate::registry::{GetOrCreate, Stately};
use crate::storage::StorageRef;
use crate::var::StorageVar;

/// One field of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Used when storage has no entry for the field.
    pub default: Option<Value>,
    pub hint: Option<ScalarKind>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            hint: None,
        }
    }

    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn hint(mut self, kind: ScalarKind) -> Self {
        self.hint = Some(kind);
        self
    }
}

/// The fields of a store, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSchema {
    fields: IndexMap<String, FieldSpec>,
}

impl StoreSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Redeclaring a name replaces the earlier spec.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A group of storage variables built from a schema.
#[derive(Debug, Clone)]
pub struct Store {
    namespace: String,
    vars: IndexMap<String, StorageVar<Value>>,
}

impl Store {
    /// Namespace the store's fields live in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// The variable behind a field.
    pub fn var(&self, field: &str) -> Result<&StorageVar<Value>> {
        self.vars
            .get(field)
            .ok_or_else(|| StatelyError::UnknownField(field.to_owned()))
    }

    /// Read a field as `T`. A field with no value reads as `None`.
    pub fn get<T>(&self, field: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.var(field)?.get() {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StatelyError::decode(field, source)),
            None => Ok(None),
        }
    }

    /// Write a field.
    pub fn set<T>(&self, field: &str, value: T) -> Result<()>
    where
        T: Serialize,
    {
        let var = self.var(field)?;
        let value = serde_json::to_value(value).map_err(StatelyError::Encode)?;
        var.set(value);
        Ok(())
    }

    /// Remove a field's value, and with it the storage entry.
    pub fn clear(&self, field: &str) -> Result<()> {
        self.var(field)?.clear();
        Ok(())
    }
}

impl Stately {
    /// Build a store over a registered storage.
    pub fn store(&self, storage: impl Into<StorageRef>, schema: &StoreSchema) -> Result<Store> {
        let storage = storage.into().resolve()?;
        let Some(namespace) = self.get_storage_name(&storage) else {
            let key = schema.fields.keys().cloned().collect::<Vec<_>>().join(",");
            let hints = schema
                .fields()
                .filter_map(|spec| spec.hint.map(|kind| format!("{}: {kind:?}", spec.name)))
                .collect::<Vec<_>>();
            return Err(StatelyError::UnregisteredStorage {
                storage,
                key,
                has_default: schema.fields().any(|spec| spec.default.is_some()),
                hint: (!hints.is_empty()).then(|| hints.join(", ")),
            });
        };

        let mut vars = IndexMap::with_capacity(schema.len());
        for spec in schema.fields() {
            let options = GetOrCreate {
                default: spec.default.clone(),
                hint: spec.hint.map(TypeHint::Scalar),
                force: false,
            };
            let var = self.get_or_create::<Value>(namespace, &spec.name, options)?;
            vars.insert(spec.name.clone(), var);
        }

        debug!(namespace, fields = vars.len(), "built store");
        Ok(Store {
            namespace: namespace.to_owned(),
            vars,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reactive::Runtime;
    use crate::storage::{MemoryStorage, Storage};
    use serde::Deserialize;
    use serde_json::json;

    fn setup() -> (Stately, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::named("session"));
        let stately = Stately::builder()
            .storage("session", Arc::clone(&storage))
            .build()
            .unwrap();
        (stately, storage)
    }

    fn dog_schema() -> StoreSchema {
        StoreSchema::new()
            .field(FieldSpec::new("breed").default_value("corgi"))
            .field(FieldSpec::new("age").default_value(3).hint(ScalarKind::Number))
            .field(FieldSpec::new("owner"))
    }

    #[test]
    fn defaults_apply_when_storage_is_empty() {
        let (stately, storage) = setup();
        let store = stately.store(&storage, &dog_schema()).unwrap();

        assert_eq!(store.namespace(), "session");
        assert_eq!(store.fields().collect::<Vec<_>>(), vec!["breed", "age", "owner"]);
        assert_eq!(store.get::<String>("breed").unwrap().as_deref(), Some("corgi"));
        assert_eq!(store.get::<u32>("age").unwrap(), Some(3));
        assert_eq!(store.get::<String>("owner").unwrap(), None);

        Runtime::flush();
        assert_eq!(storage.length(), 0);
    }

    #[test]
    fn stored_values_win_over_defaults() {
        let (stately, storage) = setup();
        storage.set_item("breed", "\"husky\"");
        storage.set_item("age", "\"5\"");

        let store = stately.store(&storage, &dog_schema()).unwrap();
        assert_eq!(store.get::<String>("breed").unwrap().as_deref(), Some("husky"));
        assert_eq!(store.get::<f64>("age").unwrap(), Some(5.0));
    }

    #[test]
    fn writes_persist_on_flush() {
        let (stately, storage) = setup();
        let store = stately.store(&storage, &dog_schema()).unwrap();

        store.set("breed", "husky").unwrap();
        store.set("owner", json!({"name": "Ann"})).unwrap();
        Runtime::flush();

        assert_eq!(storage.get_item("breed").as_deref(), Some("\"husky\""));
        assert_eq!(storage.get_item("owner").as_deref(), Some(r#"{"name":"Ann"}"#));

        store.clear("owner").unwrap();
        Runtime::flush();
        assert_eq!(storage.get_item("owner"), None);
    }

    #[test]
    fn stores_share_registry_variables() {
        let (stately, storage) = setup();
        let a = stately.store(&storage, &dog_schema()).unwrap();
        let b = stately
            .store(&storage, &StoreSchema::new().field(FieldSpec::new("breed")))
            .unwrap();

        a.set("breed", "beagle").unwrap();
        assert_eq!(b.get::<String>("breed").unwrap().as_deref(), Some("beagle"));
        assert!(a.var("breed").unwrap().ptr_eq(b.var("breed").unwrap()));
        assert_eq!(stately.len("session"), 3);
    }

    #[test]
    fn typed_reads_of_structured_fields() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Owner {
            name: String,
        }

        let (stately, storage) = setup();
        storage.set_item("owner", r#"{"name":"Ann"}"#);
        let store = stately.store(&storage, &dog_schema()).unwrap();

        let owner: Option<Owner> = store.get("owner").unwrap();
        assert_eq!(owner, Some(Owner { name: "Ann".into() }));

        let err = store.get::<u32>("owner").unwrap_err();
        assert!(matches!(err, StatelyError::Decode { .. }));
    }

    #[test]
    fn undeclared_fields_are_rejected() {
        let (stately, storage) = setup();
        let store = stately.store(&storage, &dog_schema()).unwrap();

        let err = store.set("color", "brown").unwrap_err();
        assert!(matches!(err, StatelyError::UnknownField(ref f) if f == "color"));
        assert!(!stately.contains("session", "color"));
    }

    #[test]
    fn unregistered_storage_is_rejected() {
        let (stately, _) = setup();
        let stranger: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

        let err = stately.store(&stranger, &dog_schema()).unwrap_err();
        assert!(matches!(
            err,
            StatelyError::UnregisteredStorage { ref key, has_default: true, ref hint, .. }
                if key == "breed,age,owner" && hint.as_deref() == Some("age: Number")
        ));
        assert!(stately.is_empty("session"));
    }
}
