//! Per-instance attribute accessors.
//!
//! An [`AttributeOverlay`] resolves attribute names through the model type's
//! shared [`AttributeTable`] and keeps one [`AttributeReference`] per
//! attribute it has been asked about, so repeated access reuses the same
//! handle.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use strata_core::{Attributes, StrataResult};

use crate::overlay::ModelReference;
use crate::registry::AttributeTable;

/// Handle to one attribute of one record, read through the overlay.
#[derive(Debug, Clone)]
pub struct AttributeReference {
    name: String,
    parent: ModelReference,
}

impl AttributeReference {
    fn new(name: String, parent: ModelReference) -> Self {
        Self { name, parent }
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, `None` if the record or the attribute is absent.
    pub fn value(&self) -> Option<Value> {
        self.parent
            .value()
            .and_then(|document| document.attribute(&self.name).cloned())
    }
}

/// Declared-attribute accessors for one model instance.
#[derive(Debug)]
pub struct AttributeOverlay {
    parent: ModelReference,
    table: Arc<AttributeTable>,
    references: Mutex<HashMap<String, AttributeReference>>,
}

impl AttributeOverlay {
    pub(crate) fn new(parent: ModelReference) -> Self {
        let table = parent.model_type().attribute_table();
        Self {
            parent,
            table,
            references: Mutex::new(HashMap::new()),
        }
    }

    /// The accessor table shared by all instances of the model type.
    pub fn table(&self) -> &Arc<AttributeTable> {
        &self.table
    }

    /// Cached reference for a declared attribute.
    pub fn reference(&self, name: &str) -> StrataResult<AttributeReference> {
        self.table.require(name)?;
        let mut references = self
            .references
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(references
            .entry(name.to_string())
            .or_insert_with(|| AttributeReference::new(name.to_string(), self.parent.clone()))
            .clone())
    }

    /// Current value of a declared attribute.
    pub fn get(&self, name: &str) -> StrataResult<Option<Value>> {
        Ok(self.reference(name)?.value())
    }

    /// Set a declared attribute on the local layer.
    ///
    /// Assigning the value the attribute already has does nothing, so it
    /// never creates a local snapshot or marks the record dirty.
    pub fn set(&self, name: &str, value: Value) -> StrataResult<()> {
        let current = self.get(name)?;
        if current.as_ref() == Some(&value) {
            tracing::debug!(
                key = %self.parent.key(),
                attribute = name,
                "unchanged attribute, set skipped"
            );
            return Ok(());
        }
        let mut patch = Attributes::new();
        patch.insert(name.to_string(), value);
        self.parent.push_local(patch)
    }

    /// Declared attribute names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.names()
    }

    /// Current values of all declared attributes that are set.
    pub fn values(&self) -> Attributes {
        let Some(document) = self.parent.value() else {
            return Attributes::new();
        };
        self.table
            .names()
            .filter_map(|name| {
                document
                    .attribute(name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AttributeKind, ModelDefinition};
    use crate::store::Store;
    use serde_json::json;
    use strata_core::{Locality, RecordDocument, RecordKey, StoreError, StrataError};

    fn setup() -> (Store, AttributeOverlay) {
        let store = Store::new();
        let post = store
            .define_model(
                "post",
                ModelDefinition::new()
                    .attribute("title", AttributeKind::String)
                    .attribute("published", AttributeKind::Boolean),
            )
            .unwrap();
        let parent = store
            .model_reference_for(&post, &RecordKey::new("post", 1u64))
            .unwrap();
        (store, AttributeOverlay::new(parent))
    }

    fn doc(title: &str) -> RecordDocument {
        RecordDocument::new("post", 1u64, Attributes::new()).with_attribute("title", title)
    }

    #[test]
    fn test_get_reads_overlay() {
        let (store, overlay) = setup();
        assert_eq!(overlay.get("title").unwrap(), None);

        store.push(doc("A"));
        assert_eq!(overlay.get("title").unwrap(), Some(json!("A")));
        assert_eq!(overlay.get("published").unwrap(), None);
    }

    #[test]
    fn test_undeclared_attribute() {
        let (store, overlay) = setup();
        store.push(doc("A").with_attribute("views", 3));

        let err = overlay.get("views").unwrap_err();
        assert!(matches!(
            err,
            StrataError::Store(StoreError::UnknownAttribute { .. })
        ));
        assert!(overlay.set("views", json!(4)).is_err());
    }

    #[test]
    fn test_set_writes_local() {
        let (store, overlay) = setup();
        store.push(doc("A"));
        overlay.set("title", json!("B")).unwrap();

        assert_eq!(overlay.get("title").unwrap(), Some(json!("B")));
        let key = RecordKey::new("post", 1u64);
        assert_eq!(
            store.document_for(&key, Locality::Canonical).unwrap().attribute("title"),
            Some(&json!("A"))
        );
    }

    #[test]
    fn test_set_same_value_is_noop() {
        let (store, overlay) = setup();
        store.push(doc("A"));
        let version = store.version();

        overlay.set("title", json!("A")).unwrap();
        assert_eq!(store.version(), version);
        assert!(store
            .document_for(&RecordKey::new("post", 1u64), Locality::Local)
            .is_none());
    }

    #[test]
    fn test_set_on_unloaded_record() {
        let (_store, overlay) = setup();
        let err = overlay.set("title", json!("B")).unwrap_err();
        assert!(matches!(
            err,
            StrataError::Store(StoreError::RecordNotLoaded { .. })
        ));
    }

    #[test]
    fn test_attribute_reference_cached() {
        let (_store, overlay) = setup();
        overlay.reference("title").unwrap();
        overlay.reference("title").unwrap();
        assert_eq!(overlay.references.lock().unwrap().len(), 1);
        assert_eq!(overlay.reference("title").unwrap().name(), "title");
    }

    #[test]
    fn test_values_and_names() {
        let (store, overlay) = setup();
        store.push(doc("A").with_attribute("published", true).with_attribute("views", 3));

        assert_eq!(overlay.names().collect::<Vec<_>>(), vec!["title", "published"]);
        let values = overlay.values();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("published"), Some(&json!(true)));
        assert!(!values.contains_key("views"));
    }
}
