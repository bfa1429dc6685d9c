//! Strata Test Utilities
//!
//! Shared test infrastructure for the Strata workspace:
//! - Proptest generators for identities, attributes, and documents
//! - Fixtures for a registered `post` model and seeded stores
//! - Invariant assertions over layers and snapshots

pub use strata_core::{
    Attributes, Locality, MergeStrategy, ModelName, Record, RecordDocument, RecordId, RecordKey,
    StoreConfig, StoreError, StrataError, StrataResult,
};
pub use strata_store::{
    AttributeKind, Layer, Model, ModelDefinition, RecordState, Store, StoreSnapshot,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Strata values.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Generate a model name from a small fixed vocabulary.
    pub fn arb_model_name() -> impl Strategy<Value = ModelName> {
        prop_oneof![Just("post"), Just("comment"), Just("author")].prop_map(ModelName::from)
    }

    /// Generate a record id, numeric or textual.
    pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
        prop_oneof![
            (0u64..64).prop_map(RecordId::from),
            "[a-z]{1,6}".prop_map(RecordId::from),
        ]
    }

    /// Generate a record key.
    pub fn arb_record_key() -> impl Strategy<Value = RecordKey> {
        (arb_model_name(), arb_record_id()).prop_map(|(m, id)| RecordKey::new(m, id))
    }

    /// Generate a scalar JSON value.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
        ]
    }

    /// Generate a JSON value nested at most a couple of levels.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(2, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-c]", inner, 0..4)
                    .prop_map(|m| json!(m)),
            ]
        })
    }

    /// Generate an attribute map over a small key vocabulary, so that
    /// independently generated maps overlap.
    pub fn arb_attributes() -> impl Strategy<Value = Attributes> {
        prop::collection::btree_map("(title|body|published|views|meta)", arb_value(), 0..5)
    }

    /// Generate a record.
    pub fn arb_record() -> impl Strategy<Value = Record> {
        (arb_record_key(), arb_attributes()).prop_map(|(key, attrs)| Record::new(key, attrs))
    }

    /// Generate a `post` document.
    pub fn arb_post_document() -> impl Strategy<Value = RecordDocument> {
        ((0u64..16), arb_attributes())
            .prop_map(|(id, attrs)| RecordDocument::new("post", id, attrs))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use serde_json::Value;

    /// The `post` model: `title` (string), `published` (boolean).
    pub fn post_definition() -> ModelDefinition {
        ModelDefinition::new()
            .attribute("title", AttributeKind::String)
            .attribute("published", AttributeKind::Boolean)
    }

    /// A store with `post` registered.
    pub fn post_store() -> Store {
        post_store_with_config(StoreConfig::default())
    }

    /// A store built from `config` with `post` registered.
    pub fn post_store_with_config(config: StoreConfig) -> Store {
        let store = Store::with_config(config);
        store
            .define_model("post", post_definition())
            .expect("fresh store has no post model");
        store
    }

    /// Attributes from `(name, value)` pairs.
    pub fn attrs<V: Into<Value> + Clone>(pairs: &[(&str, V)]) -> Attributes {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone().into()))
            .collect()
    }

    /// A `post` document with the given title.
    pub fn post_document(id: u64, title: &str) -> RecordDocument {
        RecordDocument::new("post", id, Attributes::new()).with_attribute("title", title)
    }

    /// A `post` store with `count` canonical posts, ids `1..=count`.
    pub fn seeded_post_store(count: u64) -> Store {
        let store = post_store();
        store.push_many((1..=count).map(|id| post_document(id, &format!("post {}", id))));
        store
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Invariant checks for layers, snapshots, and results.

    use super::*;

    /// Assert that a StrataResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &StrataResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a StrataResult is a `RecordNotLoaded` error.
    #[track_caller]
    pub fn assert_not_loaded<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Store(StoreError::RecordNotLoaded { .. })) => {}
            other => panic!("Expected RecordNotLoaded, got: {:?}", other),
        }
    }

    /// Assert that the type index and the record map of a layer agree.
    #[track_caller]
    pub fn assert_layer_consistent(layer: &Layer) {
        let mut indexed = 0;
        for model_name in layer.model_names() {
            for key in layer.keys_for_type(model_name) {
                assert_eq!(key.model_name(), model_name, "key {} indexed under wrong type", key);
                assert!(layer.contains(&key), "index references missing record {}", key);
                indexed += 1;
            }
        }
        assert_eq!(indexed, layer.len(), "records missing from the type index");
        for record in layer.records() {
            assert!(
                layer
                    .type_index(record.model_name())
                    .is_some_and(|keys| keys.contains(record.key())),
                "record {} missing from the type index",
                record.key()
            );
        }
    }

    /// Assert both layers of a snapshot are internally consistent.
    #[track_caller]
    pub fn assert_snapshot_consistent(snapshot: &StoreSnapshot) {
        assert_layer_consistent(snapshot.canonical());
        assert_layer_consistent(snapshot.local());
    }

    /// Assert a record is gone from every store lookup.
    #[track_caller]
    pub fn assert_unloaded(store: &Store, key: &RecordKey) {
        assert!(!store.has_record(key.model_name(), key.id()), "{} still loaded", key);
        assert!(store.peek_record(key.model_name(), key.id()).is_none());
        assert!(store
            .peek_all(key.model_name())
            .iter()
            .all(|model| model.key() != key));
        assert_eq!(
            store.record_state(key.model_name(), key.id()),
            RecordState::Absent
        );
        assert_snapshot_consistent(&store.snapshot());
    }
}
