//! One side (canonical or local) of the record cache.
//!
//! A [`Layer`] maps record keys to immutable record snapshots and keeps a
//! per-type ordered index of keys for enumeration. Both tables sit behind
//! `Arc`s and are copied on write, so cloning a layer is cheap and a clone
//! never observes later changes made through another handle.
//!
//! A layer can also remember which attribute names were edited on it per
//! record. The local layer uses this so that reconciliation with a fresh
//! canonical record only keeps values the user actually wrote.
//!
//! Invariant: `index[type]` holds exactly the keys in `records` whose model
//! is `type`. No orphans in either direction.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use strata_core::{Attributes, MergeStrategy, ModelName, Record, RecordId, RecordKey};

// ============================================================================
// KEY SET
// ============================================================================

/// Insertion-ordered set of record keys for one model type.
///
/// Re-inserting a removed key appends it at the end.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    next_position: u64,
    by_position: BTreeMap<u64, RecordKey>,
    positions: HashMap<RecordKey, u64>,
}

impl KeySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` if absent. Returns true if it was added.
    pub fn insert(&mut self, key: RecordKey) -> bool {
        if self.positions.contains_key(&key) {
            return false;
        }
        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(key.clone(), position);
        self.by_position.insert(position, key);
        true
    }

    /// Remove `key` if present. Returns true if it was removed.
    pub fn remove(&mut self, key: &RecordKey) -> bool {
        match self.positions.remove(key) {
            Some(position) => {
                self.by_position.remove(&position);
                true
            }
            None => false,
        }
    }

    /// Whether `key` is a member.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.positions.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordKey> {
        self.by_position.values()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// Records of one layer plus their per-type index.
///
/// The `with_*` / `without` methods consume the layer and return the next
/// one. Keep a clone to retain the previous state: the tables are shared
/// until one side writes, at which point only the writer copies.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    records: Arc<HashMap<RecordKey, Arc<Record>>>,
    index: Arc<HashMap<ModelName, KeySet>>,
    edits: Arc<HashMap<RecordKey, BTreeSet<String>>>,
}

impl Layer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `record` under its key.
    pub fn with_record(mut self, record: Record) -> Self {
        self.insert(record);
        self
    }

    /// Merge `patch` into the record stored under the patch's key.
    ///
    /// If the key is absent, `patch` becomes the whole record.
    pub fn with_merged_record(mut self, patch: Record, strategy: MergeStrategy) -> Self {
        self.merge(patch, strategy);
        self
    }

    /// Shallow-merge `patch` into the record under its key (an empty record
    /// if absent) and mark the patched attribute names as edited.
    pub fn with_edited_record(mut self, patch: Record) -> Self {
        let base = match self.records.get(patch.key()) {
            Some(existing) => Record::clone(existing),
            None => Record::empty(patch.key().clone()),
        };
        self.edit(base, patch.attributes());
        self
    }

    /// Re-derive the record under `base`'s key with `base` underneath it.
    ///
    /// Edited attributes of the existing record override `base` (deep merge);
    /// everything else comes from `base`. Edits that now match `base` stop
    /// counting as edits. A record with no edit tracking overrides `base`
    /// with all of its attributes. No-op if this layer has no record for the
    /// key.
    pub fn with_reconciled_record(mut self, base: &Record) -> Self {
        self.reconcile(base);
        self
    }

    /// Remove the record under `key` and its index entry. No-op if absent.
    pub fn without(mut self, key: &RecordKey) -> Self {
        self.remove(key);
        self
    }

    /// Snapshot stored under `key`.
    pub fn get(&self, key: &RecordKey) -> Option<&Arc<Record>> {
        self.records.get(key)
    }

    /// Whether a record is stored under `key`.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    /// Whether a record of `model_name` with `id` is stored.
    pub fn has(&self, model_name: impl Into<ModelName>, id: impl Into<RecordId>) -> bool {
        self.contains(&RecordKey::new(model_name, id))
    }

    /// Keys of `model_name`, in insertion order. Empty if none.
    pub fn keys_for_type(&self, model_name: &ModelName) -> Vec<RecordKey> {
        self.index
            .get(model_name)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Attribute names edited on this layer for `key`, if edits are tracked
    /// for it.
    pub fn edited_attributes(&self, key: &RecordKey) -> Option<&BTreeSet<String>> {
        self.edits.get(key)
    }

    /// Index entry for `model_name`, if any record of that type was ever stored.
    pub fn type_index(&self, model_name: &ModelName) -> Option<&KeySet> {
        self.index.get(model_name)
    }

    /// Model names present in the index.
    pub fn model_names(&self) -> impl Iterator<Item = &ModelName> {
        self.index.keys()
    }

    /// All records, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the layer holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // === In-place transitions, used while the store owns the layer ===

    pub(crate) fn insert(&mut self, record: Record) {
        let key = record.key().clone();
        Arc::make_mut(&mut self.index)
            .entry(key.model_name().clone())
            .or_default()
            .insert(key.clone());
        Arc::make_mut(&mut self.records).insert(key, Arc::new(record));
    }

    pub(crate) fn merge(&mut self, patch: Record, strategy: MergeStrategy) {
        let next = match self.records.get(patch.key()) {
            Some(existing) => match strategy {
                MergeStrategy::Shallow => existing.merged_shallow(patch.attributes()),
                MergeStrategy::Deep => existing.merged_deep(patch.attributes()),
            },
            None => patch,
        };
        self.insert(next);
    }

    /// Shallow-merge `patch` onto `base`, store the result under `base`'s key
    /// and mark the patched names as edited.
    pub(crate) fn edit(&mut self, base: Record, patch: &Attributes) {
        let next = base.merged_shallow(patch);
        Arc::make_mut(&mut self.edits)
            .entry(next.key().clone())
            .or_default()
            .extend(patch.keys().cloned());
        self.insert(next);
    }

    pub(crate) fn reconcile(&mut self, base: &Record) {
        let key = base.key();
        let Some(existing) = self.records.get(key) else {
            return;
        };
        let edited = self.edits.get(key);
        let next = match edited {
            Some(names) => {
                let over: Attributes = existing
                    .attributes()
                    .iter()
                    .filter(|(name, _)| names.contains(*name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                base.merged_deep(&over)
            }
            None => base.merged_deep(existing.attributes()),
        };
        let pending: Option<BTreeSet<String>> = edited.map(|names| {
            names
                .iter()
                .filter(|name| next.attribute(name) != base.attribute(name))
                .cloned()
                .collect()
        });

        if let Some(pending) = pending {
            Arc::make_mut(&mut self.edits).insert(key.clone(), pending);
        }
        self.insert(next);
    }

    pub(crate) fn remove(&mut self, key: &RecordKey) -> bool {
        if !self.records.contains_key(key) {
            return false;
        }
        Arc::make_mut(&mut self.records).remove(key);
        let index = Arc::make_mut(&mut self.index);
        if let Some(keys) = index.get_mut(key.model_name()) {
            keys.remove(key);
        }
        if self.edits.contains_key(key) {
            Arc::make_mut(&mut self.edits).remove(key);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(model: &str, id: u64, title: &str) -> Record {
        let mut attributes = Attributes::new();
        attributes.insert("title".to_string(), json!(title));
        Record::new(RecordKey::new(model, id), attributes)
    }

    fn assert_index_consistent(layer: &Layer) {
        for record in layer.records() {
            let keys = layer.type_index(record.model_name()).unwrap();
            assert!(keys.contains(record.key()), "record {} missing from index", record.key());
        }
        for model in layer.model_names() {
            for key in layer.keys_for_type(model) {
                assert!(layer.contains(&key), "index key {} has no record", key);
            }
        }
    }

    #[test]
    fn test_key_set_insertion_order() {
        let mut keys = KeySet::new();
        assert!(keys.insert(RecordKey::new("post", 2u64)));
        assert!(keys.insert(RecordKey::new("post", 1u64)));
        assert!(!keys.insert(RecordKey::new("post", 2u64)));
        let order: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["post-2", "post-1"]);

        assert!(keys.remove(&RecordKey::new("post", 2u64)));
        assert!(!keys.remove(&RecordKey::new("post", 2u64)));
        keys.insert(RecordKey::new("post", 2u64));
        let order: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(order, vec!["post-1", "post-2"]);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_with_record_leaves_receiver_untouched() {
        let empty = Layer::new();
        let one = empty.clone().with_record(record("post", 1, "A"));
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert!(one.has("post", 1u64));
        assert_eq!(one.keys_for_type(&"post".into()), vec![RecordKey::new("post", 1u64)]);
        assert_index_consistent(&one);
    }

    #[test]
    fn test_with_record_replaces() {
        let layer = Layer::new()
            .with_record(record("post", 1, "A"))
            .with_record(record("post", 1, "B"));
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.keys_for_type(&"post".into()).len(), 1);
        let stored = layer.get(&RecordKey::new("post", 1u64)).unwrap();
        assert_eq!(stored.attribute("title"), Some(&json!("B")));
    }

    #[test]
    fn test_with_merged_record_absent_inserts_patch() {
        let layer = Layer::new().with_merged_record(record("post", 1, "A"), MergeStrategy::Shallow);
        assert_eq!(
            layer.get(&RecordKey::new("post", 1u64)).unwrap().attribute("title"),
            Some(&json!("A"))
        );
        assert_index_consistent(&layer);
    }

    #[test]
    fn test_with_merged_record_shallow_vs_deep() {
        let key = RecordKey::new("post", 1u64);
        let mut base = Attributes::new();
        base.insert("meta".to_string(), json!({"a": 1, "b": 2}));
        base.insert("title".to_string(), json!("A"));
        let mut patch = Attributes::new();
        patch.insert("meta".to_string(), json!({"a": 3}));

        let layer = Layer::new().with_record(Record::new(key.clone(), base));
        let shallow = layer
            .clone()
            .with_merged_record(Record::new(key.clone(), patch.clone()), MergeStrategy::Shallow);
        let deep = layer.with_merged_record(Record::new(key.clone(), patch), MergeStrategy::Deep);

        assert_eq!(shallow.get(&key).unwrap().attribute("meta"), Some(&json!({"a": 3})));
        assert_eq!(shallow.get(&key).unwrap().attribute("title"), Some(&json!("A")));
        assert_eq!(deep.get(&key).unwrap().attribute("meta"), Some(&json!({"a": 3, "b": 2})));
    }

    #[test]
    fn test_without_removes_record_and_index_entry() {
        let layer = Layer::new()
            .with_record(record("post", 1, "A"))
            .with_record(record("post", 2, "B"))
            .with_record(record("comment", 1, "C"));
        let trimmed = layer.clone().without(&RecordKey::new("post", 1u64));

        assert!(!trimmed.has("post", 1u64));
        assert_eq!(trimmed.keys_for_type(&"post".into()), vec![RecordKey::new("post", 2u64)]);
        assert!(trimmed.has("comment", 1u64));
        assert_index_consistent(&trimmed);
        // previous layer still sees the record
        assert!(layer.has("post", 1u64));
    }

    #[test]
    fn test_without_absent_is_noop() {
        let layer = Layer::new().with_record(record("post", 1, "A"));
        let same = layer.clone().without(&RecordKey::new("post", 9u64));
        assert_eq!(same.len(), 1);
        let empty = Layer::new().without(&RecordKey::new("post", 1u64));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_keys_for_unknown_type_is_empty() {
        let layer = Layer::new();
        assert!(layer.keys_for_type(&"ghost".into()).is_empty());
        assert!(layer.type_index(&"ghost".into()).is_none());
    }

    #[test]
    fn test_untouched_records_keep_their_pointer() {
        let layer = Layer::new()
            .with_record(record("post", 1, "A"))
            .with_record(record("post", 2, "B"));
        let before = Arc::clone(layer.get(&RecordKey::new("post", 1u64)).unwrap());
        let next = layer.with_record(record("post", 2, "C"));
        let after = next.get(&RecordKey::new("post", 1u64)).unwrap();
        assert!(Arc::ptr_eq(&before, after));
    }

    #[test]
    fn test_reconcile_keeps_existing_over_base() {
        let key = RecordKey::new("post", 1u64);
        let mut local = Attributes::new();
        local.insert("title".to_string(), json!("edited"));
        let mut canonical = Attributes::new();
        canonical.insert("title".to_string(), json!("server"));
        canonical.insert("published".to_string(), json!(true));
        let base = Record::new(key.clone(), canonical);

        let layer = Layer::new()
            .with_record(Record::new(key.clone(), local))
            .with_reconciled_record(&base);
        let stored = layer.get(&key).unwrap();
        assert_eq!(stored.attribute("title"), Some(&json!("edited")));
        assert_eq!(stored.attribute("published"), Some(&json!(true)));

        let untouched = Layer::new().with_reconciled_record(&base);
        assert!(untouched.is_empty());
    }

    #[test]
    fn test_reconcile_only_keeps_edited_attributes() {
        let key = RecordKey::new("post", 1u64);
        let mut patch = Attributes::new();
        patch.insert("title".to_string(), json!("B"));

        // seeded copy of canonical with only `title` written locally
        let mut local = Layer::new();
        let mut base = Attributes::new();
        base.insert("title".to_string(), json!("A"));
        base.insert("published".to_string(), json!(false));
        local.edit(Record::new(key.clone(), base), &patch);
        assert_eq!(
            local.edited_attributes(&key).unwrap().iter().collect::<Vec<_>>(),
            vec!["title"]
        );

        let mut confirmed = Attributes::new();
        confirmed.insert("title".to_string(), json!("B"));
        confirmed.insert("published".to_string(), json!(true));
        let local = local.with_reconciled_record(&Record::new(key.clone(), confirmed));

        let stored = local.get(&key).unwrap();
        assert_eq!(stored.attribute("title"), Some(&json!("B")));
        assert_eq!(stored.attribute("published"), Some(&json!(true)));
        // the confirmed edit is no longer pending
        assert!(local.edited_attributes(&key).unwrap().is_empty());
    }

    #[test]
    fn test_unconfirmed_edit_survives_reconcile() {
        let key = RecordKey::new("post", 1u64);
        let local = Layer::new().with_edited_record(record("post", 1, "draft"));
        let reconciled = local.with_reconciled_record(&record("post", 1, "server"));

        assert_eq!(
            reconciled.get(&key).unwrap().attribute("title"),
            Some(&json!("draft"))
        );
        assert!(reconciled.edited_attributes(&key).unwrap().contains("title"));
    }

    #[test]
    fn test_without_drops_edit_tracking() {
        let key = RecordKey::new("post", 1u64);
        let layer = Layer::new()
            .with_edited_record(record("post", 1, "draft"))
            .without(&key);
        assert!(layer.edited_attributes(&key).is_none());
    }
}
