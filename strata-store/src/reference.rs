//! Memoized handles into one layer of the store.
//!
//! A [`Reference`] is bound to one `(key, locality)` pair. It does not own
//! record data: every read looks up the current snapshot for its key and
//! only re-derives the plain [`RecordDocument`] when that snapshot's pointer
//! differs from the one seen last time. Because layers share untouched
//! record snapshots between commits, pointer inequality is exact: the
//! pointer only changes when the record itself changed.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use strata_core::{
    Attributes, Locality, ModelName, Record, RecordDocument, RecordKey, StoreError, StrataResult,
};

use crate::snapshot::StoreSnapshot;
use crate::store::{Store, StoreInner};

/// Last snapshot seen and the value derived from it.
struct Memo {
    snapshot: Arc<Record>,
    value: Arc<RecordDocument>,
}

struct ReferenceInner {
    key: RecordKey,
    locality: Locality,
    store: Weak<StoreInner>,
    memo: Mutex<Option<Memo>>,
}

/// Handle to one record in one layer.
///
/// Cloning is cheap; clones share the memoized value. Handles are issued and
/// cached by the store, one per `(key, locality)`, until the record is
/// unloaded.
#[derive(Clone)]
pub struct Reference {
    inner: Arc<ReferenceInner>,
}

impl Reference {
    pub(crate) fn new(key: RecordKey, locality: Locality, store: Weak<StoreInner>) -> Self {
        Self {
            inner: Arc::new(ReferenceInner {
                key,
                locality,
                store,
                memo: Mutex::new(None),
            }),
        }
    }

    /// Key of the referenced record.
    pub fn key(&self) -> &RecordKey {
        &self.inner.key
    }

    /// Model type of the referenced record.
    pub fn model_name(&self) -> &ModelName {
        self.inner.key.model_name()
    }

    /// Layer this reference reads and writes.
    pub fn locality(&self) -> Locality {
        self.inner.locality
    }

    /// Plain value of the record in this reference's layer.
    ///
    /// Returns the cached value while the layer still holds the same
    /// snapshot; re-derives it otherwise. `None` if the layer has no record
    /// for the key.
    pub fn value(&self) -> Option<Arc<RecordDocument>> {
        let current = self.immutable_value();
        let mut memo = self.inner.memo.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(snapshot) = current else {
            *memo = None;
            return None;
        };

        if let Some(cached) = memo.as_ref() {
            if Arc::ptr_eq(&cached.snapshot, &snapshot) {
                tracing::trace!(
                    key = %self.inner.key,
                    locality = %self.inner.locality,
                    "reference cache hit"
                );
                return Some(Arc::clone(&cached.value));
            }
        }

        tracing::trace!(
            key = %self.inner.key,
            locality = %self.inner.locality,
            "reference cache miss"
        );
        let value = Arc::new(snapshot.to_document());
        *memo = Some(Memo {
            snapshot,
            value: Arc::clone(&value),
        });
        Some(value)
    }

    /// The stored snapshot itself, without deriving a plain value.
    pub fn immutable_value(&self) -> Option<Arc<Record>> {
        self.store()?.document_for(&self.inner.key, self.inner.locality)
    }

    /// Merge `patch` into the record in this reference's layer.
    pub fn push(&self, patch: Attributes) -> StrataResult<()> {
        match self.store() {
            Some(store) => store.push_from_reference(self, patch),
            None => Err(StoreError::RecordNotLoaded {
                key: self.inner.key.clone(),
            }
            .into()),
        }
    }

    /// Unload the record from the store.
    pub fn unload(&self) {
        if let Some(store) = self.store() {
            store.unload_reference(self);
        }
    }

    /// Whether two handles are the same cached reference.
    pub fn ptr_eq(&self, other: &Reference) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<StoreSnapshot>> {
        self.store().map(|store| store.snapshot())
    }

    fn store(&self) -> Option<Store> {
        self.inner.store.upgrade().map(Store::from_inner)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("key", &self.inner.key)
            .field("locality", &self.inner.locality)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(title: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("title".to_string(), json!(title));
        attributes
    }

    #[test]
    fn test_value_is_memoized_until_record_changes() {
        let store = Store::new();
        store.push(RecordDocument::new("post", 1u64, attrs("A")));
        let reference = store.reference_for("post", 1u64, Locality::Canonical);

        let first = reference.value().unwrap();
        let second = reference.value().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        store.push(RecordDocument::new("post", 1u64, attrs("B")));
        let third = reference.value().unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(third.attribute("title"), Some(&json!("B")));
    }

    #[test]
    fn test_unrelated_mutation_keeps_cached_value() {
        let store = Store::new();
        store.push(RecordDocument::new("post", 1u64, attrs("A")));
        let reference = store.reference_for("post", 1u64, Locality::Canonical);
        let before = reference.value().unwrap();

        store.push(RecordDocument::new("post", 2u64, attrs("other")));
        let after = reference.value().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_missing_record_yields_none() {
        let store = Store::new();
        let reference = store.reference_for("post", 1u64, Locality::Local);
        assert!(reference.value().is_none());
        assert!(reference.immutable_value().is_none());
    }

    #[test]
    fn test_push_targets_own_layer() {
        let store = Store::new();
        store.push(RecordDocument::new("post", 1u64, attrs("A")));
        let canonical = store.reference_for("post", 1u64, Locality::Canonical);

        canonical.push(attrs("B")).unwrap();
        assert_eq!(canonical.value().unwrap().attribute("title"), Some(&json!("B")));
        assert!(store
            .document_for(&RecordKey::new("post", 1u64), Locality::Local)
            .is_none());
    }

    #[test]
    fn test_reference_outliving_store() {
        let reference = {
            let store = Store::new();
            store.push(RecordDocument::new("post", 1u64, attrs("A")));
            store.reference_for("post", 1u64, Locality::Canonical)
        };
        assert!(reference.value().is_none());
        assert!(reference.push(attrs("B")).is_err());
        reference.unload();
    }

    #[test]
    fn test_unload_through_reference() {
        let store = Store::new();
        store.push(RecordDocument::new("post", 1u64, attrs("A")));
        let reference = store.reference_for("post", 1u64, Locality::Canonical);
        reference.unload();
        assert!(!store.has_record("post", 1u64));
        assert!(reference.value().is_none());
    }
}
