//! The dual-layer record store.
//!
//! [`Store`] is the only mutator of cache state. It holds the current
//! [`StoreSnapshot`] in a single version cell; every operation computes the
//! next canonical and local layers from one consistent read of that cell and
//! publishes them with one replace, so readers never observe a half-applied
//! mutation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use strata_core::{
    Attributes, IdAllocator, Locality, MergeStrategy, ModelName, Record, RecordDocument, RecordId,
    RecordKey, StoreConfig, StoreError, StrataResult,
};

use crate::layer::Layer;
use crate::model::Model;
use crate::overlay::ModelReference;
use crate::reference::Reference;
use crate::registry::{ModelDefinition, ModelType, TypeRegistry};
use crate::snapshot::{RecordState, StoreSnapshot, Version};

// ============================================================================
// STORE
// ============================================================================

pub(crate) struct StoreInner {
    config: StoreConfig,
    registry: Arc<TypeRegistry>,
    ids: Arc<dyn IdAllocator>,
    cell: RwLock<Arc<StoreSnapshot>>,
    references: Mutex<HashMap<(Locality, RecordKey), Reference>>,
}

/// Dual-layer (canonical/local) record store.
///
/// Cloning yields another handle to the same store.
///
/// # Example
///
/// ```
/// use strata_store::{AttributeKind, ModelDefinition, Store};
/// use strata_core::{Attributes, RecordDocument};
///
/// let store = Store::new();
/// store
///     .define_model("post", ModelDefinition::new().attribute("title", AttributeKind::String))
///     .unwrap();
///
/// let mut attributes = Attributes::new();
/// attributes.insert("title".into(), "A".into());
/// let post = store.create_record("post", Some(1u64.into()), attributes).unwrap();
///
/// post.set_attribute("title", "B").unwrap();
/// assert!(post.state().has_dirty_attributes);
///
/// store.push(RecordDocument::new("post", 1u64, Attributes::new()).with_attribute("title", "B"));
/// assert!(!post.state().has_dirty_attributes);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Builder for a [`Store`] with an injected registry or id allocator.
pub struct StoreBuilder {
    config: StoreConfig,
    registry: Option<Arc<TypeRegistry>>,
    ids: Option<Arc<dyn IdAllocator>>,
}

impl StoreBuilder {
    /// Use `config`.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing type registry.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `ids` instead of the allocator selected by the config.
    pub fn id_allocator(mut self, ids: Arc<dyn IdAllocator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Build the store.
    pub fn build(self) -> Store {
        let ids = self
            .ids
            .unwrap_or_else(|| self.config.id_strategy.allocator());
        Store {
            inner: Arc::new(StoreInner {
                config: self.config,
                registry: self.registry.unwrap_or_default(),
                ids,
                cell: RwLock::new(Arc::new(StoreSnapshot::default())),
                references: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Store {
    /// Create a store with default configuration and an empty registry.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a store with `config` and an empty registry.
    pub fn with_config(config: StoreConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building a store.
    pub fn builder() -> StoreBuilder {
        StoreBuilder {
            config: StoreConfig::default(),
            registry: None,
            ids: None,
        }
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The type registry this store resolves model names against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.inner.registry
    }

    // === Model types ===

    /// Register a model type.
    pub fn define_model(
        &self,
        model_name: impl Into<ModelName>,
        definition: ModelDefinition,
    ) -> StrataResult<Arc<ModelType>> {
        self.inner.registry.define(model_name, definition)
    }

    /// Look up a registered model type.
    pub fn model_for(&self, model_name: impl Into<ModelName>) -> StrataResult<Arc<ModelType>> {
        self.inner.registry.require(&model_name.into())
    }

    // === Reads ===

    /// The current `(canonical, local)` snapshot.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.inner.cell.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Commit position of the current snapshot.
    pub fn version(&self) -> Version {
        self.snapshot().version()
    }

    /// Whether a record is present in either layer.
    pub fn has_record(&self, model_name: impl Into<ModelName>, id: impl Into<RecordId>) -> bool {
        self.snapshot().contains(&RecordKey::new(model_name, id))
    }

    /// Lifecycle state of a record.
    pub fn record_state(
        &self,
        model_name: impl Into<ModelName>,
        id: impl Into<RecordId>,
    ) -> RecordState {
        self.snapshot().record_state(&RecordKey::new(model_name, id))
    }

    /// Snapshot of `key` in the layer selected by `locality`.
    pub fn document_for(&self, key: &RecordKey, locality: Locality) -> Option<Arc<Record>> {
        self.snapshot().record(key, locality).cloned()
    }

    /// Model instance for a loaded record.
    ///
    /// `None` if the record is in neither layer or its model was never defined.
    pub fn peek_record(
        &self,
        model_name: impl Into<ModelName>,
        id: impl Into<RecordId>,
    ) -> Option<Model> {
        let key = RecordKey::new(model_name, id);
        if !self.snapshot().contains(&key) {
            return None;
        }
        let model_type = self.inner.registry.get(key.model_name())?;
        Some(self.instantiate(model_type, key))
    }

    /// Model instances for every loaded record of a type.
    ///
    /// Canonical records come first in insertion order, then local-only
    /// records in insertion order. Empty if the model was never defined.
    pub fn peek_all(&self, model_name: impl Into<ModelName>) -> Vec<Model> {
        let model_name = model_name.into();
        let Some(model_type) = self.inner.registry.get(&model_name) else {
            return Vec::new();
        };
        let snapshot = self.snapshot();
        let canonical = snapshot.canonical();
        let mut keys = canonical.keys_for_type(&model_name);
        keys.extend(
            snapshot
                .local()
                .keys_for_type(&model_name)
                .into_iter()
                .filter(|key| !canonical.contains(key)),
        );
        keys.into_iter()
            .map(|key| self.instantiate(Arc::clone(&model_type), key))
            .collect()
    }

    // === References ===

    /// The cached reference for a record in one layer, created on first use.
    pub fn reference_for(
        &self,
        model_name: impl Into<ModelName>,
        id: impl Into<RecordId>,
        locality: Locality,
    ) -> Reference {
        self.reference_for_key(&RecordKey::new(model_name, id), locality)
    }

    /// The cached reference for `key` in one layer, created on first use.
    pub fn reference_for_key(&self, key: &RecordKey, locality: Locality) -> Reference {
        self.references()
            .entry((locality, key.clone()))
            .or_insert_with(|| Reference::new(key.clone(), locality, Arc::downgrade(&self.inner)))
            .clone()
    }

    /// Overlay reference pairing the canonical and local references of `key`.
    ///
    /// Fails with `ModelMismatch` if `key` belongs to a different model type.
    pub fn model_reference_for(
        &self,
        model_type: &Arc<ModelType>,
        key: &RecordKey,
    ) -> StrataResult<ModelReference> {
        if model_type.name() != key.model_name() {
            return Err(StoreError::ModelMismatch {
                expected: model_type.name().clone(),
                found: key.model_name().clone(),
            }
            .into());
        }
        Ok(self.pair_references(Arc::clone(model_type), key))
    }

    // === Mutations ===

    /// Create a record in the local layer.
    ///
    /// Without an id, one is drawn from the store's id allocator. If a record
    /// with the key already exists in either layer nothing changes and a
    /// model for the existing record is returned.
    pub fn create_record(
        &self,
        model_name: impl Into<ModelName>,
        id: Option<RecordId>,
        attributes: Attributes,
    ) -> StrataResult<Model> {
        let model_name = model_name.into();
        let model_type = self.inner.registry.require(&model_name)?;
        let id = id.unwrap_or_else(|| self.inner.ids.allocate(&model_name));
        let key = RecordKey::new(model_name, id);

        self.commit("create_record", |tx| {
            if tx.canonical.contains(&key) || tx.local.contains(&key) {
                tracing::debug!(key = %key, "record already present, create skipped");
                return;
            }
            tx.local.edit(Record::empty(key.clone()), &attributes);
            tx.changed = true;
            tracing::debug!(key = %key, locality = %Locality::Local, "record created");
        });

        Ok(self.instantiate(model_type, key))
    }

    /// Apply a server-confirmed document.
    ///
    /// The document is merged into canonical. If the record has a local
    /// snapshot, local is then re-derived as the fresh canonical value with
    /// the locally edited attributes deep-merged on top: confirmed fields
    /// advance, unconfirmed local edits survive.
    pub fn push(&self, document: RecordDocument) {
        let strategy = self.inner.config.canonical_merge;
        self.commit("push", |tx| tx.push_document(document, strategy));
    }

    /// Apply several server-confirmed documents in one commit.
    ///
    /// `documents` is drained before the commit starts.
    pub fn push_many(&self, documents: impl IntoIterator<Item = RecordDocument>) {
        let documents: Vec<RecordDocument> = documents.into_iter().collect();
        let strategy = self.inner.config.canonical_merge;
        self.commit("push_many", |tx| {
            for document in documents {
                tx.push_document(document, strategy);
            }
        });
    }

    /// Merge `patch` into the layer `reference` targets.
    ///
    /// Fails with `RecordNotLoaded` if the record is in neither layer.
    pub fn push_from_reference(
        &self,
        reference: &Reference,
        patch: Attributes,
    ) -> StrataResult<()> {
        let key = reference.key().clone();
        let locality = reference.locality();
        let strategy = self.inner.config.canonical_merge;
        let seed = self.inner.config.seed_local_from_canonical;

        self.commit("push_from_reference", |tx| -> StrataResult<()> {
            if !tx.canonical.contains(&key) && !tx.local.contains(&key) {
                return Err(StoreError::RecordNotLoaded { key: key.clone() }.into());
            }
            match locality {
                Locality::Canonical => {
                    tx.canonical.merge(Record::new(key.clone(), patch), strategy);
                }
                Locality::Local => {
                    let base = match (tx.local.get(&key), tx.canonical.get(&key)) {
                        (Some(local), _) => Record::clone(local),
                        (None, Some(canonical)) if seed => Record::clone(canonical),
                        _ => Record::empty(key.clone()),
                    };
                    tx.local.edit(base, &patch);
                }
            }
            tx.changed = true;
            tracing::debug!(key = %key, locality = %locality, "record patched");
            Ok(())
        })
    }

    /// Remove a record from both layers and drop its cached references.
    ///
    /// Returns false (and changes nothing) if the record was not loaded.
    pub fn unload(&self, key: &RecordKey) -> bool {
        let removed = self.commit("unload", |tx| {
            let from_canonical = tx.canonical.remove(key);
            let from_local = tx.local.remove(key);
            tx.changed = from_canonical || from_local;
            tx.changed
        });

        {
            let mut references = self.references();
            for locality in Locality::ALL {
                references.remove(&(locality, key.clone()));
            }
        }

        if removed {
            tracing::debug!(key = %key, "record unloaded");
        } else {
            tracing::debug!(key = %key, "record not loaded, unload skipped");
        }
        removed
    }

    /// Unload the record `reference` points at.
    pub fn unload_reference(&self, reference: &Reference) -> bool {
        self.unload(reference.key())
    }

    // === Internals ===

    fn instantiate(&self, model_type: Arc<ModelType>, key: RecordKey) -> Model {
        Model::new(self.pair_references(model_type, &key))
    }

    fn pair_references(&self, model_type: Arc<ModelType>, key: &RecordKey) -> ModelReference {
        ModelReference::new(
            self.reference_for_key(key, Locality::Canonical),
            self.reference_for_key(key, Locality::Local),
            model_type,
        )
    }

    fn references(&self) -> MutexGuard<'_, HashMap<(Locality, RecordKey), Reference>> {
        self.inner
            .references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `mutation` against a working copy of the current layers and
    /// publish the result.
    ///
    /// The write lock is held from the read of the current snapshot to the
    /// replace, and `mutation` must not call back into the store. The cell
    /// is written once, after `mutation` returns: if it panics, the previous
    /// snapshot stays published.
    fn commit<T>(
        &self,
        operation: &'static str,
        mutation: impl FnOnce(&mut Transaction) -> T,
    ) -> T {
        let mut cell = self.inner.cell.write().unwrap_or_else(PoisonError::into_inner);
        let (canonical, local, version) = StoreSnapshot::clone(&cell).into_layers();

        let mut tx = Transaction {
            canonical,
            local,
            changed: false,
        };
        let result = mutation(&mut tx);

        if tx.changed {
            let next = version.next();
            tracing::debug!(operation, version = next.sequence, "snapshot committed");
            *cell = Arc::new(StoreSnapshot::new(tx.canonical, tx.local, next));
        }
        result
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Store")
            .field("version", &snapshot.version().sequence)
            .field("canonical_records", &snapshot.canonical().len())
            .field("local_records", &snapshot.local().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Owned working copy of both layers during one commit.
struct Transaction {
    canonical: Layer,
    local: Layer,
    changed: bool,
}

impl Transaction {
    fn push_document(&mut self, document: RecordDocument, strategy: MergeStrategy) {
        let key = document.key();
        self.canonical.merge(document.into_record(), strategy);
        if let Some(fresh) = self.canonical.get(&key).cloned() {
            self.local.reconcile(&fresh);
        }
        self.changed = true;
        tracing::debug!(key = %key, locality = %Locality::Canonical, "document pushed");
    }
}
