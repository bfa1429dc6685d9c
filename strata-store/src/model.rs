//! Model instances.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_core::{ModelName, RecordDocument, RecordId, RecordKey, StrataResult};

use crate::attributes::AttributeOverlay;
use crate::overlay::{ModelReference, ModelState};

/// One record viewed through its model type.
///
/// All reads go through the overlay (local over canonical); attribute writes
/// go to the local layer.
pub struct Model {
    reference: ModelReference,
    attributes: OnceLock<AttributeOverlay>,
}

impl Model {
    pub(crate) fn new(reference: ModelReference) -> Self {
        Self {
            reference,
            attributes: OnceLock::new(),
        }
    }

    /// Id of the record.
    pub fn id(&self) -> &RecordId {
        self.reference.key().id()
    }

    /// Model type of the record.
    pub fn model_name(&self) -> &ModelName {
        self.reference.key().model_name()
    }

    /// Key of the record.
    pub fn key(&self) -> &RecordKey {
        self.reference.key()
    }

    /// Plain value of the record, `None` once it is unloaded.
    pub fn value(&self) -> Option<Arc<RecordDocument>> {
        self.reference.value()
    }

    /// Declared-attribute accessors, built on first use.
    pub fn attributes(&self) -> &AttributeOverlay {
        self.attributes
            .get_or_init(|| AttributeOverlay::new(self.reference.clone()))
    }

    /// Current value of a declared attribute.
    pub fn attribute(&self, name: &str) -> StrataResult<Option<Value>> {
        self.attributes().get(name)
    }

    /// Set a declared attribute on the local layer.
    pub fn set_attribute(&self, name: &str, value: impl Into<Value>) -> StrataResult<()> {
        self.attributes().set(name, value.into())
    }

    /// Current dirty state.
    pub fn state(&self) -> ModelState {
        self.reference.state()
    }

    /// Unload the record from the store.
    pub fn unload(&self) {
        self.reference.unload();
    }

    /// The underlying overlay reference.
    pub fn reference(&self) -> &ModelReference {
        &self.reference
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("key", self.key())
            .field("state", &self.state())
            .finish()
    }
}
