//! Model-level reference: local-over-canonical reads and dirty tracking.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use strata_core::{Attributes, RecordDocument, RecordKey, StrataResult};

use crate::reference::Reference;
use crate::registry::ModelType;

/// Derived record state exposed on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelState {
    /// The record has a local snapshot that differs structurally from its
    /// canonical snapshot (or has no canonical snapshot at all).
    pub has_dirty_attributes: bool,
}

/// Pair of canonical and local references for one record.
///
/// Reads prefer local: when a local snapshot exists its attributes are the
/// record's value wholesale, canonical is only consulted when there is none.
#[derive(Debug, Clone)]
pub struct ModelReference {
    canonical: Reference,
    local: Reference,
    model_type: Arc<ModelType>,
}

impl ModelReference {
    pub(crate) fn new(canonical: Reference, local: Reference, model_type: Arc<ModelType>) -> Self {
        Self {
            canonical,
            local,
            model_type,
        }
    }

    /// Key of the record.
    pub fn key(&self) -> &RecordKey {
        self.canonical.key()
    }

    /// Model type of the record.
    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    /// The canonical-layer reference.
    pub fn canonical(&self) -> &Reference {
        &self.canonical
    }

    /// The local-layer reference.
    pub fn local(&self) -> &Reference {
        &self.local
    }

    /// Local value if present, else canonical value.
    pub fn value(&self) -> Option<Arc<RecordDocument>> {
        self.local.value().or_else(|| self.canonical.value())
    }

    /// Write `patch` to canonical.
    pub fn push(&self, patch: Attributes) -> StrataResult<()> {
        self.canonical.push(patch)
    }

    /// Write `patch` to local.
    pub fn push_local(&self, patch: Attributes) -> StrataResult<()> {
        self.local.push(patch)
    }

    /// Current dirty state, computed from one snapshot of both layers.
    pub fn state(&self) -> ModelState {
        let Some(snapshot) = self.canonical.snapshot() else {
            return ModelState::default();
        };
        let key = self.key();
        let has_dirty_attributes = match (
            snapshot.canonical().get(key),
            snapshot.local().get(key),
        ) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(canonical), Some(local)) => {
                !Arc::ptr_eq(canonical, local) && canonical.attributes() != local.attributes()
            }
        };
        ModelState {
            has_dirty_attributes,
        }
    }

    /// Unload the record from both layers.
    pub fn unload(&self) {
        self.canonical.unload();
        self.local.unload();
    }
}
