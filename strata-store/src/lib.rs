//! Strata Store - Dual-Layer Record Cache
//!
//! An in-memory record cache with two layers per store: **canonical**, the
//! last state confirmed by the source of truth, and **local**, unsaved edits
//! keyed identically. Reads go through an overlay that prefers local; a record
//! is dirty when its local snapshot differs from its canonical one.
//!
//! Each layer is an immutable value shared between commits. The [`Store`]
//! publishes a new `(canonical, local)` [`StoreSnapshot`] per mutation, and a
//! [`Reference`] re-derives its plain value only when the record snapshot it
//! points at has changed.

pub mod attributes;
pub mod layer;
pub mod model;
pub mod overlay;
pub mod reference;
pub mod registry;
pub mod snapshot;
pub mod store;

pub use attributes::{AttributeOverlay, AttributeReference};
pub use layer::{KeySet, Layer};
pub use model::Model;
pub use overlay::{ModelReference, ModelState};
pub use reference::Reference;
pub use registry::{
    AttributeDescriptor, AttributeKind, AttributeTable, ModelDefinition, ModelType, TypeRegistry,
};
pub use snapshot::{RecordState, StoreSnapshot, Version};
pub use store::{Store, StoreBuilder};

// Re-export the value types callers need alongside the store
pub use strata_core::{
    Attributes, Locality, ModelName, RecordDocument, RecordId, RecordKey, StoreConfig,
    StrataError, StrataResult,
};
