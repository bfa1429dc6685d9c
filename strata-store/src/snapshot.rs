//! The consistent `(canonical, local)` pair published by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use strata_core::{Locality, Record, RecordKey};

use crate::layer::Layer;

/// Position of a snapshot in the store's commit history.
///
/// The sequence increases by one on every committed mutation. No-op
/// operations do not advance it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    /// Number of commits so far.
    pub sequence: u64,
    /// When the commit happened.
    pub committed_at: DateTime<Utc>,
}

impl Version {
    /// The version of an empty store.
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            committed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// The version following this one.
    pub fn next(&self) -> Self {
        Self {
            sequence: self.sequence + 1,
            committed_at: Utc::now(),
        }
    }

    /// Check if this version is newer than another.
    pub fn is_newer_than(&self, other: &Version) -> bool {
        self.sequence > other.sequence
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::zero()
    }
}

/// Per-record position in the `Absent -> LocalOnly/CanonicalOnly -> CanonicalAndLocal` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// In neither layer (never created, or unloaded).
    Absent,
    /// Created locally, not yet confirmed.
    LocalOnly,
    /// Confirmed, with no local snapshot.
    CanonicalOnly,
    /// Present in both layers.
    CanonicalAndLocal,
}

impl RecordState {
    /// Whether the record is present in at least one layer.
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// Both layers of the store, as of one commit.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    canonical: Layer,
    local: Layer,
    version: Version,
}

impl StoreSnapshot {
    pub(crate) fn new(canonical: Layer, local: Layer, version: Version) -> Self {
        Self {
            canonical,
            local,
            version,
        }
    }

    /// The canonical layer.
    pub fn canonical(&self) -> &Layer {
        &self.canonical
    }

    /// The local layer.
    pub fn local(&self) -> &Layer {
        &self.local
    }

    /// The layer selected by `locality`.
    pub fn layer(&self, locality: Locality) -> &Layer {
        match locality {
            Locality::Canonical => &self.canonical,
            Locality::Local => &self.local,
        }
    }

    /// Commit position of this snapshot.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Snapshot of `key` in the layer selected by `locality`.
    pub fn record(&self, key: &RecordKey, locality: Locality) -> Option<&Arc<Record>> {
        self.layer(locality).get(key)
    }

    /// Whether `key` is present in either layer.
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.canonical.contains(key) || self.local.contains(key)
    }

    /// Lifecycle state of `key`.
    pub fn record_state(&self, key: &RecordKey) -> RecordState {
        match (self.canonical.contains(key), self.local.contains(key)) {
            (false, false) => RecordState::Absent,
            (false, true) => RecordState::LocalOnly,
            (true, false) => RecordState::CanonicalOnly,
            (true, true) => RecordState::CanonicalAndLocal,
        }
    }

    pub(crate) fn into_layers(self) -> (Layer, Layer, Version) {
        (self.canonical, self.local, self.version)
    }
}
