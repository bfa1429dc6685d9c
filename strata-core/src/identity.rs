//! Identity types for records held in the layered cache.
//!
//! A record is identified by the pair `(model_name, id)`. Inside a layer the
//! pair is normalized into a single [`RecordKey`] which is used as the map key
//! for both the record table and the per-type index.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

// ============================================================================
// MODEL NAME
// ============================================================================

/// Name of a model type (e.g. `"post"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    /// Create a model name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ModelName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ModelName> for ModelName {
    fn from(name: &ModelName) -> Self {
        name.clone()
    }
}

impl AsRef<str> for ModelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// RECORD ID
// ============================================================================

/// Identifier of a record within its model type.
///
/// Ids are kept in their string form so that numeric and string ids address
/// the same record: `RecordId::from(1u64) == RecordId::from("1")`.
/// Deserializes from either a JSON string or a JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => Self(id),
            RawId::Signed(id) => Self(id.to_string()),
            RawId::Unsigned(id) => Self(id.to_string()),
        })
    }
}

impl RecordId {
    /// Create a record id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        id.clone()
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

macro_rules! record_id_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for RecordId {
                fn from(id: $ty) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

record_id_from_int!(u32, u64, i32, i64, usize);

// ============================================================================
// RECORD KEY
// ============================================================================

/// Composite `(model_name, id)` identity of a record.
///
/// The displayed form is `"{model_name}-{id}"`. Layers key on the typed pair,
/// so two records whose displayed forms happen to coincide never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    model_name: ModelName,
    id: RecordId,
}

impl RecordKey {
    /// Build the key for a record.
    pub fn new(model_name: impl Into<ModelName>, id: impl Into<RecordId>) -> Self {
        Self {
            model_name: model_name.into(),
            id: id.into(),
        }
    }

    /// The model type half of the key.
    pub fn model_name(&self) -> &ModelName {
        &self.model_name
    }

    /// The id half of the key.
    pub fn id(&self) -> &RecordId {
        &self.id
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.model_name, self.id)
    }
}

// ============================================================================
// LOCALITY
// ============================================================================

/// Which layer of the store a reference reads from and writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locality {
    /// Last known server-confirmed state.
    Canonical,
    /// Unsaved edits layered over canonical.
    Local,
}

impl Locality {
    /// Both localities, canonical first.
    pub const ALL: [Locality; 2] = [Locality::Canonical, Locality::Local];

    /// Lowercase name, as used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ID ALLOCATION
// ============================================================================

/// Supplies ids for records created without one.
///
/// Implementations must return a value unique among all records of all types
/// for the lifetime of the store that owns the allocator.
pub trait IdAllocator: Send + Sync {
    /// Allocate a fresh id for a new record of `model_name`.
    fn allocate(&self, model_name: &ModelName) -> RecordId;
}

/// Allocates UUIDv7 ids (timestamp-sortable).
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

impl IdAllocator for UuidAllocator {
    fn allocate(&self, _model_name: &ModelName) -> RecordId {
        RecordId::from(Uuid::now_v7())
    }
}

/// Allocates increasing integer ids, shared across all model types.
///
/// Deterministic, which makes it convenient for tests and fixtures.
#[derive(Debug, Default)]
pub struct SequentialAllocator {
    next: AtomicU64,
}

impl SequentialAllocator {
    /// Create an allocator whose first id is `start`.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl IdAllocator for SequentialAllocator {
    fn allocate(&self, _model_name: &ModelName) -> RecordId {
        RecordId::from(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
