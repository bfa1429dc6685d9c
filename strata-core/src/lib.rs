//! Strata Core - Record, Identity, and Configuration Types
//!
//! Pure data structures shared by the layered record cache. This crate holds
//! no store state: records, keys, merge rules, errors, and configuration.

pub mod config;
pub mod error;
pub mod identity;
pub mod record;

pub use config::{IdStrategy, MergeStrategy, StoreConfig};
pub use error::{ConfigError, StoreError, StrataError, StrataResult};
pub use identity::{
    IdAllocator, Locality, ModelName, RecordId, RecordKey, SequentialAllocator, UuidAllocator,
};
pub use record::{merge_deep, merge_shallow, Attributes, Record, RecordDocument};
