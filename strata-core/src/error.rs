//! Error types for strata operations

use crate::identity::{ModelName, RecordKey};
use thiserror::Error;

/// Store and model errors.
///
/// Missing records are not errors: lookups return `None` and redundant
/// mutations are no-ops. These variants cover caller logic errors only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown model: {model_name}")]
    UnknownModel { model_name: ModelName },

    #[error("Model already defined: {model_name}")]
    DuplicateModel { model_name: ModelName },

    #[error("Unknown attribute {attribute} on model {model_name}")]
    UnknownAttribute {
        model_name: ModelName,
        attribute: String,
    },

    #[error("Record {key} is not loaded in either layer")]
    RecordNotLoaded { key: RecordKey },

    #[error("Model mismatch: expected {expected}, found {found}")]
    ModelMismatch {
        expected: ModelName,
        found: ModelName,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all strata errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrataError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================
