//! Configuration types

use crate::error::{ConfigError, StrataError, StrataResult};
use crate::identity::{IdAllocator, SequentialAllocator, UuidAllocator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How an incoming canonical document is merged into an existing canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Attribute-by-attribute overwrite; nested objects are replaced wholesale.
    #[default]
    Shallow,
    /// Nested objects are merged recursively.
    Deep,
}

/// Default id allocation for records created without an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IdStrategy {
    /// UUIDv7 strings.
    #[default]
    UuidV7,
    /// Increasing integers starting at `start`.
    Sequential { start: u64 },
}

impl IdStrategy {
    /// Build the allocator for this strategy.
    pub fn allocator(&self) -> Arc<dyn IdAllocator> {
        match self {
            Self::UuidV7 => Arc::new(UuidAllocator),
            Self::Sequential { start } => Arc::new(SequentialAllocator::starting_at(*start)),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Merge rule for canonical pushes onto an existing canonical record.
    pub canonical_merge: MergeStrategy,
    /// Copy the canonical snapshot into local before the first local write
    /// to a record that has no local snapshot yet.
    pub seed_local_from_canonical: bool,
    /// Allocation used when `create_record` receives no id.
    pub id_strategy: IdStrategy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            canonical_merge: MergeStrategy::Shallow,
            seed_local_from_canonical: true,
            id_strategy: IdStrategy::UuidV7,
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the canonical merge strategy.
    pub fn with_canonical_merge(mut self, strategy: MergeStrategy) -> Self {
        self.canonical_merge = strategy;
        self
    }

    /// Enable or disable seeding local from canonical on first local write.
    pub fn with_seed_local_from_canonical(mut self, enabled: bool) -> Self {
        self.seed_local_from_canonical = enabled;
        self
    }

    /// Set the id strategy.
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        // Sequential ids must leave room to count upward
        if let IdStrategy::Sequential { start } = self.id_strategy {
            if start == u64::MAX {
                return Err(StrataError::Config(ConfigError::InvalidValue {
                    field: "id_strategy.start".to_string(),
                    value: start.to_string(),
                    reason: "start must be below u64::MAX".to_string(),
                }));
            }
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration document. Missing fields take
    /// their defaults.
    pub fn from_json_str(input: &str) -> StrataResult<Self> {
        let config: Self = serde_json::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}
