//! Record value types and the merge rules applied to them.
//!
//! [`Record`] is the immutable snapshot stored in a layer. [`RecordDocument`]
//! is its plain `{ id, type, attributes }` shape, used both for ingesting
//! documents and as the derived value handed out by references.

use crate::identity::{ModelName, RecordId, RecordKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute name to value mapping of a record.
pub type Attributes = BTreeMap<String, Value>;

// ============================================================================
// RECORD
// ============================================================================

/// Immutable snapshot of one record in one layer.
///
/// Layers hold records behind `Arc<Record>`. Any change produces a new
/// `Record` (and a new `Arc`), so pointer identity tells a reader whether the
/// snapshot it saw last is still current. Equality is structural.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: RecordKey,
    attributes: Attributes,
}

impl Record {
    /// Create a record.
    pub fn new(key: RecordKey, attributes: Attributes) -> Self {
        Self { key, attributes }
    }

    /// Create a record with no attributes.
    pub fn empty(key: RecordKey) -> Self {
        Self::new(key, Attributes::new())
    }

    /// Identity of the record.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Model type of the record.
    pub fn model_name(&self) -> &ModelName {
        self.key.model_name()
    }

    /// Id of the record.
    pub fn id(&self) -> &RecordId {
        self.key.id()
    }

    /// All attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// A single attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// New record with `patch` written key-by-key over these attributes.
    pub fn merged_shallow(&self, patch: &Attributes) -> Self {
        Self::new(self.key.clone(), merge_shallow(&self.attributes, patch))
    }

    /// New record with `over` deep-merged on top of these attributes.
    pub fn merged_deep(&self, over: &Attributes) -> Self {
        Self::new(self.key.clone(), merge_deep(&self.attributes, over))
    }

    /// Derive the plain document form.
    pub fn to_document(&self) -> RecordDocument {
        RecordDocument {
            id: self.key.id().clone(),
            model_name: self.key.model_name().clone(),
            attributes: self.attributes.clone(),
        }
    }
}

// ============================================================================
// RECORD DOCUMENT
// ============================================================================

/// Plain `{ id, type, attributes }` form of a record.
///
/// This is the shape documents are ingested in and the shape a reference
/// derives from a snapshot when its value is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    /// Record id.
    pub id: RecordId,
    /// Model type.
    #[serde(rename = "type")]
    pub model_name: ModelName,
    /// Attribute values.
    #[serde(default)]
    pub attributes: Attributes,
}

impl RecordDocument {
    /// Create a document.
    pub fn new(
        model_name: impl Into<ModelName>,
        id: impl Into<RecordId>,
        attributes: Attributes,
    ) -> Self {
        Self {
            id: id.into(),
            model_name: model_name.into(),
            attributes,
        }
    }

    /// Add one attribute, builder style.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Identity of the document's record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.model_name.clone(), self.id.clone())
    }

    /// A single attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Normalize into a record.
    pub fn into_record(self) -> Record {
        Record::new(RecordKey::new(self.model_name, self.id), self.attributes)
    }
}

// ============================================================================
// MERGE RULES
// ============================================================================

/// Overwrite `base` with every entry of `patch`.
///
/// Nested objects in `patch` replace the base value wholesale.
pub fn merge_shallow(base: &Attributes, patch: &Attributes) -> Attributes {
    let mut merged = base.clone();
    for (name, value) in patch {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Merge `over` on top of `base`, recursing into nested objects.
///
/// When both sides hold a JSON object under the same name the objects are
/// merged recursively; any other value in `over` (scalar, array, null)
/// replaces the base value.
pub fn merge_deep(base: &Attributes, over: &Attributes) -> Attributes {
    let mut merged = base.clone();
    for (name, value) in over {
        let next = match merged.get(name) {
            Some(existing) => merge_values(existing, value),
            None => value.clone(),
        };
        merged.insert(name.clone(), next);
    }
    merged
}

fn merge_values(base: &Value, over: &Value) -> Value {
    match (base, over) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            let mut merged = base_map.clone();
            for (name, value) in over_map {
                let next = match merged.get(name) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                merged.insert(name.clone(), next);
            }
            Value::Object(merged)
        }
        _ => over.clone(),
    }
}
