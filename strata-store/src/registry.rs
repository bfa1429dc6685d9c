//! Model type registry.
//!
//! Models are declared once with a [`ModelDefinition`] listing their
//! attributes. The registry turns each definition into a [`ModelType`] whose
//! [`AttributeTable`] (attribute name to accessor descriptor) is built on
//! first use and then shared by every model instance of that type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use strata_core::{ModelName, StoreError, StrataResult};

// ============================================================================
// DEFINITIONS
// ============================================================================

/// Declared value kind of an attribute.
///
/// Informational only: values are not checked against their kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Boolean,
    Number,
    Json,
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute name.
    pub name: String,
    /// Declared kind.
    pub kind: AttributeKind,
}

/// Attribute declarations for one model type, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    attributes: Vec<AttributeDescriptor>,
}

impl ModelDefinition {
    /// Create a definition with no attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute, builder style. Redeclaring a name replaces its kind.
    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        let name = name.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.attributes.push(AttributeDescriptor { name, kind }),
        }
        self
    }

    /// Declared attributes.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }
}

// ============================================================================
// ATTRIBUTE TABLE
// ============================================================================

/// Lookup table from attribute name to its descriptor for one model type.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    model_name: ModelName,
    descriptors: Vec<AttributeDescriptor>,
    positions: HashMap<String, usize>,
}

impl AttributeTable {
    fn build(model_name: &ModelName, definition: &ModelDefinition) -> Self {
        let descriptors = definition.attributes().to_vec();
        let positions = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Self {
            model_name: model_name.clone(),
            descriptors,
            positions,
        }
    }

    /// Model type this table belongs to.
    pub fn model_name(&self) -> &ModelName {
        &self.model_name
    }

    /// Descriptor for `name`.
    pub fn get(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.positions.get(name).map(|&i| &self.descriptors[i])
    }

    /// Descriptor for `name`, or an `UnknownAttribute` error.
    pub fn require(&self, name: &str) -> StrataResult<&AttributeDescriptor> {
        self.get(name).ok_or_else(|| {
            StoreError::UnknownAttribute {
                model_name: self.model_name.clone(),
                attribute: name.to_string(),
            }
            .into()
        })
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.descriptors.iter()
    }

    /// Declared attribute names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    /// Number of declared attributes.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no attributes are declared.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// ============================================================================
// MODEL TYPE
// ============================================================================

/// A registered model type.
#[derive(Debug)]
pub struct ModelType {
    name: ModelName,
    definition: ModelDefinition,
    table: OnceLock<Arc<AttributeTable>>,
}

impl ModelType {
    fn new(name: ModelName, definition: ModelDefinition) -> Self {
        Self {
            name,
            definition,
            table: OnceLock::new(),
        }
    }

    /// Name of the type.
    pub fn name(&self) -> &ModelName {
        &self.name
    }

    /// The definition it was registered with.
    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    /// Accessor table, built on first call and reused afterwards.
    pub fn attribute_table(&self) -> Arc<AttributeTable> {
        Arc::clone(self.table.get_or_init(|| {
            tracing::trace!(model = %self.name, "building attribute table");
            Arc::new(AttributeTable::build(&self.name, &self.definition))
        }))
    }
}

// ============================================================================
// TYPE REGISTRY
// ============================================================================

/// Registry of model types, passed explicitly to the store.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<ModelName, Arc<ModelType>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type. Each name may be defined once.
    pub fn define(
        &self,
        model_name: impl Into<ModelName>,
        definition: ModelDefinition,
    ) -> StrataResult<Arc<ModelType>> {
        let model_name = model_name.into();
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(&model_name) {
            return Err(StoreError::DuplicateModel { model_name }.into());
        }
        let model_type = Arc::new(ModelType::new(model_name.clone(), definition));
        types.insert(model_name.clone(), Arc::clone(&model_type));
        tracing::debug!(model = %model_name, "model defined");
        Ok(model_type)
    }

    /// Look up a model type.
    pub fn get(&self, model_name: &ModelName) -> Option<Arc<ModelType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_name)
            .cloned()
    }

    /// Look up a model type, or fail with `UnknownModel`.
    pub fn require(&self, model_name: &ModelName) -> StrataResult<Arc<ModelType>> {
        self.get(model_name).ok_or_else(|| {
            StoreError::UnknownModel {
                model_name: model_name.clone(),
            }
            .into()
        })
    }

    /// Whether `model_name` is registered.
    pub fn contains(&self, model_name: &ModelName) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(model_name)
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> Vec<ModelName> {
        let mut names: Vec<ModelName> = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
