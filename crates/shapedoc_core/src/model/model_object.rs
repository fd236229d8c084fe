//! Model singleton and model-side domain objects.
//!
//! # Invariants
//! - A model object is owned either by the model or by one parent model object.
//! - Diagram model objects are owned by the model and bound to diagrams by reference.

use crate::model::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-project model singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: Option<EntityId>,
}

impl Model {
    pub fn new() -> Self {
        Self { id: None }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of a model object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ModelObjectOwner {
    Model,
    ModelObject(EntityId),
}

/// Domain object of a registered model-object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: Option<EntityId>,
    pub type_name: String,
    pub name: String,
    pub owner: ModelObjectOwner,
    pub attributes: BTreeMap<String, String>,
}

impl ModelObject {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            name: name.into(),
            owner: ModelObjectOwner::Model,
            attributes: BTreeMap::new(),
        }
    }

    pub fn parent(&self) -> Option<EntityId> {
        match self.owner {
            ModelObjectOwner::Model => None,
            ModelObjectOwner::ModelObject(id) => Some(id),
        }
    }
}

/// Model-side object bound to a diagram's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramModelObject {
    pub id: Option<EntityId>,
    pub type_name: String,
    pub name: String,
}

impl DiagramModelObject {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}
