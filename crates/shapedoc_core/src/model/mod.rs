//! Domain model for project/design/diagram persistence.
//!
//! # Responsibility
//! - Define the entity records stored by the repository.
//! - Keep ownership explicit through sum-typed owner fields.
//!
//! # Invariants
//! - Identity is `None` until the repository inserts the entity.
//! - Every non-root entity has exactly one owner at any time.
//! - Soft-delete state lives beside the entity in storage, never inside it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod connection;
pub mod design;
pub mod diagram;
pub mod model_object;
pub mod project;
pub mod shape;
pub mod style;
pub mod template;

/// Opaque identity assigned by the repository on first insert.
pub type EntityId = Uuid;

/// Entity category used for type registration, errors and storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Project,
    Design,
    Style,
    Model,
    ModelObject,
    DiagramModelObject,
    Template,
    ModelMapping,
    Diagram,
    Shape,
    Connection,
}

impl EntityCategory {
    /// Stable lowercase label used in logs and storage rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Design => "design",
            Self::Style => "style",
            Self::Model => "model",
            Self::ModelObject => "model_object",
            Self::DiagramModelObject => "diagram_model_object",
            Self::Template => "template",
            Self::ModelMapping => "model_mapping",
            Self::Diagram => "diagram",
            Self::Shape => "shape",
            Self::Connection => "connection",
        }
    }

    /// Parses the label produced by [`EntityCategory::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        let category = match value {
            "project" => Self::Project,
            "design" => Self::Design,
            "style" => Self::Style,
            "model" => Self::Model,
            "model_object" => Self::ModelObject,
            "diagram_model_object" => Self::DiagramModelObject,
            "template" => Self::Template,
            "model_mapping" => Self::ModelMapping,
            "diagram" => Self::Diagram,
            "shape" => Self::Shape,
            "connection" => Self::Connection,
            _ => return None,
        };
        Some(category)
    }
}

impl Display for EntityCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage lifecycle state of one known entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Visible to lookups and counted by in-use queries.
    Active,
    /// Hidden from lookups; restorable until the store is compacted.
    SoftDeleted,
}

impl EntityState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::EntityCategory;

    #[test]
    fn category_labels_roundtrip() {
        for category in [
            EntityCategory::Project,
            EntityCategory::Design,
            EntityCategory::Style,
            EntityCategory::Model,
            EntityCategory::ModelObject,
            EntityCategory::DiagramModelObject,
            EntityCategory::Template,
            EntityCategory::ModelMapping,
            EntityCategory::Diagram,
            EntityCategory::Shape,
            EntityCategory::Connection,
        ] {
            assert_eq!(EntityCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(EntityCategory::parse("Shape"), None);
    }
}
