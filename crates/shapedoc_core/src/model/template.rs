//! Templates and their model mapping rules.
//!
//! # Invariants
//! - A template points at one prototype shape stored with
//!   `ShapeOwner::Template`.
//! - A model mapping belongs to exactly one template.

use crate::model::EntityId;
use serde::{Deserialize, Serialize};

/// Named pairing of a prototype shape and model mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: Option<EntityId>,
    pub name: String,
    pub title: String,
    pub description: String,
    /// Prototype shape id, assigned when the template is inserted.
    pub shape_id: Option<EntityId>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            title: name.clone(),
            name,
            description: String::new(),
            shape_id: None,
        }
    }
}

/// Value range mapped onto one style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRange {
    /// Lower bound (inclusive) of the model value.
    pub from: f64,
    pub style: EntityId,
}

/// How one model property drives one shape property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingKind {
    Numeric { intercept: f64, slope: f64 },
    Format { format: String },
    Style { ranges: Vec<StyleRange> },
}

/// Mapping rule owned by one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMapping {
    pub id: Option<EntityId>,
    /// Owning template, assigned on insert.
    pub template_id: Option<EntityId>,
    pub shape_property_id: u32,
    pub model_property_id: u32,
    pub kind: MappingKind,
}

impl ModelMapping {
    pub fn new(shape_property_id: u32, model_property_id: u32, kind: MappingKind) -> Self {
        Self {
            id: None,
            template_id: None,
            shape_property_id,
            model_property_id,
            kind,
        }
    }

    pub fn referenced_styles(&self) -> Vec<EntityId> {
        match &self.kind {
            MappingKind::Style { ranges } => ranges.iter().map(|range| range.style).collect(),
            MappingKind::Numeric { .. } | MappingKind::Format { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MappingKind, ModelMapping, StyleRange};
    use uuid::Uuid;

    #[test]
    fn style_mapping_lists_range_styles() {
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        let mapping = ModelMapping::new(
            1,
            2,
            MappingKind::Style {
                ranges: vec![
                    StyleRange {
                        from: 0.0,
                        style: low,
                    },
                    StyleRange {
                        from: 10.0,
                        style: high,
                    },
                ],
            },
        );
        assert_eq!(mapping.referenced_styles(), vec![low, high]);

        let numeric = ModelMapping::new(
            1,
            2,
            MappingKind::Numeric {
                intercept: 0.0,
                slope: 1.0,
            },
        );
        assert!(numeric.referenced_styles().is_empty());
    }
}
