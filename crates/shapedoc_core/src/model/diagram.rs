//! Diagram canvas record.
//!
//! Shapes are stored separately and point back through `ShapeOwner::Diagram`.

use crate::model::style::Rgba;
use crate::model::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    pub id: Option<EntityId>,
    pub name: String,
    pub title: String,
    pub width: i32,
    pub height: i32,
    pub background_color: Rgba,
    /// Optional background fill style.
    pub background_style: Option<EntityId>,
    /// Optional bound diagram model object.
    pub model_object: Option<EntityId>,
}

impl Diagram {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            title: name.clone(),
            name,
            width: 1000,
            height: 1000,
            background_color: Rgba::rgb(255, 255, 255),
            background_style: None,
            model_object: None,
        }
    }
}
