//! Shape domain model.
//!
//! # Responsibility
//! - Describe placed shapes, their control points and captions.
//! - Carry every outgoing reference (styles, template, model object) the
//!   reference index needs.
//!
//! # Invariants
//! - `owner` has exactly one active variant once inserted.
//! - Control point ids are unique within one shape.

use crate::error::{RepoError, RepoResult};
use crate::model::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of one control point within a shape.
pub type ControlPointId = u16;

/// Capability flags of a control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlPointCapability {
    /// Point can be dragged to resize the shape.
    Resize,
    /// Other shapes may glue onto this point.
    Connect,
    /// Point can be glued onto another shape's connection point.
    Glue,
    /// Point acts as rotation handle.
    Rotate,
    /// Reference point used for positioning.
    Reference,
}

impl ControlPointCapability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::Connect => "connect",
            Self::Glue => "glue",
            Self::Rotate => "rotate",
            Self::Reference => "reference",
        }
    }
}

/// One control point declared by a shape type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub id: ControlPointId,
    pub capabilities: BTreeSet<ControlPointCapability>,
}

impl ControlPoint {
    pub fn new(
        id: ControlPointId,
        capabilities: impl IntoIterator<Item = ControlPointCapability>,
    ) -> Self {
        Self {
            id,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn has_capability(&self, capability: ControlPointCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Owner of a shape. Exactly one variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ShapeOwner {
    Diagram(EntityId),
    Shape(EntityId),
    Template(EntityId),
}

impl ShapeOwner {
    pub fn id(self) -> EntityId {
        match self {
            Self::Diagram(id) | Self::Shape(id) | Self::Template(id) => id,
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            Self::Diagram(_) => "diagram",
            Self::Shape(_) => "shape",
            Self::Template(_) => "template",
        }
    }
}

/// Axis-aligned region used as a partial-loading hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && i64::from(x) < i64::from(self.x) + i64::from(self.width)
            && i64::from(y) < i64::from(self.y) + i64::from(self.height)
    }
}

/// Style references carried by a shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeStyles {
    pub line_style: Option<EntityId>,
    pub fill_style: Option<EntityId>,
    pub character_style: Option<EntityId>,
    pub paragraph_style: Option<EntityId>,
}

impl ShapeStyles {
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        [
            self.line_style,
            self.fill_style,
            self.character_style,
            self.paragraph_style,
        ]
        .into_iter()
        .flatten()
    }
}

/// Placed shape record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub id: Option<EntityId>,
    /// Registered shape type name.
    pub type_name: String,
    pub owner: Option<ShapeOwner>,
    /// Render order inside the diagram; higher is on top.
    pub z_order: i32,
    pub x: i32,
    pub y: i32,
    pub model_object: Option<EntityId>,
    pub template: Option<EntityId>,
    pub styles: ShapeStyles,
    pub control_points: Vec<ControlPoint>,
    pub captions: Vec<String>,
}

impl Shape {
    /// Creates an uninserted shape of the given type with no control points.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            owner: None,
            z_order: 0,
            x: 0,
            y: 0,
            model_object: None,
            template: None,
            styles: ShapeStyles::default(),
            control_points: Vec::new(),
            captions: Vec::new(),
        }
    }

    pub fn with_control_points(mut self, control_points: Vec<ControlPoint>) -> Self {
        self.control_points = control_points;
        self
    }

    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn control_point(&self, id: ControlPointId) -> Option<&ControlPoint> {
        self.control_points.iter().find(|point| point.id == id)
    }

    /// Returns the control point or an `Argument` error for unknown ids.
    pub fn require_control_point(&self, id: ControlPointId) -> RepoResult<&ControlPoint> {
        self.control_point(id).ok_or_else(|| {
            RepoError::Argument(format!(
                "control point {id} does not exist on shape type `{}`",
                self.type_name
            ))
        })
    }

    pub fn caption(&self, index: usize) -> RepoResult<&str> {
        self.captions
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.caption_out_of_range(index))
    }

    /// Replaces one caption text. The caption slot must already exist.
    pub fn set_caption(&mut self, index: usize, text: impl Into<String>) -> RepoResult<()> {
        let count = self.captions.len();
        match self.captions.get_mut(index) {
            Some(slot) => {
                *slot = text.into();
                Ok(())
            }
            None => Err(RepoError::Argument(format!(
                "caption index {index} out of range (count {count})"
            ))),
        }
    }

    pub fn diagram_id(&self) -> Option<EntityId> {
        match self.owner {
            Some(ShapeOwner::Diagram(id)) => Some(id),
            _ => None,
        }
    }

    fn caption_out_of_range(&self, index: usize) -> RepoError {
        RepoError::Argument(format!(
            "caption index {index} out of range (count {})",
            self.captions.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlPoint, ControlPointCapability, Rect, Shape};
    use crate::error::RepoError;

    fn box_shape() -> Shape {
        let mut shape = Shape::new("Box").with_control_points(vec![
            ControlPoint::new(1, [ControlPointCapability::Resize]),
            ControlPoint::new(
                9,
                [
                    ControlPointCapability::Connect,
                    ControlPointCapability::Reference,
                ],
            ),
        ]);
        shape.captions.push(String::new());
        shape
    }

    #[test]
    fn caption_index_is_checked() {
        let mut shape = box_shape();
        shape.set_caption(0, "Box1").expect("first caption exists");
        assert_eq!(shape.caption(0).expect("caption 0"), "Box1");

        let err = shape.set_caption(1, "missing").expect_err("index 1 is out of range");
        assert!(matches!(err, RepoError::Argument(_)));
        assert!(shape.caption(5).is_err());
    }

    #[test]
    fn control_point_capabilities_are_queryable() {
        let shape = box_shape();
        let point = shape.require_control_point(9).expect("point 9 exists");
        assert!(point.has_capability(ControlPointCapability::Connect));
        assert!(!point.has_capability(ControlPointCapability::Glue));
        assert!(shape.require_control_point(2).is_err());
    }

    #[test]
    fn rect_contains_is_half_open() {
        let rect = Rect::new(0, 0, 10, 10);
        assert!(rect.contains(0, 0));
        assert!(rect.contains(9, 9));
        assert!(!rect.contains(10, 5));
    }
}
