//! Reference index behind the `is_*_in_use` queries.
//!
//! # Responsibility
//! - Track which live referrers point at which targets.
//! - Answer in-use questions for entities whose referrers are not loaded.
//!
//! # Invariants
//! - Only active referrers are present; soft-deleted ones are removed.
//! - Forward and reverse maps always describe the same edge set.
//! - Type-name targets are stored lowercase.

use crate::model::diagram::Diagram;
use crate::model::model_object::ModelObject;
use crate::model::shape::Shape;
use crate::model::style::Style;
use crate::model::template::ModelMapping;
use crate::model::EntityId;
use crate::registry::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Something that can be "in use".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ReferenceTarget {
    Style(EntityId),
    /// Lowercase shape type name.
    ShapeType(String),
    /// Lowercase model object type name.
    ModelObjectType(String),
    Template(EntityId),
    ModelObject(EntityId),
    DiagramModelObject(EntityId),
}

impl ReferenceTarget {
    pub fn shape_type(name: &str) -> Self {
        Self::ShapeType(normalize_name(name))
    }

    pub fn model_object_type(name: &str) -> Self {
        Self::ModelObjectType(normalize_name(name))
    }
}

/// Live entity holding references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Referrer {
    Shape(EntityId),
    Style(EntityId),
    ModelObject(EntityId),
    ModelMapping(EntityId),
    Diagram(EntityId),
}

/// Outgoing references of a shape.
pub fn shape_references(shape: &Shape) -> Vec<ReferenceTarget> {
    let mut targets = vec![ReferenceTarget::shape_type(&shape.type_name)];
    targets.extend(shape.styles.iter().map(ReferenceTarget::Style));
    targets.extend(shape.template.map(ReferenceTarget::Template));
    targets.extend(shape.model_object.map(ReferenceTarget::ModelObject));
    targets
}

pub fn style_references(style: &Style) -> Vec<ReferenceTarget> {
    style
        .referenced_styles()
        .into_iter()
        .map(ReferenceTarget::Style)
        .collect()
}

pub fn model_object_references(object: &ModelObject) -> Vec<ReferenceTarget> {
    let mut targets = vec![ReferenceTarget::model_object_type(&object.type_name)];
    targets.extend(object.parent().map(ReferenceTarget::ModelObject));
    targets
}

pub fn mapping_references(mapping: &ModelMapping) -> Vec<ReferenceTarget> {
    mapping
        .referenced_styles()
        .into_iter()
        .map(ReferenceTarget::Style)
        .collect()
}

pub fn diagram_references(diagram: &Diagram) -> Vec<ReferenceTarget> {
    let mut targets = Vec::new();
    targets.extend(diagram.model_object.map(ReferenceTarget::DiagramModelObject));
    targets.extend(diagram.background_style.map(ReferenceTarget::Style));
    targets
}

/// Bidirectional referrer/target map.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    forward: BTreeMap<Referrer, BTreeSet<ReferenceTarget>>,
    reverse: BTreeMap<ReferenceTarget, BTreeSet<Referrer>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every outgoing edge of `referrer`.
    pub fn set_references(
        &mut self,
        referrer: Referrer,
        targets: impl IntoIterator<Item = ReferenceTarget>,
    ) {
        self.remove_referrer(referrer);
        let targets: BTreeSet<ReferenceTarget> = targets.into_iter().collect();
        for target in &targets {
            self.reverse
                .entry(target.clone())
                .or_default()
                .insert(referrer);
        }
        self.forward.insert(referrer, targets);
    }

    /// Drops `referrer` and all its outgoing edges.
    pub fn remove_referrer(&mut self, referrer: Referrer) {
        let Some(targets) = self.forward.remove(&referrer) else {
            return;
        };
        for target in targets {
            if let Some(referrers) = self.reverse.get_mut(&target) {
                referrers.remove(&referrer);
                if referrers.is_empty() {
                    self.reverse.remove(&target);
                }
            }
        }
    }

    pub fn contains_referrer(&self, referrer: Referrer) -> bool {
        self.forward.contains_key(&referrer)
    }

    pub fn is_referenced(&self, target: &ReferenceTarget) -> bool {
        self.reverse.contains_key(target)
    }

    /// OR over `targets`.
    pub fn is_any_referenced<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a ReferenceTarget>,
    ) -> bool {
        targets.into_iter().any(|target| self.is_referenced(target))
    }

    pub fn referrers_of(&self, target: &ReferenceTarget) -> Vec<Referrer> {
        self.reverse
            .get(target)
            .map(|referrers| referrers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    pub fn referrer_count(&self) -> usize {
        self.forward.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{shape_references, ReferenceIndex, ReferenceTarget, Referrer};
    use crate::model::shape::Shape;
    use uuid::Uuid;

    #[test]
    fn set_references_replaces_previous_edges() {
        let mut index = ReferenceIndex::new();
        let shape = Referrer::Shape(Uuid::new_v4());
        let red = ReferenceTarget::Style(Uuid::new_v4());
        let blue = ReferenceTarget::Style(Uuid::new_v4());

        index.set_references(shape, [red.clone()]);
        assert!(index.is_referenced(&red));

        index.set_references(shape, [blue.clone()]);
        assert!(!index.is_referenced(&red));
        assert!(index.is_referenced(&blue));
    }

    #[test]
    fn shared_target_stays_referenced_until_last_referrer_leaves() {
        let mut index = ReferenceIndex::new();
        let first = Referrer::Shape(Uuid::new_v4());
        let second = Referrer::Style(Uuid::new_v4());
        let target = ReferenceTarget::Style(Uuid::new_v4());

        index.set_references(first, [target.clone()]);
        index.set_references(second, [target.clone()]);
        index.remove_referrer(first);
        assert!(index.is_referenced(&target));
        index.remove_referrer(second);
        assert!(!index.is_referenced(&target));
        assert_eq!(index.referrer_count(), 0);
    }

    #[test]
    fn batch_query_uses_or_semantics() {
        let mut index = ReferenceIndex::new();
        let used = ReferenceTarget::Template(Uuid::new_v4());
        let unused = ReferenceTarget::Template(Uuid::new_v4());
        index.set_references(Referrer::Shape(Uuid::new_v4()), [used.clone()]);
        assert!(index.is_any_referenced([&unused, &used]));
        assert!(!index.is_any_referenced([&unused]));
    }

    #[test]
    fn shape_type_targets_ignore_case() {
        let shape = Shape::new("RoundedBox");
        let targets = shape_references(&shape);
        assert!(targets.contains(&ReferenceTarget::shape_type("roundedbox")));
        assert!(targets.contains(&ReferenceTarget::shape_type("ROUNDEDBOX")));
    }
}
