//! Per-diagram z-order allocation.
//!
//! # Invariants
//! - Watermarks only widen; deletes never lower the high mark or raise the
//!   low mark.
//! - A top value is strictly above, a bottom value strictly below, every
//!   value observed or issued for the diagram.

use crate::error::{RepoError, RepoResult};
use crate::model::EntityId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
struct Watermarks {
    low: Option<i32>,
    high: Option<i32>,
}

impl Watermarks {
    fn observe(&mut self, z_order: i32) {
        self.low = Some(self.low.map_or(z_order, |low| low.min(z_order)));
        self.high = Some(self.high.map_or(z_order, |high| high.max(z_order)));
    }
}

#[derive(Debug)]
pub struct ZOrderAllocator {
    initial: i32,
    step: i32,
    diagrams: BTreeMap<EntityId, Watermarks>,
}

impl ZOrderAllocator {
    /// `step` must be positive; callers validate options first.
    pub fn new(initial: i32, step: i32) -> Self {
        Self {
            initial,
            step: step.max(1),
            diagrams: BTreeMap::new(),
        }
    }

    /// Makes a diagram known with no observed values.
    pub fn register_diagram(&mut self, diagram_id: EntityId) {
        self.diagrams.entry(diagram_id).or_default();
    }

    pub fn is_registered(&self, diagram_id: EntityId) -> bool {
        self.diagrams.contains_key(&diagram_id)
    }

    /// Widens the diagram watermarks to cover `z_order`.
    pub fn observe(&mut self, diagram_id: EntityId, z_order: i32) {
        self.diagrams.entry(diagram_id).or_default().observe(z_order);
    }

    pub fn obtain_new_top(&mut self, diagram_id: EntityId) -> RepoResult<i32> {
        let step = self.step;
        let initial = self.initial;
        let marks = self.marks_mut(diagram_id)?;
        let value = marks
            .high
            .unwrap_or(initial)
            .checked_add(step)
            .ok_or_else(|| exhausted(diagram_id, "top"))?;
        marks.observe(value);
        Ok(value)
    }

    pub fn obtain_new_bottom(&mut self, diagram_id: EntityId) -> RepoResult<i32> {
        let step = self.step;
        let initial = self.initial;
        let marks = self.marks_mut(diagram_id)?;
        let value = marks
            .low
            .unwrap_or(initial)
            .checked_sub(step)
            .ok_or_else(|| exhausted(diagram_id, "bottom"))?;
        marks.observe(value);
        Ok(value)
    }

    pub fn clear(&mut self) {
        self.diagrams.clear();
    }

    fn marks_mut(&mut self, diagram_id: EntityId) -> RepoResult<&mut Watermarks> {
        self.diagrams
            .get_mut(&diagram_id)
            .ok_or_else(|| RepoError::not_found("diagram", diagram_id))
    }
}

fn exhausted(diagram_id: EntityId, end: &str) -> RepoError {
    RepoError::Argument(format!(
        "z-order range exhausted at the {end} of diagram {diagram_id}"
    ))
}

#[cfg(test)]
mod tests {
    use super::ZOrderAllocator;
    use crate::error::RepoError;
    use uuid::Uuid;

    #[test]
    fn empty_diagram_starts_one_step_from_initial() {
        let diagram = Uuid::new_v4();
        let mut allocator = ZOrderAllocator::new(100, 10);
        allocator.register_diagram(diagram);
        assert_eq!(allocator.obtain_new_bottom(diagram).expect("bottom"), 90);

        let other = Uuid::new_v4();
        allocator.register_diagram(other);
        assert_eq!(allocator.obtain_new_top(other).expect("top"), 110);
    }

    #[test]
    fn sequences_are_strictly_monotonic() {
        let diagram = Uuid::new_v4();
        let mut allocator = ZOrderAllocator::new(0, 1);
        allocator.register_diagram(diagram);
        allocator.observe(diagram, 5);
        allocator.observe(diagram, -3);

        let tops: Vec<i32> = (0..3)
            .map(|_| allocator.obtain_new_top(diagram).expect("top"))
            .collect();
        let bottoms: Vec<i32> = (0..3)
            .map(|_| allocator.obtain_new_bottom(diagram).expect("bottom"))
            .collect();
        assert_eq!(tops, vec![6, 7, 8]);
        assert_eq!(bottoms, vec![-4, -5, -6]);
    }

    #[test]
    fn overflow_and_unknown_diagram_fail() {
        let diagram = Uuid::new_v4();
        let mut allocator = ZOrderAllocator::new(0, 1);
        allocator.observe(diagram, i32::MAX);
        let err = allocator.obtain_new_top(diagram).expect_err("overflow");
        assert!(matches!(err, RepoError::Argument(_)));

        let err = allocator
            .obtain_new_top(Uuid::new_v4())
            .expect_err("unknown diagram");
        assert!(matches!(err, RepoError::NotFound { .. }));
    }
}
