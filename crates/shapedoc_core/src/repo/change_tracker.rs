//! Dirty-state tracking between saves.
//!
//! # Invariants
//! - `is_modified()` is false right after `reset`.
//! - Every key returned by `touched` was marked since the last `reset`.

use crate::model::EntityCategory;
use std::collections::BTreeSet;

/// Storage identity of one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub category: EntityCategory,
    pub key: String,
}

impl RecordKey {
    pub fn new(category: EntityCategory, key: impl Into<String>) -> Self {
        Self {
            category,
            key: key.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChangeTracker {
    modified: bool,
    touched: BTreeSet<RecordKey>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark(&mut self, category: EntityCategory, key: impl Into<String>) {
        self.modified = true;
        self.touched.insert(RecordKey::new(category, key));
    }

    /// Queues `key` for the next save without raising the dirty flag.
    pub fn touch(&mut self, category: EntityCategory, key: impl Into<String>) {
        self.touched.insert(RecordKey::new(category, key));
    }

    pub fn touched(&self) -> impl Iterator<Item = &RecordKey> {
        self.touched.iter()
    }

    pub fn touched_count(&self) -> usize {
        self.touched.len()
    }

    pub fn reset(&mut self) {
        self.modified = false;
        self.touched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ChangeTracker;
    use crate::model::EntityCategory;

    #[test]
    fn mark_and_reset() {
        let mut tracker = ChangeTracker::new();
        assert!(!tracker.is_modified());

        tracker.mark(EntityCategory::Design, "a");
        tracker.mark(EntityCategory::Design, "a");
        tracker.mark(EntityCategory::Style, "b");
        assert!(tracker.is_modified());
        assert_eq!(tracker.touched_count(), 2);

        tracker.reset();
        assert!(!tracker.is_modified());
        assert_eq!(tracker.touched().count(), 0);
    }

    #[test]
    fn touch_queues_key_without_dirtying() {
        let mut tracker = ChangeTracker::new();
        tracker.touch(EntityCategory::Project, "p");
        assert!(!tracker.is_modified());
        assert_eq!(tracker.touched_count(), 1);

        tracker.mark(EntityCategory::Design, "a");
        assert!(tracker.is_modified());
        assert_eq!(tracker.touched_count(), 2);
    }
}
