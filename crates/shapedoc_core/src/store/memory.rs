//! In-process store used by tests and ephemeral projects.
//!
//! # Invariants
//! - Records survive `close` and are dropped only by `erase` or `compact`.
//! - `save_changes` applies the whole batch or nothing.

use super::{
    is_lazy_record, select_regions, EntityRecord, ProjectSnapshot, ShapeBatch, Store,
    StoreError, StoreResult, CURRENT_FORMAT_VERSION,
};
use crate::model::shape::Rect;
use crate::model::{EntityCategory, EntityId};
use std::collections::BTreeMap;

const LOCATION: &str = "memory";

#[derive(Debug, Clone)]
struct StoredProject {
    version: i32,
    records: BTreeMap<String, EntityRecord>,
}

/// Volatile `Store` implementation backed by an ordered map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    project: Option<StoredProject>,
    connected: bool,
    version_modifiable: bool,
    save_count: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            project: None,
            connected: false,
            version_modifiable: true,
            save_count: 0,
        }
    }

    /// Store that rejects format-version changes.
    pub fn version_locked() -> Self {
        Self {
            version_modifiable: false,
            ..Self::new()
        }
    }

    /// Number of successful `save_changes` calls.
    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub fn record(&self, key: &str) -> Option<&EntityRecord> {
        self.project.as_ref()?.records.get(key)
    }

    pub fn record_count(&self) -> usize {
        self.project
            .as_ref()
            .map_or(0, |project| project.records.len())
    }

    fn connected_project(&mut self) -> StoreResult<&mut StoredProject> {
        if !self.connected {
            return Err(StoreError::NotConnected);
        }
        self.project
            .as_mut()
            .ok_or_else(|| StoreError::ProjectNotFound(LOCATION.to_string()))
    }
}

impl Store for MemoryStore {
    fn location(&self) -> String {
        LOCATION.to_string()
    }

    fn exists(&self) -> StoreResult<bool> {
        Ok(self.project.is_some())
    }

    fn create(&mut self) -> StoreResult<()> {
        if self.project.is_some() {
            return Err(StoreError::ProjectExists(LOCATION.to_string()));
        }
        self.project = Some(StoredProject {
            version: CURRENT_FORMAT_VERSION,
            records: BTreeMap::new(),
        });
        self.connected = true;
        Ok(())
    }

    fn open(&mut self) -> StoreResult<ProjectSnapshot> {
        let project = self
            .project
            .as_ref()
            .ok_or_else(|| StoreError::ProjectNotFound(LOCATION.to_string()))?;

        let mut snapshot = ProjectSnapshot {
            version: project.version,
            ..ProjectSnapshot::default()
        };
        for record in project.records.values() {
            if is_lazy_record(record) {
                snapshot.shape_summaries.extend(record.shape_summary());
            } else {
                snapshot.records.push(record.clone());
            }
        }
        self.connected = true;
        Ok(snapshot)
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn erase(&mut self) -> StoreResult<()> {
        if self.project.take().is_none() {
            return Err(StoreError::ProjectNotFound(LOCATION.to_string()));
        }
        self.connected = false;
        Ok(())
    }

    fn read_version(&self) -> StoreResult<i32> {
        self.project
            .as_ref()
            .map(|project| project.version)
            .ok_or_else(|| StoreError::ProjectNotFound(LOCATION.to_string()))
    }

    fn can_modify_version(&self) -> bool {
        self.version_modifiable
    }

    fn load_diagram_shapes(
        &mut self,
        diagram_id: EntityId,
        regions: &[Rect],
    ) -> StoreResult<ShapeBatch> {
        let project = self.connected_project()?;
        let records = project
            .records
            .values()
            .filter(|record| is_lazy_record(record) && record.diagram_id == Some(diagram_id))
            .cloned()
            .collect();
        Ok(select_regions(records, regions))
    }

    fn save_changes(&mut self, version: i32, records: &[EntityRecord]) -> StoreResult<()> {
        let project = self.connected_project()?;
        if let Some(record) = records.iter().find(|record| record.key.is_empty()) {
            return Err(StoreError::InvalidData(format!(
                "{} record without key",
                record.category()
            )));
        }
        project.version = version;
        for record in records {
            project.records.insert(record.key.clone(), record.clone());
        }
        self.save_count += 1;
        Ok(())
    }

    fn compact(&mut self) -> StoreResult<usize> {
        let project = self.connected_project()?;
        let before = project.records.len();
        project.records.retain(|_, record| {
            record.state.is_active() || record.category() == EntityCategory::Project
        });
        Ok(before - project.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::design::Design;
    use crate::model::EntityState;
    use crate::store::{EntityData, EntityRecord, Store, StoreError};
    use uuid::Uuid;

    fn design_record(state: EntityState) -> EntityRecord {
        let id = Uuid::new_v4();
        let mut design = Design::new("Default");
        design.id = Some(id);
        EntityRecord {
            key: id.to_string(),
            diagram_id: None,
            state,
            data: EntityData::Design(design),
        }
    }

    #[test]
    fn open_requires_existing_project() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.open(), Err(StoreError::ProjectNotFound(_))));
        store.create().expect("create");
        assert!(matches!(store.create(), Err(StoreError::ProjectExists(_))));
    }

    #[test]
    fn save_requires_connection() {
        let mut store = MemoryStore::new();
        store.create().expect("create");
        store.close();
        let err = store
            .save_changes(1, &[design_record(EntityState::Active)])
            .expect_err("closed store");
        assert!(matches!(err, StoreError::NotConnected));
    }

    #[test]
    fn compact_purges_soft_deleted_records() {
        let mut store = MemoryStore::new();
        store.create().expect("create");
        store
            .save_changes(
                1,
                &[
                    design_record(EntityState::Active),
                    design_record(EntityState::SoftDeleted),
                ],
            )
            .expect("save");
        assert_eq!(store.compact().expect("compact"), 1);
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.open().expect("reopen").records.len(), 1);
    }
}
