//! In-memory project graph of an open repository.
//!
//! # Responsibility
//! - Hold every known entity with its lifecycle state.
//! - Convert between storage records and typed entities.
//! - Keep the reference index and z-order watermarks in step with the maps.
//!
//! # Invariants
//! - Entities are never removed from the maps except by `purge_soft_deleted`.
//! - The reference index holds exactly the active referrers that are loaded,
//!   plus unloaded diagram shapes seeded from summaries.

use crate::config::RepositoryOptions;
use crate::error::{RepoError, RepoResult};
use crate::model::connection::{ConnectionKey, ShapeConnection};
use crate::model::design::Design;
use crate::model::diagram::Diagram;
use crate::model::model_object::{DiagramModelObject, Model, ModelObject};
use crate::model::project::ProjectSettings;
use crate::model::shape::{Shape, ShapeOwner};
use crate::model::style::Style;
use crate::model::template::{ModelMapping, Template};
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::change_tracker::{ChangeTracker, RecordKey};
use crate::repo::reference_index::{
    diagram_references, mapping_references, model_object_references, shape_references,
    style_references, ReferenceIndex, Referrer,
};
use crate::repo::zorder::ZOrderAllocator;
use crate::store::{EntityData, EntityRecord, ProjectSnapshot, ShapeSummary, StoreError};
use std::collections::{BTreeMap, BTreeSet};

/// Entity plus lifecycle state.
#[derive(Debug, Clone)]
pub(crate) struct Slot<T> {
    pub value: T,
    pub state: EntityState,
}

impl<T> Slot<T> {
    pub fn active(value: T) -> Self {
        Self {
            value,
            state: EntityState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Looks up an active entity by id.
pub(crate) fn live<T>(map: &BTreeMap<EntityId, Slot<T>>, id: EntityId) -> Option<&T> {
    map.get(&id)
        .filter(|slot| slot.is_active())
        .map(|slot| &slot.value)
}

/// Returns the slot of a soft-deleted entity or `NotFound`.
pub(crate) fn deleted_slot<'a, T>(
    map: &'a mut BTreeMap<EntityId, Slot<T>>,
    what: &'static str,
    id: EntityId,
) -> RepoResult<&'a mut Slot<T>> {
    match map.get_mut(&id) {
        Some(slot) if !slot.is_active() => Ok(slot),
        _ => Err(RepoError::not_found(what, format!("deleted {id}"))),
    }
}

/// Returns the slot of an active entity or `NotFound`.
pub(crate) fn live_slot<'a, T>(
    map: &'a mut BTreeMap<EntityId, Slot<T>>,
    what: &'static str,
    id: EntityId,
) -> RepoResult<&'a mut Slot<T>> {
    match map.get_mut(&id) {
        Some(slot) if slot.is_active() => Ok(slot),
        _ => Err(RepoError::not_found(what, id)),
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    pub settings: ProjectSettings,
    pub version: i32,
    pub designs: BTreeMap<EntityId, Slot<Design>>,
    pub styles: BTreeMap<EntityId, Slot<Style>>,
    /// Owning design per style.
    pub style_designs: BTreeMap<EntityId, EntityId>,
    pub model: Option<Slot<Model>>,
    pub model_objects: BTreeMap<EntityId, Slot<ModelObject>>,
    pub diagram_model_objects: BTreeMap<EntityId, Slot<DiagramModelObject>>,
    pub templates: BTreeMap<EntityId, Slot<Template>>,
    pub mappings: BTreeMap<EntityId, Slot<ModelMapping>>,
    pub diagrams: BTreeMap<EntityId, Slot<Diagram>>,
    pub shapes: BTreeMap<EntityId, Slot<Shape>>,
    pub connections: BTreeMap<ConnectionKey, Slot<ShapeConnection>>,
    /// Diagrams whose shapes are all materialized.
    pub loaded_diagrams: BTreeSet<EntityId>,
    /// Stored diagram per shape, from the open-time summaries.
    pub summary_diagrams: BTreeMap<EntityId, EntityId>,
    pub tracker: ChangeTracker,
    pub zorder: ZOrderAllocator,
    pub index: ReferenceIndex,
}

impl Session {
    pub fn new(settings: ProjectSettings, version: i32, options: &RepositoryOptions) -> Self {
        Self {
            settings,
            version,
            designs: BTreeMap::new(),
            styles: BTreeMap::new(),
            style_designs: BTreeMap::new(),
            model: None,
            model_objects: BTreeMap::new(),
            diagram_model_objects: BTreeMap::new(),
            templates: BTreeMap::new(),
            mappings: BTreeMap::new(),
            diagrams: BTreeMap::new(),
            shapes: BTreeMap::new(),
            connections: BTreeMap::new(),
            loaded_diagrams: BTreeSet::new(),
            summary_diagrams: BTreeMap::new(),
            tracker: ChangeTracker::new(),
            zorder: ZOrderAllocator::new(options.initial_z_order, options.z_order_step),
            index: ReferenceIndex::new(),
        }
    }

    /// Builds the graph from an opened store snapshot.
    pub fn from_snapshot(
        snapshot: ProjectSnapshot,
        options: &RepositoryOptions,
    ) -> RepoResult<Self> {
        let ProjectSnapshot {
            version,
            records,
            shape_summaries,
        } = snapshot;

        let settings = records
            .iter()
            .find_map(|record| match &record.data {
                EntityData::Project(settings) => Some(settings.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                RepoError::Storage(StoreError::InvalidData(
                    "project settings record missing".to_string(),
                ))
            })?;

        let mut session = Self::new(settings, version, options);
        for record in records {
            if record.category() != EntityCategory::Project {
                session.absorb(record)?;
            }
        }
        for summary in &shape_summaries {
            session.seed_summary(summary);
        }
        Ok(session)
    }

    /// Inserts a stored record unless an in-memory copy already exists.
    pub fn absorb(&mut self, record: EntityRecord) -> RepoResult<()> {
        let state = record.state;
        let key = record.key.clone();
        match record.data {
            EntityData::Project(settings) => self.settings = settings,
            EntityData::Design(design) => {
                let id = require_id(design.id, "design", &key)?;
                self.designs.entry(id).or_insert(Slot {
                    value: design,
                    state,
                });
            }
            EntityData::Style { design_id, style } => {
                let id = require_id(style.id, "style", &key)?;
                if !self.styles.contains_key(&id) {
                    self.style_designs.insert(id, design_id);
                    self.styles.insert(id, Slot { value: style, state });
                    self.reindex_style(id);
                }
            }
            EntityData::Model(model) => {
                if self.model.is_none() {
                    self.model = Some(Slot { value: model, state });
                }
            }
            EntityData::ModelObject(object) => {
                let id = require_id(object.id, "model object", &key)?;
                if !self.model_objects.contains_key(&id) {
                    self.model_objects.insert(id, Slot { value: object, state });
                    self.reindex_model_object(id);
                }
            }
            EntityData::DiagramModelObject(object) => {
                let id = require_id(object.id, "diagram model object", &key)?;
                self.diagram_model_objects.entry(id).or_insert(Slot {
                    value: object,
                    state,
                });
            }
            EntityData::Template(template) => {
                let id = require_id(template.id, "template", &key)?;
                self.templates.entry(id).or_insert(Slot {
                    value: template,
                    state,
                });
            }
            EntityData::ModelMapping(mapping) => {
                let id = require_id(mapping.id, "model mapping", &key)?;
                if !self.mappings.contains_key(&id) {
                    self.mappings.insert(id, Slot {
                        value: mapping,
                        state,
                    });
                    self.reindex_mapping(id);
                }
            }
            EntityData::Diagram(diagram) => {
                let id = require_id(diagram.id, "diagram", &key)?;
                if !self.diagrams.contains_key(&id) {
                    self.zorder.register_diagram(id);
                    self.diagrams.insert(id, Slot {
                        value: diagram,
                        state,
                    });
                    self.reindex_diagram(id);
                }
            }
            EntityData::Shape(shape) => {
                let id = require_id(shape.id, "shape", &key)?;
                if !self.shapes.contains_key(&id) {
                    self.shapes.insert(id, Slot { value: shape, state });
                    self.reindex_shape(id);
                }
            }
            EntityData::Connection(connection) => {
                self.connections
                    .entry(connection.key())
                    .or_insert(Slot {
                        value: connection,
                        state,
                    });
            }
        }
        Ok(())
    }

    /// Seeds index and z-order state for a shape that is not loaded.
    fn seed_summary(&mut self, summary: &ShapeSummary) {
        self.zorder.observe(summary.diagram_id, summary.z_order);
        self.summary_diagrams.insert(summary.id, summary.diagram_id);
        if summary.state.is_active() && !self.shapes.contains_key(&summary.id) {
            self.index
                .set_references(Referrer::Shape(summary.id), summary.references.clone());
        }
    }

    pub fn mark(&mut self, category: EntityCategory, id: EntityId) {
        self.tracker.mark(category, id.to_string());
    }

    pub fn touch(&mut self, category: EntityCategory, id: EntityId) {
        self.tracker.touch(category, id.to_string());
    }

    pub fn mark_connection(&mut self, key: ConnectionKey) {
        self.tracker
            .mark(EntityCategory::Connection, key.storage_key());
    }

    /// Storage record for a touched key, or `None` when unknown.
    pub fn record(&self, key: &RecordKey) -> Option<EntityRecord> {
        let (data, state, diagram_id) = match key.category {
            EntityCategory::Project => (
                EntityData::Project(self.settings.clone()),
                EntityState::Active,
                None,
            ),
            EntityCategory::Connection => {
                let slot = self
                    .connections
                    .values()
                    .find(|slot| slot.value.key().storage_key() == key.key)?;
                (
                    EntityData::Connection(slot.value),
                    slot.state,
                    self.shape_diagram(slot.value.connector_shape),
                )
            }
            category => {
                let id = EntityId::parse_str(&key.key).ok()?;
                self.entity_record_parts(category, id)?
            }
        };
        Some(EntityRecord {
            key: key.key.clone(),
            diagram_id,
            state,
            data,
        })
    }

    fn entity_record_parts(
        &self,
        category: EntityCategory,
        id: EntityId,
    ) -> Option<(EntityData, EntityState, Option<EntityId>)> {
        let parts = match category {
            EntityCategory::Design => {
                let slot = self.designs.get(&id)?;
                (EntityData::Design(slot.value.clone()), slot.state, None)
            }
            EntityCategory::Style => {
                let slot = self.styles.get(&id)?;
                let design_id = *self.style_designs.get(&id)?;
                (
                    EntityData::Style {
                        design_id,
                        style: slot.value.clone(),
                    },
                    slot.state,
                    None,
                )
            }
            EntityCategory::Model => {
                let slot = self.model.as_ref().filter(|slot| slot.value.id == Some(id))?;
                (EntityData::Model(slot.value.clone()), slot.state, None)
            }
            EntityCategory::ModelObject => {
                let slot = self.model_objects.get(&id)?;
                (EntityData::ModelObject(slot.value.clone()), slot.state, None)
            }
            EntityCategory::DiagramModelObject => {
                let slot = self.diagram_model_objects.get(&id)?;
                (
                    EntityData::DiagramModelObject(slot.value.clone()),
                    slot.state,
                    None,
                )
            }
            EntityCategory::Template => {
                let slot = self.templates.get(&id)?;
                (EntityData::Template(slot.value.clone()), slot.state, None)
            }
            EntityCategory::ModelMapping => {
                let slot = self.mappings.get(&id)?;
                (EntityData::ModelMapping(slot.value.clone()), slot.state, None)
            }
            EntityCategory::Diagram => {
                let slot = self.diagrams.get(&id)?;
                (EntityData::Diagram(slot.value.clone()), slot.state, None)
            }
            EntityCategory::Shape => {
                let slot = self.shapes.get(&id)?;
                (
                    EntityData::Shape(slot.value.clone()),
                    slot.state,
                    self.shape_diagram(id),
                )
            }
            EntityCategory::Project | EntityCategory::Connection => return None,
        };
        Some(parts)
    }

    /// Root diagram of a shape, following parent shapes.
    pub fn shape_diagram(&self, shape_id: EntityId) -> Option<EntityId> {
        let mut current = shape_id;
        for _ in 0..=self.shapes.len() {
            match self.shapes.get(&current)?.value.owner? {
                ShapeOwner::Diagram(diagram_id) => return Some(diagram_id),
                ShapeOwner::Template(_) => return None,
                ShapeOwner::Shape(parent) => current = parent,
            }
        }
        None
    }

    /// `true` when `ancestor` appears on the owner chain of `shape_id`.
    pub fn is_shape_ancestor(&self, ancestor: EntityId, shape_id: EntityId) -> bool {
        let mut current = shape_id;
        for _ in 0..=self.shapes.len() {
            if current == ancestor {
                return true;
            }
            match self.shapes.get(&current).and_then(|slot| slot.value.owner) {
                Some(ShapeOwner::Shape(parent)) => current = parent,
                _ => return false,
            }
        }
        false
    }

    /// Ids of every shape below `owner`, depth-first, any state.
    pub fn shape_subtree(&self, owner: ShapeOwner) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut pending = vec![owner];
        while let Some(current) = pending.pop() {
            for (id, slot) in &self.shapes {
                if slot.value.owner == Some(current) && !result.contains(id) {
                    result.push(*id);
                    pending.push(ShapeOwner::Shape(*id));
                }
            }
        }
        result
    }

    /// Keys of connections touching any shape of `shape_ids`.
    pub fn connections_touching(&self, shape_ids: &BTreeSet<EntityId>) -> Vec<ConnectionKey> {
        self.connections
            .iter()
            .filter(|(_, slot)| {
                shape_ids.contains(&slot.value.connector_shape)
                    || shape_ids.contains(&slot.value.target_shape)
            })
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn is_shape_live(&self, id: EntityId) -> bool {
        live(&self.shapes, id).is_some()
    }

    pub fn is_model_object_ancestor(&self, ancestor: EntityId, object_id: EntityId) -> bool {
        let mut current = object_id;
        for _ in 0..=self.model_objects.len() {
            if current == ancestor {
                return true;
            }
            match self
                .model_objects
                .get(&current)
                .and_then(|slot| slot.value.parent())
            {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    pub fn reindex_shape(&mut self, id: EntityId) {
        let Some(slot) = self.shapes.get(&id) else {
            return;
        };
        let referrer = Referrer::Shape(id);
        if slot.is_active() {
            let targets = shape_references(&slot.value);
            let diagram_id = self.shape_diagram(id);
            let z_order = slot.value.z_order;
            self.index.set_references(referrer, targets);
            if let Some(diagram_id) = diagram_id {
                self.zorder.observe(diagram_id, z_order);
            }
        } else {
            self.index.remove_referrer(referrer);
        }
    }

    pub fn reindex_style(&mut self, id: EntityId) {
        let referrer = Referrer::Style(id);
        match self.styles.get(&id) {
            Some(slot) if slot.is_active() => {
                let targets = style_references(&slot.value);
                self.index.set_references(referrer, targets);
            }
            _ => self.index.remove_referrer(referrer),
        }
    }

    pub fn reindex_model_object(&mut self, id: EntityId) {
        let referrer = Referrer::ModelObject(id);
        match self.model_objects.get(&id) {
            Some(slot) if slot.is_active() => {
                let targets = model_object_references(&slot.value);
                self.index.set_references(referrer, targets);
            }
            _ => self.index.remove_referrer(referrer),
        }
    }

    pub fn reindex_mapping(&mut self, id: EntityId) {
        let referrer = Referrer::ModelMapping(id);
        match self.mappings.get(&id) {
            Some(slot) if slot.is_active() => {
                let targets = mapping_references(&slot.value);
                self.index.set_references(referrer, targets);
            }
            _ => self.index.remove_referrer(referrer),
        }
    }

    pub fn reindex_diagram(&mut self, id: EntityId) {
        let referrer = Referrer::Diagram(id);
        match self.diagrams.get(&id) {
            Some(slot) if slot.is_active() => {
                let targets = diagram_references(&slot.value);
                self.index.set_references(referrer, targets);
            }
            _ => self.index.remove_referrer(referrer),
        }
    }

    /// Moves the listed shapes to `state` and returns the ones that changed.
    pub fn set_shapes_state(&mut self, ids: &[EntityId], state: EntityState) -> Vec<Shape> {
        let mut changed = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(slot) = self.shapes.get_mut(&id) else {
                continue;
            };
            if slot.state == state {
                continue;
            }
            slot.state = state;
            changed.push(slot.value.clone());
            self.reindex_shape(id);
            self.mark(EntityCategory::Shape, id);
        }
        changed
    }

    pub fn set_connections_state(
        &mut self,
        keys: &[ConnectionKey],
        state: EntityState,
    ) -> Vec<ShapeConnection> {
        let mut changed = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(slot) = self.connections.get_mut(key) else {
                continue;
            };
            if slot.state == state {
                continue;
            }
            slot.state = state;
            changed.push(slot.value);
            self.mark_connection(*key);
        }
        changed
    }

    /// Active connections touching any of `shape_ids`.
    pub fn live_connections_touching(&self, shape_ids: &BTreeSet<EntityId>) -> Vec<ConnectionKey> {
        self.connections_touching(shape_ids)
            .into_iter()
            .filter(|key| self.connections.get(key).is_some_and(Slot::is_active))
            .collect()
    }

    /// Soft-deleted connections touching `shape_ids` whose ends are both live.
    pub fn restorable_connections(&self, shape_ids: &BTreeSet<EntityId>) -> Vec<ConnectionKey> {
        self.connections_touching(shape_ids)
            .into_iter()
            .filter(|key| {
                self.connections.get(key).is_some_and(|slot| {
                    !slot.is_active()
                        && self.is_shape_live(slot.value.connector_shape)
                        && self.is_shape_live(slot.value.target_shape)
                })
            })
            .collect()
    }

    /// Root diagram shared by every shape of the batch, if there is one.
    pub fn common_diagram(&self, shapes: &[Shape]) -> Option<EntityId> {
        let mut diagrams = shapes
            .iter()
            .map(|shape| shape.id.and_then(|id| self.shape_diagram(id)));
        let first = diagrams.next()??;
        diagrams
            .all(|diagram| diagram == Some(first))
            .then_some(first)
    }

    /// Drops soft-deleted entities after the store compacted them.
    pub fn purge_soft_deleted(&mut self) -> usize {
        let before = self.entity_count();
        self.designs.retain(|_, slot| slot.is_active());
        self.styles.retain(|_, slot| slot.is_active());
        let styles = &self.styles;
        self.style_designs.retain(|id, _| styles.contains_key(id));
        if self.model.as_ref().is_some_and(|slot| !slot.is_active()) {
            self.model = None;
        }
        self.model_objects.retain(|_, slot| slot.is_active());
        self.diagram_model_objects.retain(|_, slot| slot.is_active());
        self.templates.retain(|_, slot| slot.is_active());
        self.mappings.retain(|_, slot| slot.is_active());
        self.diagrams.retain(|_, slot| slot.is_active());
        self.shapes.retain(|_, slot| slot.is_active());
        self.connections.retain(|_, slot| slot.is_active());
        let diagrams = &self.diagrams;
        self.loaded_diagrams.retain(|id| diagrams.contains_key(id));
        self.summary_diagrams
            .retain(|_, diagram_id| diagrams.contains_key(diagram_id));
        before - self.entity_count()
    }

    fn entity_count(&self) -> usize {
        self.designs.len()
            + self.styles.len()
            + usize::from(self.model.is_some())
            + self.model_objects.len()
            + self.diagram_model_objects.len()
            + self.templates.len()
            + self.mappings.len()
            + self.diagrams.len()
            + self.shapes.len()
            + self.connections.len()
    }
}

fn require_id(id: Option<EntityId>, what: &str, key: &str) -> RepoResult<EntityId> {
    id.ok_or_else(|| {
        RepoError::Storage(StoreError::InvalidData(format!(
            "stored {what} `{key}` has no id"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::config::RepositoryOptions;
    use crate::model::project::ProjectSettings;
    use crate::model::shape::{Shape, ShapeOwner};
    use crate::model::EntityState;
    use crate::repo::change_tracker::RecordKey;
    use crate::model::EntityCategory;
    use crate::store::{EntityData, EntityRecord};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn session() -> Session {
        Session::new(ProjectSettings::new("Demo", 1), 1, &RepositoryOptions::default())
    }

    fn insert_shape(session: &mut Session, owner: ShapeOwner) -> Uuid {
        let id = Uuid::new_v4();
        let mut shape = Shape::new("Box");
        shape.id = Some(id);
        shape.owner = Some(owner);
        session
            .absorb(EntityRecord {
                key: id.to_string(),
                diagram_id: None,
                state: EntityState::Active,
                data: EntityData::Shape(shape),
            })
            .expect("absorb shape");
        id
    }

    #[test]
    fn shape_diagram_follows_parent_chain() {
        let mut session = session();
        let diagram = Uuid::new_v4();
        let root = insert_shape(&mut session, ShapeOwner::Diagram(diagram));
        let child = insert_shape(&mut session, ShapeOwner::Shape(root));
        let grandchild = insert_shape(&mut session, ShapeOwner::Shape(child));

        assert_eq!(session.shape_diagram(grandchild), Some(diagram));
        assert!(session.is_shape_ancestor(root, grandchild));
        assert!(!session.is_shape_ancestor(grandchild, root));

        let subtree = session.shape_subtree(ShapeOwner::Diagram(diagram));
        assert_eq!(
            subtree.into_iter().collect::<BTreeSet<_>>(),
            BTreeSet::from([root, child, grandchild])
        );
    }

    #[test]
    fn record_carries_root_diagram() {
        let mut session = session();
        let diagram = Uuid::new_v4();
        let root = insert_shape(&mut session, ShapeOwner::Diagram(diagram));
        let child = insert_shape(&mut session, ShapeOwner::Shape(root));

        let record = session
            .record(&RecordKey::new(EntityCategory::Shape, child.to_string()))
            .expect("child record");
        assert_eq!(record.diagram_id, Some(diagram));
        assert!(session
            .record(&RecordKey::new(EntityCategory::Shape, Uuid::new_v4().to_string()))
            .is_none());
    }
}
