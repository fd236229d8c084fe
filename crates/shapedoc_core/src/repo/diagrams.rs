//! Diagram operations and region-based shape retrieval.
//!
//! # Invariants
//! - A newly inserted diagram is complete in memory and never hits the
//!   store for its shapes.
//! - `delete_all_diagram` and `undelete_all_diagram` load the whole diagram
//!   before touching its subtree.

use crate::error::{RepoError, RepoResult};
use crate::model::connection::ShapeConnection;
use crate::model::diagram::Diagram;
use crate::model::shape::{ControlPointId, Rect, Shape, ShapeOwner};
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::events::{ChangeKind, RepositoryEvent};
use crate::repo::repository::{ensure_uninserted, ProjectRepository};
use crate::repo::session::{deleted_slot, live, live_slot, Session, Slot};
use crate::store::Store;
use log::debug;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Connection to create by [`ProjectRepository::insert_all_diagram`],
/// addressed by position in the shape slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConnection {
    pub connector_index: usize,
    pub glue_point_id: ControlPointId,
    pub target_index: usize,
    pub target_point_id: ControlPointId,
}

impl<S: Store> ProjectRepository<S> {
    pub fn get_diagram(&self, id: EntityId) -> Option<Diagram> {
        live(&self.session.as_ref()?.diagrams, id).cloned()
    }

    pub fn get_diagram_including_deleted(&self, id: EntityId) -> Option<Diagram> {
        let session = self.session.as_ref()?;
        session.diagrams.get(&id).map(|slot| slot.value.clone())
    }

    pub fn get_diagrams(&self) -> Vec<Diagram> {
        self.session.as_ref().map_or_else(Vec::new, |session| {
            session
                .diagrams
                .values()
                .filter(|slot| slot.is_active())
                .map(|slot| slot.value.clone())
                .collect()
        })
    }

    /// First active diagram whose name matches exactly.
    pub fn get_diagram_by_name(&self, name: &str) -> Option<Diagram> {
        let session = self.session.as_ref()?;
        session
            .diagrams
            .values()
            .find(|slot| slot.is_active() && slot.value.name == name)
            .map(|slot| slot.value.clone())
    }

    /// Top-level shapes of a diagram, lowest z-order first.
    ///
    /// `regions` is passed to the store as a loading hint. When non-empty,
    /// only shapes whose position lies in a region are returned.
    pub fn get_diagram_shapes(
        &mut self,
        diagram_id: EntityId,
        regions: &[Rect],
    ) -> RepoResult<Vec<Shape>> {
        if live(&self.session()?.diagrams, diagram_id).is_none() {
            return Err(RepoError::not_found("diagram", diagram_id));
        }
        self.load_diagram(diagram_id, regions)?;
        let session = self.session()?;
        let owner = Some(ShapeOwner::Diagram(diagram_id));
        let mut shapes: Vec<Shape> = session
            .shapes
            .values()
            .filter(|slot| slot.is_active() && slot.value.owner == owner)
            .filter(|slot| {
                regions.is_empty()
                    || regions
                        .iter()
                        .any(|region| region.contains(slot.value.x, slot.value.y))
            })
            .map(|slot| slot.value.clone())
            .collect();
        shapes.sort_by_key(|shape| shape.z_order);
        Ok(shapes)
    }

    pub fn insert_diagram(&mut self, diagram: &mut Diagram) -> RepoResult<EntityId> {
        let id = self.apply_insert_diagram(diagram)?;
        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Inserted,
            diagrams: vec![diagram.clone()],
        });
        Ok(id)
    }

    /// Inserts a diagram, its top-level shapes and the connections between
    /// them. Stops at the first failure; the prefix stays inserted.
    pub fn insert_all_diagram(
        &mut self,
        diagram: &mut Diagram,
        shapes: &mut [Shape],
        connections: &[PendingConnection],
    ) -> RepoResult<EntityId> {
        for pending in connections {
            let highest = pending.connector_index.max(pending.target_index);
            if highest >= shapes.len() {
                return Err(RepoError::Argument(format!(
                    "connection references shape index {highest} of {}",
                    shapes.len()
                )));
            }
        }

        let diagram_id = self.apply_insert_diagram(diagram)?;
        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Inserted,
            diagrams: vec![diagram.clone()],
        });
        self.insert_shapes(shapes, ShapeOwner::Diagram(diagram_id))?;

        let mut inserted = Vec::with_capacity(connections.len());
        let mut result = Ok(diagram_id);
        for pending in connections {
            match self.apply_pending_connection(shapes, pending) {
                Ok(connection) => inserted.push(connection),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Inserted,
            connections: inserted,
        });
        result
    }

    pub fn update_diagram(&mut self, diagram: &Diagram) -> RepoResult<()> {
        let id = diagram
            .id
            .ok_or_else(|| RepoError::not_found("diagram", "uninserted"))?;
        let session = self.session_mut()?;
        check_diagram_references(session, diagram)?;
        live_slot(&mut session.diagrams, "diagram", id)?.value = diagram.clone();
        session.reindex_diagram(id);
        session.mark(EntityCategory::Diagram, id);
        debug!("event=diagram_update module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Updated,
            diagrams: vec![diagram.clone()],
        });
        Ok(())
    }

    /// Soft-deletes the diagram only; its shapes keep their state.
    pub fn delete_diagram(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.diagrams, "diagram", id)?;
        slot.state = EntityState::SoftDeleted;
        let diagram = slot.value.clone();
        session.reindex_diagram(id);
        session.mark(EntityCategory::Diagram, id);
        debug!("event=diagram_delete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Deleted,
            diagrams: vec![diagram],
        });
        Ok(())
    }

    /// Soft-deletes the diagram, every shape below it and their connections.
    pub fn delete_all_diagram(&mut self, id: EntityId) -> RepoResult<()> {
        if live(&self.session()?.diagrams, id).is_none() {
            return Err(RepoError::not_found("diagram", id));
        }
        self.load_diagram(id, &[])?;
        let session = self.session_mut()?;

        let shape_ids = session.shape_subtree(ShapeOwner::Diagram(id));
        let subtree: BTreeSet<EntityId> = shape_ids.iter().copied().collect();
        let keys = session.live_connections_touching(&subtree);
        let connections = session.set_connections_state(&keys, EntityState::SoftDeleted);
        let shapes = session.set_shapes_state(&shape_ids, EntityState::SoftDeleted);

        let slot = live_slot(&mut session.diagrams, "diagram", id)?;
        slot.state = EntityState::SoftDeleted;
        let diagram = slot.value.clone();
        session.reindex_diagram(id);
        session.mark(EntityCategory::Diagram, id);
        debug!(
            "event=diagram_delete_all module=repo status=ok id={id} shapes={} connections={}",
            shapes.len(),
            connections.len()
        );

        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Deleted,
            connections,
        });
        self.events.publish(RepositoryEvent::Shapes {
            kind: ChangeKind::Deleted,
            diagram_id: Some(id),
            shapes,
        });
        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Deleted,
            diagrams: vec![diagram],
        });
        Ok(())
    }

    pub fn undelete_diagram(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.diagrams, "diagram", id)?;
        slot.state = EntityState::Active;
        let diagram = slot.value.clone();
        session.reindex_diagram(id);
        session.mark(EntityCategory::Diagram, id);
        debug!("event=diagram_undelete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Inserted,
            diagrams: vec![diagram],
        });
        Ok(())
    }

    /// Restores the diagram, every soft-deleted shape below it and the
    /// connections whose ends are both live again.
    pub fn undelete_all_diagram(&mut self, id: EntityId) -> RepoResult<()> {
        {
            let session = self.session_mut()?;
            deleted_slot(&mut session.diagrams, "diagram", id)?;
        }
        self.load_diagram(id, &[])?;
        let session = self.session_mut()?;

        let slot = deleted_slot(&mut session.diagrams, "diagram", id)?;
        slot.state = EntityState::Active;
        let diagram = slot.value.clone();
        session.reindex_diagram(id);
        session.mark(EntityCategory::Diagram, id);

        let shape_ids = session.shape_subtree(ShapeOwner::Diagram(id));
        let shapes = session.set_shapes_state(&shape_ids, EntityState::Active);
        let subtree: BTreeSet<EntityId> = shape_ids.into_iter().collect();
        let keys = session.restorable_connections(&subtree);
        let connections = session.set_connections_state(&keys, EntityState::Active);
        debug!(
            "event=diagram_undelete_all module=repo status=ok id={id} shapes={} connections={}",
            shapes.len(),
            connections.len()
        );

        self.events.publish(RepositoryEvent::Diagram {
            kind: ChangeKind::Inserted,
            diagrams: vec![diagram],
        });
        self.events.publish(RepositoryEvent::Shapes {
            kind: ChangeKind::Inserted,
            diagram_id: Some(id),
            shapes,
        });
        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Inserted,
            connections,
        });
        Ok(())
    }

    fn apply_insert_diagram(&mut self, diagram: &mut Diagram) -> RepoResult<EntityId> {
        ensure_uninserted(diagram.id, "diagram")?;
        let session = self.session_mut()?;
        check_diagram_references(session, diagram)?;

        let id = Uuid::new_v4();
        diagram.id = Some(id);
        session.diagrams.insert(id, Slot::active(diagram.clone()));
        session.zorder.register_diagram(id);
        session.loaded_diagrams.insert(id);
        session.reindex_diagram(id);
        session.mark(EntityCategory::Diagram, id);
        debug!("event=diagram_insert module=repo status=ok id={id}");
        Ok(id)
    }

    fn apply_pending_connection(
        &mut self,
        shapes: &[Shape],
        pending: &PendingConnection,
    ) -> RepoResult<ShapeConnection> {
        let shape_at = |index: usize| {
            shapes.get(index).ok_or_else(|| {
                RepoError::Argument(format!("shape index {index} out of range"))
            })
        };
        let connector = shape_at(pending.connector_index)?;
        let target = shape_at(pending.target_index)?;
        let connection = ShapeConnection::new(
            connector,
            pending.glue_point_id,
            target,
            pending.target_point_id,
        )?;
        let session = self.session_mut()?;
        let key = connection.key();
        if session.connections.get(&key).is_some_and(Slot::is_active) {
            return Err(RepoError::Argument(format!(
                "glue point {} of shape {} is already connected",
                key.glue_point_id, key.connector_shape
            )));
        }
        session.connections.insert(key, Slot::active(connection));
        session.mark_connection(key);
        Ok(connection)
    }
}

fn check_diagram_references(session: &Session, diagram: &Diagram) -> RepoResult<()> {
    if let Some(style) = diagram.background_style {
        if live(&session.styles, style).is_none() {
            return Err(RepoError::not_found("style", style));
        }
    }
    if let Some(object) = diagram.model_object {
        if live(&session.diagram_model_objects, object).is_none() {
            return Err(RepoError::not_found("diagram model object", object));
        }
    }
    Ok(())
}
