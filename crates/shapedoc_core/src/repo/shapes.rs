//! Shape, connection and z-order operations.
//!
//! # Invariants
//! - Shapes are reachable through `get_shape` only once loaded.
//! - A shape owner is a live diagram or a live shape; template ownership is
//!   managed by the template operations.
//! - A glue point holds at most one active connection.
//! - `delete_shapes` removes the listed shapes only; `delete_all_shapes`
//!   also removes their children and every connection touching them.

use crate::error::{RepoError, RepoResult};
use crate::model::connection::ShapeConnection;
use crate::model::shape::{ControlPointId, Shape, ShapeOwner};
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::events::{ChangeKind, RepositoryEvent};
use crate::repo::reference_index::ReferenceTarget;
use crate::repo::repository::{ensure_uninserted, ProjectRepository};
use crate::repo::session::{live, live_slot, Session, Slot};
use crate::store::Store;
use log::debug;
use std::collections::BTreeSet;
use uuid::Uuid;

impl<S: Store> ProjectRepository<S> {
    /// Loaded, active shape by id.
    pub fn get_shape(&self, id: EntityId) -> Option<Shape> {
        live(&self.session.as_ref()?.shapes, id).cloned()
    }

    pub fn get_shape_including_deleted(&self, id: EntityId) -> Option<Shape> {
        let session = self.session.as_ref()?;
        session.shapes.get(&id).map(|slot| slot.value.clone())
    }

    /// Active direct children of a loaded shape, lowest z-order first.
    pub fn get_child_shapes(&self, parent: EntityId) -> Vec<Shape> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let mut children: Vec<Shape> = session
            .shapes
            .values()
            .filter(|slot| slot.is_active() && slot.value.owner == Some(ShapeOwner::Shape(parent)))
            .map(|slot| slot.value.clone())
            .collect();
        children.sort_by_key(|shape| shape.z_order);
        children
    }

    /// Inserts a shape below a diagram or a parent shape.
    ///
    /// # Errors
    /// - `AlreadyInserted` when the shape has an id.
    /// - `InvalidOwner` for a template owner.
    /// - `NotFound` for an unregistered type, an unknown owner or an
    ///   unknown referenced style, template or model object.
    pub fn insert_shape(&mut self, shape: &mut Shape, owner: ShapeOwner) -> RepoResult<EntityId> {
        let id = self.apply_insert_shape(shape, owner)?;
        let diagram_id = self.session()?.shape_diagram(id);
        self.events.publish(RepositoryEvent::Shapes {
            kind: ChangeKind::Inserted,
            diagram_id,
            shapes: vec![shape.clone()],
        });
        Ok(id)
    }

    /// Inserts shapes below one owner, in order.
    pub fn insert_shapes(&mut self, shapes: &mut [Shape], owner: ShapeOwner) -> RepoResult<()> {
        let mut inserted = Vec::with_capacity(shapes.len());
        let mut result = Ok(());
        for shape in shapes.iter_mut() {
            match self.apply_insert_shape(shape, owner) {
                Ok(_) => inserted.push(shape.clone()),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.publish_shapes(ChangeKind::Inserted, inserted);
        result
    }

    /// Replaces a loaded shape's content. The owner must be unchanged.
    pub fn update_shape(&mut self, shape: &Shape) -> RepoResult<()> {
        let id = shape
            .id
            .ok_or_else(|| RepoError::not_found("shape", "uninserted"))?;
        self.registry.require(&shape.type_name, EntityCategory::Shape)?;
        let session = self.session_mut()?;
        check_shape_references(session, shape)?;
        let slot = live_slot(&mut session.shapes, "shape", id)?;
        if slot.value.owner != shape.owner {
            return Err(RepoError::Argument(
                "shape owner changes through update_shape_owner".to_string(),
            ));
        }
        slot.value = shape.clone();
        session.reindex_shape(id);
        session.mark(EntityCategory::Shape, id);
        debug!("event=shape_update module=repo status=ok id={id}");
        self.publish_shapes(ChangeKind::Updated, vec![shape.clone()]);
        Ok(())
    }

    /// Re-parents a loaded shape under a diagram or another shape.
    ///
    /// Descendants and touching connections are re-marked so their stored
    /// diagram follows the move.
    ///
    /// # Errors
    /// - `InvalidOwner` for a template owner.
    /// - `Argument` for a template prototype, a move below itself or a move
    ///   to another diagram that would split a live connection.
    /// - `NotFound` for an unknown shape or owner.
    pub fn update_shape_owner(&mut self, id: EntityId, owner: ShapeOwner) -> RepoResult<()> {
        self.load_shape_diagram(id)?;
        let session = self.session_mut()?;
        let current = live(&session.shapes, id)
            .ok_or_else(|| RepoError::not_found("shape", id))?
            .owner;
        if matches!(current, Some(ShapeOwner::Template(_))) {
            return Err(RepoError::Argument(
                "template prototypes change through replace_template_shape".to_string(),
            ));
        }
        check_shape_owner(session, owner)?;
        if let ShapeOwner::Shape(parent) = owner {
            if session.is_shape_ancestor(id, parent) {
                return Err(RepoError::Argument(format!(
                    "moving shape {id} under {parent} would create a cycle"
                )));
            }
        }
        check_move_keeps_connections(session, id, owner)?;

        let slot = live_slot(&mut session.shapes, "shape", id)?;
        slot.value.owner = Some(owner);
        let shape = slot.value.clone();
        session.reindex_shape(id);
        session.mark(EntityCategory::Shape, id);

        let descendants = session.shape_subtree(ShapeOwner::Shape(id));
        for &child in &descendants {
            session.reindex_shape(child);
            session.mark(EntityCategory::Shape, child);
        }
        let mut moved: BTreeSet<EntityId> = descendants.into_iter().collect();
        moved.insert(id);
        for key in session.connections_touching(&moved) {
            session.mark_connection(key);
        }
        debug!(
            "event=shape_move module=repo status=ok id={id} owner={} descendants={}",
            owner.kind_name(),
            moved.len() - 1
        );
        self.publish_shapes(ChangeKind::Updated, vec![shape]);
        Ok(())
    }

    pub fn delete_shape(&mut self, id: EntityId) -> RepoResult<()> {
        self.delete_shapes(&[id])
    }

    /// Soft-deletes the listed loaded shapes; children and connections stay.
    pub fn delete_shapes(&mut self, ids: &[EntityId]) -> RepoResult<()> {
        let (shapes, result) = {
            let session = self.session_mut()?;
            let valid = leading_shapes(session, ids, EntityState::Active);
            let shapes = session.set_shapes_state(&valid, EntityState::SoftDeleted);
            (shapes, check_prefix(ids, &valid))
        };
        debug!(
            "event=shape_delete module=repo status=ok count={}",
            shapes.len()
        );
        self.publish_shapes(ChangeKind::Deleted, shapes);
        result
    }

    /// Soft-deletes the listed shapes, their descendants and every
    /// connection touching them. The owning diagrams are loaded first.
    pub fn delete_all_shapes(&mut self, ids: &[EntityId]) -> RepoResult<()> {
        for &id in ids {
            self.load_shape_diagram(id)?;
        }
        let session = self.session_mut()?;
        let valid = leading_shapes(session, ids, EntityState::Active);
        let result = check_prefix(ids, &valid);

        let subtree = with_descendants(session, &valid);
        let keys = session.live_connections_touching(&subtree);
        let connections = session.set_connections_state(&keys, EntityState::SoftDeleted);
        let ordered: Vec<EntityId> = subtree.into_iter().collect();
        let shapes = session.set_shapes_state(&ordered, EntityState::SoftDeleted);
        debug!(
            "event=shape_delete_all module=repo status=ok shapes={} connections={}",
            shapes.len(),
            connections.len()
        );

        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Deleted,
            connections,
        });
        self.publish_shapes(ChangeKind::Deleted, shapes);
        result
    }

    pub fn undelete_shape(&mut self, id: EntityId) -> RepoResult<()> {
        self.undelete_shapes(&[id])
    }

    pub fn undelete_shapes(&mut self, ids: &[EntityId]) -> RepoResult<()> {
        let (shapes, result) = {
            let session = self.session_mut()?;
            let valid = leading_shapes(session, ids, EntityState::SoftDeleted);
            let shapes = session.set_shapes_state(&valid, EntityState::Active);
            (shapes, check_deleted_prefix(ids, &valid))
        };
        debug!(
            "event=shape_undelete module=repo status=ok count={}",
            shapes.len()
        );
        self.publish_shapes(ChangeKind::Inserted, shapes);
        result
    }

    /// Restores the listed shapes, their soft-deleted descendants and the
    /// connections whose ends are both live again.
    pub fn undelete_all_shapes(&mut self, ids: &[EntityId]) -> RepoResult<()> {
        let session = self.session_mut()?;
        let valid = leading_shapes(session, ids, EntityState::SoftDeleted);
        let result = check_deleted_prefix(ids, &valid);

        let subtree = with_descendants(session, &valid);
        let ordered: Vec<EntityId> = subtree.iter().copied().collect();
        let shapes = session.set_shapes_state(&ordered, EntityState::Active);
        let keys = session.restorable_connections(&subtree);
        let connections = session.set_connections_state(&keys, EntityState::Active);
        debug!(
            "event=shape_undelete_all module=repo status=ok shapes={} connections={}",
            shapes.len(),
            connections.len()
        );

        self.publish_shapes(ChangeKind::Inserted, shapes);
        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Inserted,
            connections,
        });
        result
    }

    /// `true` when any live shape, loaded or not, has the given type.
    pub fn is_shape_type_in_use(&self, type_name: &str) -> bool {
        self.is_shape_types_in_use(&[type_name])
    }

    /// `true` when any of the given types is in use.
    pub fn is_shape_types_in_use(&self, type_names: &[&str]) -> bool {
        let targets: Vec<ReferenceTarget> = type_names
            .iter()
            .map(|name| ReferenceTarget::shape_type(name))
            .collect();
        self.session
            .as_ref()
            .is_some_and(|session| session.index.is_any_referenced(&targets))
    }

    /// Z-order above every shape ever seen in the diagram.
    pub fn obtain_new_top_z_order(&mut self, diagram_id: EntityId) -> RepoResult<i32> {
        let session = self.session_mut()?;
        ensure_live_diagram(session, diagram_id)?;
        session.zorder.obtain_new_top(diagram_id)
    }

    /// Z-order below every shape ever seen in the diagram.
    pub fn obtain_new_bottom_z_order(&mut self, diagram_id: EntityId) -> RepoResult<i32> {
        let session = self.session_mut()?;
        ensure_live_diagram(session, diagram_id)?;
        session.zorder.obtain_new_bottom(diagram_id)
    }

    /// Glues `glue_point_id` of the connector onto a target point.
    ///
    /// # Errors
    /// - `NotFound` when either shape is not loaded and live.
    /// - `Argument` for unknown points, an already connected glue point or
    ///   ends in different diagrams.
    /// - `ConnectionCapability` when Glue/Connect capabilities are missing.
    pub fn insert_connection(
        &mut self,
        connector_id: EntityId,
        glue_point_id: ControlPointId,
        target_id: EntityId,
        target_point_id: ControlPointId,
    ) -> RepoResult<ShapeConnection> {
        let connection = {
            let session = self.session()?;
            let connector = live(&session.shapes, connector_id)
                .ok_or_else(|| RepoError::not_found("shape", connector_id))?;
            let target = live(&session.shapes, target_id)
                .ok_or_else(|| RepoError::not_found("shape", target_id))?;
            if session.shape_diagram(connector_id) != session.shape_diagram(target_id) {
                return Err(RepoError::Argument(format!(
                    "shapes {connector_id} and {target_id} belong to different diagrams"
                )));
            }
            ShapeConnection::new(connector, glue_point_id, target, target_point_id)?
        };
        self.load_shape_diagram(connector_id)?;

        let session = self.session_mut()?;
        let key = connection.key();
        if session.connections.get(&key).is_some_and(Slot::is_active) {
            return Err(RepoError::Argument(format!(
                "glue point {glue_point_id} of shape {connector_id} is already connected"
            )));
        }
        session.connections.insert(key, Slot::active(connection));
        session.mark_connection(key);
        debug!(
            "event=connection_insert module=repo status=ok connector={connector_id} target={target_id}"
        );
        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Inserted,
            connections: vec![connection],
        });
        Ok(connection)
    }

    /// Soft-deletes an existing connection.
    pub fn delete_connection(&mut self, connection: &ShapeConnection) -> RepoResult<()> {
        {
            let session = self.session()?;
            for shape_id in [connection.connector_shape, connection.target_shape] {
                if !session.is_shape_live(shape_id) {
                    return Err(RepoError::not_found("shape", shape_id));
                }
            }
        }
        self.load_shape_diagram(connection.connector_shape)?;

        let session = self.session_mut()?;
        let key = connection.key();
        match session.connections.get(&key) {
            Some(slot) if slot.is_active() && slot.value == *connection => {}
            _ => return Err(RepoError::not_found("connection", key.storage_key())),
        }
        let connections = session.set_connections_state(&[key], EntityState::SoftDeleted);
        debug!(
            "event=connection_delete module=repo status=ok connector={}",
            connection.connector_shape
        );
        self.events.publish(RepositoryEvent::Connections {
            kind: ChangeKind::Deleted,
            connections,
        });
        Ok(())
    }

    /// Active connections where the shape is either end and both ends are
    /// live. Loads the owning diagram first.
    pub fn get_connections(&mut self, shape_id: EntityId) -> RepoResult<Vec<ShapeConnection>> {
        self.load_shape_diagram(shape_id)?;
        let session = self.session()?;
        Ok(session
            .connections
            .values()
            .filter(|slot| slot.is_active() && slot.value.involves(shape_id))
            .filter(|slot| {
                session.is_shape_live(slot.value.connector_shape)
                    && session.is_shape_live(slot.value.target_shape)
            })
            .map(|slot| slot.value)
            .collect())
    }

    fn apply_insert_shape(
        &mut self,
        shape: &mut Shape,
        owner: ShapeOwner,
    ) -> RepoResult<EntityId> {
        ensure_uninserted(shape.id, "shape")?;
        self.registry.require(&shape.type_name, EntityCategory::Shape)?;
        let session = self.session_mut()?;
        check_shape_owner(session, owner)?;
        check_shape_references(session, shape)?;

        let id = Uuid::new_v4();
        shape.id = Some(id);
        shape.owner = Some(owner);
        session.shapes.insert(id, Slot::active(shape.clone()));
        session.reindex_shape(id);
        session.mark(EntityCategory::Shape, id);
        debug!(
            "event=shape_insert module=repo status=ok id={id} owner={} type={}",
            owner.kind_name(),
            shape.type_name
        );
        Ok(id)
    }

    /// Publishes one shapes event, tagging the diagram when it is shared.
    fn publish_shapes(&mut self, kind: ChangeKind, shapes: Vec<Shape>) {
        let diagram_id = self
            .session
            .as_ref()
            .and_then(|session| session.common_diagram(&shapes));
        self.events.publish(RepositoryEvent::Shapes {
            kind,
            diagram_id,
            shapes,
        });
    }
}

fn check_shape_owner(session: &Session, owner: ShapeOwner) -> RepoResult<()> {
    match owner {
        ShapeOwner::Diagram(diagram_id) => ensure_live_diagram(session, diagram_id),
        ShapeOwner::Shape(parent) => {
            if session.is_shape_live(parent) {
                Ok(())
            } else {
                Err(RepoError::not_found("shape", parent))
            }
        }
        ShapeOwner::Template(_) => Err(RepoError::InvalidOwner {
            what: "shape",
            owner: "template",
        }),
    }
}

/// Rejects a diagram change that would leave a live connection spanning
/// two diagrams.
fn check_move_keeps_connections(
    session: &Session,
    id: EntityId,
    owner: ShapeOwner,
) -> RepoResult<()> {
    let target_diagram = match owner {
        ShapeOwner::Diagram(diagram_id) => Some(diagram_id),
        ShapeOwner::Shape(parent) => session.shape_diagram(parent),
        ShapeOwner::Template(_) => None,
    };
    if session.shape_diagram(id) == target_diagram {
        return Ok(());
    }
    let mut moved: BTreeSet<EntityId> = session
        .shape_subtree(ShapeOwner::Shape(id))
        .into_iter()
        .collect();
    moved.insert(id);
    let splits = session
        .live_connections_touching(&moved)
        .into_iter()
        .filter_map(|key| session.connections.get(&key))
        .any(|slot| {
            !(moved.contains(&slot.value.connector_shape)
                && moved.contains(&slot.value.target_shape))
        });
    if splits {
        return Err(RepoError::Argument(format!(
            "moving shape {id} to another diagram would split a connection"
        )));
    }
    Ok(())
}

/// Checks that styles, template and model object referenced by a shape
/// are live.
pub(crate) fn check_shape_references(session: &Session, shape: &Shape) -> RepoResult<()> {
    if let Some(style) = shape
        .styles
        .iter()
        .find(|style| live(&session.styles, *style).is_none())
    {
        return Err(RepoError::not_found("style", style));
    }
    if let Some(template) = shape.template {
        if live(&session.templates, template).is_none() {
            return Err(RepoError::not_found("template", template));
        }
    }
    if let Some(object) = shape.model_object {
        if live(&session.model_objects, object).is_none() {
            return Err(RepoError::not_found("model object", object));
        }
    }
    Ok(())
}

fn ensure_live_diagram(session: &Session, diagram_id: EntityId) -> RepoResult<()> {
    if live(&session.diagrams, diagram_id).is_some() {
        Ok(())
    } else {
        Err(RepoError::not_found("diagram", diagram_id))
    }
}

/// Longest prefix of `ids` whose shapes are loaded and in `state`.
fn leading_shapes(session: &Session, ids: &[EntityId], state: EntityState) -> Vec<EntityId> {
    ids.iter()
        .copied()
        .take_while(|id| {
            session
                .shapes
                .get(id)
                .is_some_and(|slot| slot.state == state)
        })
        .collect()
}

fn check_prefix(ids: &[EntityId], valid: &[EntityId]) -> RepoResult<()> {
    match ids.get(valid.len()) {
        Some(id) => Err(RepoError::not_found("shape", id)),
        None => Ok(()),
    }
}

fn check_deleted_prefix(ids: &[EntityId], valid: &[EntityId]) -> RepoResult<()> {
    match ids.get(valid.len()) {
        Some(id) => Err(RepoError::not_found("shape", format!("deleted {id}"))),
        None => Ok(()),
    }
}

fn with_descendants(session: &Session, ids: &[EntityId]) -> BTreeSet<EntityId> {
    let mut subtree: BTreeSet<EntityId> = ids.iter().copied().collect();
    for &id in ids {
        subtree.extend(session.shape_subtree(ShapeOwner::Shape(id)));
    }
    subtree
}

#[cfg(test)]
mod tests {
    use super::{check_prefix, leading_shapes};
    use crate::config::RepositoryOptions;
    use crate::error::RepoError;
    use crate::model::project::ProjectSettings;
    use crate::model::shape::Shape;
    use crate::model::EntityState;
    use crate::repo::session::{Session, Slot};
    use uuid::Uuid;

    #[test]
    fn leading_shapes_stops_at_first_mismatch() {
        let mut session = Session::new(
            ProjectSettings::new("Demo", 1),
            1,
            &RepositoryOptions::default(),
        );
        let live = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let after = Uuid::new_v4();
        session.shapes.insert(live, Slot::active(Shape::new("Box")));
        session.shapes.insert(after, Slot::active(Shape::new("Box")));

        let ids = [live, missing, after];
        let valid = leading_shapes(&session, &ids, EntityState::Active);
        assert_eq!(valid, vec![live]);
        assert!(matches!(
            check_prefix(&ids, &valid),
            Err(RepoError::NotFound { what: "shape", .. })
        ));
    }
}
