//! Model, model object and diagram model object operations.
//!
//! # Invariants
//! - At most one model exists per project.
//! - A model object is owned by the model or by one live parent object and
//!   the ownership chain never loops.
//! - Ownership changes only through `update_model_object_owner`.

use crate::error::{RepoError, RepoResult};
use crate::model::model_object::{DiagramModelObject, Model, ModelObject, ModelObjectOwner};
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::events::{ChangeKind, RepositoryEvent};
use crate::repo::reference_index::ReferenceTarget;
use crate::repo::repository::{ensure_uninserted, ProjectRepository};
use crate::repo::session::{deleted_slot, live, live_slot, Session, Slot};
use crate::store::Store;
use log::debug;
use uuid::Uuid;

impl<S: Store> ProjectRepository<S> {
    pub fn get_model(&self) -> Option<Model> {
        self.session
            .as_ref()?
            .model
            .as_ref()
            .filter(|slot| slot.is_active())
            .map(|slot| slot.value.clone())
    }

    /// Inserts the project model.
    ///
    /// # Errors
    /// - `Argument` when a model already exists, live or soft-deleted.
    pub fn insert_model(&mut self, model: &mut Model) -> RepoResult<EntityId> {
        ensure_uninserted(model.id, "model")?;
        let session = self.session_mut()?;
        if session.model.is_some() {
            return Err(RepoError::Argument("the project already has a model".to_string()));
        }
        let id = Uuid::new_v4();
        model.id = Some(id);
        session.model = Some(Slot::active(model.clone()));
        session.mark(EntityCategory::Model, id);
        debug!("event=model_insert module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Model {
            kind: ChangeKind::Inserted,
            model: model.clone(),
        });
        Ok(id)
    }

    pub fn update_model(&mut self, model: &Model) -> RepoResult<()> {
        let session = self.session_mut()?;
        let id = live_model_id(session, model.id)?;
        if let Some(slot) = session.model.as_mut() {
            slot.value = model.clone();
        }
        session.mark(EntityCategory::Model, id);
        self.events.publish(RepositoryEvent::Model {
            kind: ChangeKind::Updated,
            model: model.clone(),
        });
        Ok(())
    }

    /// Soft-deletes the model; its objects stay active.
    pub fn delete_model(&mut self) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = session
            .model
            .as_mut()
            .filter(|slot| slot.is_active())
            .ok_or_else(|| RepoError::not_found("model", "project model"))?;
        slot.state = EntityState::SoftDeleted;
        let model = slot.value.clone();
        if let Some(id) = model.id {
            session.mark(EntityCategory::Model, id);
        }
        debug!("event=model_delete module=repo status=ok");
        self.events.publish(RepositoryEvent::Model {
            kind: ChangeKind::Deleted,
            model,
        });
        Ok(())
    }

    pub fn undelete_model(&mut self) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = session
            .model
            .as_mut()
            .filter(|slot| !slot.is_active())
            .ok_or_else(|| RepoError::not_found("model", "deleted project model"))?;
        slot.state = EntityState::Active;
        let model = slot.value.clone();
        if let Some(id) = model.id {
            session.mark(EntityCategory::Model, id);
        }
        debug!("event=model_undelete module=repo status=ok");
        self.events.publish(RepositoryEvent::Model {
            kind: ChangeKind::Inserted,
            model,
        });
        Ok(())
    }

    pub fn get_model_object(&self, id: EntityId) -> Option<ModelObject> {
        live(&self.session.as_ref()?.model_objects, id).cloned()
    }

    pub fn get_model_object_including_deleted(&self, id: EntityId) -> Option<ModelObject> {
        let session = self.session.as_ref()?;
        session.model_objects.get(&id).map(|slot| slot.value.clone())
    }

    /// Active model objects, in id order.
    pub fn get_model_objects(&self) -> Vec<ModelObject> {
        self.session.as_ref().map_or_else(Vec::new, |session| {
            session
                .model_objects
                .values()
                .filter(|slot| slot.is_active())
                .map(|slot| slot.value.clone())
                .collect()
        })
    }

    /// Active direct children of `parent`.
    pub fn get_child_model_objects(&self, parent: EntityId) -> Vec<ModelObject> {
        self.get_model_objects()
            .into_iter()
            .filter(|object| object.parent() == Some(parent))
            .collect()
    }

    pub fn insert_model_object(&mut self, object: &mut ModelObject) -> RepoResult<EntityId> {
        let id = self.apply_insert_model_object(object)?;
        self.events.publish(RepositoryEvent::ModelObjects {
            kind: ChangeKind::Inserted,
            model_objects: vec![object.clone()],
        });
        Ok(id)
    }

    /// Inserts objects in order; parents must precede their children.
    pub fn insert_model_objects(&mut self, objects: &mut [ModelObject]) -> RepoResult<()> {
        let mut inserted = Vec::with_capacity(objects.len());
        let mut result = Ok(());
        for object in objects.iter_mut() {
            match self.apply_insert_model_object(object) {
                Ok(_) => inserted.push(object.clone()),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.events.publish(RepositoryEvent::ModelObjects {
            kind: ChangeKind::Inserted,
            model_objects: inserted,
        });
        result
    }

    /// Replaces a live object's content. The owner must be unchanged.
    pub fn update_model_object(&mut self, object: &ModelObject) -> RepoResult<()> {
        let id = object
            .id
            .ok_or_else(|| RepoError::not_found("model object", "uninserted"))?;
        self.registry
            .require(&object.type_name, EntityCategory::ModelObject)?;
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.model_objects, "model object", id)?;
        if slot.value.owner != object.owner {
            return Err(RepoError::Argument(
                "model object owner changes through update_model_object_owner".to_string(),
            ));
        }
        slot.value = object.clone();
        session.reindex_model_object(id);
        session.mark(EntityCategory::ModelObject, id);
        debug!("event=model_object_update module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::ModelObjects {
            kind: ChangeKind::Updated,
            model_objects: vec![object.clone()],
        });
        Ok(())
    }

    /// Re-parents a model object.
    ///
    /// # Errors
    /// - `NotFound` for an unknown object or parent.
    /// - `Argument` when the move would create an ownership cycle.
    pub fn update_model_object_owner(
        &mut self,
        id: EntityId,
        owner: ModelObjectOwner,
    ) -> RepoResult<()> {
        let session = self.session_mut()?;
        if live(&session.model_objects, id).is_none() {
            return Err(RepoError::not_found("model object", id));
        }
        check_model_object_owner(session, owner)?;
        if let ModelObjectOwner::ModelObject(parent) = owner {
            if session.is_model_object_ancestor(id, parent) {
                return Err(RepoError::Argument(format!(
                    "moving model object {id} under {parent} would create a cycle"
                )));
            }
        }

        let slot = live_slot(&mut session.model_objects, "model object", id)?;
        slot.value.owner = owner;
        let object = slot.value.clone();
        session.reindex_model_object(id);
        session.mark(EntityCategory::ModelObject, id);
        debug!("event=model_object_move module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::ModelObjects {
            kind: ChangeKind::Updated,
            model_objects: vec![object],
        });
        Ok(())
    }

    pub fn delete_model_object(&mut self, id: EntityId) -> RepoResult<()> {
        self.delete_model_objects(&[id])
    }

    /// Soft-deletes objects in order; the ones before a failure stay deleted.
    pub fn delete_model_objects(&mut self, ids: &[EntityId]) -> RepoResult<()> {
        self.set_model_objects_state(ids, EntityState::SoftDeleted)
    }

    pub fn undelete_model_object(&mut self, id: EntityId) -> RepoResult<()> {
        self.undelete_model_objects(&[id])
    }

    pub fn undelete_model_objects(&mut self, ids: &[EntityId]) -> RepoResult<()> {
        self.set_model_objects_state(ids, EntityState::Active)
    }

    /// `true` when a live shape or child model object references the object.
    pub fn is_model_object_in_use(&self, id: EntityId) -> bool {
        self.session.as_ref().is_some_and(|session| {
            session
                .index
                .is_referenced(&ReferenceTarget::ModelObject(id))
        })
    }

    pub fn is_model_object_type_in_use(&self, type_name: &str) -> bool {
        self.session.as_ref().is_some_and(|session| {
            session
                .index
                .is_referenced(&ReferenceTarget::model_object_type(type_name))
        })
    }

    pub fn get_diagram_model_object(&self, id: EntityId) -> Option<DiagramModelObject> {
        live(&self.session.as_ref()?.diagram_model_objects, id).cloned()
    }

    pub fn insert_diagram_model_object(
        &mut self,
        object: &mut DiagramModelObject,
    ) -> RepoResult<EntityId> {
        ensure_uninserted(object.id, "diagram model object")?;
        self.registry
            .require(&object.type_name, EntityCategory::DiagramModelObject)?;
        let session = self.session_mut()?;
        let id = Uuid::new_v4();
        object.id = Some(id);
        session
            .diagram_model_objects
            .insert(id, Slot::active(object.clone()));
        session.mark(EntityCategory::DiagramModelObject, id);
        debug!("event=diagram_model_object_insert module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::DiagramModelObjects {
            kind: ChangeKind::Inserted,
            diagram_model_objects: vec![object.clone()],
        });
        Ok(id)
    }

    pub fn update_diagram_model_object(&mut self, object: &DiagramModelObject) -> RepoResult<()> {
        let id = object
            .id
            .ok_or_else(|| RepoError::not_found("diagram model object", "uninserted"))?;
        self.registry
            .require(&object.type_name, EntityCategory::DiagramModelObject)?;
        let session = self.session_mut()?;
        live_slot(&mut session.diagram_model_objects, "diagram model object", id)?.value =
            object.clone();
        session.mark(EntityCategory::DiagramModelObject, id);
        self.events.publish(RepositoryEvent::DiagramModelObjects {
            kind: ChangeKind::Updated,
            diagram_model_objects: vec![object.clone()],
        });
        Ok(())
    }

    pub fn delete_diagram_model_object(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.diagram_model_objects, "diagram model object", id)?;
        slot.state = EntityState::SoftDeleted;
        let object = slot.value.clone();
        session.mark(EntityCategory::DiagramModelObject, id);
        debug!("event=diagram_model_object_delete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::DiagramModelObjects {
            kind: ChangeKind::Deleted,
            diagram_model_objects: vec![object],
        });
        Ok(())
    }

    pub fn undelete_diagram_model_object(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.diagram_model_objects, "diagram model object", id)?;
        slot.state = EntityState::Active;
        let object = slot.value.clone();
        session.mark(EntityCategory::DiagramModelObject, id);
        self.events.publish(RepositoryEvent::DiagramModelObjects {
            kind: ChangeKind::Inserted,
            diagram_model_objects: vec![object],
        });
        Ok(())
    }

    /// `true` when a live diagram is bound to the object.
    pub fn is_diagram_model_object_in_use(&self, id: EntityId) -> bool {
        self.session.as_ref().is_some_and(|session| {
            session
                .index
                .is_referenced(&ReferenceTarget::DiagramModelObject(id))
        })
    }

    fn apply_insert_model_object(&mut self, object: &mut ModelObject) -> RepoResult<EntityId> {
        ensure_uninserted(object.id, "model object")?;
        self.registry
            .require(&object.type_name, EntityCategory::ModelObject)?;
        let session = self.session_mut()?;
        check_model_object_owner(session, object.owner)?;

        let id = Uuid::new_v4();
        object.id = Some(id);
        session.model_objects.insert(id, Slot::active(object.clone()));
        session.reindex_model_object(id);
        session.mark(EntityCategory::ModelObject, id);
        debug!(
            "event=model_object_insert module=repo status=ok id={id} type={}",
            object.type_name
        );
        Ok(id)
    }

    fn set_model_objects_state(&mut self, ids: &[EntityId], target: EntityState) -> RepoResult<()> {
        let session = self.session_mut()?;
        let mut changed = Vec::with_capacity(ids.len());
        let mut result = Ok(());
        for &id in ids {
            let slot = match target {
                EntityState::SoftDeleted => {
                    live_slot(&mut session.model_objects, "model object", id)
                }
                EntityState::Active => {
                    deleted_slot(&mut session.model_objects, "model object", id)
                }
            };
            match slot {
                Ok(slot) => {
                    slot.state = target;
                    changed.push(slot.value.clone());
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            session.reindex_model_object(id);
            session.mark(EntityCategory::ModelObject, id);
        }
        debug!(
            "event=model_object_state module=repo status=ok state={:?} count={}",
            target,
            changed.len()
        );

        let kind = match target {
            EntityState::SoftDeleted => ChangeKind::Deleted,
            EntityState::Active => ChangeKind::Inserted,
        };
        self.events.publish(RepositoryEvent::ModelObjects {
            kind,
            model_objects: changed,
        });
        result
    }
}

fn live_model_id(session: &Session, id: Option<EntityId>) -> RepoResult<EntityId> {
    session
        .model
        .as_ref()
        .filter(|slot| slot.is_active() && slot.value.id == id)
        .and_then(|slot| slot.value.id)
        .ok_or_else(|| RepoError::not_found("model", "project model"))
}

fn check_model_object_owner(session: &Session, owner: ModelObjectOwner) -> RepoResult<()> {
    match owner {
        ModelObjectOwner::Model => {
            let has_model = session.model.as_ref().is_some_and(|slot| slot.is_active());
            if !has_model {
                return Err(RepoError::not_found("model", "project model"));
            }
        }
        ModelObjectOwner::ModelObject(parent) => {
            if live(&session.model_objects, parent).is_none() {
                return Err(RepoError::not_found("model object", parent));
            }
        }
    }
    Ok(())
}
