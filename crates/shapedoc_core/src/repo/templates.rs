//! Template and model mapping operations.
//!
//! # Invariants
//! - A template's prototype shape is owned by `ShapeOwner::Template`.
//! - `delete_template` touches the template only; `delete_all_template`
//!   also removes the prototype subtree and the template's mappings.
//! - The bound model object of a prototype is never cascaded.

use crate::error::{RepoError, RepoResult};
use crate::model::shape::{Shape, ShapeOwner};
use crate::model::template::{ModelMapping, Template};
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::events::{ChangeKind, RepositoryEvent};
use crate::repo::reference_index::ReferenceTarget;
use crate::repo::repository::{ensure_uninserted, ProjectRepository};
use crate::repo::session::{deleted_slot, live, live_slot, Session, Slot};
use crate::repo::shapes::check_shape_references;
use crate::store::Store;
use log::debug;
use uuid::Uuid;

impl<S: Store> ProjectRepository<S> {
    pub fn get_template(&self, id: EntityId) -> Option<Template> {
        live(&self.session.as_ref()?.templates, id).cloned()
    }

    pub fn get_template_including_deleted(&self, id: EntityId) -> Option<Template> {
        let session = self.session.as_ref()?;
        session.templates.get(&id).map(|slot| slot.value.clone())
    }

    pub fn get_templates(&self) -> Vec<Template> {
        self.session.as_ref().map_or_else(Vec::new, |session| {
            session
                .templates
                .values()
                .filter(|slot| slot.is_active())
                .map(|slot| slot.value.clone())
                .collect()
        })
    }

    /// Current prototype shape of a live template.
    pub fn get_template_shape(&self, template_id: EntityId) -> Option<Shape> {
        let session = self.session.as_ref()?;
        let shape_id = live(&session.templates, template_id)?.shape_id?;
        live(&session.shapes, shape_id).cloned()
    }

    /// Inserts a template together with its prototype shape.
    ///
    /// The shape becomes owned by the template and `template.shape_id`
    /// points at it.
    ///
    /// # Errors
    /// - `AlreadyInserted` when either entity has an id.
    /// - `NotFound` when the shape type is not registered or the shape
    ///   references an unknown style, template or model object.
    pub fn insert_template(
        &mut self,
        template: &mut Template,
        shape: &mut Shape,
    ) -> RepoResult<EntityId> {
        ensure_uninserted(template.id, "template")?;
        ensure_uninserted(shape.id, "shape")?;
        self.registry.require(&shape.type_name, EntityCategory::Shape)?;
        let session = self.session_mut()?;
        check_shape_references(session, shape)?;

        let template_id = Uuid::new_v4();
        let shape_id = Uuid::new_v4();
        shape.id = Some(shape_id);
        shape.owner = Some(ShapeOwner::Template(template_id));
        template.id = Some(template_id);
        template.shape_id = Some(shape_id);

        session.templates.insert(template_id, Slot::active(template.clone()));
        session.shapes.insert(shape_id, Slot::active(shape.clone()));
        session.reindex_shape(shape_id);
        session.mark(EntityCategory::Template, template_id);
        session.mark(EntityCategory::Shape, shape_id);
        debug!("event=template_insert module=repo status=ok id={template_id} shape={shape_id}");

        self.events.publish(RepositoryEvent::Template {
            kind: ChangeKind::Inserted,
            templates: vec![template.clone()],
        });
        self.events.publish(RepositoryEvent::Shapes {
            kind: ChangeKind::Inserted,
            diagram_id: None,
            shapes: vec![shape.clone()],
        });
        Ok(template_id)
    }

    /// Replaces name, title and description. The prototype changes only
    /// through [`ProjectRepository::replace_template_shape`].
    pub fn update_template(&mut self, template: &Template) -> RepoResult<()> {
        let id = template
            .id
            .ok_or_else(|| RepoError::not_found("template", "uninserted"))?;
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.templates, "template", id)?;
        if slot.value.shape_id != template.shape_id {
            return Err(RepoError::Argument(
                "template shape changes through replace_template_shape".to_string(),
            ));
        }
        slot.value = template.clone();
        session.mark(EntityCategory::Template, id);
        debug!("event=template_update module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Template {
            kind: ChangeKind::Updated,
            templates: vec![template.clone()],
        });
        Ok(())
    }

    /// Swaps the prototype: inserts `new_shape` and soft-deletes the old one.
    pub fn replace_template_shape(
        &mut self,
        template_id: EntityId,
        new_shape: &mut Shape,
    ) -> RepoResult<()> {
        ensure_uninserted(new_shape.id, "shape")?;
        self.registry
            .require(&new_shape.type_name, EntityCategory::Shape)?;
        let session = self.session_mut()?;
        let template = live(&session.templates, template_id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("template", template_id))?;
        let old_shape = template
            .shape_id
            .and_then(|id| session.shapes.get(&id))
            .map(|slot| slot.value.clone())
            .ok_or_else(|| RepoError::not_found("template shape", template_id))?;
        check_shape_references(session, new_shape)?;

        let shape_id = Uuid::new_v4();
        new_shape.id = Some(shape_id);
        new_shape.owner = Some(ShapeOwner::Template(template_id));
        session.shapes.insert(shape_id, Slot::active(new_shape.clone()));
        session.reindex_shape(shape_id);
        session.mark(EntityCategory::Shape, shape_id);

        let old_ids = prototype_subtree(session, &template);
        session.set_shapes_state(&old_ids, EntityState::SoftDeleted);

        let slot = live_slot(&mut session.templates, "template", template_id)?;
        slot.value.shape_id = Some(shape_id);
        let template = slot.value.clone();
        session.mark(EntityCategory::Template, template_id);
        debug!(
            "event=template_shape_replace module=repo status=ok id={template_id} shape={shape_id}"
        );
        self.events.publish(RepositoryEvent::TemplateShapeReplaced {
            template,
            old_shape,
            new_shape: new_shape.clone(),
        });
        Ok(())
    }

    /// Soft-deletes the template only.
    pub fn delete_template(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.templates, "template", id)?;
        slot.state = EntityState::SoftDeleted;
        let template = slot.value.clone();
        session.mark(EntityCategory::Template, id);
        debug!("event=template_delete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Template {
            kind: ChangeKind::Deleted,
            templates: vec![template],
        });
        Ok(())
    }

    /// Soft-deletes the template, its mappings and its prototype subtree.
    pub fn delete_all_template(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let template = live(&session.templates, id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("template", id))?;

        let mapping_ids = template_mapping_ids(session, id, EntityState::Active);
        let mappings = set_mappings_state(session, &mapping_ids, EntityState::SoftDeleted);
        let shape_ids = prototype_subtree(session, &template);
        let shapes = session.set_shapes_state(&shape_ids, EntityState::SoftDeleted);

        let slot = live_slot(&mut session.templates, "template", id)?;
        slot.state = EntityState::SoftDeleted;
        let template = slot.value.clone();
        session.mark(EntityCategory::Template, id);
        debug!(
            "event=template_delete_all module=repo status=ok id={id} mappings={} shapes={}",
            mappings.len(),
            shapes.len()
        );

        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Deleted,
            template_id: id,
            mappings,
        });
        self.events.publish(RepositoryEvent::Shapes {
            kind: ChangeKind::Deleted,
            diagram_id: None,
            shapes,
        });
        self.events.publish(RepositoryEvent::Template {
            kind: ChangeKind::Deleted,
            templates: vec![template],
        });
        Ok(())
    }

    pub fn undelete_template(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.templates, "template", id)?;
        slot.state = EntityState::Active;
        let template = slot.value.clone();
        session.mark(EntityCategory::Template, id);
        debug!("event=template_undelete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Template {
            kind: ChangeKind::Inserted,
            templates: vec![template],
        });
        Ok(())
    }

    /// Restores the template, its current prototype subtree and every
    /// soft-deleted mapping it owns.
    pub fn undelete_all_template(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.templates, "template", id)?;
        slot.state = EntityState::Active;
        let template = slot.value.clone();
        session.mark(EntityCategory::Template, id);

        let shape_ids = prototype_subtree(session, &template);
        let shapes = session.set_shapes_state(&shape_ids, EntityState::Active);
        let mapping_ids = template_mapping_ids(session, id, EntityState::SoftDeleted);
        let mappings = set_mappings_state(session, &mapping_ids, EntityState::Active);
        debug!(
            "event=template_undelete_all module=repo status=ok id={id} mappings={} shapes={}",
            mappings.len(),
            shapes.len()
        );

        self.events.publish(RepositoryEvent::Template {
            kind: ChangeKind::Inserted,
            templates: vec![template],
        });
        self.events.publish(RepositoryEvent::Shapes {
            kind: ChangeKind::Inserted,
            diagram_id: None,
            shapes,
        });
        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Inserted,
            template_id: id,
            mappings,
        });
        Ok(())
    }

    /// `true` when a live shape was instantiated from the template.
    pub fn is_template_in_use(&self, id: EntityId) -> bool {
        self.session.as_ref().is_some_and(|session| {
            session
                .index
                .is_referenced(&ReferenceTarget::Template(id))
        })
    }

    pub fn get_model_mapping(&self, id: EntityId) -> Option<ModelMapping> {
        live(&self.session.as_ref()?.mappings, id).cloned()
    }

    /// Active mappings of one template.
    pub fn get_model_mappings(&self, template_id: EntityId) -> Vec<ModelMapping> {
        self.session.as_ref().map_or_else(Vec::new, |session| {
            session
                .mappings
                .values()
                .filter(|slot| slot.is_active() && slot.value.template_id == Some(template_id))
                .map(|slot| slot.value.clone())
                .collect()
        })
    }

    pub fn insert_model_mapping(
        &mut self,
        template_id: EntityId,
        mapping: &mut ModelMapping,
    ) -> RepoResult<EntityId> {
        let id = self.apply_insert_mapping(template_id, mapping)?;
        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Inserted,
            template_id,
            mappings: vec![mapping.clone()],
        });
        Ok(id)
    }

    pub fn insert_model_mappings(
        &mut self,
        template_id: EntityId,
        mappings: &mut [ModelMapping],
    ) -> RepoResult<()> {
        let mut inserted = Vec::with_capacity(mappings.len());
        let mut result = Ok(());
        for mapping in mappings.iter_mut() {
            match self.apply_insert_mapping(template_id, mapping) {
                Ok(_) => inserted.push(mapping.clone()),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Inserted,
            template_id,
            mappings: inserted,
        });
        result
    }

    /// Replaces a live mapping. The owning template must be unchanged.
    pub fn update_model_mapping(&mut self, mapping: &ModelMapping) -> RepoResult<()> {
        let id = mapping
            .id
            .ok_or_else(|| RepoError::not_found("model mapping", "uninserted"))?;
        let session = self.session_mut()?;
        check_mapping_styles(session, mapping)?;
        let slot = live_slot(&mut session.mappings, "model mapping", id)?;
        if slot.value.template_id != mapping.template_id {
            return Err(RepoError::Argument(
                "a model mapping cannot move to another template".to_string(),
            ));
        }
        slot.value = mapping.clone();
        let template_id = owning_template(&slot.value)?;
        session.reindex_mapping(id);
        session.mark(EntityCategory::ModelMapping, id);
        debug!("event=model_mapping_update module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Updated,
            template_id,
            mappings: vec![mapping.clone()],
        });
        Ok(())
    }

    pub fn delete_model_mapping(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.mappings, "model mapping", id)?;
        let template_id = owning_template(&slot.value)?;
        let mappings = set_mappings_state(session, &[id], EntityState::SoftDeleted);
        debug!("event=model_mapping_delete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Deleted,
            template_id,
            mappings,
        });
        Ok(())
    }

    pub fn undelete_model_mapping(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.mappings, "model mapping", id)?;
        let template_id = owning_template(&slot.value)?;
        let mappings = set_mappings_state(session, &[id], EntityState::Active);
        debug!("event=model_mapping_undelete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::ModelMappings {
            kind: ChangeKind::Inserted,
            template_id,
            mappings,
        });
        Ok(())
    }

    fn apply_insert_mapping(
        &mut self,
        template_id: EntityId,
        mapping: &mut ModelMapping,
    ) -> RepoResult<EntityId> {
        ensure_uninserted(mapping.id, "model mapping")?;
        let session = self.session_mut()?;
        if live(&session.templates, template_id).is_none() {
            return Err(RepoError::not_found("template", template_id));
        }
        check_mapping_styles(session, mapping)?;

        let id = Uuid::new_v4();
        mapping.id = Some(id);
        mapping.template_id = Some(template_id);
        session.mappings.insert(id, Slot::active(mapping.clone()));
        session.reindex_mapping(id);
        session.mark(EntityCategory::ModelMapping, id);
        debug!("event=model_mapping_insert module=repo status=ok id={id} template={template_id}");
        Ok(id)
    }
}

/// Current prototype shape plus its descendants, any state.
fn prototype_subtree(session: &Session, template: &Template) -> Vec<EntityId> {
    let Some(shape_id) = template.shape_id else {
        return Vec::new();
    };
    let mut ids = vec![shape_id];
    ids.extend(session.shape_subtree(ShapeOwner::Shape(shape_id)));
    ids
}

fn template_mapping_ids(
    session: &Session,
    template_id: EntityId,
    state: EntityState,
) -> Vec<EntityId> {
    session
        .mappings
        .iter()
        .filter(|(_, slot)| slot.state == state && slot.value.template_id == Some(template_id))
        .map(|(id, _)| *id)
        .collect()
}

fn set_mappings_state(
    session: &mut Session,
    ids: &[EntityId],
    state: EntityState,
) -> Vec<ModelMapping> {
    let mut changed = Vec::with_capacity(ids.len());
    for &id in ids {
        if let Some(slot) = session.mappings.get_mut(&id) {
            slot.state = state;
            changed.push(slot.value.clone());
        }
        session.reindex_mapping(id);
        session.mark(EntityCategory::ModelMapping, id);
    }
    changed
}

fn check_mapping_styles(session: &Session, mapping: &ModelMapping) -> RepoResult<()> {
    match mapping
        .referenced_styles()
        .into_iter()
        .find(|style| live(&session.styles, *style).is_none())
    {
        Some(style) => Err(RepoError::not_found("style", style)),
        None => Ok(()),
    }
}

fn owning_template(mapping: &ModelMapping) -> RepoResult<EntityId> {
    mapping
        .template_id
        .ok_or_else(|| RepoError::not_found("template", "unassigned"))
}
