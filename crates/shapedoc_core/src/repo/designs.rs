//! Design and style operations.
//!
//! # Invariants
//! - A style belongs to exactly one design, fixed at insert.
//! - `delete_all_design` soft-deletes the design and its active styles;
//!   `undelete_all_design` restores both.

use crate::error::{RepoError, RepoResult};
use crate::model::design::Design;
use crate::model::style::Style;
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::events::{ChangeKind, RepositoryEvent};
use crate::repo::reference_index::ReferenceTarget;
use crate::repo::repository::{ensure_uninserted, ProjectRepository};
use crate::repo::session::{deleted_slot, live, live_slot, Session, Slot};
use crate::store::Store;
use log::debug;
use uuid::Uuid;

impl<S: Store> ProjectRepository<S> {
    pub fn get_design(&self, id: EntityId) -> Option<Design> {
        live(&self.session.as_ref()?.designs, id).cloned()
    }

    pub fn get_design_including_deleted(&self, id: EntityId) -> Option<Design> {
        let session = self.session.as_ref()?;
        session.designs.get(&id).map(|slot| slot.value.clone())
    }

    pub fn get_designs(&self) -> Vec<Design> {
        self.session.as_ref().map_or_else(Vec::new, |session| {
            session
                .designs
                .values()
                .filter(|slot| slot.is_active())
                .map(|slot| slot.value.clone())
                .collect()
        })
    }

    pub fn insert_design(&mut self, design: &mut Design) -> RepoResult<EntityId> {
        let id = self.apply_insert_design(design)?;
        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Inserted,
            designs: vec![design.clone()],
        });
        Ok(id)
    }

    /// Inserts a design together with its styles.
    ///
    /// The design is inserted first; a failing style leaves the design and
    /// the styles before it inserted.
    pub fn insert_all_design(
        &mut self,
        design: &mut Design,
        styles: &mut [Style],
    ) -> RepoResult<EntityId> {
        let design_id = self.apply_insert_design(design)?;
        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Inserted,
            designs: vec![design.clone()],
        });
        self.insert_styles(design_id, styles)?;
        Ok(design_id)
    }

    pub fn update_design(&mut self, design: &Design) -> RepoResult<()> {
        let id = design
            .id
            .ok_or_else(|| RepoError::not_found("design", "uninserted"))?;
        let session = self.session_mut()?;
        live_slot(&mut session.designs, "design", id)?.value = design.clone();
        session.mark(EntityCategory::Design, id);
        debug!("event=design_update module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Updated,
            designs: vec![design.clone()],
        });
        Ok(())
    }

    /// Soft-deletes the design only; its styles stay active.
    pub fn delete_design(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = live_slot(&mut session.designs, "design", id)?;
        slot.state = EntityState::SoftDeleted;
        let design = slot.value.clone();
        session.mark(EntityCategory::Design, id);
        debug!("event=design_delete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Deleted,
            designs: vec![design],
        });
        Ok(())
    }

    /// Soft-deletes the design and every active style it owns.
    pub fn delete_all_design(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        live_slot(&mut session.designs, "design", id)?;

        let style_ids = design_style_ids(session, id, EntityState::Active);
        let mut styles = Vec::with_capacity(style_ids.len());
        for style_id in style_ids {
            if let Some(slot) = session.styles.get_mut(&style_id) {
                slot.state = EntityState::SoftDeleted;
                styles.push(slot.value.clone());
            }
            session.reindex_style(style_id);
            session.mark(EntityCategory::Style, style_id);
        }

        let slot = live_slot(&mut session.designs, "design", id)?;
        slot.state = EntityState::SoftDeleted;
        let design = slot.value.clone();
        session.mark(EntityCategory::Design, id);
        debug!(
            "event=design_delete_all module=repo status=ok id={id} styles={}",
            styles.len()
        );

        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Deleted,
            design_id: id,
            styles,
        });
        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Deleted,
            designs: vec![design],
        });
        Ok(())
    }

    pub fn undelete_design(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.designs, "design", id)?;
        slot.state = EntityState::Active;
        let design = slot.value.clone();
        session.mark(EntityCategory::Design, id);
        debug!("event=design_undelete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Inserted,
            designs: vec![design],
        });
        Ok(())
    }

    /// Restores the design and every soft-deleted style it owns.
    pub fn undelete_all_design(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let slot = deleted_slot(&mut session.designs, "design", id)?;
        slot.state = EntityState::Active;
        let design = slot.value.clone();
        session.mark(EntityCategory::Design, id);

        let style_ids = design_style_ids(session, id, EntityState::SoftDeleted);
        let mut styles = Vec::with_capacity(style_ids.len());
        for style_id in style_ids {
            if let Some(slot) = session.styles.get_mut(&style_id) {
                slot.state = EntityState::Active;
                styles.push(slot.value.clone());
            }
            session.reindex_style(style_id);
            session.mark(EntityCategory::Style, style_id);
        }
        debug!(
            "event=design_undelete_all module=repo status=ok id={id} styles={}",
            styles.len()
        );

        self.events.publish(RepositoryEvent::Design {
            kind: ChangeKind::Inserted,
            designs: vec![design],
        });
        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Inserted,
            design_id: id,
            styles,
        });
        Ok(())
    }

    pub fn get_style(&self, id: EntityId) -> Option<Style> {
        live(&self.session.as_ref()?.styles, id).cloned()
    }

    pub fn get_style_including_deleted(&self, id: EntityId) -> Option<Style> {
        let session = self.session.as_ref()?;
        session.styles.get(&id).map(|slot| slot.value.clone())
    }

    /// Active styles of a design, in id order.
    pub fn get_styles(&self, design_id: EntityId) -> Vec<Style> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        design_style_ids(session, design_id, EntityState::Active)
            .into_iter()
            .filter_map(|style_id| live(&session.styles, style_id).cloned())
            .collect()
    }

    /// Design that owns `style_id`, including soft-deleted styles.
    pub fn get_style_design(&self, style_id: EntityId) -> Option<EntityId> {
        self.session
            .as_ref()?
            .style_designs
            .get(&style_id)
            .copied()
    }

    pub fn insert_style(&mut self, design_id: EntityId, style: &mut Style) -> RepoResult<EntityId> {
        let id = self.apply_insert_style(design_id, style)?;
        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Inserted,
            design_id,
            styles: vec![style.clone()],
        });
        Ok(id)
    }

    /// Inserts styles in order; the ones before a failure stay inserted.
    pub fn insert_styles(&mut self, design_id: EntityId, styles: &mut [Style]) -> RepoResult<()> {
        let mut inserted = Vec::with_capacity(styles.len());
        let mut result = Ok(());
        for style in styles.iter_mut() {
            match self.apply_insert_style(design_id, style) {
                Ok(_) => inserted.push(style.clone()),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Inserted,
            design_id,
            styles: inserted,
        });
        result
    }

    pub fn update_style(&mut self, style: &Style) -> RepoResult<()> {
        let id = style
            .id
            .ok_or_else(|| RepoError::not_found("style", "uninserted"))?;
        let session = self.session_mut()?;
        check_style_references(session, style)?;
        live_slot(&mut session.styles, "style", id)?.value = style.clone();
        session.reindex_style(id);
        session.mark(EntityCategory::Style, id);
        let design_id = owning_design(session.style_designs.get(&id), id)?;
        debug!("event=style_update module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Updated,
            design_id,
            styles: vec![style.clone()],
        });
        Ok(())
    }

    pub fn delete_style(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let design_id = owning_design(session.style_designs.get(&id), id)?;
        let slot = live_slot(&mut session.styles, "style", id)?;
        slot.state = EntityState::SoftDeleted;
        let style = slot.value.clone();
        session.reindex_style(id);
        session.mark(EntityCategory::Style, id);
        debug!("event=style_delete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Deleted,
            design_id,
            styles: vec![style],
        });
        Ok(())
    }

    /// Restores a style whose design is live.
    pub fn undelete_style(&mut self, id: EntityId) -> RepoResult<()> {
        let session = self.session_mut()?;
        let design_id = owning_design(session.style_designs.get(&id), id)?;
        if live(&session.designs, design_id).is_none() {
            return Err(RepoError::not_found("design", design_id));
        }
        let slot = deleted_slot(&mut session.styles, "style", id)?;
        slot.state = EntityState::Active;
        let style = slot.value.clone();
        session.reindex_style(id);
        session.mark(EntityCategory::Style, id);
        debug!("event=style_undelete module=repo status=ok id={id}");
        self.events.publish(RepositoryEvent::Styles {
            kind: ChangeKind::Inserted,
            design_id,
            styles: vec![style],
        });
        Ok(())
    }

    /// `true` when any live shape, style, model mapping or diagram
    /// references the style, loaded or not.
    pub fn is_style_in_use(&self, id: EntityId) -> bool {
        self.is_styles_in_use(&[id])
    }

    pub fn is_styles_in_use(&self, ids: &[EntityId]) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let targets: Vec<ReferenceTarget> =
            ids.iter().copied().map(ReferenceTarget::Style).collect();
        session.index.is_any_referenced(&targets)
    }

    fn apply_insert_design(&mut self, design: &mut Design) -> RepoResult<EntityId> {
        ensure_uninserted(design.id, "design")?;
        let session = self.session_mut()?;
        let id = Uuid::new_v4();
        design.id = Some(id);
        session.designs.insert(id, Slot::active(design.clone()));
        session.mark(EntityCategory::Design, id);
        debug!("event=design_insert module=repo status=ok id={id}");
        Ok(id)
    }

    fn apply_insert_style(
        &mut self,
        design_id: EntityId,
        style: &mut Style,
    ) -> RepoResult<EntityId> {
        ensure_uninserted(style.id, "style")?;
        let session = self.session_mut()?;
        if live(&session.designs, design_id).is_none() {
            return Err(RepoError::not_found("design", design_id));
        }
        check_style_references(session, style)?;
        let id = Uuid::new_v4();
        style.id = Some(id);
        session.style_designs.insert(id, design_id);
        session.styles.insert(id, Slot::active(style.clone()));
        session.reindex_style(id);
        session.mark(EntityCategory::Style, id);
        debug!(
            "event=style_insert module=repo status=ok id={id} design={design_id} kind={}",
            style.kind_name()
        );
        Ok(id)
    }
}

fn design_style_ids(
    session: &Session,
    design_id: EntityId,
    state: EntityState,
) -> Vec<EntityId> {
    session
        .style_designs
        .iter()
        .filter(|(_, owner)| **owner == design_id)
        .map(|(style_id, _)| *style_id)
        .filter(|style_id| {
            session
                .styles
                .get(style_id)
                .is_some_and(|slot| slot.state == state)
        })
        .collect()
}

/// Styles referenced by `style` must be live and distinct from it.
fn check_style_references(session: &Session, style: &Style) -> RepoResult<()> {
    for referenced in style.referenced_styles() {
        if style.id == Some(referenced) {
            return Err(RepoError::Argument(format!(
                "style {referenced} cannot reference itself"
            )));
        }
        if live(&session.styles, referenced).is_none() {
            return Err(RepoError::not_found("style", referenced));
        }
    }
    Ok(())
}

fn owning_design(design_id: Option<&EntityId>, style_id: EntityId) -> RepoResult<EntityId> {
    design_id
        .copied()
        .ok_or_else(|| RepoError::not_found("style", style_id))
}
