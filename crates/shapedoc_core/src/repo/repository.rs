//! Repository facade: project lifecycle, type registration and persistence.
//!
//! # Responsibility
//! - Own the store, the type registry, the event bus and the open session.
//! - Open, create, save, compact and erase projects.
//! - Materialize diagram shapes on demand.
//!
//! # Invariants
//! - Every category operation requires an open project (`NotOpen`).
//! - A failed store call leaves the session and dirty state untouched.
//! - Events are published after the in-memory graph is updated.
//!
//! # See also
//! - `designs.rs`, `models.rs`, `templates.rs`, `diagrams.rs`, `shapes.rs`
//!   for the per-category operations.

use crate::config::RepositoryOptions;
use crate::error::{RepoError, RepoResult};
use crate::logging::sanitize_message;
use crate::model::project::ProjectSettings;
use crate::model::shape::Rect;
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::registry::{EntityType, EntityTypeProvider, EntityTypeRegistry};
use crate::repo::events::{ChangeKind, EventBus, RepositoryEvent, SubscriptionId};
use crate::repo::reference_index::ReferenceTarget;
use crate::repo::session::Session;
use crate::store::{
    EntityData, EntityRecord, ProjectSnapshot, Store, CURRENT_FORMAT_VERSION,
};
use log::{debug, error, info, warn};
use std::time::Instant;
use uuid::Uuid;

const MAX_LOGGED_NAME_CHARS: usize = 64;

/// Persistence facade over one project.
pub struct ProjectRepository<S: Store> {
    pub(crate) store: S,
    pub(crate) options: RepositoryOptions,
    pub(crate) registry: EntityTypeRegistry,
    pub(crate) events: EventBus,
    pub(crate) session: Option<Session>,
}

impl<S: Store> ProjectRepository<S> {
    /// Creates a closed repository over `store` with default options.
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: RepositoryOptions::default(),
            registry: EntityTypeRegistry::new(),
            events: EventBus::new(),
            session: None,
        }
    }

    /// Creates a closed repository after validating `options`.
    pub fn with_options(store: S, options: RepositoryOptions) -> RepoResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            ..Self::new(store)
        })
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// `true` when accepted mutations exist since open, create or save.
    pub fn is_modified(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.tracker.is_modified())
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RepositoryEvent) + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn entity_types(&self) -> &EntityTypeRegistry {
        &self.registry
    }

    pub fn add_entity_type(&mut self, entity_type: EntityType) -> RepoResult<()> {
        let library = entity_type.library.clone();
        self.registry.add_entity_type(entity_type)?;
        self.record_library(&library);
        Ok(())
    }

    /// Registers every type of `provider`; earlier types stay on failure.
    pub fn register_provider(&mut self, provider: &dyn EntityTypeProvider) -> RepoResult<usize> {
        let result = self.registry.register_provider(provider);
        self.record_library(provider.library_name());
        result
    }

    pub fn remove_entity_type(&mut self, name: &str) -> RepoResult<EntityType> {
        self.registry.remove_entity_type(name)
    }

    pub fn remove_all_entity_types(&mut self) {
        self.registry.remove_all_entity_types();
    }

    /// Adds `library` to the open project's library list. The list is
    /// written by the next save that carries changes; `is_modified` is
    /// left alone.
    fn record_library(&mut self, library: &str) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if library.trim().is_empty()
            || session
                .settings
                .libraries
                .iter()
                .any(|current| current.eq_ignore_ascii_case(library))
        {
            return;
        }
        session.settings.add_library(library);
        let project_id = session.settings.id;
        if let Some(id) = project_id {
            session.touch(EntityCategory::Project, id);
        }
    }

    pub fn exists(&self) -> RepoResult<bool> {
        Ok(self.store.exists()?)
    }

    /// Creates and opens a new project named `name`.
    ///
    /// # Errors
    /// - `Argument` when a project is already open or `name` is blank.
    /// - `Storage` when the store already holds a project.
    pub fn create(&mut self, name: &str) -> RepoResult<()> {
        if self.session.is_some() {
            return Err(RepoError::Argument("a project is already open".to_string()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(RepoError::Argument("project name must not be blank".to_string()));
        }

        let started_at = Instant::now();
        info!("event=project_create module=repo status=start");

        let mut settings = ProjectSettings::new(name, CURRENT_FORMAT_VERSION);
        settings.id = Some(Uuid::new_v4());
        for entity_type in self.registry.iter() {
            settings.add_library(&entity_type.library);
        }
        let key = settings.id.map(|id| id.to_string()).unwrap_or_default();
        let record = EntityRecord {
            key,
            diagram_id: None,
            state: EntityState::Active,
            data: EntityData::Project(settings.clone()),
        };

        let persisted = self.store.create().and_then(|()| {
            self.store
                .save_changes(CURRENT_FORMAT_VERSION, std::slice::from_ref(&record))
        });
        if let Err(err) = persisted {
            error!(
                "event=project_create module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }

        self.session = Some(Session::new(
            settings.clone(),
            CURRENT_FORMAT_VERSION,
            &self.options,
        ));
        info!(
            "event=project_create module=repo status=ok duration_ms={} name={}",
            started_at.elapsed().as_millis(),
            sanitize_message(name, MAX_LOGGED_NAME_CHARS)
        );
        self.events.publish(RepositoryEvent::Project {
            kind: ChangeKind::Inserted,
            settings,
        });
        Ok(())
    }

    /// Opens the stored project.
    ///
    /// # Errors
    /// - `NotFound` when the snapshot uses an unregistered entity type.
    /// - `Storage` when the store has no project or fails.
    pub fn open(&mut self) -> RepoResult<()> {
        if self.session.is_some() {
            return Err(RepoError::Argument("a project is already open".to_string()));
        }

        let started_at = Instant::now();
        info!("event=project_open module=repo status=start");

        let snapshot = match self.store.open() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(
                    "event=project_open module=repo status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        let session = self
            .check_snapshot_types(&snapshot)
            .and_then(|()| Session::from_snapshot(snapshot, &self.options));
        let mut session = match session {
            Ok(session) => session,
            Err(err) => {
                self.store.close();
                warn!(
                    "event=project_open module=repo status=rejected duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        if !self.options.lazy_shape_loading {
            let diagram_ids: Vec<EntityId> = session.diagrams.keys().copied().collect();
            for diagram_id in diagram_ids {
                let batch = match self.store.load_diagram_shapes(diagram_id, &[]) {
                    Ok(batch) => batch,
                    Err(err) => {
                        self.store.close();
                        error!(
                            "event=project_open module=repo status=error stage=eager_load duration_ms={} error={}",
                            started_at.elapsed().as_millis(),
                            err
                        );
                        return Err(err.into());
                    }
                };
                if let Err(err) =
                    absorb_batch(&mut session, diagram_id, batch.records, batch.complete)
                {
                    self.store.close();
                    return Err(err);
                }
            }
        }

        info!(
            "event=project_open module=repo status=ok duration_ms={} version={} diagrams={} loaded_shapes={}",
            started_at.elapsed().as_millis(),
            session.version,
            session.diagrams.len(),
            session.shapes.len()
        );
        self.session = Some(session);
        Ok(())
    }

    /// Closes the project; unsaved changes are discarded.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if session.tracker.is_modified() {
                warn!(
                    "event=project_close module=repo status=discarded touched={}",
                    session.tracker.touched_count()
                );
            }
        }
        self.store.close();
        info!("event=project_close module=repo status=ok");
    }

    /// Closes and removes the stored project.
    pub fn erase(&mut self) -> RepoResult<()> {
        let started_at = Instant::now();
        self.session = None;
        self.store.close();
        if let Err(err) = self.store.erase() {
            error!(
                "event=project_erase module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
        info!(
            "event=project_erase module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Sends every touched record to the store in one call.
    pub fn save_changes(&mut self) -> RepoResult<()> {
        let started_at = Instant::now();
        let session = self.session.as_ref().ok_or(RepoError::NotOpen)?;
        if !session.tracker.is_modified() {
            debug!("event=project_save module=repo status=skipped reason=clean");
            return Ok(());
        }

        let records: Vec<EntityRecord> = session
            .tracker
            .touched()
            .filter_map(|key| session.record(key))
            .collect();
        let version = session.version;
        info!(
            "event=project_save module=repo status=start records={}",
            records.len()
        );

        if let Err(err) = self.store.save_changes(version, &records) {
            error!(
                "event=project_save module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }

        if let Some(session) = self.session.as_mut() {
            session.tracker.reset();
        }
        info!(
            "event=project_save module=repo status=ok duration_ms={} records={}",
            started_at.elapsed().as_millis(),
            records.len()
        );
        Ok(())
    }

    /// Saves pending changes, then purges soft-deleted entities.
    ///
    /// Returns the number of records the store removed.
    pub fn compact(&mut self) -> RepoResult<usize> {
        if self.session.is_none() {
            return Err(RepoError::NotOpen);
        }
        self.save_changes()?;

        let started_at = Instant::now();
        let purged = match self.store.compact() {
            Ok(purged) => purged,
            Err(err) => {
                error!(
                    "event=project_compact module=repo status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };
        let dropped = self
            .session
            .as_mut()
            .map_or(0, |session| session.purge_soft_deleted());
        info!(
            "event=project_compact module=repo status=ok duration_ms={} purged={} dropped_in_memory={}",
            started_at.elapsed().as_millis(),
            purged,
            dropped
        );
        Ok(purged)
    }

    pub fn get_project(&self) -> RepoResult<ProjectSettings> {
        Ok(self.session()?.settings.clone())
    }

    /// Replaces name, description and libraries of the project settings.
    pub fn update_project(&mut self, settings: &ProjectSettings) -> RepoResult<()> {
        let session = self.session_mut()?;
        if settings.id != session.settings.id {
            return Err(RepoError::not_found(
                "project",
                settings
                    .id
                    .map_or_else(|| "uninserted".to_string(), |id| id.to_string()),
            ));
        }
        let version = session.version;
        session.settings = ProjectSettings {
            version,
            ..settings.clone()
        };
        let updated = session.settings.clone();
        if let Some(id) = updated.id {
            session.mark(EntityCategory::Project, id);
        }
        debug!("event=project_update module=repo status=ok");
        self.events.publish(RepositoryEvent::Project {
            kind: ChangeKind::Updated,
            settings: updated,
        });
        Ok(())
    }

    pub fn version(&self) -> RepoResult<i32> {
        Ok(self.session()?.version)
    }

    /// Changes the format version written by the next save.
    ///
    /// # Errors
    /// - `VersionLocked` when the store does not allow version changes.
    pub fn set_version(&mut self, version: i32) -> RepoResult<()> {
        if !self.store.can_modify_version() {
            return Err(RepoError::VersionLocked);
        }
        let session = self.session_mut()?;
        if session.version == version {
            return Ok(());
        }
        session.version = version;
        session.settings.version = version;
        let settings = session.settings.clone();
        if let Some(id) = settings.id {
            session.mark(EntityCategory::Project, id);
        }
        debug!("event=project_version module=repo status=ok version={version}");
        self.events.publish(RepositoryEvent::Project {
            kind: ChangeKind::Updated,
            settings,
        });
        Ok(())
    }

    /// Reads the stored version without opening the project.
    pub fn read_version(&self) -> RepoResult<i32> {
        Ok(self.store.read_version()?)
    }

    pub(crate) fn session(&self) -> RepoResult<&Session> {
        self.session.as_ref().ok_or(RepoError::NotOpen)
    }

    pub(crate) fn session_mut(&mut self) -> RepoResult<&mut Session> {
        self.session.as_mut().ok_or(RepoError::NotOpen)
    }

    /// Materializes diagram shapes. A no-op once the diagram is complete.
    pub(crate) fn load_diagram(
        &mut self,
        diagram_id: EntityId,
        regions: &[Rect],
    ) -> RepoResult<()> {
        let session = self.session()?;
        if !session.diagrams.contains_key(&diagram_id) {
            return Err(RepoError::not_found("diagram", diagram_id));
        }
        if session.loaded_diagrams.contains(&diagram_id) {
            return Ok(());
        }

        let started_at = Instant::now();
        let batch = match self.store.load_diagram_shapes(diagram_id, regions) {
            Ok(batch) => batch,
            Err(err) => {
                error!(
                    "event=shape_load module=repo status=error diagram={} duration_ms={} error={}",
                    diagram_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };
        let count = batch.records.len();
        let complete = batch.complete;
        let session = self.session_mut()?;
        absorb_batch(session, diagram_id, batch.records, complete)?;
        info!(
            "event=shape_load module=repo status=ok diagram={} duration_ms={} records={} regions={} complete={}",
            diagram_id,
            started_at.elapsed().as_millis(),
            count,
            regions.len(),
            complete
        );
        Ok(())
    }

    /// Loads the whole diagram that owns `shape_id`, if any.
    pub(crate) fn load_shape_diagram(&mut self, shape_id: EntityId) -> RepoResult<()> {
        let session = self.session()?;
        let diagram_id = session
            .shape_diagram(shape_id)
            .or_else(|| session.summary_diagrams.get(&shape_id).copied());
        match diagram_id {
            Some(diagram_id) => self.load_diagram(diagram_id, &[]),
            None => Ok(()),
        }
    }

    /// Checks that every type used by the snapshot is registered.
    fn check_snapshot_types(&self, snapshot: &ProjectSnapshot) -> RepoResult<()> {
        for record in &snapshot.records {
            match &record.data {
                EntityData::Shape(shape) => {
                    self.registry
                        .require(&shape.type_name, EntityCategory::Shape)?;
                }
                EntityData::ModelObject(object) => {
                    self.registry
                        .require(&object.type_name, EntityCategory::ModelObject)?;
                }
                EntityData::DiagramModelObject(object) => {
                    self.registry
                        .require(&object.type_name, EntityCategory::DiagramModelObject)?;
                }
                _ => {}
            }
        }
        for summary in &snapshot.shape_summaries {
            for target in &summary.references {
                if let ReferenceTarget::ShapeType(name) = target {
                    self.registry.require(name, EntityCategory::Shape)?;
                }
            }
        }
        Ok(())
    }
}

/// Rejects entities that already carry an identity.
pub(crate) fn ensure_uninserted(id: Option<EntityId>, what: &'static str) -> RepoResult<()> {
    match id {
        Some(id) => Err(RepoError::AlreadyInserted { what, id }),
        None => Ok(()),
    }
}

/// Adds loaded records to the session; in-memory copies win.
fn absorb_batch(
    session: &mut Session,
    diagram_id: EntityId,
    records: Vec<EntityRecord>,
    complete: bool,
) -> RepoResult<()> {
    for record in records {
        session.absorb(record)?;
    }
    if complete {
        session.loaded_diagrams.insert(diagram_id);
    }
    Ok(())
}
