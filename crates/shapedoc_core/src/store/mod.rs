//! Storage backend contract.
//!
//! # Responsibility
//! - Define the boundary between the in-memory repository and a backend.
//! - Carry entity records and shape metadata across that boundary.
//!
//! # Invariants
//! - Only `Store` methods perform I/O; the repository never retries them.
//! - `open` returns every record except diagram-owned shapes and
//!   connections, plus one `ShapeSummary` per diagram shape.
//! - `save_changes` upserts records keyed by `EntityRecord::key`.

use crate::db::DbError;
use crate::model::connection::ShapeConnection;
use crate::model::design::Design;
use crate::model::diagram::Diagram;
use crate::model::model_object::{DiagramModelObject, Model, ModelObject};
use crate::model::project::ProjectSettings;
use crate::model::shape::{Rect, Shape, ShapeOwner};
use crate::model::style::Style;
use crate::model::template::{ModelMapping, Template};
use crate::model::{EntityCategory, EntityId, EntityState};
use crate::repo::reference_index::{shape_references, ReferenceTarget};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Initial storage format version written by the bundled stores.
pub const CURRENT_FORMAT_VERSION: i32 = 1;

pub type StoreResult<T> = Result<T, StoreError>;

/// Backend failure.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite bootstrap or query failure.
    Db(DbError),
    /// Payload could not be encoded or decoded.
    Serialization(serde_json::Error),
    /// Project file could not be removed or inspected.
    Io(std::io::Error),
    /// No project exists at the store location.
    ProjectNotFound(String),
    /// `create` called where a project already exists.
    ProjectExists(String),
    /// Operation requires an open store.
    NotConnected,
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "record serialization failed: {err}"),
            Self::Io(err) => write!(f, "project file access failed: {err}"),
            Self::ProjectNotFound(location) => write!(f, "project not found at {location}"),
            Self::ProjectExists(location) => write!(f, "project already exists at {location}"),
            Self::NotConnected => write!(f, "store is not connected"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Serialized entity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "value", rename_all = "snake_case")]
pub enum EntityData {
    Project(ProjectSettings),
    Design(Design),
    Style {
        design_id: EntityId,
        style: Style,
    },
    Model(Model),
    ModelObject(ModelObject),
    DiagramModelObject(DiagramModelObject),
    Template(Template),
    ModelMapping(ModelMapping),
    Diagram(Diagram),
    Shape(Shape),
    Connection(ShapeConnection),
}

impl EntityData {
    pub fn category(&self) -> EntityCategory {
        match self {
            Self::Project(_) => EntityCategory::Project,
            Self::Design(_) => EntityCategory::Design,
            Self::Style { .. } => EntityCategory::Style,
            Self::Model(_) => EntityCategory::Model,
            Self::ModelObject(_) => EntityCategory::ModelObject,
            Self::DiagramModelObject(_) => EntityCategory::DiagramModelObject,
            Self::Template(_) => EntityCategory::Template,
            Self::ModelMapping(_) => EntityCategory::ModelMapping,
            Self::Diagram(_) => EntityCategory::Diagram,
            Self::Shape(_) => EntityCategory::Shape,
            Self::Connection(_) => EntityCategory::Connection,
        }
    }
}

/// One stored entity with its lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Entity uuid text, or `ConnectionKey::storage_key` for connections.
    pub key: String,
    /// Diagram that owns the record (shapes and connections only).
    pub diagram_id: Option<EntityId>,
    pub state: EntityState,
    pub data: EntityData,
}

impl EntityRecord {
    pub fn category(&self) -> EntityCategory {
        self.data.category()
    }

    /// Metadata summary for diagram shapes; `None` for other records.
    pub fn shape_summary(&self) -> Option<ShapeSummary> {
        let EntityData::Shape(shape) = &self.data else {
            return None;
        };
        let diagram_id = self.diagram_id?;
        Some(ShapeSummary {
            id: shape.id?,
            diagram_id,
            z_order: shape.z_order,
            state: self.state,
            references: shape_references(shape),
        })
    }
}

/// Shape metadata available without materializing the shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSummary {
    pub id: EntityId,
    pub diagram_id: EntityId,
    pub z_order: i32,
    pub state: EntityState,
    pub references: Vec<ReferenceTarget>,
}

/// Result of `Store::open`.
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub version: i32,
    pub records: Vec<EntityRecord>,
    pub shape_summaries: Vec<ShapeSummary>,
}

/// Result of `Store::load_diagram_shapes`.
#[derive(Debug, Clone, Default)]
pub struct ShapeBatch {
    /// Shape and connection records.
    pub records: Vec<EntityRecord>,
    /// `true` when every shape of the diagram is included.
    pub complete: bool,
}

/// Selects the shapes of one diagram that fall into `regions`.
///
/// Region containment is tested on root shapes (owned by the diagram);
/// child shapes follow their root. Connections are kept when both ends are
/// selected. An empty `regions` slice selects everything.
pub(crate) fn select_regions(records: Vec<EntityRecord>, regions: &[Rect]) -> ShapeBatch {
    if regions.is_empty() {
        return ShapeBatch {
            records,
            complete: true,
        };
    }

    let mut parents = BTreeMap::new();
    let mut roots_in_region = BTreeSet::new();
    for record in &records {
        let EntityData::Shape(shape) = &record.data else {
            continue;
        };
        let Some(id) = shape.id else {
            continue;
        };
        match shape.owner {
            Some(ShapeOwner::Shape(parent)) => {
                parents.insert(id, parent);
            }
            _ => {
                if regions.iter().any(|region| region.contains(shape.x, shape.y)) {
                    roots_in_region.insert(id);
                }
            }
        }
    }

    let root_of = |mut id: EntityId| {
        // Bounded walk; owner cycles are rejected on update.
        for _ in 0..=parents.len() {
            match parents.get(&id) {
                Some(parent) => id = *parent,
                None => break,
            }
        }
        id
    };

    let mut selected_shapes = BTreeSet::new();
    let mut total_shapes = 0usize;
    for record in &records {
        if let EntityData::Shape(Shape { id: Some(id), .. }) = &record.data {
            total_shapes += 1;
            if roots_in_region.contains(&root_of(*id)) {
                selected_shapes.insert(*id);
            }
        }
    }

    let complete = selected_shapes.len() == total_shapes;
    let records = records
        .into_iter()
        .filter(|record| match &record.data {
            EntityData::Shape(shape) => shape
                .id
                .is_some_and(|id| selected_shapes.contains(&id)),
            EntityData::Connection(connection) => {
                selected_shapes.contains(&connection.connector_shape)
                    && selected_shapes.contains(&connection.target_shape)
            }
            _ => false,
        })
        .collect();

    ShapeBatch { records, complete }
}

/// `true` for shapes and connections owned by a diagram, which `open` skips.
pub(crate) fn is_lazy_record(record: &EntityRecord) -> bool {
    record.diagram_id.is_some()
        && matches!(
            record.category(),
            EntityCategory::Shape | EntityCategory::Connection
        )
}

/// Contract implemented by concrete backends.
pub trait Store {
    /// Human-readable location used in logs and errors.
    fn location(&self) -> String;
    fn exists(&self) -> StoreResult<bool>;
    /// Creates an empty project; fails with `ProjectExists` if one is present.
    fn create(&mut self) -> StoreResult<()>;
    fn open(&mut self) -> StoreResult<ProjectSnapshot>;
    fn close(&mut self);
    /// Removes the project and every record.
    fn erase(&mut self) -> StoreResult<()>;
    /// Reads the stored format version without opening the project.
    fn read_version(&self) -> StoreResult<i32>;
    fn can_modify_version(&self) -> bool;
    /// Loads diagram shapes; `regions` is a hint the backend may ignore.
    fn load_diagram_shapes(
        &mut self,
        diagram_id: EntityId,
        regions: &[Rect],
    ) -> StoreResult<ShapeBatch>;
    /// Persists `records` and the format version as one unit.
    fn save_changes(&mut self, version: i32, records: &[EntityRecord]) -> StoreResult<()>;
    /// Physically removes soft-deleted records; returns the purge count.
    fn compact(&mut self) -> StoreResult<usize>;
}
