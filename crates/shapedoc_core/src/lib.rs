//! Persistence core for a graphical-document editor.
//! This crate owns project consistency: identities, ownership, soft-delete
//! state and change notification.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod registry;
pub mod repo;
pub mod store;

pub use config::RepositoryOptions;
pub use error::{RepoError, RepoResult};
pub use logging::{default_log_level, init_logging, init_logging_with_options, logging_status};
pub use model::connection::{ConnectionKey, ShapeConnection};
pub use model::design::Design;
pub use model::diagram::Diagram;
pub use model::model_object::{DiagramModelObject, Model, ModelObject, ModelObjectOwner};
pub use model::project::ProjectSettings;
pub use model::shape::{
    ControlPoint, ControlPointCapability, ControlPointId, Rect, Shape, ShapeOwner, ShapeStyles,
};
pub use model::style::{
    CharacterStyle, ColorStyle, ContentAlignment, FillMode, FillStyle, HasAlignment, HasColor,
    LineStyle, ParagraphStyle, Rgba, Style, StyleKind,
};
pub use model::template::{MappingKind, ModelMapping, StyleRange, Template};
pub use model::{EntityCategory, EntityId, EntityState};
pub use registry::{EntityFactory, EntityType, EntityTypeProvider, EntityTypeRegistry};
pub use repo::{
    ChangeKind, PendingConnection, ProjectRepository, ReferenceTarget, RepositoryEvent,
    SubscriptionId,
};
pub use store::{
    EntityData, EntityRecord, MemoryStore, ProjectSnapshot, ShapeBatch, ShapeSummary,
    SqliteStore, Store, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
