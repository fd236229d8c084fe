//! Project repository: bookkeeping components and the category facade.
//!
//! # Responsibility
//! - Track dirty state, z-order watermarks and references of the open graph.
//! - Expose CRUD, soft-delete and undelete per entity category.
//! - Publish one typed event per affected category and operation.
//!
//! # Invariants
//! - The in-memory graph is updated before an event is published.
//! - Repository-level batches are not atomic; the applied prefix stays.
//!
//! # See also
//! - `store` for the persistence contract behind the facade.

pub mod change_tracker;
mod designs;
pub mod diagrams;
pub mod events;
mod models;
pub mod reference_index;
pub mod repository;
mod session;
mod shapes;
mod templates;
pub mod zorder;

pub use change_tracker::{ChangeTracker, RecordKey};
pub use diagrams::PendingConnection;
pub use events::{ChangeKind, EventBus, RepositoryEvent, SubscriptionId};
pub use reference_index::{ReferenceIndex, ReferenceTarget, Referrer};
pub use repository::ProjectRepository;
pub use zorder::ZOrderAllocator;
