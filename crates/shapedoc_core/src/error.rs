//! Repository error taxonomy.
//!
//! # Invariants
//! - Validation errors are raised before any in-memory mutation.
//! - `Storage` is the only variant produced by backend I/O.

use crate::model::shape::{ControlPointCapability, ControlPointId};
use crate::model::EntityId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors returned by registry, model construction and repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Null-like or out-of-range argument.
    Argument(String),
    /// Entity already carries an identity.
    AlreadyInserted { what: &'static str, id: EntityId },
    /// Entity, entity type or relation unknown to the repository.
    NotFound { what: &'static str, key: String },
    /// Entity type name already registered (case-insensitive).
    DuplicateName(String),
    /// Control point lacks the capability a connection requires.
    ConnectionCapability {
        shape: Option<EntityId>,
        point: ControlPointId,
        required: ControlPointCapability,
    },
    /// Enumerated value without a mapped handling.
    UnsupportedValue { what: &'static str, value: String },
    /// Owner kind is not permitted for the entity.
    InvalidOwner {
        what: &'static str,
        owner: &'static str,
    },
    /// No project is open.
    NotOpen,
    /// Store does not allow changing the format version.
    VersionLocked,
    /// Backend failure during open/create/save/erase/load.
    Storage(StoreError),
}

impl RepoError {
    pub(crate) fn not_found(what: &'static str, key: impl Display) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argument(message) => write!(f, "invalid argument: {message}"),
            Self::AlreadyInserted { what, id } => write!(f, "{what} already inserted: {id}"),
            Self::NotFound { what, key } => write!(f, "{what} not found: {key}"),
            Self::DuplicateName(name) => write!(f, "entity type already registered: {name}"),
            Self::ConnectionCapability {
                shape,
                point,
                required,
            } => match shape {
                Some(shape) => write!(
                    f,
                    "control point {point} of shape {shape} lacks capability `{}`",
                    required.as_str()
                ),
                None => write!(
                    f,
                    "control point {point} lacks capability `{}`",
                    required.as_str()
                ),
            },
            Self::UnsupportedValue { what, value } => {
                write!(f, "unsupported {what} value: {value}")
            }
            Self::InvalidOwner { what, owner } => {
                write!(f, "{owner} is not a permitted owner for {what}")
            }
            Self::NotOpen => write!(f, "repository is not open"),
            Self::VersionLocked => write!(f, "store does not allow modifying the version"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

#[cfg(test)]
mod tests {
    use super::RepoError;
    use crate::model::shape::ControlPointCapability;
    use crate::store::StoreError;
    use std::error::Error;

    #[test]
    fn display_names_entity_and_key() {
        let err = RepoError::not_found("diagram", "Sheet1");
        assert_eq!(err.to_string(), "diagram not found: Sheet1");
    }

    #[test]
    fn capability_error_mentions_required_capability() {
        let err = RepoError::ConnectionCapability {
            shape: None,
            point: 3,
            required: ControlPointCapability::Glue,
        };
        assert!(err.to_string().contains("glue"));
    }

    #[test]
    fn storage_error_exposes_source() {
        let err = RepoError::from(StoreError::ProjectNotFound("memory".to_string()));
        assert!(err.source().is_some());
    }
}
