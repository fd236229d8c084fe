//! Shape connection edges.
//!
//! # Invariants
//! - The connector's glue point carries `Glue`.
//! - The target's point carries `Connect`.
//! - Both checks run at construction; a constructed value is always valid.

use crate::error::{RepoError, RepoResult};
use crate::model::shape::{ControlPointCapability, ControlPointId, Shape};
use crate::model::EntityId;
use serde::{Deserialize, Serialize};

/// Connection key: one glue point holds at most one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub connector_shape: EntityId,
    pub glue_point_id: ControlPointId,
}

impl ConnectionKey {
    /// Storage key text, `"<connector uuid>/<glue point id>"`.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.connector_shape, self.glue_point_id)
    }
}

/// Edge gluing one connector point onto a target shape point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeConnection {
    pub connector_shape: EntityId,
    pub glue_point_id: ControlPointId,
    pub target_shape: EntityId,
    pub target_point_id: ControlPointId,
}

impl ShapeConnection {
    /// Builds a connection after validating identities and capabilities.
    ///
    /// # Errors
    /// - `Argument` when either shape is uninserted or a point id is unknown.
    /// - `ConnectionCapability` when Glue/Connect capabilities are missing.
    pub fn new(
        connector: &Shape,
        glue_point_id: ControlPointId,
        target: &Shape,
        target_point_id: ControlPointId,
    ) -> RepoResult<Self> {
        let connector_shape = connector
            .id
            .ok_or_else(|| RepoError::Argument("connector shape is not inserted".to_string()))?;
        let target_shape = target
            .id
            .ok_or_else(|| RepoError::Argument("target shape is not inserted".to_string()))?;
        if connector_shape == target_shape {
            return Err(RepoError::Argument(
                "a shape cannot be connected to itself".to_string(),
            ));
        }

        require_capability(connector, glue_point_id, ControlPointCapability::Glue)?;
        require_capability(target, target_point_id, ControlPointCapability::Connect)?;

        Ok(Self {
            connector_shape,
            glue_point_id,
            target_shape,
            target_point_id,
        })
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            connector_shape: self.connector_shape,
            glue_point_id: self.glue_point_id,
        }
    }

    pub fn involves(&self, shape_id: EntityId) -> bool {
        self.connector_shape == shape_id || self.target_shape == shape_id
    }
}

fn require_capability(
    shape: &Shape,
    point_id: ControlPointId,
    required: ControlPointCapability,
) -> RepoResult<()> {
    let point = shape.require_control_point(point_id)?;
    if !point.has_capability(required) {
        return Err(RepoError::ConnectionCapability {
            shape: shape.id,
            point: point_id,
            required,
        });
    }
    Ok(())
}
