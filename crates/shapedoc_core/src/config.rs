//! Repository options.
//!
//! # Invariants
//! - `z_order_step` is strictly positive.
//! - Missing JSON fields fall back to [`RepositoryOptions::default`].

use crate::error::{RepoError, RepoResult};
use crate::logging::normalize_level;
use serde::{Deserialize, Serialize};

const DEFAULT_INITIAL_Z_ORDER: i32 = 0;
const DEFAULT_Z_ORDER_STEP: i32 = 1;

/// Tunables for one `ProjectRepository` instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    /// Pivot used when a diagram has no shapes yet.
    pub initial_z_order: i32,
    /// Distance between consecutive allocated z-order values.
    pub z_order_step: i32,
    /// Defer diagram shape materialization until first request.
    pub lazy_shape_loading: bool,
    /// Optional log level handed to `init_logging` by embedding hosts.
    pub log_level: Option<String>,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            initial_z_order: DEFAULT_INITIAL_Z_ORDER,
            z_order_step: DEFAULT_Z_ORDER_STEP,
            lazy_shape_loading: true,
            log_level: None,
        }
    }
}

impl RepositoryOptions {
    /// Parses options from JSON and validates them.
    pub fn from_json_str(raw: &str) -> RepoResult<Self> {
        let options: Self = serde_json::from_str(raw)
            .map_err(|err| RepoError::Argument(format!("invalid repository options: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> RepoResult<()> {
        if self.z_order_step <= 0 {
            return Err(RepoError::Argument(format!(
                "z_order_step must be positive, got {}",
                self.z_order_step
            )));
        }
        if let Some(level) = self.log_level.as_deref() {
            normalize_level(level).map_err(|_| RepoError::UnsupportedValue {
                what: "log level",
                value: level.to_string(),
            })?;
        }
        Ok(())
    }
}
