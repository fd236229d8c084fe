//! Design: a named collection of styles.

use crate::model::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    pub id: Option<EntityId>,
    pub name: String,
    pub title: String,
    pub description: String,
}

impl Design {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            title: name.clone(),
            name,
            description: String::new(),
        }
    }
}
