//! Project settings root singleton.

use crate::model::EntityId;
use serde::{Deserialize, Serialize};

/// Root record of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub id: Option<EntityId>,
    pub name: String,
    pub description: String,
    /// Storage format version the project was last written with.
    pub version: i32,
    /// Names of entity-type libraries the project depends on.
    pub libraries: Vec<String>,
}

impl ProjectSettings {
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            version,
            libraries: Vec::new(),
        }
    }

    /// Records a library name once, case-insensitively.
    pub fn add_library(&mut self, library: &str) {
        let exists = self
            .libraries
            .iter()
            .any(|current| current.eq_ignore_ascii_case(library));
        if !exists {
            self.libraries.push(library.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProjectSettings;

    #[test]
    fn add_library_deduplicates_case_insensitively() {
        let mut settings = ProjectSettings::new("Demo", 1);
        settings.add_library("GeneralShapes");
        settings.add_library("generalshapes");
        settings.add_library("Flowchart");
        assert_eq!(settings.libraries, vec!["GeneralShapes", "Flowchart"]);
    }
}
