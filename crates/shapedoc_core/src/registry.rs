//! Entity type registry.
//!
//! # Responsibility
//! - Map case-insensitive type names to entity-type descriptors.
//! - Create fresh shape/model-object instances through registered factories.
//!
//! # Invariants
//! - Names are unique ignoring ASCII case.
//! - Lookups are exact (case-insensitive), never prefix or partial matches.
//! - Registration is explicit; there is no runtime type discovery.

use crate::error::{RepoError, RepoResult};
use crate::model::model_object::{DiagramModelObject, ModelObject};
use crate::model::shape::{ControlPoint, Shape};
use crate::model::EntityCategory;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

static TYPE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_. -]*$").expect("valid type name regex"));

/// Factory capability attached to a descriptor.
#[derive(Clone)]
pub enum EntityFactory {
    Shape(Arc<dyn Fn(&EntityType) -> Shape + Send + Sync>),
    ModelObject(Arc<dyn Fn(&EntityType) -> ModelObject + Send + Sync>),
    DiagramModelObject(Arc<dyn Fn(&EntityType) -> DiagramModelObject + Send + Sync>),
}

impl Debug for EntityFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Shape(_) => "Shape",
            Self::ModelObject(_) => "ModelObject",
            Self::DiagramModelObject(_) => "DiagramModelObject",
        };
        write!(f, "EntityFactory::{kind}")
    }
}

/// Descriptor of one registered entity kind.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub library: String,
    pub category: EntityCategory,
    factory: Option<EntityFactory>,
}

impl EntityType {
    /// Descriptor without a factory.
    pub fn new(
        name: impl Into<String>,
        library: impl Into<String>,
        category: EntityCategory,
    ) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            category,
            factory: None,
        }
    }

    /// Shape type whose instances carry a copy of `control_points` and
    /// `caption_count` empty captions.
    pub fn shape(
        name: impl Into<String>,
        library: impl Into<String>,
        control_points: Vec<ControlPoint>,
        caption_count: usize,
    ) -> Self {
        let mut descriptor = Self::new(name, library, EntityCategory::Shape);
        descriptor.factory = Some(EntityFactory::Shape(Arc::new(move |entity_type| {
            let mut shape =
                Shape::new(entity_type.name.clone()).with_control_points(control_points.clone());
            shape.captions = vec![String::new(); caption_count];
            shape
        })));
        descriptor
    }

    pub fn model_object(name: impl Into<String>, library: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name, library, EntityCategory::ModelObject);
        descriptor.factory = Some(EntityFactory::ModelObject(Arc::new(|entity_type| {
            ModelObject::new(entity_type.name.clone(), String::new())
        })));
        descriptor
    }

    pub fn diagram_model_object(name: impl Into<String>, library: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name, library, EntityCategory::DiagramModelObject);
        descriptor.factory = Some(EntityFactory::DiagramModelObject(Arc::new(
            |entity_type| DiagramModelObject::new(entity_type.name.clone(), String::new()),
        )));
        descriptor
    }

    /// Replaces the factory (custom providers).
    pub fn with_factory(mut self, factory: EntityFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Creates a fresh, uninserted shape instance.
    ///
    /// # Errors
    /// - `Argument` when the descriptor has no shape factory.
    pub fn create_shape(&self) -> RepoResult<Shape> {
        match &self.factory {
            Some(EntityFactory::Shape(factory)) => Ok(factory(self)),
            _ => Err(self.no_factory("shape")),
        }
    }

    pub fn create_model_object(&self) -> RepoResult<ModelObject> {
        match &self.factory {
            Some(EntityFactory::ModelObject(factory)) => Ok(factory(self)),
            _ => Err(self.no_factory("model object")),
        }
    }

    pub fn create_diagram_model_object(&self) -> RepoResult<DiagramModelObject> {
        match &self.factory {
            Some(EntityFactory::DiagramModelObject(factory)) => Ok(factory(self)),
            _ => Err(self.no_factory("diagram model object")),
        }
    }

    fn no_factory(&self, kind: &str) -> RepoError {
        RepoError::Argument(format!(
            "entity type `{}` has no {kind} factory",
            self.name
        ))
    }
}

/// Source of a set of entity types, e.g. one extension library.
pub trait EntityTypeProvider {
    fn library_name(&self) -> &str;
    fn entity_types(&self) -> Vec<EntityType>;
}

/// Case-insensitive name -> descriptor registry.
#[derive(Debug, Default)]
pub struct EntityTypeRegistry {
    entries: BTreeMap<String, EntityType>,
}

impl EntityTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one descriptor.
    ///
    /// # Errors
    /// - `Argument` when the name is blank or malformed.
    /// - `DuplicateName` when the name exists ignoring case.
    pub fn add_entity_type(&mut self, entity_type: EntityType) -> RepoResult<()> {
        if !TYPE_NAME_RE.is_match(&entity_type.name) {
            return Err(RepoError::Argument(format!(
                "invalid entity type name `{}`",
                entity_type.name
            )));
        }
        let key = normalize_name(&entity_type.name);
        if self.entries.contains_key(&key) {
            return Err(RepoError::DuplicateName(entity_type.name));
        }
        debug!(
            "event=entity_type_add module=registry status=ok name={} category={}",
            entity_type.name, entity_type.category
        );
        self.entries.insert(key, entity_type);
        Ok(())
    }

    /// Registers every type of `provider` in order.
    ///
    /// Types added before a failing one remain registered.
    pub fn register_provider(&mut self, provider: &dyn EntityTypeProvider) -> RepoResult<usize> {
        let mut added = 0;
        for entity_type in provider.entity_types() {
            self.add_entity_type(entity_type)?;
            added += 1;
        }
        debug!(
            "event=provider_register module=registry status=ok library={} count={}",
            provider.library_name(),
            added
        );
        Ok(added)
    }

    /// Removes one descriptor by name.
    ///
    /// # Errors
    /// - `NotFound` when no descriptor matches.
    pub fn remove_entity_type(&mut self, name: &str) -> RepoResult<EntityType> {
        self.entries
            .remove(&normalize_name(name))
            .ok_or_else(|| RepoError::not_found("entity type", name))
    }

    /// Clears the registry unconditionally.
    pub fn remove_all_entity_types(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.entries.get(&normalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_name(name))
    }

    /// Looks up a descriptor and checks its category.
    pub fn require(&self, name: &str, category: EntityCategory) -> RepoResult<&EntityType> {
        match self.get(name) {
            Some(entity_type) if entity_type.category == category => Ok(entity_type),
            _ => Err(RepoError::not_found(category_type_label(category), name)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors of one category, sorted by normalized name.
    pub fn list_by_category(&self, category: EntityCategory) -> Vec<&EntityType> {
        self.entries
            .values()
            .filter(|entity_type| entity_type.category == category)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityType> {
        self.entries.values()
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn category_type_label(category: EntityCategory) -> &'static str {
    match category {
        EntityCategory::Shape => "shape type",
        EntityCategory::ModelObject => "model object type",
        EntityCategory::DiagramModelObject => "diagram model object type",
        _ => "entity type",
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityType, EntityTypeProvider, EntityTypeRegistry};
    use crate::error::RepoError;
    use crate::model::shape::{ControlPoint, ControlPointCapability};
    use crate::model::EntityCategory;

    struct GeneralShapes;

    impl EntityTypeProvider for GeneralShapes {
        fn library_name(&self) -> &str {
            "GeneralShapes"
        }

        fn entity_types(&self) -> Vec<EntityType> {
            vec![
                EntityType::shape("Box", "GeneralShapes", vec![], 1),
                EntityType::shape("Circle", "GeneralShapes", vec![], 1),
                EntityType::model_object("GenericModelObject", "GeneralShapes"),
            ]
        }
    }

    #[test]
    fn rejects_names_differing_only_by_case() {
        let mut registry = EntityTypeRegistry::new();
        registry
            .add_entity_type(EntityType::shape("Box", "lib", vec![], 0))
            .expect("first registration");
        let err = registry
            .add_entity_type(EntityType::shape("BOX", "lib", vec![], 0))
            .expect_err("case-insensitive duplicate must fail");
        assert!(matches!(err, RepoError::DuplicateName(name) if name == "BOX"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_is_case_insensitive_and_exact() {
        let mut registry = EntityTypeRegistry::new();
        registry
            .register_provider(&GeneralShapes)
            .expect("provider registration");
        assert!(registry.get("box").is_some());
        assert!(registry.get("CIRCLE").is_some());
        assert!(registry.get("Bo").is_none());
        assert_eq!(registry.list_by_category(EntityCategory::Shape).len(), 2);
    }

    #[test]
    fn remove_unknown_type_is_not_found() {
        let mut registry = EntityTypeRegistry::new();
        let err = registry
            .remove_entity_type("Missing")
            .expect_err("unknown type");
        assert!(matches!(err, RepoError::NotFound { .. }));
    }

    #[test]
    fn remove_all_then_readd_resolves_exactly_one_type() {
        let mut registry = EntityTypeRegistry::new();
        registry
            .register_provider(&GeneralShapes)
            .expect("provider registration");
        registry.remove_all_entity_types();
        assert!(registry.is_empty());

        registry
            .add_entity_type(EntityType::shape("Box", "GeneralShapes", vec![], 1))
            .expect("re-adding a removed name");
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("box"));
        assert!(!registry.contains("circle"));
    }

    #[test]
    fn rejects_malformed_names() {
        let mut registry = EntityTypeRegistry::new();
        for name in ["", "  ", "1Box", "Box/Round"] {
            let err = registry
                .add_entity_type(EntityType::new(name, "lib", EntityCategory::Shape))
                .expect_err("malformed name must fail");
            assert!(matches!(err, RepoError::Argument(_)));
        }
    }

    #[test]
    fn shape_factory_copies_control_points_and_captions() {
        let descriptor = EntityType::shape(
            "Line",
            "GeneralShapes",
            vec![ControlPoint::new(1, [ControlPointCapability::Glue])],
            2,
        );
        let shape = descriptor.create_shape().expect("shape factory");
        assert_eq!(shape.type_name, "Line");
        assert_eq!(shape.captions.len(), 2);
        assert!(shape.id.is_none());
        assert!(shape.control_points[0].has_capability(ControlPointCapability::Glue));
        assert!(descriptor.create_model_object().is_err());
    }

    #[test]
    fn require_checks_category() {
        let mut registry = EntityTypeRegistry::new();
        registry
            .register_provider(&GeneralShapes)
            .expect("provider registration");
        assert!(registry.require("Box", EntityCategory::Shape).is_ok());
        let err = registry
            .require("Box", EntityCategory::ModelObject)
            .expect_err("category mismatch");
        assert!(matches!(err, RepoError::NotFound { what: "model object type", .. }));
    }
}
