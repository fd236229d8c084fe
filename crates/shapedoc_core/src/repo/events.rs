//! Change notifications.
//!
//! # Responsibility
//! - Describe every repository mutation as one typed event.
//! - Deliver events synchronously to subscribers in subscription order.
//!
//! # Invariants
//! - Listeners receive `&RepositoryEvent` only and cannot reach the repository.
//! - An unsubscribed listener is never called again.

use crate::model::connection::ShapeConnection;
use crate::model::design::Design;
use crate::model::diagram::Diagram;
use crate::model::model_object::{DiagramModelObject, Model, ModelObject};
use crate::model::project::ProjectSettings;
use crate::model::shape::Shape;
use crate::model::style::Style;
use crate::model::template::{ModelMapping, Template};
use crate::model::{EntityCategory, EntityId};
use log::debug;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// One notification per category and logical operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    Project {
        kind: ChangeKind,
        settings: ProjectSettings,
    },
    Design {
        kind: ChangeKind,
        designs: Vec<Design>,
    },
    Styles {
        kind: ChangeKind,
        design_id: EntityId,
        styles: Vec<Style>,
    },
    Model {
        kind: ChangeKind,
        model: Model,
    },
    ModelObjects {
        kind: ChangeKind,
        model_objects: Vec<ModelObject>,
    },
    DiagramModelObjects {
        kind: ChangeKind,
        diagram_model_objects: Vec<DiagramModelObject>,
    },
    Template {
        kind: ChangeKind,
        templates: Vec<Template>,
    },
    /// Prototype shape swapped by `replace_template_shape`.
    TemplateShapeReplaced {
        template: Template,
        old_shape: Shape,
        new_shape: Shape,
    },
    ModelMappings {
        kind: ChangeKind,
        template_id: EntityId,
        mappings: Vec<ModelMapping>,
    },
    Diagram {
        kind: ChangeKind,
        diagrams: Vec<Diagram>,
    },
    Shapes {
        kind: ChangeKind,
        /// Owning diagram when every shape of the batch shares one.
        diagram_id: Option<EntityId>,
        shapes: Vec<Shape>,
    },
    Connections {
        kind: ChangeKind,
        connections: Vec<ShapeConnection>,
    },
}

impl RepositoryEvent {
    /// `Updated` for `TemplateShapeReplaced`.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Project { kind, .. }
            | Self::Design { kind, .. }
            | Self::Styles { kind, .. }
            | Self::Model { kind, .. }
            | Self::ModelObjects { kind, .. }
            | Self::DiagramModelObjects { kind, .. }
            | Self::Template { kind, .. }
            | Self::ModelMappings { kind, .. }
            | Self::Diagram { kind, .. }
            | Self::Shapes { kind, .. }
            | Self::Connections { kind, .. } => *kind,
            Self::TemplateShapeReplaced { .. } => ChangeKind::Updated,
        }
    }

    pub fn category(&self) -> EntityCategory {
        match self {
            Self::Project { .. } => EntityCategory::Project,
            Self::Design { .. } => EntityCategory::Design,
            Self::Styles { .. } => EntityCategory::Style,
            Self::Model { .. } => EntityCategory::Model,
            Self::ModelObjects { .. } => EntityCategory::ModelObject,
            Self::DiagramModelObjects { .. } => EntityCategory::DiagramModelObject,
            Self::Template { .. } | Self::TemplateShapeReplaced { .. } => {
                EntityCategory::Template
            }
            Self::ModelMappings { .. } => EntityCategory::ModelMapping,
            Self::Diagram { .. } => EntityCategory::Diagram,
            Self::Shapes { .. } => EntityCategory::Shape,
            Self::Connections { .. } => EntityCategory::Connection,
        }
    }

    /// Number of entities carried by the event.
    pub fn len(&self) -> usize {
        match self {
            Self::Project { .. } | Self::Model { .. } | Self::TemplateShapeReplaced { .. } => 1,
            Self::Design { designs, .. } => designs.len(),
            Self::Styles { styles, .. } => styles.len(),
            Self::ModelObjects { model_objects, .. } => model_objects.len(),
            Self::DiagramModelObjects {
                diagram_model_objects,
                ..
            } => diagram_model_objects.len(),
            Self::Template { templates, .. } => templates.len(),
            Self::ModelMappings { mappings, .. } => mappings.len(),
            Self::Diagram { diagrams, .. } => diagrams.len(),
            Self::Shapes { shapes, .. } => shapes.len(),
            Self::Connections { connections, .. } => connections.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&RepositoryEvent)>;

/// Synchronous observer list.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&RepositoryEvent) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(current, _)| *current != id);
        self.listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Delivers `event` to every listener. Empty batches are dropped.
    pub fn publish(&mut self, event: RepositoryEvent) {
        if event.is_empty() {
            return;
        }
        debug!(
            "event=repository_event module=events status=publish category={} kind={} count={} subscribers={}",
            event.category(),
            event.kind().as_str(),
            event.len(),
            self.listeners.len()
        );
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }
}
