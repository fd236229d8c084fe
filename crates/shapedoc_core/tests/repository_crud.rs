use shapedoc_core::store::{EntityRecord, ProjectSnapshot, ShapeBatch};
use shapedoc_core::{
    ChangeKind, Design, Diagram, DiagramModelObject, EntityCategory, EntityId, EntityType,
    EntityTypeProvider, MappingKind, MemoryStore, Model, ModelMapping, ModelObject,
    ModelObjectOwner, ProjectRepository, Rect, RepoError, RepositoryEvent, Rgba, Shape,
    ShapeOwner, Store, StoreError, StoreResult, Style, StyleRange, Template,
};
use std::cell::RefCell;
use std::rc::Rc;

fn open_repository() -> ProjectRepository<MemoryStore> {
    let mut repo = ProjectRepository::new(MemoryStore::new());
    repo.add_entity_type(EntityType::shape("Box", "General", vec![], 1))
        .unwrap();
    repo.add_entity_type(EntityType::model_object("Asset", "General"))
        .unwrap();
    repo.add_entity_type(EntityType::diagram_model_object("Sheet", "General"))
        .unwrap();
    repo.create("Demo").unwrap();
    repo
}

fn record_events<S: Store>(
    repo: &mut ProjectRepository<S>,
) -> Rc<RefCell<Vec<(EntityCategory, ChangeKind)>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    repo.subscribe(move |event: &RepositoryEvent| {
        sink.borrow_mut().push((event.category(), event.kind()));
    });
    events
}

#[test]
fn closed_repository_rejects_operations() {
    let mut repo = ProjectRepository::new(MemoryStore::new());
    let mut design = Design::new("Default");

    assert!(matches!(
        repo.insert_design(&mut design),
        Err(RepoError::NotOpen)
    ));
    assert!(matches!(repo.save_changes(), Err(RepoError::NotOpen)));
    assert!(repo.get_designs().is_empty());
    assert!(!repo.is_modified());
    assert!(matches!(
        repo.open(),
        Err(RepoError::Storage(StoreError::ProjectNotFound(_)))
    ));
}

#[test]
fn design_insert_delete_undelete_roundtrip() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let id = repo.insert_design(&mut design).unwrap();

    assert_eq!(design.id, Some(id));
    assert_eq!(repo.get_design(id), Some(design.clone()));

    repo.delete_design(id).unwrap();
    assert_eq!(repo.get_design(id), None);
    assert_eq!(repo.get_design_including_deleted(id), Some(design.clone()));

    repo.undelete_design(id).unwrap();
    assert_eq!(repo.get_design(id), Some(design));

    let err = repo.undelete_design(id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn inserting_twice_is_already_inserted() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    repo.insert_design(&mut design).unwrap();

    let err = repo.insert_design(&mut design).unwrap_err();
    assert!(matches!(
        err,
        RepoError::AlreadyInserted { what: "design", .. }
    ));
}

#[test]
fn update_of_unknown_entity_is_not_found() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    design.id = Some(EntityId::new_v4());

    assert!(matches!(
        repo.update_design(&design),
        Err(RepoError::NotFound { what: "design", .. })
    ));
}

#[test]
fn delete_all_design_cascades_to_styles_children_first() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let mut styles = [
        Style::color("Red", Rgba::rgb(255, 0, 0)),
        Style::color("Blue", Rgba::rgb(0, 0, 255)),
    ];
    let design_id = repo.insert_all_design(&mut design, &mut styles).unwrap();
    assert_eq!(repo.get_styles(design_id).len(), 2);

    let events = record_events(&mut repo);
    repo.delete_all_design(design_id).unwrap();
    assert!(repo.get_styles(design_id).is_empty());
    assert_eq!(
        *events.borrow(),
        vec![
            (EntityCategory::Style, ChangeKind::Deleted),
            (EntityCategory::Design, ChangeKind::Deleted),
        ]
    );

    events.borrow_mut().clear();
    repo.undelete_all_design(design_id).unwrap();
    assert_eq!(repo.get_styles(design_id).len(), 2);
    assert_eq!(
        *events.borrow(),
        vec![
            (EntityCategory::Design, ChangeKind::Inserted),
            (EntityCategory::Style, ChangeKind::Inserted),
        ]
    );
}

#[test]
fn delete_design_keeps_styles_active() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let mut styles = [Style::color("Red", Rgba::rgb(255, 0, 0))];
    let design_id = repo.insert_all_design(&mut design, &mut styles).unwrap();
    let style_id = styles[0].id.unwrap();

    repo.delete_design(design_id).unwrap();
    assert!(repo.get_style(style_id).is_some());
    assert_eq!(repo.get_style_design(style_id), Some(design_id));
}

#[test]
fn style_in_use_follows_live_referrers() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let design_id = repo.insert_design(&mut design).unwrap();
    let mut red = Style::color("Red", Rgba::rgb(255, 0, 0));
    let red_id = repo.insert_style(design_id, &mut red).unwrap();
    assert!(!repo.is_style_in_use(red_id));

    let mut line = Style::line("Outline", 2, Some(red_id));
    repo.insert_style(design_id, &mut line).unwrap();
    assert!(repo.is_style_in_use(red_id));
    assert!(repo.is_styles_in_use(&[EntityId::new_v4(), red_id]));

    repo.delete_style(line.id.unwrap()).unwrap();
    assert!(!repo.is_style_in_use(red_id));

    let mut diagram = Diagram::new("Sheet1");
    diagram.background_style = Some(red_id);
    let diagram_id = repo.insert_diagram(&mut diagram).unwrap();
    assert!(repo.is_style_in_use(red_id));
    repo.delete_diagram(diagram_id).unwrap();
    assert!(!repo.is_style_in_use(red_id));
}

#[test]
fn insert_style_requires_live_design() {
    let mut repo = open_repository();
    let mut style = Style::color("Red", Rgba::rgb(255, 0, 0));

    let err = repo
        .insert_style(EntityId::new_v4(), &mut style)
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { what: "design", .. }));
    assert_eq!(style.id, None);
}

#[test]
fn model_is_a_singleton() {
    let mut repo = open_repository();
    let mut model = Model::new();
    repo.insert_model(&mut model).unwrap();
    assert_eq!(repo.get_model(), Some(model));

    let err = repo.insert_model(&mut Model::new()).unwrap_err();
    assert!(matches!(err, RepoError::Argument(_)));

    repo.delete_model().unwrap();
    assert_eq!(repo.get_model(), None);
    repo.undelete_model().unwrap();
    assert!(repo.get_model().is_some());
}

#[test]
fn model_objects_require_registered_type_and_owner() {
    let mut repo = open_repository();

    let mut orphan = ModelObject::new("Asset", "Pump");
    assert!(matches!(
        repo.insert_model_object(&mut orphan),
        Err(RepoError::NotFound { what: "model", .. })
    ));

    repo.insert_model(&mut Model::new()).unwrap();
    let mut unknown = ModelObject::new("Valve", "V1");
    assert!(matches!(
        repo.insert_model_object(&mut unknown),
        Err(RepoError::NotFound {
            what: "model object type",
            ..
        })
    ));

    let parent_id = repo.insert_model_object(&mut orphan).unwrap();
    let mut child = ModelObject::new("asset", "Motor");
    child.owner = ModelObjectOwner::ModelObject(parent_id);
    let child_id = repo.insert_model_object(&mut child).unwrap();

    assert_eq!(repo.get_child_model_objects(parent_id), vec![child.clone()]);
    assert!(repo.is_model_object_in_use(parent_id));
    assert!(repo.is_model_object_type_in_use("ASSET"));
    assert!(!repo.is_model_object_in_use(child_id));
}

#[test]
fn model_object_owner_updates_reject_cycles() {
    let mut repo = open_repository();
    repo.insert_model(&mut Model::new()).unwrap();
    let mut root = ModelObject::new("Asset", "Plant");
    let root_id = repo.insert_model_object(&mut root).unwrap();
    let mut child = ModelObject::new("Asset", "Line");
    child.owner = ModelObjectOwner::ModelObject(root_id);
    let child_id = repo.insert_model_object(&mut child).unwrap();

    let err = repo
        .update_model_object_owner(root_id, ModelObjectOwner::ModelObject(child_id))
        .unwrap_err();
    assert!(matches!(err, RepoError::Argument(_)));

    let mut moved = child.clone();
    moved.owner = ModelObjectOwner::Model;
    assert!(matches!(
        repo.update_model_object(&moved),
        Err(RepoError::Argument(_))
    ));

    repo.update_model_object_owner(child_id, ModelObjectOwner::Model)
        .unwrap();
    assert_eq!(
        repo.get_model_object(child_id).unwrap().owner,
        ModelObjectOwner::Model
    );
    assert!(!repo.is_model_object_in_use(root_id));
}

#[test]
fn model_object_batch_delete_keeps_applied_prefix() {
    let mut repo = open_repository();
    repo.insert_model(&mut Model::new()).unwrap();
    let mut first = ModelObject::new("Asset", "A");
    let first_id = repo.insert_model_object(&mut first).unwrap();

    let events = record_events(&mut repo);
    let err = repo
        .delete_model_objects(&[first_id, EntityId::new_v4()])
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
    assert_eq!(repo.get_model_object(first_id), None);
    assert_eq!(
        *events.borrow(),
        vec![(EntityCategory::ModelObject, ChangeKind::Deleted)]
    );
}

#[test]
fn diagram_model_object_in_use_by_diagram() {
    let mut repo = open_repository();
    let mut object = DiagramModelObject::new("Sheet", "Cover");
    let object_id = repo.insert_diagram_model_object(&mut object).unwrap();
    assert!(!repo.is_diagram_model_object_in_use(object_id));

    let mut diagram = Diagram::new("Sheet1");
    diagram.model_object = Some(object_id);
    repo.insert_diagram(&mut diagram).unwrap();
    assert!(repo.is_diagram_model_object_in_use(object_id));
}

#[test]
fn template_delete_leaves_prototype_and_delete_all_cascades() {
    let mut repo = open_repository();
    let events = record_events(&mut repo);
    let mut template = Template::new("Pump");
    let mut prototype = Shape::new("Box");
    let template_id = repo.insert_template(&mut template, &mut prototype).unwrap();
    let prototype_id = prototype.id.unwrap();
    assert_eq!(
        *events.borrow(),
        vec![
            (EntityCategory::Template, ChangeKind::Inserted),
            (EntityCategory::Shape, ChangeKind::Inserted),
        ]
    );
    assert_eq!(repo.get_template_shape(template_id), Some(prototype.clone()));

    repo.delete_template(template_id).unwrap();
    assert!(repo.get_template(template_id).is_none());
    assert!(repo.get_shape(prototype_id).is_some());
    repo.undelete_template(template_id).unwrap();

    let mut mapping = ModelMapping::new(1, 2, MappingKind::Numeric {
        intercept: 0.0,
        slope: 2.0,
    });
    repo.insert_model_mapping(template_id, &mut mapping).unwrap();
    assert_eq!(mapping.template_id, Some(template_id));

    events.borrow_mut().clear();
    repo.delete_all_template(template_id).unwrap();
    assert!(repo.get_shape(prototype_id).is_none());
    assert!(repo.get_model_mappings(template_id).is_empty());
    assert_eq!(
        *events.borrow(),
        vec![
            (EntityCategory::ModelMapping, ChangeKind::Deleted),
            (EntityCategory::Shape, ChangeKind::Deleted),
            (EntityCategory::Template, ChangeKind::Deleted),
        ]
    );

    repo.undelete_all_template(template_id).unwrap();
    assert!(repo.get_shape(prototype_id).is_some());
    assert_eq!(repo.get_model_mappings(template_id), vec![mapping]);
}

#[test]
fn replace_template_shape_fires_one_event() {
    let mut repo = open_repository();
    let mut template = Template::new("Pump");
    let mut prototype = Shape::new("Box");
    let template_id = repo.insert_template(&mut template, &mut prototype).unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    repo.subscribe(move |event: &RepositoryEvent| sink.borrow_mut().push(event.clone()));

    let mut replacement = Shape::new("Box");
    repo.replace_template_shape(template_id, &mut replacement)
        .unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    match &events[0] {
        RepositoryEvent::TemplateShapeReplaced {
            template,
            old_shape,
            new_shape,
        } => {
            assert_eq!(template.shape_id, replacement.id);
            assert_eq!(old_shape.id, prototype.id);
            assert_eq!(new_shape, &replacement);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(repo.get_shape(prototype.id.unwrap()).is_none());
    assert_eq!(repo.get_template_shape(template_id), Some(replacement));
}

#[test]
fn style_mapping_marks_styles_in_use() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let mut styles = [Style::color("Low", Rgba::rgb(0, 255, 0))];
    repo.insert_all_design(&mut design, &mut styles).unwrap();
    let style_id = styles[0].id.unwrap();

    let mut template = Template::new("Gauge");
    let template_id = repo
        .insert_template(&mut template, &mut Shape::new("Box"))
        .unwrap();
    let mut mapping = ModelMapping::new(1, 1, MappingKind::Style {
        ranges: vec![StyleRange {
            from: 0.0,
            style: style_id,
        }],
    });
    let mapping_id = repo.insert_model_mapping(template_id, &mut mapping).unwrap();
    assert!(repo.is_style_in_use(style_id));

    repo.delete_model_mapping(mapping_id).unwrap();
    assert!(!repo.is_style_in_use(style_id));
}

#[test]
fn set_version_requires_modifiable_store() {
    let mut repo = ProjectRepository::new(MemoryStore::version_locked());
    repo.create("Locked").unwrap();
    assert!(matches!(repo.set_version(2), Err(RepoError::VersionLocked)));

    let mut repo = open_repository();
    repo.set_version(2).unwrap();
    assert_eq!(repo.version().unwrap(), 2);
    repo.save_changes().unwrap();
    assert_eq!(repo.read_version().unwrap(), 2);
}

#[test]
fn registry_rejects_case_duplicates_and_allows_readd() {
    let mut repo = open_repository();
    let err = repo
        .add_entity_type(EntityType::shape("BOX", "General", vec![], 0))
        .unwrap_err();
    assert!(matches!(err, RepoError::DuplicateName(_)));

    repo.remove_entity_type("box").unwrap();
    repo.add_entity_type(EntityType::shape("Box", "General", vec![], 0))
        .unwrap();

    repo.remove_all_entity_types();
    repo.add_entity_type(EntityType::shape("Circle", "Extra", vec![], 0))
        .unwrap();
    let names: Vec<&str> = repo
        .entity_types()
        .iter()
        .map(|entity_type| entity_type.name.as_str())
        .collect();
    assert_eq!(names, vec!["Circle"]);
    assert!(repo.get_project().unwrap().libraries.contains(&"Extra".to_string()));
}

/// Memory store whose saves can be switched to fail.
struct FailingStore {
    inner: MemoryStore,
    fail_saves: bool,
}

impl Store for FailingStore {
    fn location(&self) -> String {
        "failing".to_string()
    }

    fn exists(&self) -> StoreResult<bool> {
        self.inner.exists()
    }

    fn create(&mut self) -> StoreResult<()> {
        self.inner.create()
    }

    fn open(&mut self) -> StoreResult<ProjectSnapshot> {
        self.inner.open()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn erase(&mut self) -> StoreResult<()> {
        self.inner.erase()
    }

    fn read_version(&self) -> StoreResult<i32> {
        self.inner.read_version()
    }

    fn can_modify_version(&self) -> bool {
        self.inner.can_modify_version()
    }

    fn load_diagram_shapes(
        &mut self,
        diagram_id: EntityId,
        regions: &[Rect],
    ) -> StoreResult<ShapeBatch> {
        self.inner.load_diagram_shapes(diagram_id, regions)
    }

    fn save_changes(&mut self, version: i32, records: &[EntityRecord]) -> StoreResult<()> {
        if self.fail_saves {
            return Err(StoreError::InvalidData("disk full".to_string()));
        }
        self.inner.save_changes(version, records)
    }

    fn compact(&mut self) -> StoreResult<usize> {
        self.inner.compact()
    }
}

#[test]
fn failed_save_keeps_modified_state() {
    let mut repo = ProjectRepository::new(FailingStore {
        inner: MemoryStore::new(),
        fail_saves: false,
    });
    repo.create("Demo").unwrap();
    let mut design = Design::new("Default");
    let design_id = repo.insert_design(&mut design).unwrap();

    repo.store_mut().fail_saves = true;
    let err = repo.save_changes().unwrap_err();
    assert!(matches!(err, RepoError::Storage(_)));
    assert!(repo.is_modified());
    assert_eq!(repo.get_design(design_id), Some(design));

    repo.store_mut().fail_saves = false;
    repo.save_changes().unwrap();
    assert!(!repo.is_modified());
}

#[test]
fn saved_entities_survive_reopen() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let mut styles = [Style::color("Red", Rgba::rgb(255, 0, 0))];
    let design_id = repo.insert_all_design(&mut design, &mut styles).unwrap();
    let style_id = styles[0].id.unwrap();
    repo.delete_style(style_id).unwrap();
    repo.save_changes().unwrap();
    repo.close();

    repo.open().unwrap();
    assert!(!repo.is_modified());
    assert_eq!(repo.get_design(design_id), Some(design));
    assert_eq!(repo.get_style(style_id), None);
    repo.undelete_style(style_id).unwrap();
    assert_eq!(repo.get_style(style_id), Some(styles[0].clone()));
}

#[test]
fn open_rejects_unregistered_types() {
    let mut repo = open_repository();
    let mut template = Template::new("Pump");
    repo.insert_template(&mut template, &mut Shape::new("Box"))
        .unwrap();
    repo.save_changes().unwrap();
    repo.close();

    repo.remove_all_entity_types();
    let err = repo.open().unwrap_err();
    assert!(matches!(err, RepoError::NotFound { what: "shape type", .. }));
    assert!(!repo.is_open());
}

#[test]
fn compact_purges_soft_deleted_entities() {
    let mut repo = open_repository();
    let mut kept = Design::new("Kept");
    let mut dropped = Design::new("Dropped");
    repo.insert_design(&mut kept).unwrap();
    let dropped_id = repo.insert_design(&mut dropped).unwrap();
    repo.delete_design(dropped_id).unwrap();

    assert_eq!(repo.compact().unwrap(), 1);
    assert!(!repo.is_modified());
    assert_eq!(repo.get_design_including_deleted(dropped_id), None);
    assert!(matches!(
        repo.undelete_design(dropped_id),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn style_references_must_be_live_and_not_self() {
    let mut repo = open_repository();
    let design_id = repo.insert_design(&mut Design::new("Default")).unwrap();
    let ghost = EntityId::new_v4();

    let mut dangling = Style::line("Outline", 1, Some(ghost));
    let err = repo.insert_style(design_id, &mut dangling).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { what: "style", .. }));
    assert_eq!(dangling.id, None);
    assert!(!repo.is_style_in_use(ghost));

    let mut line = Style::line("Outline", 1, None);
    let line_id = repo.insert_style(design_id, &mut line).unwrap();
    let mut looped = line.clone();
    looped.kind = Style::line("Outline", 1, Some(line_id)).kind;
    let err = repo.update_style(&looped).unwrap_err();
    assert!(matches!(err, RepoError::Argument(_)));
    assert!(!repo.is_style_in_use(line_id));
    assert_eq!(repo.get_style(line_id), Some(line));
}

#[test]
fn updating_referrers_marks_styles_in_use() {
    let mut repo = open_repository();
    let design_id = repo.insert_design(&mut Design::new("Default")).unwrap();
    let mut red = Style::color("Red", Rgba::rgb(255, 0, 0));
    let red_id = repo.insert_style(design_id, &mut red).unwrap();
    let mut line = Style::line("Outline", 2, None);
    let line_id = repo.insert_style(design_id, &mut line).unwrap();
    let diagram_id = repo.insert_diagram(&mut Diagram::new("Sheet1")).unwrap();
    let mut shape = Shape::new("Box");
    repo.insert_shape(&mut shape, ShapeOwner::Diagram(diagram_id))
        .unwrap();
    assert!(!repo.is_styles_in_use(&[red_id, line_id]));

    let events = record_events(&mut repo);
    let mut outlined = line.clone();
    outlined.kind = Style::line("Outline", 2, Some(red_id)).kind;
    repo.update_style(&outlined).unwrap();
    assert!(repo.is_style_in_use(red_id));
    assert_eq!(repo.get_style(line_id), Some(outlined));

    shape.styles.line_style = Some(line_id);
    repo.update_shape(&shape).unwrap();
    assert!(repo.is_style_in_use(line_id));
    assert_eq!(
        *events.borrow(),
        vec![
            (EntityCategory::Style, ChangeKind::Updated),
            (EntityCategory::Shape, ChangeKind::Updated),
        ]
    );

    repo.update_style(&line).unwrap();
    assert!(!repo.is_style_in_use(red_id));
}

#[test]
fn insert_styles_publishes_applied_prefix() {
    let mut repo = open_repository();
    let design_id = repo.insert_design(&mut Design::new("Default")).unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    repo.subscribe(move |event: &RepositoryEvent| sink.borrow_mut().push(event.clone()));

    let mut styles = [
        Style::color("Red", Rgba::rgb(255, 0, 0)),
        Style::line("Broken", 1, Some(EntityId::new_v4())),
        Style::color("Blue", Rgba::rgb(0, 0, 255)),
    ];
    let err = repo.insert_styles(design_id, &mut styles).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { what: "style", .. }));
    assert!(styles[0].id.is_some());
    assert_eq!(styles[1].id, None);
    assert_eq!(styles[2].id, None);
    assert_eq!(repo.get_styles(design_id), vec![styles[0].clone()]);

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    match &events[0] {
        RepositoryEvent::Styles {
            kind: ChangeKind::Inserted,
            design_id: event_design,
            styles: inserted,
        } => {
            assert_eq!(*event_design, design_id);
            assert_eq!(inserted, &vec![styles[0].clone()]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn undelete_style_requires_live_design() {
    let mut repo = open_repository();
    let mut design = Design::new("Default");
    let mut styles = [Style::color("Red", Rgba::rgb(255, 0, 0))];
    let design_id = repo.insert_all_design(&mut design, &mut styles).unwrap();
    let style_id = styles[0].id.unwrap();

    repo.delete_all_design(design_id).unwrap();
    let err = repo.undelete_style(style_id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { what: "design", .. }));
    assert!(repo.get_style(style_id).is_none());

    repo.undelete_design(design_id).unwrap();
    repo.undelete_style(style_id).unwrap();
    assert!(repo.get_style(style_id).is_some());
}

#[test]
fn template_prototype_references_must_be_live() {
    let mut repo = open_repository();
    let ghost = EntityId::new_v4();
    let mut template = Template::new("Pump");
    let mut prototype = Shape::new("Box");
    prototype.styles.line_style = Some(ghost);

    let err = repo
        .insert_template(&mut template, &mut prototype)
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { what: "style", .. }));
    assert_eq!(template.id, None);
    assert!(repo.get_templates().is_empty());
    assert!(!repo.is_style_in_use(ghost));

    let mut prototype = Shape::new("Box");
    let template_id = repo.insert_template(&mut template, &mut prototype).unwrap();
    let mut replacement = Shape::new("Box");
    replacement.model_object = Some(ghost);
    let err = repo
        .replace_template_shape(template_id, &mut replacement)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            what: "model object",
            ..
        }
    ));
    assert_eq!(repo.get_template_shape(template_id), Some(prototype));
}

#[test]
fn update_project_replaces_settings_and_keeps_version() {
    let mut repo = open_repository();
    let events = record_events(&mut repo);
    let mut settings = repo.get_project().unwrap();
    let version = settings.version;
    settings.name = "Renamed".to_string();
    settings.description = "Pump station".to_string();
    settings.version = version + 7;

    repo.update_project(&settings).unwrap();
    let updated = repo.get_project().unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.description, "Pump station");
    assert_eq!(updated.version, version);
    assert!(repo.is_modified());
    assert_eq!(
        *events.borrow(),
        vec![(EntityCategory::Project, ChangeKind::Updated)]
    );

    let mut stranger = settings.clone();
    stranger.id = Some(EntityId::new_v4());
    assert!(matches!(
        repo.update_project(&stranger),
        Err(RepoError::NotFound { what: "project", .. })
    ));
}

struct PlantLibrary;

impl EntityTypeProvider for PlantLibrary {
    fn library_name(&self) -> &str {
        "Plant"
    }

    fn entity_types(&self) -> Vec<EntityType> {
        vec![
            EntityType::shape("Valve", "Plant", vec![], 0),
            EntityType::model_object("Pump", "Plant"),
            EntityType::shape("box", "Plant", vec![], 0),
        ]
    }
}

#[test]
fn provider_registration_records_library_without_dirtying() {
    let mut repo = open_repository();
    let err = repo.register_provider(&PlantLibrary).unwrap_err();
    assert!(matches!(err, RepoError::DuplicateName(_)));
    assert!(repo.entity_types().contains("Valve"));
    assert!(repo.entity_types().contains("Pump"));
    assert!(repo
        .get_project()
        .unwrap()
        .libraries
        .contains(&"Plant".to_string()));
    assert!(!repo.is_modified());

    repo.insert_design(&mut Design::new("Default")).unwrap();
    repo.save_changes().unwrap();
    repo.close();

    let mut reopened = ProjectRepository::new(repo.store().clone());
    reopened.open().unwrap();
    assert!(reopened
        .get_project()
        .unwrap()
        .libraries
        .contains(&"Plant".to_string()));
}
