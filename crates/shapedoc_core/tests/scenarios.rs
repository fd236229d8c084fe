use shapedoc_core::{
    ChangeKind, ControlPoint, ControlPointCapability, Design, Diagram, EntityCategory, EntityType,
    MemoryStore, Model, ModelObject, ModelObjectOwner, ProjectRepository, RepositoryEvent, Rgba,
    ShapeOwner, Style, Template,
};
use std::cell::RefCell;
use std::rc::Rc;

fn register_types(repo: &mut ProjectRepository<MemoryStore>) {
    repo.add_entity_type(EntityType::shape(
        "Box",
        "BasicShapes",
        vec![
            ControlPoint::new(1, [ControlPointCapability::Resize]),
            ControlPoint::new(9, [ControlPointCapability::Connect]),
        ],
        1,
    ))
    .unwrap();
    repo.add_entity_type(EntityType::model_object("Pump", "Plant"))
        .unwrap();
}

#[test]
fn first_drawing_is_tracked_until_saved() {
    let mut repo = ProjectRepository::new(MemoryStore::new());
    register_types(&mut repo);
    repo.create("Plant layout").unwrap();
    assert!(!repo.is_modified());

    let mut design = Design::new("Default");
    let mut styles = [Style::color("Red", Rgba::rgb(255, 0, 0))];
    let design_id = repo.insert_all_design(&mut design, &mut styles).unwrap();
    let red = styles[0].id.unwrap();

    let diagram_id = repo.insert_diagram(&mut Diagram::new("Sheet1")).unwrap();
    let mut shape = repo
        .entity_types()
        .require("Box", EntityCategory::Shape)
        .unwrap()
        .create_shape()
        .unwrap();
    shape.set_caption(0, "Box1").unwrap();
    shape.styles.fill_style = Some(red);
    shape.z_order = repo.obtain_new_top_z_order(diagram_id).unwrap();
    let shape_id = repo
        .insert_shape(&mut shape, ShapeOwner::Diagram(diagram_id))
        .unwrap();

    assert!(repo.is_modified());
    assert!(repo.is_style_in_use(red));
    assert_eq!(repo.get_style_design(red), Some(design_id));
    assert_eq!(repo.get_diagram_by_name("Sheet1").unwrap().id, Some(diagram_id));
    assert_eq!(repo.get_shape(shape_id).unwrap().captions, vec!["Box1"]);

    repo.save_changes().unwrap();
    assert!(!repo.is_modified());
    let saves = repo.store().save_count();
    repo.save_changes().unwrap();
    assert_eq!(repo.store().save_count(), saves);
}

#[test]
fn templated_shape_keeps_references_across_reopen() {
    let mut repo = ProjectRepository::new(MemoryStore::new());
    register_types(&mut repo);
    repo.create("Plant layout").unwrap();

    repo.insert_model(&mut Model::new()).unwrap();
    let mut plant = ModelObject::new("Pump", "P-100");
    let plant_id = repo.insert_model_object(&mut plant).unwrap();
    let mut part = ModelObject::new("Pump", "P-100 motor");
    part.owner = ModelObjectOwner::ModelObject(plant_id);
    repo.insert_model_object(&mut part).unwrap();
    assert_eq!(repo.get_child_model_objects(plant_id), vec![part]);

    let mut prototype = repo
        .entity_types()
        .require("Box", EntityCategory::Shape)
        .unwrap()
        .create_shape()
        .unwrap();
    let mut template = Template::new("Pump");
    let template_id = repo.insert_template(&mut template, &mut prototype).unwrap();

    let diagram_id = repo.insert_diagram(&mut Diagram::new("Sheet1")).unwrap();
    let mut placed = repo.get_template_shape(template_id).unwrap();
    placed.id = None;
    placed.owner = None;
    placed.template = Some(template_id);
    placed.model_object = Some(plant_id);
    let placed_id = repo
        .insert_shape(&mut placed, ShapeOwner::Diagram(diagram_id))
        .unwrap();
    assert!(repo.is_template_in_use(template_id));
    assert!(repo.is_model_object_in_use(plant_id));
    repo.save_changes().unwrap();
    repo.close();

    let mut reopened = ProjectRepository::new(repo.store().clone());
    register_types(&mut reopened);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    reopened.subscribe(move |event: &RepositoryEvent| {
        sink.borrow_mut().push((event.category(), event.kind()));
    });
    reopened.open().unwrap();

    let project = reopened.get_project().unwrap();
    assert!(project.libraries.iter().any(|library| library == "BasicShapes"));
    assert!(project.libraries.iter().any(|library| library == "Plant"));
    assert!(reopened.get_model().is_some());
    assert_eq!(reopened.get_template(template_id), Some(template));
    assert!(reopened.get_shape(placed_id).is_none());
    assert!(reopened.is_template_in_use(template_id));
    assert!(reopened.is_model_object_in_use(plant_id));
    assert!(reopened.is_model_object_type_in_use("pump"));

    reopened.get_diagram_shapes(diagram_id, &[]).unwrap();
    reopened.delete_all_shapes(&[placed_id]).unwrap();
    assert!(!reopened.is_template_in_use(template_id));
    assert!(events
        .borrow()
        .contains(&(EntityCategory::Shape, ChangeKind::Deleted)));
}
