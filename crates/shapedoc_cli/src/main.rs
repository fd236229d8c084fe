//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open or create a SQLite project file through `shapedoc_core`.
//! - Optionally run a small editing scenario and print repository status.
//!
//! Usage: `shapedoc_cli <project.sdb> [--smoke] [--log-dir <dir>]`

use log::{error, info};
use shapedoc_core::{
    ControlPoint, ControlPointCapability, Design, Diagram, EntityCategory, EntityType,
    EntityTypeProvider, ProjectRepository, RepoResult, Rgba, ShapeOwner, SqliteStore, Style,
};
use std::process::ExitCode;

const LIBRARY: &str = "BasicShapes";

struct BasicShapes;

impl EntityTypeProvider for BasicShapes {
    fn library_name(&self) -> &str {
        LIBRARY
    }

    fn entity_types(&self) -> Vec<EntityType> {
        vec![
            EntityType::shape(
                "Box",
                LIBRARY,
                vec![
                    ControlPoint::new(1, [ControlPointCapability::Resize]),
                    ControlPoint::new(9, [ControlPointCapability::Connect]),
                ],
                1,
            ),
            EntityType::shape(
                "Line",
                LIBRARY,
                vec![
                    ControlPoint::new(1, [ControlPointCapability::Glue]),
                    ControlPoint::new(2, [ControlPointCapability::Glue]),
                ],
                0,
            ),
        ]
    }
}

struct Args {
    path: String,
    smoke: bool,
    log_dir: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut path = None;
    let mut smoke = false;
    let mut log_dir = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--smoke" => smoke = true,
            "--log-dir" => {
                log_dir = Some(args.next().ok_or("--log-dir needs a directory")?);
            }
            other if other.starts_with("--") => return Err(format!("unknown flag `{other}`")),
            other => path = Some(other.to_string()),
        }
    }
    let path = path.ok_or("usage: shapedoc_cli <project.sdb> [--smoke] [--log-dir <dir>]")?;
    Ok(Args {
        path,
        smoke,
        log_dir,
    })
}

fn run(args: &Args) -> RepoResult<()> {
    let mut repository = ProjectRepository::new(SqliteStore::new(&args.path));
    repository.register_provider(&BasicShapes)?;
    if repository.exists()? {
        repository.open()?;
    } else {
        repository.create("CLI project")?;
    }

    if args.smoke {
        smoke(&mut repository)?;
        repository.save_changes()?;
    }

    let project = repository.get_project()?;
    println!("shapedoc_core version={}", shapedoc_core::core_version());
    println!("project name={} version={}", project.name, repository.version()?);
    println!("designs={}", repository.get_designs().len());
    println!("diagrams={}", repository.get_diagrams().len());
    println!("modified={}", repository.is_modified());
    repository.close();
    Ok(())
}

/// Inserts a design, a diagram and two glued shapes.
fn smoke(repository: &mut ProjectRepository<SqliteStore>) -> RepoResult<()> {
    let mut design = Design::new("Default");
    let mut styles = [Style::color("Red", Rgba::rgb(255, 0, 0))];
    repository.insert_all_design(&mut design, &mut styles)?;

    let mut diagram = Diagram::new("Sheet1");
    let diagram_id = repository.insert_diagram(&mut diagram)?;

    let types = repository.entity_types();
    let mut target = types.require("Box", EntityCategory::Shape)?.create_shape()?;
    let mut connector = types.require("Line", EntityCategory::Shape)?.create_shape()?;
    target.set_caption(0, "Box1")?;
    target.z_order = repository.obtain_new_top_z_order(diagram_id)?;
    let target_id = repository.insert_shape(&mut target, ShapeOwner::Diagram(diagram_id))?;
    connector.z_order = repository.obtain_new_top_z_order(diagram_id)?;
    let connector_id = repository.insert_shape(&mut connector, ShapeOwner::Diagram(diagram_id))?;
    repository.insert_connection(connector_id, 1, target_id, 9)?;
    info!("event=cli_smoke module=cli status=ok diagram={diagram_id}");
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };
    if let Some(dir) = &args.log_dir {
        if let Err(message) =
            shapedoc_core::init_logging(shapedoc_core::default_log_level(), dir)
        {
            eprintln!("logging disabled: {message}");
        }
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
