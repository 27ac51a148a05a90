use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use facekeeper::faces::{run_faces_pipeline, FacesOptions};
use facekeeper::purge::run_orphan_sweep;
use facekeeper::tasks::{WorkerKind, WorkerRegistry};
use facekeeper::{logging, Config, Database};

enum Command {
    Faces { force: bool },
    Purge,
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = None;
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("facekeeper {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--force" | "-f" => {
                force = true;
            }
            "faces" if command.is_none() => {
                command = Some("faces");
            }
            "purge" if command.is_none() => {
                command = Some("purge");
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let command = match command {
        Some("faces") => Command::Faces { force },
        Some(_) if force => {
            eprintln!("Error: --force only applies to the faces command");
            std::process::exit(1);
        }
        Some(_) => Command::Purge,
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    Args {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"facekeeper - Face index maintenance

USAGE:
    facekeeper [OPTIONS] <COMMAND>

COMMANDS:
    faces               Repair markers, cluster and match faces, remove orphans
    purge               Remove orphaned files, duplicates, countries, cameras and lenses

OPTIONS:
    --config, -c PATH   Path to config file
    --force, -f         Recluster and rematch all markers (faces only)
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FACEKEEPER_CONFIG   Path to config file (overrides default location)
    FACEKEEPER_LOG      Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/facekeeper/config.toml

See also: facekeeper-daemon --help"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    logging::init_console()?;

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)?;
    db.initialize()?;

    let workers = Arc::new(WorkerRegistry::new());

    match args.command {
        Command::Faces { force } => {
            let report = run_faces_pipeline(&db, &config, workers, FacesOptions { force })?;
            for outcome in &report.stages {
                println!("{}", outcome);
            }
            if report.canceled {
                println!("canceled before all stages ran");
            }
        }
        Command::Purge => {
            let _guard = workers.start(WorkerKind::Purge)?;
            let report = run_orphan_sweep(&db).context("Orphan sweep failed")?;
            for (step, count) in &report.removed {
                println!("{}: removed {}", step, count);
            }
            for (step, error) in &report.failed {
                println!("{}: failed: {}", step, error);
            }
        }
    }

    Ok(())
}
