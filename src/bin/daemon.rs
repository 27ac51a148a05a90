//! Facekeeper daemon for periodic index maintenance.
//!
//! Each cycle runs the orphan sweep, then the faces pipeline:
//! - Orphaned files, duplicates, countries, cameras and lenses are purged
//! - Markers are repaired, clustered into faces and matched to people
//! - People and faces nothing refers to anymore are removed
//!
//! The daemon shares the index database with the `facekeeper` command.
//!
//! ## Usage
//!
//! ```bash
//! facekeeper-daemon              # Run in foreground
//! facekeeper-daemon --once       # Run one maintenance cycle and exit
//! ```

use anyhow::Result;
use chrono::{Local, NaiveTime};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use facekeeper::config::DaemonConfig;
use facekeeper::faces::{run_faces_pipeline, FacesError, FacesOptions};
use facekeeper::purge::run_orphan_sweep;
use facekeeper::tasks::{WorkerKind, WorkerRegistry};
use facekeeper::{logging, Config, Database};

/// Command line options
#[derive(Default)]
struct DaemonArgs {
    /// Overrides `daemon.interval_secs` (seconds)
    interval: Option<u64>,
    /// Run once and exit
    once: bool,
    /// Config path override
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = parse_args();

    logging::init(None)?;

    info!("Facekeeper daemon starting...");

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config loaded");

    let db = Database::open(&config.db_path)?;
    db.initialize()?;
    info!("Database opened at {:?}", config.db_path);

    let workers = Arc::new(WorkerRegistry::new());

    if args.once {
        info!("Running in single-shot mode");
        run_cycle(&db, &config, &workers)?;
    } else {
        let interval = args.interval.unwrap_or(config.daemon.interval_secs);
        info!("Running in daemon mode, every {} seconds", interval);
        run_daemon_loop(&db, &config, &workers, interval);
    }

    info!("Facekeeper daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DaemonArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                config.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(interval) => config.interval = Some(interval),
                        Err(_) => {
                            eprintln!("Invalid interval: {}", args[i + 1]);
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_help() {
    println!(
        r#"facekeeper-daemon - Periodic face index maintenance

USAGE:
    facekeeper-daemon [OPTIONS]

OPTIONS:
    --once, -1          Run one maintenance cycle and exit
    --interval, -i N    Seconds between cycles (default: daemon.interval_secs)
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    FACEKEEPER_CONFIG   Path to config file (overrides default location)
    FACEKEEPER_LOG      Log level (trace, debug, info, warn, error)

Hours of operation are read from the [daemon] section of the config file
(hours_start, hours_end). Ranges may wrap past midnight, e.g. 22 to 6.
"#
    );
}

fn run_daemon_loop(db: &Database, config: &Config, workers: &Arc<WorkerRegistry>, interval: u64) {
    loop {
        if within_hours(&config.daemon, Local::now().time()) {
            if let Err(e) = run_cycle(db, config, workers) {
                error!("Maintenance cycle failed: {:#}", e);
            }
        } else {
            info!("Outside hours of operation, skipping this cycle");
        }

        thread::sleep(Duration::from_secs(interval));
    }
}

/// One sweep, then one faces run. A failed sweep does not hold back the
/// faces run; a busy or disabled pipeline is not an error.
fn run_cycle(db: &Database, config: &Config, workers: &Arc<WorkerRegistry>) -> Result<()> {
    match workers.start(WorkerKind::Purge) {
        Ok(_guard) => {
            if let Err(e) = run_orphan_sweep(db) {
                error!("Orphan sweep failed: {:#}", e);
            }
        }
        Err(e) => warn!("Skipping orphan sweep: {}", e),
    }

    match run_faces_pipeline(db, config, workers.clone(), FacesOptions::default()) {
        Ok(_) => {}
        Err(FacesError::Disabled) => info!("Facial recognition is disabled, skipping faces"),
        Err(FacesError::Busy(e)) => warn!("Skipping faces: {}", e),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Whether `now` falls in the configured hours. Overnight ranges wrap.
fn within_hours(daemon: &DaemonConfig, now: NaiveTime) -> bool {
    let (start, end) = match (daemon.hours_start, daemon.hours_end) {
        (Some(s), Some(e)) => (s, e),
        _ => return true, // No hours configured, always process
    };

    let start_time = NaiveTime::from_hms_opt(start as u32, 0, 0).unwrap_or(NaiveTime::MIN);
    let end_time = NaiveTime::from_hms_opt(end as u32, 0, 0).unwrap_or(NaiveTime::MIN);

    if start_time <= end_time {
        now >= start_time && now < end_time
    } else {
        // Overnight range, e.g. 22:00 to 06:00
        now >= start_time || now < end_time
    }
}
