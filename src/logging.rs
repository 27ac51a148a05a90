//! Logging configuration with journald support on Linux.
//!
//! Log level is controlled via the `FACEKEEPER_LOG` environment variable
//! (`debug`, `info`, `warn`, `error`; default `info`). Zero-count stage
//! results are logged at `debug`, so use `FACEKEEPER_LOG=debug` to see
//! every stage of a run.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("FACEKEEPER_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(target_os = "linux")]
fn try_journald() -> Result<bool> {
    if let Ok(journald_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(journald_layer)
            .try_init()
            .context("Failed to set tracing subscriber")?;

        tracing::info!("Logging initialized with journald backend");
        return Ok(true);
    }
    Ok(false)
}

#[cfg(not(target_os = "linux"))]
fn try_journald() -> Result<bool> {
    Ok(false)
}

/// Initialize logging for long-running processes.
///
/// On Linux this connects to systemd-journald. If unavailable, logs go to a
/// daily rolling file in `log_dir` (or the local data directory).
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    if try_journald()? {
        return Ok(());
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facekeeper")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "facekeeper.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer stops flushing once its guard drops; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .context("Failed to set tracing subscriber")?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

/// Initialize logging for interactive commands: journald if present, else stderr.
pub fn init_console() -> Result<()> {
    if try_journald()? {
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to set tracing subscriber")?;

    Ok(())
}
