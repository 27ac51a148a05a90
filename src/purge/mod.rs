//! Orphan sweep over files, duplicates and photo dimensions.
//!
//! Steps run in a fixed order. Only the file purge can abort the sweep;
//! the later steps log their errors and the sweep moves on.

use anyhow::{Context, Result};
use std::fmt;
use std::time::Instant;

use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurgeStep {
    Files,
    Duplicates,
    Countries,
    Cameras,
    Lenses,
}

impl PurgeStep {
    pub const ALL: [PurgeStep; 5] = [
        PurgeStep::Files,
        PurgeStep::Duplicates,
        PurgeStep::Countries,
        PurgeStep::Cameras,
        PurgeStep::Lenses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeStep::Files => "files",
            PurgeStep::Duplicates => "duplicates",
            PurgeStep::Countries => "countries",
            PurgeStep::Cameras => "cameras",
            PurgeStep::Lenses => "lenses",
        }
    }

    /// Whether a failure of this step ends the sweep.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PurgeStep::Files)
    }

    fn run(&self, db: &Database) -> Result<usize> {
        match self {
            PurgeStep::Files => db.purge_orphan_files(),
            PurgeStep::Duplicates => db.purge_orphan_duplicates(),
            PurgeStep::Countries => db.purge_orphan_countries(),
            PurgeStep::Cameras => db.purge_orphan_cameras(),
            PurgeStep::Lenses => db.purge_orphan_lenses(),
        }
    }
}

impl fmt::Display for PurgeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows removed per step, and the steps that failed.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub removed: Vec<(PurgeStep, usize)>,
    pub failed: Vec<(PurgeStep, String)>,
}

impl PurgeReport {
    pub fn removed(&self, step: PurgeStep) -> Option<usize> {
        self.removed
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, n)| *n)
    }

    pub fn total(&self) -> usize {
        self.removed.iter().map(|(_, n)| n).sum()
    }
}

/// Delete every unreachable file, duplicate, country, camera and lens.
pub fn run_orphan_sweep(db: &Database) -> Result<PurgeReport> {
    let started = Instant::now();
    let mut report = PurgeReport::default();

    for step in PurgeStep::ALL {
        match step.run(db) {
            Ok(0) => {
                tracing::debug!(step = step.as_str(), "purge: no orphan {}", step);
                report.removed.push((step, 0));
            }
            Ok(count) => {
                tracing::info!(
                    step = step.as_str(),
                    count,
                    "purge: removed {} orphan {}",
                    count,
                    step
                );
                report.removed.push((step, count));
            }
            Err(e) if step.is_fatal() => {
                tracing::error!(step = step.as_str(), error = %e, "purge: aborted");
                return Err(e).with_context(|| format!("Failed to purge orphan {}", step));
            }
            Err(e) => {
                tracing::error!(step = step.as_str(), error = %e, "purge: step failed");
                report.failed.push((step, format!("{:#}", e)));
            }
        }
    }

    tracing::info!(
        elapsed = ?started.elapsed(),
        removed = report.total(),
        failed = report.failed.len(),
        "purge: completed"
    );
    Ok(report)
}
