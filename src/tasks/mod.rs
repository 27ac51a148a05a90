//! Named worker locks for maintenance jobs.
//!
//! Every long-running job belongs to a [`WorkerKind`]. At most one job per
//! kind runs at a time, and a job polls [`WorkerRegistry::canceled`] between
//! its stages so that broader jobs can ask it to yield.

pub mod registry;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use registry::{WorkerGuard, WorkerRegistry};

/// Category of background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    /// Indexing and other jobs that need the whole library.
    Main,
    /// Metadata updates.
    Meta,
    /// Face clustering and matching.
    Faces,
    /// Orphan row purging.
    Purge,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Main,
        WorkerKind::Meta,
        WorkerKind::Faces,
        WorkerKind::Purge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Main => "main",
            WorkerKind::Meta => "meta",
            WorkerKind::Faces => "faces",
            WorkerKind::Purge => "purge",
        }
    }

    /// Kinds whose cancellation also cancels this one.
    pub fn superseded_by(&self) -> &'static [WorkerKind] {
        match self {
            WorkerKind::Main => &[],
            WorkerKind::Meta => &[WorkerKind::Main],
            WorkerKind::Faces => &[WorkerKind::Main, WorkerKind::Meta],
            WorkerKind::Purge => &[WorkerKind::Main],
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock acquisition failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    /// The kind's lock is held; the caller should skip this run.
    #[error("{0} worker is already running")]
    Busy(WorkerKind),
}

/// Snapshot of a running worker.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub kind: WorkerKind,
    pub canceled: bool,
    pub elapsed: Duration,
}
