//! Single-flight orchestrator for the faces pipeline.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use super::engine::FaceEngine;
use super::ops::{FaceOps, FacesOptions};
use super::stages::{run_stage, Criticality, Stage, StageOutcome};
use crate::config::Config;
use crate::db::Database;
use crate::tasks::{WorkerError, WorkerKind, WorkerRegistry};

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum FacesError {
    #[error("facial recognition is disabled")]
    Disabled,

    #[error(transparent)]
    Busy(#[from] WorkerError),

    /// A fatal stage failed; later stages did not run.
    #[error("{stage} failed: {cause:#}")]
    Stage { stage: Stage, cause: anyhow::Error },

    #[error("faces worker panicked: {message}")]
    Panic { message: String, backtrace: String },
}

/// Stages executed by one run, in order.
#[derive(Debug, Clone, Default)]
pub struct FacesReport {
    pub stages: Vec<StageOutcome>,
    /// Set when a cancellation request stopped the run early.
    pub canceled: bool,
}

impl FacesReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|o| o.stage == stage)
    }

    pub fn executed(&self) -> Vec<Stage> {
        self.stages.iter().map(|o| o.stage).collect()
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages.iter().filter(|o| !o.is_ok())
    }
}

pub struct FacesWorker<O> {
    ops: O,
    workers: Arc<WorkerRegistry>,
    disabled: bool,
}

impl<O: FaceOps> FacesWorker<O> {
    pub fn new(ops: O, workers: Arc<WorkerRegistry>, disabled: bool) -> Self {
        Self {
            ops,
            workers,
            disabled,
        }
    }

    /// Run every stage once under the faces lock.
    pub fn start(&self, opts: FacesOptions) -> Result<FacesReport, FacesError> {
        if self.disabled() {
            return Err(FacesError::Disabled);
        }

        let _guard = self.workers.start(WorkerKind::Faces)?;
        let started = Instant::now();
        tracing::info!(force = opts.force, "faces: starting");

        match panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(&opts))) {
            Ok(Ok(report)) => {
                let failed = report.failed().count();
                tracing::info!(
                    elapsed = ?started.elapsed(),
                    failed,
                    canceled = report.canceled,
                    "faces: completed"
                );
                Ok(report)
            }
            Ok(Err(e)) => {
                tracing::error!(elapsed = ?started.elapsed(), error = %e, "faces: aborted");
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let backtrace = Backtrace::force_capture().to_string();
                tracing::error!(panic = %message, backtrace = %backtrace, "faces: worker panicked");
                Err(FacesError::Panic { message, backtrace })
            }
        }
    }

    pub fn start_default(&self) -> Result<FacesReport, FacesError> {
        self.start(FacesOptions::default())
    }

    pub fn cancel(&self) {
        self.workers.cancel(WorkerKind::Faces);
    }

    /// True if this run or a broader job was asked to stop.
    pub fn canceled(&self) -> bool {
        self.workers.canceled(WorkerKind::Faces)
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    fn run_stages(&self, opts: &FacesOptions) -> Result<FacesReport, FacesError> {
        let mut report = FacesReport::default();

        for stage in Stage::PIPELINE {
            if self.canceled() {
                tracing::warn!(next = stage.as_str(), "faces: canceled, skipping remaining stages");
                report.canceled = true;
                break;
            }

            let (outcome, cause) = run_stage(&self.ops, stage, opts);
            report.stages.push(outcome);

            if let Some(cause) = cause {
                if stage.criticality() == Criticality::Fatal {
                    return Err(FacesError::Stage { stage, cause });
                }
            }
        }

        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the pipeline once against `db` with the engine from `config`.
pub fn run_faces_pipeline(
    db: &Database,
    config: &Config,
    workers: Arc<WorkerRegistry>,
    opts: FacesOptions,
) -> Result<FacesReport, FacesError> {
    let engine = FaceEngine::new(db, &config.faces);
    FacesWorker::new(engine, workers, config.faces.disabled).start(opts)
}
