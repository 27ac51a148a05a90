//! Pipeline stages, their order and how their results are logged.

use std::fmt;
use std::time::{Duration, Instant};

use super::ops::{FaceOps, FacesOptions, MatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    RemoveOrphanMarkers,
    FixMarkerReferences,
    CreateMarkerSubjects,
    ResolveCollisions,
    Optimize,
    Cluster,
    Match,
    DeleteOrphanPeople,
    DeleteOrphanFaces,
}

/// What a stage failure does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Abort the run.
    Fatal,
    /// Log and continue with the next stage.
    Recoverable,
}

impl Stage {
    /// Every stage, in execution order: maintenance, then clustering and
    /// matching, then cleanup.
    pub const PIPELINE: [Stage; 9] = [
        Stage::RemoveOrphanMarkers,
        Stage::FixMarkerReferences,
        Stage::CreateMarkerSubjects,
        Stage::ResolveCollisions,
        Stage::Optimize,
        Stage::Cluster,
        Stage::Match,
        Stage::DeleteOrphanPeople,
        Stage::DeleteOrphanFaces,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RemoveOrphanMarkers => "remove_orphan_markers",
            Stage::FixMarkerReferences => "fix_marker_references",
            Stage::CreateMarkerSubjects => "create_marker_subjects",
            Stage::ResolveCollisions => "resolve_collisions",
            Stage::Optimize => "optimize",
            Stage::Cluster => "cluster",
            Stage::Match => "match",
            Stage::DeleteOrphanPeople => "delete_orphan_people",
            Stage::DeleteOrphanFaces => "delete_orphan_faces",
        }
    }

    pub fn criticality(&self) -> Criticality {
        match self {
            Stage::Optimize => Criticality::Fatal,
            _ => Criticality::Recoverable,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one successful (or partly successful) stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutput {
    /// Rows removed, repaired or created.
    Count(usize),
    Collisions { examined: usize, resolved: usize },
    Merged(usize),
    /// New faces created by clustering.
    Clusters(usize),
    Matched(MatchResult),
}

impl StageOutput {
    fn is_zero(&self) -> bool {
        match self {
            StageOutput::Count(n) | StageOutput::Merged(n) | StageOutput::Clusters(n) => *n == 0,
            StageOutput::Collisions { examined, .. } => *examined == 0,
            StageOutput::Matched(m) => m.updated == 0,
        }
    }
}

impl fmt::Display for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutput::Count(n) => write!(f, "{}", n),
            StageOutput::Collisions { examined, resolved } => {
                write!(f, "resolved {} / {} collisions", resolved, examined)
            }
            StageOutput::Merged(n) => write!(f, "merged {} faces", n),
            StageOutput::Clusters(n) => write!(f, "added {} faces", n),
            StageOutput::Matched(m) => write!(
                f,
                "updated {}, recognized {}, unknown {}",
                m.updated, m.recognized, m.unknown
            ),
        }
    }
}

/// How one executed stage ended.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    /// Set on success, and on a failed match with the partial counters.
    pub output: Option<StageOutput>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.output, &self.error) {
            (_, Some(error)) => write!(f, "{}: failed: {}", self.stage, error),
            (Some(output), None) => write!(f, "{}: {}", self.stage, describe(self.stage, output)),
            (None, None) => write!(f, "{}: done", self.stage),
        }
    }
}

/// Run a single stage and log its outcome.
///
/// Returns the error cause as well when the stage failed, so the caller
/// can decide based on [`Stage::criticality`].
pub(crate) fn run_stage<O: FaceOps + ?Sized>(
    ops: &O,
    stage: Stage,
    opts: &FacesOptions,
) -> (StageOutcome, Option<anyhow::Error>) {
    let started = Instant::now();
    let result = execute(ops, stage, opts);
    let elapsed = started.elapsed();

    let (output, cause) = match result {
        Ok(output) => (Some(output), None),
        Err((partial, cause)) => (partial, Some(cause)),
    };
    let outcome = StageOutcome {
        stage,
        output,
        error: cause.as_ref().map(|e| format!("{:#}", e)),
        elapsed,
    };
    log_outcome(&outcome);

    (outcome, cause)
}

fn execute<O: FaceOps + ?Sized>(
    ops: &O,
    stage: Stage,
    opts: &FacesOptions,
) -> Result<StageOutput, (Option<StageOutput>, anyhow::Error)> {
    let plain = |e: anyhow::Error| -> (Option<StageOutput>, anyhow::Error) { (None, e) };
    let count = StageOutput::Count;
    match stage {
        Stage::RemoveOrphanMarkers => ops.remove_orphan_markers().map(count).map_err(plain),
        Stage::FixMarkerReferences => ops.fix_marker_references().map(count).map_err(plain),
        Stage::CreateMarkerSubjects => ops.create_marker_subjects().map(count).map_err(plain),
        Stage::ResolveCollisions => ops
            .resolve_face_collisions()
            .map(|(examined, resolved)| StageOutput::Collisions { examined, resolved })
            .map_err(plain),
        Stage::Optimize => ops
            .optimize_clusters(opts)
            .map(|r| StageOutput::Merged(r.merged))
            .map_err(plain),
        Stage::Cluster => ops
            .build_clusters(opts)
            .map(|faces| StageOutput::Clusters(faces.len()))
            .map_err(plain),
        Stage::Match => ops
            .match_markers(opts)
            .map(StageOutput::Matched)
            .map_err(|e| (Some(StageOutput::Matched(e.partial)), e.cause)),
        Stage::DeleteOrphanPeople => ops.delete_orphan_people().map(count).map_err(plain),
        Stage::DeleteOrphanFaces => ops.delete_orphan_faces().map(count).map_err(plain),
    }
}

fn describe(stage: Stage, output: &StageOutput) -> String {
    match (stage, output) {
        (Stage::RemoveOrphanMarkers, StageOutput::Count(n)) => {
            format!("removed {} orphan markers", n)
        }
        (Stage::FixMarkerReferences, StageOutput::Count(n)) => {
            format!("fixed {} marker references", n)
        }
        (Stage::CreateMarkerSubjects, StageOutput::Count(n)) => {
            format!("added {} subjects from marker names", n)
        }
        (Stage::DeleteOrphanPeople, StageOutput::Count(n)) => {
            format!("removed {} orphan people", n)
        }
        (Stage::DeleteOrphanFaces, StageOutput::Count(n)) => format!("removed {} orphan faces", n),
        (_, output) => output.to_string(),
    }
}

fn log_outcome(outcome: &StageOutcome) {
    let stage = outcome.stage.as_str();

    if let Some(error) = &outcome.error {
        tracing::error!(stage, elapsed = ?outcome.elapsed, error = %error, "faces: stage failed");
        if let Some(partial) = &outcome.output {
            tracing::warn!(
                stage,
                partial = true,
                "faces: {} before the failure",
                describe(outcome.stage, partial)
            );
        }
        return;
    }

    let Some(output) = &outcome.output else {
        return;
    };
    let message = describe(outcome.stage, output);
    if output.is_zero() {
        tracing::debug!(stage, elapsed = ?outcome.elapsed, "faces: {}", message);
    } else {
        tracing::info!(stage, elapsed = ?outcome.elapsed, "faces: {}", message);
    }
}
