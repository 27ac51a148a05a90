use anyhow::Result;

use crate::db::Face;

/// Options for one pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacesOptions {
    /// Reconsider markers that were already clustered or matched.
    pub force: bool,
}

/// Outcome of cluster optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeResult {
    pub merged: usize,
}

/// Counters produced by marker matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchResult {
    /// Markers whose face or subject changed.
    pub updated: usize,
    /// Markers that ended up with a subject.
    pub recognized: usize,
    /// Markers with no matching face or no subject.
    pub unknown: usize,
}

/// Matching stopped early. `partial` holds the counters reached so far;
/// they describe work that was only partly applied.
#[derive(Debug, thiserror::Error)]
#[error("{cause:#}")]
pub struct MatchFailure {
    pub partial: MatchResult,
    pub cause: anyhow::Error,
}

impl MatchFailure {
    pub fn new(partial: MatchResult, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            partial,
            cause: cause.into(),
        }
    }
}

/// The operations the faces pipeline runs, one per stage.
///
/// Every method must be safe to call again after a failure or a
/// completed run.
pub trait FaceOps {
    fn remove_orphan_markers(&self) -> Result<usize>;

    fn fix_marker_references(&self) -> Result<usize>;

    fn create_marker_subjects(&self) -> Result<usize>;

    /// Returns `(examined, resolved)`.
    fn resolve_face_collisions(&self) -> Result<(usize, usize)>;

    fn optimize_clusters(&self, opts: &FacesOptions) -> Result<OptimizeResult>;

    /// Returns the faces created by this call.
    fn build_clusters(&self, opts: &FacesOptions) -> Result<Vec<Face>>;

    fn match_markers(&self, opts: &FacesOptions) -> Result<MatchResult, MatchFailure>;

    fn delete_orphan_people(&self) -> Result<usize>;

    fn delete_orphan_faces(&self) -> Result<usize>;
}
