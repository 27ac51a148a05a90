pub mod clustering;
pub mod engine;
pub mod ops;
pub mod stages;
pub mod worker;

pub use engine::FaceEngine;
pub use ops::{FaceOps, FacesOptions, MatchFailure, MatchResult, OptimizeResult};
pub use stages::{Criticality, Stage, StageOutcome, StageOutput};
pub use worker::{run_faces_pipeline, FacesError, FacesReport, FacesWorker};
