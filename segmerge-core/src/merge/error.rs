use thiserror::Error;

use super::status::JobState;
use crate::engine::EngineError;
use crate::plan::PlanError;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("a merge job is already running")]
    Busy,
    #[error("No videos to merge in the asana list")]
    EmptyPlaylist,
    #[error("No valid videos to merge")]
    NoValidSegments,
    #[error("{message}; {hint}")]
    Environment { message: String, hint: String },
    #[error("transcode failed: {0}")]
    Engine(EngineError),
    #[error("plan error: {0}")]
    Plan(PlanError),
    #[error("invalid job transition {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },
}

impl MergeError {
    /// Stable machine-readable code for callers that branch on failures.
    pub fn code(&self) -> &'static str {
        match self {
            MergeError::Busy => "busy",
            MergeError::EmptyPlaylist => "empty_playlist",
            MergeError::NoValidSegments => "no_valid_segments",
            MergeError::Environment { .. } => "environment",
            MergeError::Engine(_) => "engine",
            MergeError::Plan(_) => "plan",
            MergeError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

impl From<EngineError> for MergeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Environment { message, hint } => MergeError::Environment { message, hint },
            other => MergeError::Engine(other),
        }
    }
}

impl From<PlanError> for MergeError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Empty => MergeError::EmptyPlaylist,
            other => MergeError::Plan(other),
        }
    }
}

pub type MergeResult<T> = Result<T, MergeError>;
