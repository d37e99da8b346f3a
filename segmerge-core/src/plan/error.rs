use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no videos to merge in the asana list")]
    Empty,
    #[error("unknown quality tier: {0}")]
    InvalidTier(String),
    #[error("failed to read plan {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse plan: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type PlanResult<T> = Result<T, PlanError>;
