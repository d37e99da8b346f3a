use std::path::PathBuf;

use thiserror::Error;

use crate::loader::LoaderError;
use crate::media::MediaError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("{message}")]
    Environment { message: String, hint: String },
    #[error("native mux plugin failed: {0}")]
    Plugin(String),
    #[error("entry {0} does not belong to this session")]
    UnknownEntry(PathBuf),
    #[error("nothing to concatenate")]
    NoInputs,
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("download error: {0}")]
    Download(#[from] LoaderError),
}

impl EngineError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        EngineError::Io {
            source,
            path: path.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
