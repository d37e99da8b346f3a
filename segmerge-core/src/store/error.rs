use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid payload: {0}")]
    Payload(String),
    #[error("failed to walk content store {path}: {message}")]
    Walk { message: String, path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        StoreError::Io {
            source,
            path: path.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
