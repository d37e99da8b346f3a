use std::path::PathBuf;

use thiserror::Error;

use crate::error::ConfigError;
use crate::media::MediaError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid source url {url}: {reason}")]
    Url { url: String, reason: String },
    #[error("stored segment {0} did not resolve")]
    Unresolved(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl LoaderError {
    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LoaderError::Io {
            source,
            path: path.into(),
        }
    }
}

pub type LoaderResult<T> = Result<T, LoaderError>;
