//! Playable media references and the in-memory blob registry.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, Serializer};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Path prefix under which the host shell serves app-local files over http.
pub const APP_FILE_PREFIX: &str = "/_app_file_";

const BLOB_SCHEME: &str = "blob:";
const BLOB_ORIGIN: &str = "segmerge/";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported media reference: {0}")]
    Unsupported(String),
    #[error("malformed blob reference: {0}")]
    MalformedBlob(String),
    #[error("blob {0} is not registered")]
    UnknownBlob(Uuid),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// A reference a media player (or a transcode engine) can open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaRef {
    LocalFile(PathBuf),
    Remote(Url),
    Blob(Uuid),
}

impl MediaRef {
    pub fn parse(value: &str) -> MediaResult<Self> {
        let value = value.trim();
        if let Some(rest) = value.strip_prefix(BLOB_SCHEME) {
            let id = rest.strip_prefix(BLOB_ORIGIN).unwrap_or(rest);
            return Uuid::parse_str(id)
                .map(MediaRef::Blob)
                .map_err(|_| MediaError::MalformedBlob(value.to_string()));
        }
        if let Ok(url) = Url::parse(value) {
            return match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map(MediaRef::LocalFile)
                    .map_err(|_| MediaError::Unsupported(value.to_string())),
                "http" | "https" => match url.path().find(APP_FILE_PREFIX) {
                    Some(index) => {
                        let encoded = &url.path()[index + APP_FILE_PREFIX.len()..];
                        app_file_path(encoded)
                            .map(MediaRef::LocalFile)
                            .ok_or_else(|| MediaError::Unsupported(value.to_string()))
                    }
                    None => Ok(MediaRef::Remote(url)),
                },
                _ => Err(MediaError::Unsupported(value.to_string())),
            };
        }
        let path = Path::new(value);
        if path.is_absolute() {
            Ok(MediaRef::LocalFile(path.to_path_buf()))
        } else {
            Err(MediaError::Unsupported(value.to_string()))
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaRef::LocalFile(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, MediaRef::Remote(_))
    }

    pub fn to_uri(&self) -> String {
        match self {
            MediaRef::LocalFile(path) => Url::from_file_path(path)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| path.display().to_string()),
            MediaRef::Remote(url) => url.to_string(),
            MediaRef::Blob(id) => format!("{BLOB_SCHEME}{BLOB_ORIGIN}{id}"),
        }
    }
}

fn app_file_path(encoded: &str) -> Option<PathBuf> {
    if !encoded.starts_with('/') {
        return None;
    }
    Url::parse(&format!("file://{encoded}"))
        .ok()?
        .to_file_path()
        .ok()
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl Serialize for MediaRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// In-memory object store backing `blob:` references.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    blobs: Arc<Mutex<HashMap<Uuid, Arc<Vec<u8>>>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>) -> MediaRef {
        let id = Uuid::new_v4();
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(bytes));
        MediaRef::Blob(id)
    }

    pub fn read(&self, id: &Uuid) -> MediaResult<Arc<Vec<u8>>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(MediaError::UnknownBlob(*id))
    }

    /// Drops the registry's handle; returns whether the blob existed.
    pub fn revoke(&self, id: &Uuid) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
