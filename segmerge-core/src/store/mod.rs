//! Filesystem-backed content store keyed by segment identity and quality tier.

mod error;
mod payload;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::media::MediaRef;
use crate::plan::{QualityTier, SegmentKey, SegmentVariant};

pub use error::{StoreError, StoreResult};
pub use payload::Payload;

const ASSET_EXTENSION: &str = "mp4";
const EXPLANATION_SUFFIX: &str = "_explanation";

/// Deterministic cache key: identical (code, tier, variant) always maps to one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub code: String,
    pub tier: QualityTier,
    pub variant: SegmentVariant,
}

impl AssetKey {
    pub fn new(key: &SegmentKey, tier: QualityTier) -> Self {
        Self {
            code: key.code.clone(),
            tier,
            variant: key.variant,
        }
    }

    pub fn file_name(&self) -> String {
        let code: String = self
            .code
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let suffix = if self.variant.is_explanation() {
            EXPLANATION_SUFFIX
        } else {
            ""
        };
        format!("{code}{suffix}_{}.{ASSET_EXTENSION}", self.tier)
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persists the payload under `key`, creating parent directories.
    async fn write(&self, key: &AssetKey, payload: Payload) -> StoreResult<()>;

    /// `Ok(None)` when nothing is stored for `key`; I/O failures are errors.
    async fn resolve(&self, key: &AssetKey) -> StoreResult<Option<MediaRef>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct CachedAsset {
    pub code: String,
    pub tier: Option<QualityTier>,
    pub explanation: bool,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new<P: AsRef<Path>>(data_dir: P, video_dir: &str) -> Self {
        Self {
            root: data_dir.as_ref().join(video_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &AssetKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Lists every cached asset; a missing root is an empty store.
    pub fn entries(&self) -> StoreResult<Vec<CachedAsset>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut assets = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|err| StoreError::Walk {
                message: err.to_string(),
                path: err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.root.clone()),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ASSET_EXTENSION) {
                continue;
            }
            let size_bytes = entry
                .metadata()
                .map(|meta| meta.len())
                .map_err(|err| StoreError::Walk {
                    message: err.to_string(),
                    path: path.to_path_buf(),
                })?;
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
            let (name, tier) = match stem.rsplit_once('_') {
                Some((name, tier)) => (name.to_string(), tier.parse().ok()),
                None => (stem.clone(), None),
            };
            let (code, explanation) = match name.strip_suffix(EXPLANATION_SUFFIX) {
                Some(code) => (code.to_string(), true),
                None => (name, false),
            };
            assets.push(CachedAsset {
                code,
                tier,
                explanation,
                path: path.to_path_buf(),
                size_bytes,
            });
        }
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(assets)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn write(&self, key: &AssetKey, payload: Payload) -> StoreResult<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::io(source, parent))?;
        }
        let bytes = payload.into_bytes()?;
        let partial = path.with_extension(format!("{ASSET_EXTENSION}.part"));
        fs::write(&partial, &bytes)
            .await
            .map_err(|source| StoreError::io(source, &partial))?;
        fs::rename(&partial, &path)
            .await
            .map_err(|source| StoreError::io(source, &path))?;
        debug!(path = %path.display(), bytes = bytes.len(), "stored segment");
        Ok(())
    }

    async fn resolve(&self, key: &AssetKey) -> StoreResult<Option<MediaRef>> {
        let path = self.path_for(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(MediaRef::LocalFile(path))),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::io(source, path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn keys_are_deterministic_and_path_safe() {
        let main = AssetKey::new(&SegmentKey::main("TADASANA"), QualityTier::High);
        assert_eq!(main.file_name(), "TADASANA_1080p.mp4");
        let explanation = AssetKey::new(&SegmentKey::explanation("TADASANA"), QualityTier::Low);
        assert_eq!(explanation.file_name(), "TADASANA_explanation_720p.mp4");
        let hostile = AssetKey::new(&SegmentKey::main("../etc/passwd"), QualityTier::Low);
        assert_eq!(hostile.file_name(), "___etc_passwd_720p.mp4");
        assert_eq!(main, AssetKey::new(&SegmentKey::main("TADASANA"), QualityTier::High));
    }

    #[tokio::test]
    async fn resolve_distinguishes_absent_from_present() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::new(dir.path(), "asana-videos");
        let key = AssetKey::new(&SegmentKey::main("A"), QualityTier::Low);
        assert!(store.resolve(&key).await.unwrap().is_none());

        store
            .write(&key, Payload::Base64("AAEC".into()))
            .await
            .unwrap();
        let resolved = store.resolve(&key).await.unwrap().unwrap();
        let path = resolved.local_path().unwrap().to_path_buf();
        assert_eq!(path, dir.path().join("asana-videos").join("A_720p.mp4"));
        assert_eq!(std::fs::read(path).unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn resolve_surfaces_io_failures() {
        let dir = TempDir::new().unwrap();
        // a regular file where the store directory should be
        std::fs::write(dir.path().join("asana-videos"), b"not a directory").unwrap();
        let store = FsContentStore::new(dir.path(), "asana-videos");
        let key = AssetKey::new(&SegmentKey::main("A"), QualityTier::Low);
        assert!(store.resolve(&key).await.is_err());
    }

    #[tokio::test]
    async fn lists_cached_assets() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::new(dir.path(), "asana-videos");
        assert!(store.entries().unwrap().is_empty());
        store
            .write(
                &AssetKey::new(&SegmentKey::explanation("B"), QualityTier::High),
                Payload::Raw(vec![1; 4]),
            )
            .await
            .unwrap();
        store
            .write(
                &AssetKey::new(&SegmentKey::main("A"), QualityTier::Low),
                Payload::Raw(vec![1; 2]),
            )
            .await
            .unwrap();
        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, "A");
        assert_eq!(entries[0].tier, Some(QualityTier::Low));
        assert!(!entries[0].explanation);
        assert_eq!(entries[1].code, "B");
        assert!(entries[1].explanation);
        assert_eq!(entries[1].size_bytes, 4);
    }
}
