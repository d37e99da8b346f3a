use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{EngineError, EngineResult};
use super::plugin::{MuxPlugin, MuxRequest, NativeProgress};
use super::{
    release_owned, remove_workdir, EngineKind, EngineSession, TranscodeEngine,
    WorkEntry,
};
use crate::config::SegmergeConfig;
use crate::loader::SegmentFetcher;
use crate::media::{BlobRegistry, MediaRef};

/// Delegates muxing to a host plugin; inputs live on device storage.
pub struct NativeEngine {
    cache_dir: PathBuf,
    output_dir: PathBuf,
    fetcher: Arc<dyn SegmentFetcher>,
    blobs: BlobRegistry,
    plugin: Arc<dyn MuxPlugin>,
}

impl NativeEngine {
    pub fn new(
        config: &SegmergeConfig,
        fetcher: Arc<dyn SegmentFetcher>,
        blobs: BlobRegistry,
        plugin: Arc<dyn MuxPlugin>,
    ) -> Self {
        Self {
            cache_dir: config.cache_dir(),
            output_dir: config.output_dir(),
            fetcher,
            blobs,
            plugin,
        }
    }
}

#[async_trait]
impl TranscodeEngine for NativeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    async fn open_session(&self) -> EngineResult<Box<dyn EngineSession>> {
        let dir = self.cache_dir.join(format!("video_merge_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| EngineError::io(source, &dir))?;
        debug!(dir = %dir.display(), "opened native session");
        Ok(Box::new(NativeSession {
            dir,
            output_dir: self.output_dir.clone(),
            fetcher: Arc::clone(&self.fetcher),
            blobs: self.blobs.clone(),
            plugin: Arc::clone(&self.plugin),
            counter: 0,
        }))
    }
}

struct NativeSession {
    dir: PathBuf,
    output_dir: PathBuf,
    fetcher: Arc<dyn SegmentFetcher>,
    blobs: BlobRegistry,
    plugin: Arc<dyn MuxPlugin>,
    counter: usize,
}

impl NativeSession {
    fn next_path(&mut self) -> PathBuf {
        let path = self.dir.join(format!("segment_{}.mp4", self.counter));
        self.counter += 1;
        path
    }
}

async fn move_file(from: &Path, to: &Path) -> EngineResult<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // rename cannot cross filesystems
    fs::copy(from, to)
        .await
        .map_err(|err| EngineError::io(err, to))?;
    fs::remove_file(from)
        .await
        .map_err(|err| EngineError::io(err, from))
}

#[async_trait]
impl EngineSession for NativeSession {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    fn workdir(&self) -> &Path {
        &self.dir
    }

    async fn stage(&mut self, source: &MediaRef, token: Option<&str>) -> EngineResult<WorkEntry> {
        match source {
            MediaRef::LocalFile(path) => {
                fs::metadata(path)
                    .await
                    .map_err(|err| EngineError::io(err, path))?;
                Ok(WorkEntry::borrowed(path.clone()))
            }
            MediaRef::Remote(url) => {
                let path = self.next_path();
                self.fetcher.download_to(url, token, &path).await?;
                Ok(WorkEntry::owned(path))
            }
            MediaRef::Blob(id) => {
                let path = self.next_path();
                let bytes = self.blobs.read(id)?;
                fs::write(&path, bytes.as_slice())
                    .await
                    .map_err(|err| EngineError::io(err, &path))?;
                Ok(WorkEntry::owned(path))
            }
        }
    }

    async fn concat(
        &mut self,
        inputs: &[WorkEntry],
        output: &str,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> EngineResult<WorkEntry> {
        if inputs.is_empty() {
            return Err(EngineError::NoInputs);
        }
        let output_path = self.dir.join(output);
        let request = MuxRequest {
            video_paths: inputs
                .iter()
                .map(|entry| entry.path.to_string_lossy().to_string())
                .collect(),
            output_path: output_path.to_string_lossy().to_string(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<NativeProgress>();
        let forward = async {
            while let Some(event) = rx.recv().await {
                if event.progress.is_finite() {
                    progress(event.progress.clamp(0.0, 1.0));
                }
            }
        };
        let (response, ()) = tokio::join!(self.plugin.merge_videos(request, tx), forward);
        let response = response?;
        info!(inputs = inputs.len(), output = %response.path, "native mux finished");
        // plugins answer with a plain path, a file:// URI or an app-local file URL
        let produced = match MediaRef::parse(&response.path)? {
            MediaRef::LocalFile(path) => path,
            other => {
                return Err(EngineError::Plugin(format!(
                    "output is not a device file: {other}"
                )))
            }
        };
        if produced.parent() == Some(self.dir.as_path()) {
            Ok(WorkEntry::owned(produced))
        } else {
            Err(EngineError::Plugin(format!(
                "output written outside the session: {}",
                produced.display()
            )))
        }
    }

    async fn copy(&mut self, input: &WorkEntry, output: &str) -> EngineResult<WorkEntry> {
        let target = self.dir.join(output);
        fs::copy(&input.path, &target)
            .await
            .map_err(|err| EngineError::io(err, &target))?;
        Ok(WorkEntry::owned(target))
    }

    async fn materialize(&mut self, output: &WorkEntry) -> EngineResult<MediaRef> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| EngineError::io(err, &self.output_dir))?;
        let target = self.output_dir.join(format!("merged_{}.mp4", Uuid::new_v4()));
        move_file(&output.path, &target).await?;
        Ok(MediaRef::LocalFile(target))
    }

    async fn release(&mut self, entry: &WorkEntry) -> EngineResult<()> {
        release_owned(entry).await
    }

    async fn close(self: Box<Self>) -> EngineResult<()> {
        remove_workdir(&self.dir).await
    }
}
