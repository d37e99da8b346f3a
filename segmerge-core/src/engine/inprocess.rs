use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::command::{render_command, CommandExecutor, SystemCommandExecutor};
use super::error::{EngineError, EngineResult};
use super::{
    concat_list, release_owned, remove_workdir, EngineKind, EngineSession,
    TranscodeEngine, WorkEntry,
};
use crate::config::SegmergeConfig;
use crate::loader::SegmentFetcher;
use crate::media::{BlobRegistry, MediaRef};

const ENVIRONMENT_HINT: &str = "install ffmpeg or point engine.ffmpeg_binary at it, \
     or set engine.strategy = \"native\" on devices that provide the mux plugin";

/// Software engine running ffmpeg against a private per-job directory.
pub struct InProcessEngine {
    root: PathBuf,
    ffmpeg: PathBuf,
    fetcher: Arc<dyn SegmentFetcher>,
    blobs: BlobRegistry,
    executor: Arc<dyn CommandExecutor>,
}

impl InProcessEngine {
    pub fn new(
        config: &SegmergeConfig,
        fetcher: Arc<dyn SegmentFetcher>,
        blobs: BlobRegistry,
    ) -> Self {
        Self {
            root: config.cache_dir().join("engine"),
            ffmpeg: PathBuf::from(&config.engine.ffmpeg_binary),
            fetcher,
            blobs,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TranscodeEngine for InProcessEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::InProcess
    }

    async fn open_session(&self) -> EngineResult<Box<dyn EngineSession>> {
        let ffmpeg = self
            .executor
            .locate(&self.ffmpeg)
            .ok_or_else(|| EngineError::Environment {
                message: format!(
                    "in-process engine unavailable: `{}` not found",
                    self.ffmpeg.display()
                ),
                hint: ENVIRONMENT_HINT.into(),
            })?;
        let dir = self.root.join(format!("session-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| EngineError::io(source, &dir))?;
        debug!(dir = %dir.display(), "opened in-process session");
        Ok(Box::new(InProcessSession {
            dir,
            ffmpeg,
            fetcher: Arc::clone(&self.fetcher),
            blobs: self.blobs.clone(),
            executor: Arc::clone(&self.executor),
            counter: 0,
        }))
    }
}

struct InProcessSession {
    dir: PathBuf,
    ffmpeg: PathBuf,
    fetcher: Arc<dyn SegmentFetcher>,
    blobs: BlobRegistry,
    executor: Arc<dyn CommandExecutor>,
    counter: usize,
}

impl InProcessSession {
    fn next_id(&mut self) -> usize {
        let id = self.counter;
        self.counter += 1;
        id
    }

    fn member_name(&self, entry: &WorkEntry) -> EngineResult<String> {
        if entry.path.parent() != Some(self.dir.as_path()) {
            return Err(EngineError::UnknownEntry(entry.path.clone()));
        }
        Ok(entry.name())
    }

    async fn ffmpeg(&self, args: Vec<String>) -> EngineResult<()> {
        let output = self
            .executor
            .run(&self.ffmpeg, &args, Some(self.dir.as_path()))
            .await
            .map_err(|source| EngineError::io(source, &self.ffmpeg))?;
        if !output.status.success() {
            return Err(EngineError::CommandFailure {
                command: render_command(&self.ffmpeg, &args),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

fn base_args() -> Vec<String> {
    ["-y", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[async_trait]
impl EngineSession for InProcessSession {
    fn kind(&self) -> EngineKind {
        EngineKind::InProcess
    }

    fn workdir(&self) -> &Path {
        &self.dir
    }

    async fn stage(&mut self, source: &MediaRef, token: Option<&str>) -> EngineResult<WorkEntry> {
        let id = self.next_id();
        let path = self.dir.join(format!("temp_in_{id}.mp4"));
        match source {
            MediaRef::LocalFile(from) => {
                fs::copy(from, &path)
                    .await
                    .map_err(|err| EngineError::io(err, from))?;
            }
            MediaRef::Remote(url) => self.fetcher.download_to(url, token, &path).await?,
            MediaRef::Blob(id) => {
                let bytes = self.blobs.read(id)?;
                fs::write(&path, bytes.as_slice())
                    .await
                    .map_err(|err| EngineError::io(err, &path))?;
            }
        }
        Ok(WorkEntry::owned(path))
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
        let names = inputs
            .iter()
            .map(|entry| self.member_name(entry))
            .collect::<EngineResult<Vec<_>>>()?;
        let id = self.next_id();
        let list_name = format!("list_{id}.txt");
        let list_path = self.dir.join(&list_name);
        fs::write(&list_path, concat_list(&names))
            .await
            .map_err(|err| EngineError::io(err, &list_path))?;

        let mut args = base_args();
        args.extend(
            ["-f", "concat", "-safe", "0", "-i", list_name.as_str(), "-c", "copy", output]
                .into_iter()
                .map(String::from),
        );
        let result = self.ffmpeg(args).await;
        if let Err(err) = fs::remove_file(&list_path).await {
            warn!(path = %list_path.display(), error = %err, "failed to remove concat list");
        }
        result?;
        progress(1.0);
        info!(inputs = inputs.len(), output, "concatenated entries");
        Ok(WorkEntry::owned(self.dir.join(output)))
    }

    async fn copy(&mut self, input: &WorkEntry, output: &str) -> EngineResult<WorkEntry> {
        let name = self.member_name(input)?;
        let mut args = base_args();
        args.extend(
            ["-i", name.as_str(), "-c", "copy", output]
                .into_iter()
                .map(String::from),
        );
        self.ffmpeg(args).await?;
        Ok(WorkEntry::owned(self.dir.join(output)))
    }

    async fn materialize(&mut self, output: &WorkEntry) -> EngineResult<MediaRef> {
        let bytes = fs::read(&output.path)
            .await
            .map_err(|err| EngineError::io(err, &output.path))?;
        Ok(self.blobs.create(bytes))
    }

    async fn release(&mut self, entry: &WorkEntry) -> EngineResult<()> {
        release_owned(entry).await
    }

    async fn close(self: Box<Self>) -> EngineResult<()> {
        remove_workdir(&self.dir).await
    }
}
