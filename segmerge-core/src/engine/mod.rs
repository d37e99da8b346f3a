//! Stream-copy concatenation engines behind one session contract.

mod command;
mod error;
mod inprocess;
mod native;
mod plugin;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::{EngineStrategy, SegmergeConfig};
use crate::loader::SegmentFetcher;
use crate::media::{BlobRegistry, MediaRef};
use crate::platform::Platform;

pub use command::{CommandExecutor, SystemCommandExecutor};
pub use error::{EngineError, EngineResult};
pub use inprocess::InProcessEngine;
pub use native::NativeEngine;
pub use plugin::{parse_progress_line, FfmpegMuxPlugin, MuxPlugin, MuxRequest, MuxResponse, NativeProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    InProcess,
    Native,
}

impl EngineKind {
    /// `auto` picks the native engine on device classes that ship the mux plugin.
    pub fn select(strategy: EngineStrategy, platform: Platform) -> Self {
        match strategy {
            EngineStrategy::InProcess => EngineKind::InProcess,
            EngineStrategy::Native => EngineKind::Native,
            EngineStrategy::Auto => match platform {
                Platform::Native => EngineKind::Native,
                Platform::Portable => EngineKind::InProcess,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::InProcess => "in_process",
            EngineKind::Native => "native",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file in (or borrowed by) a session's working storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkEntry {
    pub path: PathBuf,
    /// Owned entries are deleted on release; borrowed ones are left alone.
    pub owned: bool,
}

impl WorkEntry {
    pub fn owned(path: PathBuf) -> Self {
        Self { path, owned: true }
    }

    pub fn borrowed(path: PathBuf) -> Self {
        Self { path, owned: false }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Opens working storage owned exclusively by one merge job.
    async fn open_session(&self) -> EngineResult<Box<dyn EngineSession>>;
}

#[async_trait]
pub trait EngineSession: Send {
    fn kind(&self) -> EngineKind;

    /// Directory holding the session's working storage; removed on `close`.
    fn workdir(&self) -> &Path;

    /// Makes `source` available to the engine as an input entry.
    async fn stage(&mut self, source: &MediaRef, token: Option<&str>) -> EngineResult<WorkEntry>;

    /// Stream-copy concatenation of `inputs`, in order, into `output`.
    /// `progress` receives this step's completion in [0, 1].
    async fn concat(
        &mut self,
        inputs: &[WorkEntry],
        output: &str,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> EngineResult<WorkEntry>;

    /// Single-input stream copy, skipping the concat demuxer.
    async fn copy(&mut self, input: &WorkEntry, output: &str) -> EngineResult<WorkEntry>;

    /// Exposes a finished artifact as something a player can open.
    async fn materialize(&mut self, output: &WorkEntry) -> EngineResult<MediaRef>;

    async fn release(&mut self, entry: &WorkEntry) -> EngineResult<()>;

    async fn close(self: Box<Self>) -> EngineResult<()>;
}

pub struct EngineDeps {
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub blobs: BlobRegistry,
    pub executor: Arc<dyn CommandExecutor>,
}

pub fn build_engine(
    kind: EngineKind,
    config: &SegmergeConfig,
    deps: EngineDeps,
) -> Arc<dyn TranscodeEngine> {
    match kind {
        EngineKind::InProcess => Arc::new(
            InProcessEngine::new(config, deps.fetcher, deps.blobs).with_executor(deps.executor),
        ),
        EngineKind::Native => {
            let plugin = FfmpegMuxPlugin::new(&config.engine).with_executor(deps.executor);
            Arc::new(NativeEngine::new(
                config,
                deps.fetcher,
                deps.blobs,
                Arc::new(plugin),
            ))
        }
    }
}

pub(crate) async fn release_owned(entry: &WorkEntry) -> EngineResult<()> {
    if !entry.owned {
        return Ok(());
    }
    match fs::remove_file(&entry.path).await {
        Ok(()) => {
            debug!(path = %entry.path.display(), "released work entry");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(EngineError::io(source, &entry.path)),
    }
}

pub(crate) fn list_workdir(dir: &Path) -> Vec<PathBuf> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut entries: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    entries.sort();
    entries
}

pub(crate) async fn remove_workdir(dir: &Path) -> EngineResult<()> {
    let leftover = list_workdir(dir);
    if !leftover.is_empty() {
        warn!(
            dir = %dir.display(),
            count = leftover.len(),
            "removing work directory with unreleased entries"
        );
    }
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(EngineError::io(source, dir)),
    }
}

/// Removes a session directory if the job is dropped before `close` runs.
#[derive(Debug)]
pub(crate) struct WorkdirGuard {
    path: Option<PathBuf>,
}

impl WorkdirGuard {
    pub(crate) fn arm(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_dir_all(&path) {
            Ok(()) => warn!(dir = %path.display(), "removed work directory of an abandoned job"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(dir = %path.display(), error = %err, "failed to remove work directory"),
        }
    }
}

/// Quoting for entries of an ffmpeg concat list file.
pub(crate) fn concat_list(paths: &[String]) -> String {
    paths
        .iter()
        .map(|path| format!("file '{}'\n", path.replace('\'', "'\\''")))
        .collect()
}
