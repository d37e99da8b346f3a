#![allow(dead_code)]

use std::collections::HashSet;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use segmerge_core::engine::{
    build_engine, CommandExecutor, EngineDeps, EngineError, EngineKind, MuxPlugin, MuxRequest,
    MuxResponse, NativeEngine, NativeProgress,
};
use segmerge_core::loader::{ExecutionMode, LoaderError, LoaderResult, SegmentFetcher, SegmentLoader};
use segmerge_core::merge::{MergeOrchestrator, ProgressCallback, ProgressEvent};
use segmerge_core::platform::DeviceProfile;
use segmerge_core::retry::RetryPolicy;
use segmerge_core::store::Payload;
use segmerge_core::SegmergeConfig;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

pub fn test_config(base: &Path) -> SegmergeConfig {
    let mut config = SegmergeConfig::default().with_base_dir(base);
    config.prefetch.stagger_ms = 0;
    config.prefetch.cooldown_ms = 0;
    config
}

/// Bytes a fake origin serves for a segment label such as `A` or `B_explanation`.
pub fn segment_bytes(label: &str) -> Vec<u8> {
    format!("[{label}]").into_bytes()
}

fn label_for(url: &Url) -> String {
    let code = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or_default()
        .to_string();
    let explanation = url
        .query_pairs()
        .any(|(key, value)| key == "explanation" && value == "true");
    if explanation {
        format!("{code}_explanation")
    } else {
        code
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    calls: Mutex<Vec<String>>,
    failing: bool,
    failing_labels: HashSet<String>,
    hanging: HashSet<String>,
    delay: Option<Duration>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Every request for `label` answers 404; other labels succeed.
    pub fn failing_on(mut self, label: &str) -> Self {
        self.failing_labels.insert(label.to_string());
        self
    }

    pub fn hanging_on(mut self, label: &str) -> Self {
        self.hanging.insert(label.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, label: &str) -> usize {
        self.calls().iter().filter(|call| *call == label).count()
    }
}

#[async_trait]
impl SegmentFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url, _token: Option<&str>) -> LoaderResult<Payload> {
        let label = label_for(url);
        self.calls.lock().unwrap().push(label.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.hanging.contains(&label) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing {
            return Err(LoaderError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        if self.failing_labels.contains(&label) {
            return Err(LoaderError::Status {
                status: 404,
                url: url.to_string(),
            });
        }
        Ok(Payload::Raw(segment_bytes(&label)))
    }
}

/// Stands in for ffmpeg: honours concat list files and `-c copy` by moving bytes.
#[derive(Default)]
pub struct FfmpegEmulator {
    calls: Mutex<Vec<Vec<String>>>,
    fail_on_call: Option<usize>,
    missing_binary: bool,
}

impl FfmpegEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_call(index: usize) -> Self {
        Self {
            fail_on_call: Some(index),
            ..Self::default()
        }
    }

    pub fn without_binary() -> Self {
        Self {
            missing_binary: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn input_after_flag(args: &[String]) -> String {
        let position = args.iter().position(|arg| arg == "-i").unwrap();
        args[position + 1].clone()
    }
}

#[async_trait]
impl CommandExecutor for FfmpegEmulator {
    async fn run(
        &self,
        _program: &Path,
        args: &[String],
        cwd: Option<&Path>,
    ) -> std::io::Result<Output> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(args.to_vec());
            calls.len() - 1
        };
        if self.fail_on_call == Some(index) {
            return Ok(Output {
                status: ExitStatus::from_raw(1 << 8),
                stdout: Vec::new(),
                stderr: b"concat demuxer: invalid data".to_vec(),
            });
        }
        let cwd = cwd.map(Path::to_path_buf).unwrap_or_default();
        let input = cwd.join(Self::input_after_flag(args));
        let output = cwd.join(args.last().unwrap());
        let bytes = if args.iter().any(|arg| arg == "concat") {
            let list = std::fs::read_to_string(&input)?;
            let mut joined = Vec::new();
            for line in list.lines() {
                let name = line
                    .trim()
                    .strip_prefix("file '")
                    .and_then(|rest| rest.strip_suffix('\''))
                    .unwrap();
                joined.extend(std::fs::read(cwd.join(name))?);
            }
            joined
        } else {
            std::fs::read(&input)?
        };
        std::fs::write(output, bytes)?;
        Ok(Output {
            status: ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }

    fn locate(&self, program: &Path) -> Option<PathBuf> {
        (!self.missing_binary).then(|| program.to_path_buf())
    }
}

/// Native plugin double: concatenates files and reports two progress ticks.
#[derive(Default)]
pub struct ConcatPlugin {
    requests: Mutex<Vec<MuxRequest>>,
    fail_on_request: Option<usize>,
    answer_with_uri: bool,
}

impl ConcatPlugin {
    pub fn failing_on_request(index: usize) -> Self {
        Self {
            fail_on_request: Some(index),
            ..Self::default()
        }
    }

    /// Answers with a `file://` URI instead of a plain path.
    pub fn answering_with_uri() -> Self {
        Self {
            answer_with_uri: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<MuxRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MuxPlugin for ConcatPlugin {
    async fn merge_videos(
        &self,
        request: MuxRequest,
        progress: UnboundedSender<NativeProgress>,
    ) -> Result<MuxResponse, EngineError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        if self.fail_on_request == Some(index) {
            return Err(EngineError::Plugin("muxer rejected the inputs".into()));
        }
        let mut joined = Vec::new();
        for path in &request.video_paths {
            joined.extend(std::fs::read(path).map_err(|err| EngineError::Plugin(err.to_string()))?);
        }
        let _ = progress.send(NativeProgress {
            progress: 0.5,
            message: "halfway".into(),
        });
        std::fs::write(&request.output_path, joined)
            .map_err(|err| EngineError::Plugin(err.to_string()))?;
        let _ = progress.send(NativeProgress {
            progress: 1.0,
            message: "done".into(),
        });
        let path = if self.answer_with_uri {
            Url::from_file_path(&request.output_path).unwrap().to_string()
        } else {
            request.output_path
        };
        Ok(MuxResponse { path })
    }
}

pub fn loader(
    config: &SegmergeConfig,
    mode: ExecutionMode,
    fetcher: Arc<FakeFetcher>,
) -> Arc<SegmentLoader> {
    Arc::new(
        SegmentLoader::new(config, mode)
            .unwrap()
            .with_fetcher(fetcher)
            .with_retry(RetryPolicy::linear(3, Duration::ZERO)),
    )
}

pub fn in_process(
    config: &SegmergeConfig,
    loader: Arc<SegmentLoader>,
    fetcher: Arc<FakeFetcher>,
    executor: Arc<FfmpegEmulator>,
    concurrency: usize,
) -> MergeOrchestrator {
    let engine = build_engine(
        EngineKind::InProcess,
        config,
        EngineDeps {
            fetcher,
            blobs: loader.blobs().clone(),
            executor,
        },
    );
    MergeOrchestrator::new(config, loader, engine)
        .with_profile(DeviceProfile::with_concurrency(concurrency))
}

pub fn native(
    config: &SegmergeConfig,
    loader: Arc<SegmentLoader>,
    fetcher: Arc<FakeFetcher>,
    plugin: Arc<ConcatPlugin>,
) -> MergeOrchestrator {
    let engine = NativeEngine::new(config, fetcher, loader.blobs().clone(), plugin);
    MergeOrchestrator::new(config, loader, Arc::new(engine))
        .with_profile(DeviceProfile::with_concurrency(2))
}

pub fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Arc::new(move |event: &ProgressEvent| {
        sink.lock().unwrap().push(event.clone());
    });
    (callback, events)
}

pub fn dir_entries(path: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(path) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
