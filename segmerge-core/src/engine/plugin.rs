use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use super::command::{render_command, CommandExecutor, SystemCommandExecutor};
use super::concat_list;
use super::error::{EngineError, EngineResult};
use crate::config::EngineSection;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxRequest {
    pub video_paths: Vec<String>,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxResponse {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeProgress {
    pub progress: f64,
    pub message: String,
}

/// Host-platform media muxer. Progress events are best effort; the returned
/// path is the only completion signal.
#[async_trait]
pub trait MuxPlugin: Send + Sync {
    async fn merge_videos(
        &self,
        request: MuxRequest,
        progress: UnboundedSender<NativeProgress>,
    ) -> EngineResult<MuxResponse>;
}

/// Out-of-process muxer driving the system ffmpeg.
pub struct FfmpegMuxPlugin {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl FfmpegMuxPlugin {
    pub fn new(engine: &EngineSection) -> Self {
        Self {
            ffmpeg: PathBuf::from(&engine.ffmpeg_binary),
            ffprobe: PathBuf::from(&engine.ffprobe_binary),
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    async fn probe_duration(&self, path: &str) -> Option<Duration> {
        let args: Vec<String> = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            path,
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let output = match self.executor.run(&self.ffprobe, &args, None).await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!(path, status = ?output.status.code(), "ffprobe failed");
                return None;
            }
            Err(err) => {
                debug!(path, error = %err, "ffprobe unavailable");
                return None;
            }
        };
        let seconds = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .ok()?;
        (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
    }

    async fn total_duration(&self, paths: &[String]) -> Option<Duration> {
        let mut total = Duration::ZERO;
        for path in paths {
            total += self.probe_duration(path).await?;
        }
        Some(total)
    }
}

#[async_trait]
impl MuxPlugin for FfmpegMuxPlugin {
    async fn merge_videos(
        &self,
        request: MuxRequest,
        progress: UnboundedSender<NativeProgress>,
    ) -> EngineResult<MuxResponse> {
        if request.video_paths.is_empty() {
            return Err(EngineError::NoInputs);
        }
        let output_path = PathBuf::from(&request.output_path);
        let workdir = output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let total = self.total_duration(&request.video_paths).await;

        let list_path = workdir.join(format!("list_{}.txt", Uuid::new_v4()));
        fs::write(&list_path, concat_list(&request.video_paths))
            .await
            .map_err(|err| EngineError::io(err, &list_path))?;

        let args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .into_iter()
        .map(String::from)
        .chain([list_path.to_string_lossy().to_string()])
        .chain(["-c", "copy"].into_iter().map(String::from))
        .chain([request.output_path.clone()])
        .collect();

        let on_line: &(dyn for<'l> Fn(&'l str) + Send + Sync) = &|line: &str| {
            if let Some(fraction) = parse_progress_line(line, total) {
                let _ = progress.send(NativeProgress {
                    progress: fraction,
                    message: "muxing".into(),
                });
            }
        };
        let result = self
            .executor
            .run_streaming(&self.ffmpeg, &args, None, on_line)
            .await;
        if let Err(err) = fs::remove_file(&list_path).await {
            warn!(path = %list_path.display(), error = %err, "failed to remove concat list");
        }
        let output = result.map_err(|err| EngineError::io(err, &self.ffmpeg))?;
        if !output.status.success() {
            return Err(EngineError::CommandFailure {
                command: render_command(&self.ffmpeg, &args),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        let _ = progress.send(NativeProgress {
            progress: 1.0,
            message: "complete".into(),
        });
        Ok(MuxResponse {
            path: request.output_path,
        })
    }
}

/// Maps one `-progress pipe:1` line to a completion fraction.
pub fn parse_progress_line(line: &str, total: Option<Duration>) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(1.0),
        // ffmpeg reports microseconds under both keys
        "out_time_us" | "out_time_ms" => {
            let total = total.filter(|total| !total.is_zero())?;
            let micros = value.parse::<f64>().ok().filter(|m| *m >= 0.0)?;
            Some((micros / total.as_micros() as f64).clamp(0.0, 1.0))
        }
        _ => None,
    }
}
