use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::info;

use segmerge_core::config::MergeSection;
use segmerge_core::merge::ProgressCallback;
use segmerge_core::{
    build_engine, BlobRegistry, DeviceProfile, EngineDeps, EngineKind, EngineStrategy,
    ExecutionMode, MediaRef, MergeOptions, MergeOrchestrator, Platform, PracticePlan,
    ProgressEvent, SegmentLoader, SystemCommandExecutor,
};

use crate::{AppContext, AppError, DisplayFallback, Result};

/// Merges a practice plan into a single video file.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Plan document (JSON, as served by the origin)
    #[arg(long)]
    pub plan: PathBuf,
    /// Where to write the merged video (defaults to paths.output_dir)
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Overrides engine.strategy from the configuration
    #[arg(long, value_enum)]
    pub engine: Option<EngineChoice>,
    /// Device class used to pick the chunk size
    #[arg(long, value_enum, default_value_t = ProfileChoice::Auto)]
    pub profile: ProfileChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineChoice {
    Auto,
    InProcess,
    Native,
}

impl From<EngineChoice> for EngineStrategy {
    fn from(choice: EngineChoice) -> Self {
        match choice {
            EngineChoice::Auto => EngineStrategy::Auto,
            EngineChoice::InProcess => EngineStrategy::InProcess,
            EngineChoice::Native => EngineStrategy::Native,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileChoice {
    /// Detect from the available cores
    Auto,
    /// At or below merge.concurrency_threshold
    Constrained,
    /// Above merge.concurrency_threshold
    Capable,
}

impl ProfileChoice {
    pub fn resolve(self, merge: &MergeSection) -> DeviceProfile {
        match self {
            ProfileChoice::Auto => DeviceProfile::detect(),
            ProfileChoice::Constrained => {
                DeviceProfile::with_concurrency(merge.concurrency_threshold)
            }
            ProfileChoice::Capable => {
                DeviceProfile::with_concurrency(merge.concurrency_threshold + 1)
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MergeReport {
    pub job_id: String,
    pub title: String,
    pub engine: EngineKind,
    pub output: PathBuf,
    pub segments: usize,
    pub chunks: usize,
    pub skipped: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

pub(crate) async fn execute(context: &AppContext, args: &MergeArgs) -> Result<MergeReport> {
    let config = &context.config;
    let plan = PracticePlan::from_path(&args.plan)?;
    let strategy = args
        .engine
        .map(EngineStrategy::from)
        .unwrap_or(config.engine.strategy);
    let kind = EngineKind::select(strategy, Platform::current());

    let loader = Arc::new(SegmentLoader::new(config, ExecutionMode::Filesystem)?);
    let blobs = loader.blobs().clone();
    let engine = build_engine(
        kind,
        config,
        EngineDeps {
            fetcher: loader.fetcher(),
            blobs: blobs.clone(),
            executor: Arc::new(SystemCommandExecutor),
        },
    );
    let orchestrator = MergeOrchestrator::new(config, loader, engine)
        .with_profile(args.profile.resolve(&config.merge));

    let on_progress: ProgressCallback = Arc::new(|event: &ProgressEvent| {
        eprintln!(
            "[{:>5.1}%] {:<11} {}",
            event.fraction * 100.0,
            event.status.as_str(),
            event.message
        );
    });
    info!(plan = %args.plan.display(), engine = %kind, "starting merge");
    let outcome = orchestrator
        .merge(
            &plan.asana_list,
            context.token(),
            MergeOptions::default().with_progress(on_progress),
        )
        .await?;

    let output = match &args.output {
        Some(path) => path.clone(),
        None => config
            .output_dir()
            .join(format!("merged_{}.mp4", outcome.job_id)),
    };
    write_artifact(&outcome.media, &blobs, &output).await?;

    Ok(MergeReport {
        job_id: outcome.job_id.to_string(),
        title: plan.title,
        engine: outcome.engine,
        output,
        segments: outcome.segments,
        chunks: outcome.chunks,
        skipped: outcome.skipped.iter().map(ToString::to_string).collect(),
        completed_at: outcome.completed_at,
    })
}

/// Copies the job's media reference to `output`; blobs are revoked once written.
async fn write_artifact(media: &MediaRef, blobs: &BlobRegistry, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    match media {
        MediaRef::LocalFile(path) if path == output => {}
        MediaRef::LocalFile(path) => {
            if tokio::fs::rename(path, output).await.is_err() {
                tokio::fs::copy(path, output).await?;
                tokio::fs::remove_file(path).await?;
            }
        }
        MediaRef::Blob(id) => {
            let bytes = blobs.read(id)?;
            tokio::fs::write(output, bytes.as_slice()).await?;
            blobs.revoke(id);
        }
        MediaRef::Remote(url) => {
            return Err(AppError::MissingResource(format!(
                "merge produced a remote reference {url}"
            )));
        }
    }
    Ok(())
}

impl DisplayFallback for MergeReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Merged {} segments in {} chunks with the {} engine",
            self.segments, self.chunks, self.engine
        )];
        lines.push(format!("Output: {}", self.output.display()));
        if !self.skipped.is_empty() {
            lines.push(format!("Skipped: {}", self.skipped.join(", ")));
        }
        lines.join("\n")
    }
}
