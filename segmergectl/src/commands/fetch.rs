use clap::Args;
use serde::Serialize;

use segmerge_core::{
    ExecutionMode, LoadOrigin, LoadedSegment, MediaRef, QualityTier, SegmentKey, SegmentLoader,
};

use crate::{AppContext, AppError, DisplayFallback, Result};

/// Downloads a single segment into the content store.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Asana content code
    #[arg(long)]
    pub code: String,
    /// Quality tier (1080p | 720p); defaults to loader.native_default_tier
    #[arg(long)]
    pub tier: Option<QualityTier>,
    /// Fetch the explanation video instead of the main one
    #[arg(long)]
    pub explanation: bool,
}

#[derive(Debug, Serialize)]
pub struct FetchReport {
    #[serde(flatten)]
    pub segment: LoadedSegment,
}

pub(crate) async fn execute(context: &AppContext, args: &FetchArgs) -> Result<FetchReport> {
    let code = args.code.trim();
    if code.is_empty() {
        return Err(AppError::MissingResource("asana code is empty".to_string()));
    }
    let key = if args.explanation {
        SegmentKey::explanation(code)
    } else {
        SegmentKey::main(code)
    };
    let loader = SegmentLoader::new(&context.config, ExecutionMode::Filesystem)?;
    let segment = loader.load(&key, args.tier, context.token()).await;
    if segment.origin == LoadOrigin::DirectStream {
        return Err(AppError::MissingResource(format!(
            "{key} could not be stored locally; only {} is reachable",
            segment.reference
        )));
    }
    Ok(FetchReport { segment })
}

impl DisplayFallback for FetchReport {
    fn display(&self) -> String {
        let origin = match self.segment.origin {
            LoadOrigin::CacheHit => "already cached",
            LoadOrigin::Fetched => "downloaded",
            LoadOrigin::DirectStream => "streaming only",
        };
        let location = match &self.segment.reference {
            MediaRef::LocalFile(path) => path.display().to_string(),
            other => other.to_string(),
        };
        format!(
            "{} ({}) {origin} after {} attempt(s): {location}",
            self.segment.key, self.segment.tier, self.segment.attempts
        )
    }
}
