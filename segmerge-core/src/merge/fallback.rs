use std::collections::HashSet;

use tracing::info;

use crate::loader::{LoadedSegment, SegmentLoader};
use crate::plan::{QualityTier, SegmentKey};

/// One-shot quality degradation after a playback failure, per segment code.
#[derive(Debug, Default)]
pub struct PlaybackFallback {
    attempted: HashSet<String>,
}

impl PlaybackFallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tier to retry with, or `None` once this code has already degraded
    /// or no lower tier exists.
    pub fn next_tier(&mut self, code: &str, failed: QualityTier) -> Option<QualityTier> {
        let lower = failed.fallback()?;
        self.attempted.insert(code.to_string()).then_some(lower)
    }

    pub fn has_fallen_back(&self, code: &str) -> bool {
        self.attempted.contains(code)
    }

    pub async fn reload(
        &mut self,
        loader: &SegmentLoader,
        key: &SegmentKey,
        failed: QualityTier,
        token: Option<&str>,
    ) -> Option<LoadedSegment> {
        let tier = self.next_tier(&key.code, failed)?;
        info!(segment = %key, from = %failed, to = %tier, "reloading at lower quality");
        Some(loader.load(key, Some(tier), token).await)
    }
}
