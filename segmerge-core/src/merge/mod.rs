//! Merge orchestration: one globally exclusive job that resolves a playlist,
//! concatenates it chunk by chunk and cleans up after itself.

mod chunk;
mod coordinator;
mod error;
mod fallback;
mod prefetch;
mod progress;
mod status;
mod tracker;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{MergeSection, PrefetchSection, SegmergeConfig};
use crate::engine::{EngineKind, EngineSession, TranscodeEngine, WorkEntry, WorkdirGuard};
use crate::loader::{LoadedSegment, SegmentLoader};
use crate::media::MediaRef;
use crate::plan::{flatten, unique_keys, PlanEntry, QualityTier, SegmentKey, SegmentRef};
use crate::platform::DeviceProfile;

pub use chunk::partition;
pub use coordinator::{JobPermit, MergeCoordinator};
pub use error::{MergeError, MergeResult};
pub use fallback::PlaybackFallback;
pub use prefetch::{PrefetchPool, PrefetchReport};
pub use progress::{ProgressBand, ProgressCallback, ProgressEvent, ProgressReporter};
pub use status::JobState;
pub use tracker::WorkTracker;

const FINAL_OUTPUT: &str = "output_final.mp4";

/// Per-call knobs; unset fields fall back to the orchestrator's defaults.
#[derive(Clone, Default)]
pub struct MergeOptions {
    pub chunk_size: Option<usize>,
    pub tier: Option<QualityTier>,
    pub prefetch: Option<bool>,
    pub on_progress: Option<ProgressCallback>,
}

impl MergeOptions {
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub job_id: Uuid,
    pub media: MediaRef,
    pub segments: usize,
    pub chunks: usize,
    pub skipped: Vec<SegmentKey>,
    pub engine: EngineKind,
    pub leftover_entries: usize,
    pub completed_at: DateTime<Utc>,
}

struct JobPlan<'a> {
    segments: &'a [SegmentRef],
    chunk_size: usize,
    prefetch: bool,
    tier: Option<QualityTier>,
}

struct Assembled {
    media: MediaRef,
    segments: usize,
    chunks: usize,
    skipped: Vec<SegmentKey>,
}

pub struct MergeOrchestrator {
    coordinator: MergeCoordinator,
    loader: Arc<SegmentLoader>,
    engine: Arc<dyn TranscodeEngine>,
    merge: MergeSection,
    prefetch: PrefetchSection,
    profile: DeviceProfile,
}

impl MergeOrchestrator {
    pub fn new(
        config: &SegmergeConfig,
        loader: Arc<SegmentLoader>,
        engine: Arc<dyn TranscodeEngine>,
    ) -> Self {
        Self {
            coordinator: MergeCoordinator::new(),
            loader,
            engine,
            merge: config.merge.clone(),
            prefetch: config.prefetch.clone(),
            profile: DeviceProfile::detect(),
        }
    }

    pub fn with_coordinator(mut self, coordinator: MergeCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn coordinator(&self) -> &MergeCoordinator {
        &self.coordinator
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    pub fn chunk_size(&self) -> usize {
        self.profile.chunk_size(&self.merge)
    }

    /// Runs one job to completion. Rejected with `Busy` while another job is
    /// active; transient work is released on every exit path.
    pub async fn merge(
        &self,
        entries: &[PlanEntry],
        token: Option<&str>,
        options: MergeOptions,
    ) -> MergeResult<MergeOutcome> {
        let _permit = self.coordinator.try_acquire()?;
        let job_id = Uuid::new_v4();
        let reporter = ProgressReporter::new(self.merge.progress_ceiling, options.on_progress.clone());

        let segments = match flatten(entries) {
            Ok(segments) => segments,
            Err(err) => {
                let err = MergeError::from(err);
                reporter.fail(err.to_string());
                return Err(err);
            }
        };
        let plan = JobPlan {
            segments: &segments,
            chunk_size: options.chunk_size.unwrap_or_else(|| self.chunk_size()).max(1),
            prefetch: options
                .prefetch
                .unwrap_or(self.engine.kind() == EngineKind::Native),
            tier: options.tier,
        };
        info!(
            job = %job_id,
            segments = segments.len(),
            chunk_size = plan.chunk_size,
            engine = %self.engine.kind(),
            "merge job started"
        );
        reporter.transition(JobState::Downloading)?;
        reporter.report(0.05, "initializing");

        let mut session = match self.engine.open_session().await {
            Ok(session) => session,
            Err(err) => {
                let err = MergeError::from(err);
                reporter.fail(err.to_string());
                return Err(err);
            }
        };
        let mut guard = WorkdirGuard::arm(session.workdir());
        let mut tracker = WorkTracker::new();
        let result = self
            .assemble(session.as_mut(), &mut tracker, &plan, token, &reporter)
            .await;

        tracker
            .release_all(session.as_mut(), self.loader.blobs())
            .await;
        let leftover_entries = tracker.len();
        if !tracker.is_empty() {
            warn!(job = %job_id, leftover_entries, "some work entries could not be released");
        }
        match session.close().await {
            Ok(()) => guard.disarm(),
            Err(err) => warn!(job = %job_id, error = %err, "failed to close engine session"),
        }

        match result {
            Ok(assembled) => {
                reporter.complete("complete")?;
                info!(
                    job = %job_id,
                    media = %assembled.media,
                    chunks = assembled.chunks,
                    "merge job finished"
                );
                Ok(MergeOutcome {
                    job_id,
                    media: assembled.media,
                    segments: assembled.segments,
                    chunks: assembled.chunks,
                    skipped: assembled.skipped,
                    engine: self.engine.kind(),
                    leftover_entries,
                    completed_at: Utc::now(),
                })
            }
            Err(err) => {
                warn!(job = %job_id, error = %err, "merge job failed");
                reporter.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn assemble(
        &self,
        session: &mut dyn EngineSession,
        tracker: &mut WorkTracker,
        plan: &JobPlan<'_>,
        token: Option<&str>,
        reporter: &ProgressReporter,
    ) -> MergeResult<Assembled> {
        let mut resolved: HashMap<SegmentKey, LoadedSegment> = HashMap::new();
        let mut playable: Vec<SegmentRef> = plan.segments.to_vec();
        let mut skipped = Vec::new();
        let mut chunk_start = 0.10;

        if plan.prefetch {
            let band = ProgressBand::new(0.05, 0.30);
            let on_progress = |done: usize, total: usize| {
                reporter.report(
                    band.at(done as f64 / total.max(1) as f64),
                    format!("downloaded {done}/{total}"),
                );
            };
            let report = PrefetchPool::new(&self.loader, &self.prefetch)
                .run(unique_keys(plan.segments), plan.tier, token, &on_progress)
                .await;
            for loaded in report.resolved.values() {
                if let MediaRef::Blob(id) = &loaded.reference {
                    tracker.track_blob(*id);
                }
            }
            playable.retain(|segment| report.resolved.contains_key(&segment.key));
            skipped = report.failed;
            resolved = report.resolved;
            if playable.is_empty() {
                return Err(MergeError::NoValidSegments);
            }
            chunk_start = band.end;
        }

        reporter.transition(JobState::Merging)?;
        let chunks = partition(&playable, plan.chunk_size);
        let chunk_total = chunks.len();
        let stamp = Utc::now().timestamp_millis();
        let band = ProgressBand::new(chunk_start, 0.80);
        let mut outputs: Vec<WorkEntry> = Vec::with_capacity(chunk_total);

        let mut unplayable: HashSet<SegmentKey> = HashSet::new();
        let mut staged = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_band = band.split(index, chunk_total);
            let mut inputs = Vec::with_capacity(chunk.len());
            for (position, segment) in chunk.iter().enumerate() {
                if unplayable.contains(&segment.key) {
                    continue;
                }
                let reference = match resolved.get(&segment.key) {
                    Some(loaded) => loaded.reference.clone(),
                    None => {
                        let loaded = self.loader.load(&segment.key, plan.tier, token).await;
                        if let MediaRef::Blob(id) = &loaded.reference {
                            tracker.track_blob(*id);
                        }
                        let reference = loaded.reference.clone();
                        resolved.insert(segment.key.clone(), loaded);
                        reference
                    }
                };
                let entry = match session.stage(&reference, token).await {
                    Ok(entry) => entry,
                    // a direct-stream fallback gets one last download attempt
                    Err(err) if matches!(reference, MediaRef::Remote(_)) => {
                        warn!(segment = %segment.key, error = %err, "segment unavailable, skipping");
                        unplayable.insert(segment.key.clone());
                        skipped.push(segment.key.clone());
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };
                tracker.track(entry.clone());
                inputs.push(entry);
                staged += 1;
                reporter.report(
                    chunk_band.at(0.5 * (position + 1) as f64 / chunk.len() as f64),
                    format!("loaded {}", segment.key),
                );
            }

            if inputs.is_empty() {
                debug!(chunk = index, "chunk has no playable segments");
                continue;
            }
            let name = format!("chunk_{stamp}_{index}.mp4");
            let on_concat = |fraction: f64| {
                reporter.report(chunk_band.at(0.5 + 0.5 * fraction), "merging chunk");
            };
            let output = session.concat(&inputs, &name, &on_concat).await?;
            tracker.track(output.clone());
            for input in &inputs {
                tracker.release(session, input).await;
            }
            debug!(chunk = index, inputs = inputs.len(), "chunk merged");
            reporter.report(
                chunk_band.end,
                format!("merged chunk {}/{chunk_total}", index + 1),
            );
            outputs.push(output);
        }

        reporter.report(0.85, "finalizing");
        let final_entry = match outputs.as_slice() {
            [] => return Err(MergeError::NoValidSegments),
            [single] => session.copy(single, FINAL_OUTPUT).await?,
            all => {
                let final_band = ProgressBand::new(0.85, 0.95);
                let on_concat = |fraction: f64| {
                    reporter.report(final_band.at(fraction), "merging chunks");
                };
                session.concat(all, FINAL_OUTPUT, &on_concat).await?
            }
        };
        tracker.track(final_entry.clone());
        for output in &outputs {
            tracker.release(session, output).await;
        }

        reporter.report(0.95, "generating output");
        let media = session.materialize(&final_entry).await?;
        Ok(Assembled {
            media,
            segments: staged,
            chunks: outputs.len(),
            skipped,
        })
    }
}
