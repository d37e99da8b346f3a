use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::PrefetchSection;
use crate::loader::{LoadedSegment, SegmentLoader};
use crate::plan::{QualityTier, SegmentKey};

#[derive(Debug, Default)]
pub struct PrefetchReport {
    pub resolved: HashMap<SegmentKey, LoadedSegment>,
    /// Direct-stream fallbacks land in `resolved`; staging retries them once.
    /// Keys whose task timed out.
    pub failed: Vec<SegmentKey>,
}

/// Small staggered worker pool pulling fetch keys from a shared queue.
pub struct PrefetchPool<'a> {
    loader: &'a SegmentLoader,
    settings: &'a PrefetchSection,
}

impl<'a> PrefetchPool<'a> {
    pub fn new(loader: &'a SegmentLoader, settings: &'a PrefetchSection) -> Self {
        Self { loader, settings }
    }

    /// Completion order is unspecified; `on_progress(done, total)` fires after
    /// every task.
    pub async fn run(
        &self,
        keys: Vec<SegmentKey>,
        tier: Option<QualityTier>,
        token: Option<&str>,
        on_progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> PrefetchReport {
        let total = keys.len();
        let queue = Mutex::new(VecDeque::from(keys));
        let report = Mutex::new(PrefetchReport::default());
        let done = AtomicUsize::new(0);
        let workers = self.settings.workers.min(total);

        let tasks = (0..workers).map(|index| {
            let queue = &queue;
            let report = &report;
            let done = &done;
            async move {
                let stagger = self.settings.stagger() * index as u32;
                if !stagger.is_zero() {
                    sleep(stagger).await;
                }
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(key) = next else {
                        break;
                    };
                    let limit = self.settings.task_timeout();
                    let outcome = timeout(limit, self.loader.load(&key, tier, token)).await;
                    {
                        let mut report = report.lock().unwrap_or_else(PoisonError::into_inner);
                        match outcome {
                            Ok(loaded) => {
                                if !loaded.is_local() {
                                    warn!(
                                        segment = %key,
                                        reference = %loaded.reference,
                                        "prefetch produced no local copy"
                                    );
                                }
                                report.resolved.insert(key, loaded);
                            }
                            Err(_) => {
                                warn!(segment = %key, timeout = ?limit, "prefetch task timed out");
                                report.failed.push(key);
                            }
                        }
                    }
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(finished, total);
                    let cooldown = self.settings.cooldown();
                    if !cooldown.is_zero() {
                        sleep(cooldown).await;
                    }
                }
                debug!(worker = index, "prefetch worker drained queue");
            }
        });
        join_all(tasks).await;
        report.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
