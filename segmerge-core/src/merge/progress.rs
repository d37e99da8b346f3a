use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use super::error::{MergeError, MergeResult};
use super::status::JobState;

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub fraction: f64,
    pub status: JobState,
    pub message: String,
}

/// Sub-range of the job's [0, 1] progress assigned to one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn at(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * fraction
    }

    /// The `index`-th of `count` equal slices.
    pub fn split(&self, index: usize, count: usize) -> Self {
        let count = count.max(1) as f64;
        Self::new(
            self.at(index as f64 / count),
            self.at((index + 1) as f64 / count),
        )
    }
}

struct ProgressInner {
    fraction: f64,
    state: JobState,
}

/// Unified progress channel for one job: non-decreasing, held under the
/// ceiling until `complete` snaps it to 1.0.
pub struct ProgressReporter {
    ceiling: f64,
    callback: Option<ProgressCallback>,
    inner: Mutex<ProgressInner>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("ceiling", &self.ceiling)
            .field("fraction", &self.fraction())
            .field("state", &self.state())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(ceiling: f64, callback: Option<ProgressCallback>) -> Self {
        Self {
            ceiling,
            callback,
            inner: Mutex::new(ProgressInner {
                fraction: 0.0,
                state: JobState::Idle,
            }),
        }
    }

    pub fn fraction(&self) -> f64 {
        self.lock().fraction
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn transition(&self, next: JobState) -> MergeResult<()> {
        let mut inner = self.lock();
        if !inner.state.can_transition(next) {
            return Err(MergeError::InvalidTransition {
                from: inner.state,
                to: next,
            });
        }
        debug!(from = %inner.state, to = %next, "job state changed");
        inner.state = next;
        Ok(())
    }

    pub fn report(&self, fraction: f64, message: impl Into<String>) {
        let event = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return;
            }
            let capped = if fraction.is_finite() {
                fraction.min(self.ceiling)
            } else {
                inner.fraction
            };
            inner.fraction = inner.fraction.max(capped);
            ProgressEvent {
                fraction: inner.fraction,
                status: inner.state,
                message: message.into(),
            }
        };
        self.emit(&event);
    }

    pub fn complete(&self, message: impl Into<String>) -> MergeResult<()> {
        self.transition(JobState::Ready)?;
        let event = {
            let mut inner = self.lock();
            inner.fraction = 1.0;
            ProgressEvent {
                fraction: 1.0,
                status: JobState::Ready,
                message: message.into(),
            }
        };
        self.emit(&event);
        Ok(())
    }

    /// Moves the job to `error`; progress stays where it stopped.
    pub fn fail(&self, message: impl Into<String>) {
        let event = {
            let mut inner = self.lock();
            if !inner.state.can_transition(JobState::Error) {
                return;
            }
            inner.state = JobState::Error;
            ProgressEvent {
                fraction: inner.fraction,
                status: JobState::Error,
                message: message.into(),
            }
        };
        self.emit(&event);
    }

    fn emit(&self, event: &ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
