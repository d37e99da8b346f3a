use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::{MergeError, MergeResult};

/// Admits at most one merge job at a time; construct once and share clones.
#[derive(Debug, Clone)]
pub struct MergeCoordinator {
    slots: Arc<Semaphore>,
}

/// Held for the lifetime of a job; dropping it admits the next one.
#[derive(Debug)]
pub struct JobPermit {
    _permit: OwnedSemaphorePermit,
}

impl MergeCoordinator {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Semaphore::new(1)),
        }
    }

    /// Fails fast with `Busy` instead of queueing behind the active job.
    pub fn try_acquire(&self) -> MergeResult<JobPermit> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .map(|permit| JobPermit { _permit: permit })
            .map_err(|_| MergeError::Busy)
    }

    pub fn is_busy(&self) -> bool {
        self.slots.available_permits() == 0
    }
}

impl Default for MergeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
