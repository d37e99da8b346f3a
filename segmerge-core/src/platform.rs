use serde::Serialize;

use crate::config::MergeSection;

/// Device class the pipeline runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Mobile targets shipping the native mux plugin.
    Native,
    Portable,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(any(target_os = "android", target_os = "ios")) {
            Platform::Native
        } else {
            Platform::Portable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub concurrency: usize,
}

impl DeviceProfile {
    pub fn detect() -> Self {
        Self::with_concurrency(num_cpus::get())
    }

    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Constrained devices get smaller chunks to bound peak memory.
    pub fn chunk_size(&self, merge: &MergeSection) -> usize {
        if self.concurrency <= merge.concurrency_threshold {
            merge.low_chunk_size
        } else {
            merge.high_chunk_size
        }
    }
}
