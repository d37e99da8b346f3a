use tracing::warn;
use uuid::Uuid;

use crate::engine::{EngineSession, WorkEntry};
use crate::media::BlobRegistry;

/// Every transient resource a job creates, released on all exit paths.
#[derive(Debug, Default)]
pub struct WorkTracker {
    entries: Vec<WorkEntry>,
    blobs: Vec<Uuid>,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, entry: WorkEntry) {
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn track_blob(&mut self, id: Uuid) {
        if !self.blobs.contains(&id) {
            self.blobs.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases one entry early; it stays tracked if the release fails.
    pub async fn release(&mut self, session: &mut dyn EngineSession, entry: &WorkEntry) {
        match session.release(entry).await {
            Ok(()) => self.entries.retain(|tracked| tracked != entry),
            Err(err) => {
                warn!(path = %entry.path.display(), error = %err, "failed to release work entry");
            }
        }
    }

    /// Releases everything still tracked. Entries whose release fails stay
    /// tracked; returns how many there were.
    pub async fn release_all(
        &mut self,
        session: &mut dyn EngineSession,
        blobs: &BlobRegistry,
    ) -> usize {
        let mut kept = Vec::new();
        for entry in std::mem::take(&mut self.entries) {
            if let Err(err) = session.release(&entry).await {
                warn!(path = %entry.path.display(), error = %err, "failed to release work entry");
                kept.push(entry);
            }
        }
        let failures = kept.len();
        self.entries = kept;
        for id in std::mem::take(&mut self.blobs) {
            blobs.revoke(&id);
        }
        failures
    }
}
