//! Per-document ingestion progress, published over watch channels.
//!
//! Each document gets one channel carrying a fraction in [0, 1]. Writes are
//! last-write-wins; a subscriber polling slowly sees the latest value, never
//! a stale intermediate one.
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

pub struct ProgressTracker {
    channels: Mutex<HashMap<i64, watch::Sender<f32>>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Publish the current progress for a document, creating its channel on
    /// first use.
    pub fn publish(&self, document_id: i64, progress: f32) {
        let Ok(mut channels) = self.channels.lock() else {
            return;
        };
        channels
            .entry(document_id)
            .or_insert_with(|| watch::channel(0.0).0)
            .send_replace(progress);
    }

    /// Subscribe to a document's progress. Creates the channel if no value
    /// has been published yet, so subscribing before ingestion starts works.
    pub fn subscribe(&self, document_id: i64) -> Option<watch::Receiver<f32>> {
        let mut channels = self.channels.lock().ok()?;
        Some(
            channels
                .entry(document_id)
                .or_insert_with(|| watch::channel(0.0).0)
                .subscribe(),
        )
    }

    /// Latest published value, if the document is being tracked.
    #[must_use]
    pub fn get(&self, document_id: i64) -> Option<f32> {
        let channels = self.channels.lock().ok()?;
        channels.get(&document_id).map(|tx| *tx.borrow())
    }

    /// Stop tracking a document. Existing receivers keep their last value.
    pub fn clear(&self, document_id: i64) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.remove(&document_id);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
