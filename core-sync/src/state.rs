//! Observable sync state for UIs and the foreground host.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// What the upload engine is doing with the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStep {
    #[default]
    Idle,
    Uploading,
    MergingChunks,
}

impl SyncStep {
    pub fn label(&self) -> &'static str {
        match self {
            SyncStep::Idle => "",
            SyncStep::Uploading => "Uploading",
            SyncStep::MergingChunks => "Merging chunks",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position within the current pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    pub total: usize,
    pub completed: usize,
    pub file_name: String,
    pub step: SyncStep,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub is_syncing: bool,
    pub progress: SyncProgress,
    pub step: SyncStep,
    /// Progress of the current file, 0.0..=1.0
    pub file_progress: f32,
}

/// Publishes [`SyncState`] snapshots; receivers always see the latest one.
#[derive(Clone)]
pub struct SyncStateManager {
    tx: Arc<watch::Sender<SyncState>>,
}

impl SyncStateManager {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SyncState {
        self.tx.borrow().clone()
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.tx.send_modify(|s| s.is_syncing = syncing);
    }

    pub fn set_progress_info(&self, completed: usize, total: usize, file_name: &str) {
        self.tx.send_modify(|s| {
            s.progress.completed = completed;
            s.progress.total = total;
            s.progress.file_name = file_name.to_string();
        });
    }

    pub fn set_step(&self, step: SyncStep) {
        self.tx.send_modify(|s| {
            s.step = step;
            s.progress.step = step;
        });
    }

    pub fn set_file_progress(&self, progress: f32) {
        self.tx
            .send_modify(|s| s.file_progress = progress.clamp(0.0, 1.0));
    }

    pub fn reset(&self) {
        self.tx.send_replace(SyncState::default());
    }
}

impl Default for SyncStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_labels() {
        assert_eq!(SyncStep::Uploading.label(), "Uploading");
        assert_eq!(SyncStep::MergingChunks.to_string(), "Merging chunks");
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let state = SyncStateManager::new();
        let mut rx = state.subscribe();

        state.set_syncing(true);
        state.set_progress_info(1, 4, "a.jpg");
        state.set_step(SyncStep::MergingChunks);
        state.set_file_progress(1.5);

        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert!(snapshot.is_syncing);
        assert_eq!(snapshot.progress.completed, 1);
        assert_eq!(snapshot.progress.total, 4);
        assert_eq!(snapshot.progress.file_name, "a.jpg");
        assert_eq!(snapshot.progress.step, SyncStep::MergingChunks);
        assert_eq!(snapshot.file_progress, 1.0);

        state.reset();
        assert_eq!(state.current(), SyncState::default());
    }
}
