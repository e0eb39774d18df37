//! # Sync Coordinator
//!
//! Runs upload passes over the media the change detector reports.
//!
//! ## Workflow
//!
//! 1. Claim the single sync slot (one pass at a time per device)
//! 2. Collect pending items from the selected albums, oldest generation first
//! 3. Upload items in order through the [`UploadEngine`]
//! 4. Advance the cursor after every accepted item
//! 5. Stop at the first failure; record the sync time when nothing failed
//! 6. Emit progress events via `EventBus` and publish [`SyncState`](crate::state::SyncState)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//!
//! # async fn example(coordinator: SyncCoordinator) -> Result<(), Box<dyn std::error::Error>> {
//! let job_id = coordinator.start_sync().await?;
//! println!("Started sync job: {}", job_id);
//!
//! // Cancel if needed
//! coordinator.cancel_sync().await;
//! # Ok(())
//! # }
//! ```

use crate::{
    albums::AlbumSelection,
    cursor::SyncCursorStore,
    detector::ChangeDetector,
    job::{ItemFailure, SyncJob, SyncJobId, SyncReport},
    state::{SyncStateManager, SyncStep},
    upload::{UploadConfig, UploadEngine, UploadFailureReason, UploadResult},
    Result, SyncError,
};
use bridge_traits::{
    media::MediaIndex, storage::SettingsStore, time::Clock, upload::MediaUploadApi,
};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Sync coordinator configuration
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub upload: UploadConfig,

    /// Send the platform favorite flag with uploads instead of always 0
    pub sync_favorites: bool,
}

/// Active sync job tracking
#[derive(Clone)]
struct ActiveSync {
    job_id: SyncJobId,
    cancellation_token: CancellationToken,
}

/// A pass running in the background.
pub struct SyncHandle {
    pub job_id: SyncJobId,
    pub task: JoinHandle<SyncReport>,
}

enum PassOutcome {
    Completed,
    Failed {
        failure: ItemFailure,
        reason: UploadFailureReason,
    },
    Cancelled,
}

/// Sync coordinator for orchestrating upload passes
#[derive(Clone)]
pub struct SyncCoordinator {
    event_bus: EventBus,
    detector: Arc<ChangeDetector>,
    cursor: SyncCursorStore,
    engine: Arc<UploadEngine>,
    state: SyncStateManager,
    clock: Arc<dyn Clock>,

    /// The running pass, if any
    active: Arc<Mutex<Option<ActiveSync>>>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        index: Arc<dyn MediaIndex>,
        settings: Arc<dyn SettingsStore>,
        api: Arc<dyn MediaUploadApi>,
        event_bus: EventBus,
        state: SyncStateManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cursor = SyncCursorStore::new(settings.clone());
        let detector = Arc::new(ChangeDetector::new(
            index.clone(),
            AlbumSelection::new(settings),
            cursor.clone(),
            config.sync_favorites,
        ));
        let engine = Arc::new(UploadEngine::new(api, index, state.clone(), config.upload));

        Self {
            event_bus,
            detector,
            cursor,
            engine,
            state,
            clock,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn state(&self) -> &SyncStateManager {
        &self.state
    }

    /// Start a pass in the background and return its job id.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if another pass is running.
    pub async fn start_sync(&self) -> Result<SyncJobId> {
        Ok(self.spawn_sync().await?.job_id)
    }

    /// Like [`SyncCoordinator::start_sync`] but hands back the task so the
    /// caller can wait for the report.
    #[instrument(skip(self))]
    pub async fn spawn_sync(&self) -> Result<SyncHandle> {
        let job_id = SyncJobId::new();
        let token = CancellationToken::new();
        self.claim(job_id, token.clone()).await?;

        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let report = coordinator.execute(job_id, token).await;
            coordinator.release(job_id).await;
            report
        });

        info!(job_id = %job_id, "Started sync");
        Ok(SyncHandle { job_id, task })
    }

    /// Run one pass on the current task.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if another pass is running. Upload failures
    /// are reported through the returned [`SyncReport`].
    #[instrument(skip(self, cancel))]
    pub async fn run_sync(&self, cancel: CancellationToken) -> Result<SyncReport> {
        let job_id = SyncJobId::new();
        self.claim(job_id, cancel.clone()).await?;
        let report = self.execute(job_id, cancel).await;
        self.release(job_id).await;
        Ok(report)
    }

    /// Signal the running pass to stop. Returns false when nothing is running.
    pub async fn cancel_sync(&self) -> bool {
        let active = self.active.lock().await.clone();
        match active {
            Some(sync) => {
                sync.cancellation_token.cancel();
                info!(job_id = %sync.job_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    pub async fn is_sync_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn active_job(&self) -> Option<SyncJobId> {
        self.active.lock().await.as_ref().map(|s| s.job_id)
    }

    async fn claim(&self, job_id: SyncJobId, cancellation_token: CancellationToken) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(existing) = active.as_ref() {
            return Err(SyncError::SyncInProgress {
                job_id: existing.job_id.to_string(),
            });
        }
        *active = Some(ActiveSync {
            job_id,
            cancellation_token,
        });
        Ok(())
    }

    async fn release(&self, job_id: SyncJobId) {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|s| s.job_id) == Some(job_id) {
            *active = None;
        }
    }

    #[instrument(skip(self, cancel), fields(job_id = %job_id))]
    async fn execute(&self, job_id: SyncJobId, cancel: CancellationToken) -> SyncReport {
        self.state.set_syncing(true);

        let mut job = SyncJob::with_id(job_id);
        let outcome = self.upload_pending(&mut job, &cancel).await;
        let job = self.finish(job, outcome);

        self.state.set_step(SyncStep::Idle);
        self.state.set_syncing(false);
        job.report()
    }

    async fn upload_pending(&self, job: &mut SyncJob, cancel: &CancellationToken) -> Result<PassOutcome> {
        let items = self.detector.fetch_pending().await?;
        let total = items.len();
        *job = job.clone().start(total as u64)?;
        let job_id = job.id.to_string();

        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Started {
            job_id: job_id.clone(),
            pending_items: total as u64,
        }));
        info!(pending = total, "Uploading pending media");

        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(PassOutcome::Cancelled);
            }

            self.state.set_progress_info(i, total, &item.file_name);
            let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::ItemStarted {
                job_id: job_id.clone(),
                index: i as u64 + 1,
                total: total as u64,
                file_name: item.file_name.clone(),
                chunked: self.engine.is_chunked(item),
            }));

            match self.engine.upload(item, cancel).await {
                UploadResult::Success => {
                    self.cursor.advance(item.generation_modified).await?;
                    job.record_upload(item.generation_modified)?;
                    let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::ItemUploaded {
                        job_id: job_id.clone(),
                        file_name: item.file_name.clone(),
                        generation: item.generation_modified,
                    }));
                }
                UploadResult::Failure { reason, message } => {
                    warn!(file = %item.file_name, reason = %reason, message = %message, "Upload failed, stopping pass");
                    let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::ItemFailed {
                        job_id: job_id.clone(),
                        file_name: item.file_name.clone(),
                        reason: reason.as_str().to_string(),
                        message: message.clone(),
                    }));
                    return Ok(PassOutcome::Failed {
                        failure: ItemFailure {
                            file_name: item.file_name.clone(),
                            reason: reason.as_str().to_string(),
                            message,
                        },
                        reason,
                    });
                }
                UploadResult::Cancelled => return Ok(PassOutcome::Cancelled),
            }
        }

        self.state.set_progress_info(total, total, "");
        self.cursor
            .record_sync_time(self.clock.unix_timestamp_millis())
            .await?;
        Ok(PassOutcome::Completed)
    }

    fn finish(&self, job: SyncJob, outcome: Result<PassOutcome>) -> SyncJob {
        let job_id = job.id.to_string();
        let uploaded = job.uploaded;

        let next = match outcome {
            Ok(PassOutcome::Completed) => job.clone().complete().map(|done| {
                let duration_secs = done.duration_secs().unwrap_or(0);
                info!(uploaded, duration_secs, "Sync completed");
                let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Completed {
                    job_id,
                    uploaded,
                    duration_secs,
                }));
                done
            }),
            Ok(PassOutcome::Failed { failure, reason }) => {
                let message = format!("{}: {}", failure.file_name, failure.message);
                let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Failed {
                    job_id,
                    message: message.clone(),
                    uploaded,
                    recoverable: reason == UploadFailureReason::NetworkError,
                }));
                job.clone().fail(message, Some(failure))
            }
            Ok(PassOutcome::Cancelled) => {
                info!(uploaded, "Sync cancelled");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Cancelled { job_id, uploaded }));
                job.clone().cancel()
            }
            Err(e) => {
                error!(error = %e, "Sync failed");
                let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::Failed {
                    job_id,
                    message: e.to_string(),
                    uploaded,
                    recoverable: false,
                }));
                job.clone().fail(e.to_string(), None)
            }
        };

        match next {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "Job left in its previous state");
                job
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SyncStatus;
    use crate::testing::{memory_settings, record, FakeMediaIndex, ScriptedUploadApi};
    use bridge_traits::time::ManualClock;
    use chrono::TimeZone;
    use core_runtime::events::EventStream;
    use std::time::Duration;

    struct Harness {
        coordinator: SyncCoordinator,
        api: Arc<ScriptedUploadApi>,
        cursor: SyncCursorStore,
        events: EventStream,
    }

    async fn harness(index: FakeMediaIndex) -> Harness {
        let settings = memory_settings().await;
        AlbumSelection::new(settings.clone()).toggle(1).await.unwrap();

        let api = Arc::new(ScriptedUploadApi::default());
        let event_bus = EventBus::new(64);
        let events = EventStream::new(event_bus.subscribe());
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        ));
        let config = SyncConfig {
            upload: UploadConfig {
                chunk_size: 4,
                chunk_threshold: 8,
                poll_interval: Duration::from_millis(10),
                ..UploadConfig::default()
            },
            sync_favorites: false,
        };

        let coordinator = SyncCoordinator::new(
            config,
            Arc::new(index),
            settings.clone(),
            api.clone(),
            event_bus,
            SyncStateManager::new(),
            clock,
        );

        Harness {
            coordinator,
            api,
            cursor: SyncCursorStore::new(settings),
            events,
        }
    }

    fn drain(events: &mut EventStream) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Some(Ok(event)) = events.try_recv() {
            if let CoreEvent::Sync(e) = event {
                out.push(e);
            }
        }
        out
    }

    fn three_items() -> FakeMediaIndex {
        FakeMediaIndex::new("v", 30)
            .with_records(vec![
                record("c.jpg", 1, 3, 30),
                record("a.jpg", 1, 3, 10),
                record("b.jpg", 1, 3, 20),
            ])
            .with_content("a.jpg", b"aaa".to_vec())
            .with_content("b.jpg", b"bbb".to_vec())
            .with_content("c.jpg", b"ccc".to_vec())
    }

    #[tokio::test]
    async fn test_uploads_in_generation_order_and_advances_cursor() {
        let mut h = harness(three_items()).await;

        let report = h.coordinator.run_sync(CancellationToken::new()).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.total_items, 3);
        assert_eq!(report.uploaded, 3);
        assert_eq!(
            h.api.direct_uploads(),
            vec![b"aaa".to_vec(), b"bbb".to_vec(), b"ccc".to_vec()]
        );
        assert_eq!(h.cursor.last_generation().await.unwrap(), 30);
        assert_eq!(h.cursor.latest_sync_time().await.unwrap(), 1_700_000_000_000);
        assert!(!h.coordinator.state().current().is_syncing);
        assert!(!h.coordinator.is_sync_active().await);

        let events = drain(&mut h.events);
        assert!(matches!(events.first(), Some(SyncEvent::Started { pending_items: 3, .. })));
        assert!(matches!(events.last(), Some(SyncEvent::Completed { uploaded: 3, .. })));
        let uploaded = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::ItemUploaded { .. }))
            .count();
        assert_eq!(uploaded, 3);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let mut h = harness(three_items()).await;
        h.api.reject_direct_for("b.jpg", 500, "Storage unavailable");

        let report = h.coordinator.run_sync(CancellationToken::new()).await.unwrap();

        assert_eq!(report.status, SyncStatus::Failed);
        assert_eq!(report.uploaded, 1);
        let failure = report.failure.unwrap();
        assert_eq!(failure.file_name, "b.jpg");
        assert_eq!(failure.reason, "SERVER_ERROR");
        assert_eq!(failure.message, "Storage unavailable");

        // c.jpg was never attempted and the cursor stays at a.jpg
        assert_eq!(h.api.direct_uploads().len(), 1);
        assert_eq!(h.cursor.last_generation().await.unwrap(), 10);
        assert_eq!(h.cursor.latest_sync_time().await.unwrap(), 0);

        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, SyncEvent::ItemFailed { reason, .. } if reason == "SERVER_ERROR")));
        assert!(matches!(
            events.last(),
            Some(SyncEvent::Failed {
                uploaded: 1,
                recoverable: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_network_failure_is_recoverable() {
        let mut h = harness(three_items()).await;
        h.api.fail_direct_network("connection reset");

        let report = h.coordinator.run_sync(CancellationToken::new()).await.unwrap();
        assert_eq!(report.failure.unwrap().reason, "NETWORK_ERROR");
        assert!(matches!(
            drain(&mut h.events).last(),
            Some(SyncEvent::Failed {
                recoverable: true,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_selection_completes_without_uploads() {
        let settings = memory_settings().await;
        let api = Arc::new(ScriptedUploadApi::default());
        let coordinator = SyncCoordinator::new(
            SyncConfig::default(),
            Arc::new(three_items()),
            settings.clone(),
            api.clone(),
            EventBus::new(8),
            SyncStateManager::new(),
            Arc::new(bridge_traits::time::SystemClock),
        );

        let report = coordinator.run_sync(CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.total_items, 0);
        assert!(api.direct_uploads().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_item() {
        let mut h = harness(three_items()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h.coordinator.run_sync(cancel).await.unwrap();
        assert_eq!(report.status, SyncStatus::Cancelled);
        assert!(h.api.direct_uploads().is_empty());
        assert_eq!(h.cursor.latest_sync_time().await.unwrap(), 0);
        assert!(matches!(
            drain(&mut h.events).last(),
            Some(SyncEvent::Cancelled { uploaded: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_single_flight_and_cancel() {
        let index = FakeMediaIndex::new("v", 1)
            .with_records(vec![record("big.mp4", 1, 12, 1)])
            .with_content("big.mp4", b"aaaabbbbcccc".to_vec());
        let h = harness(index).await;

        let handle = h.coordinator.spawn_sync().await.unwrap();
        assert_eq!(h.coordinator.active_job().await, Some(handle.job_id));

        let second = h.coordinator.start_sync().await;
        assert!(matches!(second, Err(SyncError::SyncInProgress { .. })));

        // Merge never finishes; give the pass time to reach polling.
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(h.coordinator.cancel_sync().await);

        let report = handle.task.await.unwrap();
        assert_eq!(report.status, SyncStatus::Cancelled);
        assert_eq!(h.cursor.last_generation().await.unwrap(), 0);
        assert!(!h.coordinator.is_sync_active().await);
        assert!(!h.coordinator.cancel_sync().await);
    }
}
