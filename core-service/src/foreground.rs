//! Foreground sync host.
//!
//! Keeps an ongoing notification up while a sync pass runs, mirroring the
//! pass's progress, then shows the outcome for a short while.

use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use bridge_traits::notification::{Notification, NotificationPresenter};
use core_sync::{SyncCoordinator, SyncError, SyncJobId, SyncReport, SyncStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Result;

pub const SYNC_NOTIFICATION_ID: u32 = 1001;
pub const NOTIFICATION_TITLE: &str = "Media sync";
pub const DEFAULT_LINGER: Duration = Duration::from_secs(3);

pub struct ForegroundSyncHost {
    coordinator: SyncCoordinator,
    event_bus: EventBus,
    presenter: Arc<dyn NotificationPresenter>,
    linger: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ForegroundSyncHost {
    pub fn new(
        coordinator: SyncCoordinator,
        event_bus: EventBus,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Self {
        Self {
            coordinator,
            event_bus,
            presenter,
            linger: DEFAULT_LINGER,
            task: Mutex::new(None),
        }
    }

    /// How long the final notification stays before it is dismissed.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Start a pass under the notification.
    ///
    /// Returns `None` without doing anything when a pass is already running.
    pub async fn start(&self) -> Result<Option<SyncJobId>> {
        // Subscribe before the pass exists so no progress event is missed.
        let events = self.event_bus.subscribe();
        let handle = match self.coordinator.spawn_sync().await {
            Ok(handle) => handle,
            Err(SyncError::SyncInProgress { job_id }) => {
                debug!(job_id = %job_id, "Sync already running, ignoring start");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        self.show(Notification::ongoing(
            SYNC_NOTIFICATION_ID,
            NOTIFICATION_TITLE,
            "Sync started, please keep the app open",
        ))
        .await;

        let job_id = handle.job_id;

        let presenter = self.presenter.clone();
        let linger = self.linger;
        let task = tokio::spawn(async move {
            follow_progress(presenter.as_ref(), events, job_id).await;

            let text = match handle.task.await {
                Ok(report) => outcome_text(&report),
                Err(e) => {
                    warn!(error = %e, "Sync task ended abnormally");
                    "Sync failed".to_string()
                }
            };
            info!(job_id = %job_id, outcome = %text, "Foreground sync finished");

            show(
                presenter.as_ref(),
                Notification::finished(SYNC_NOTIFICATION_ID, NOTIFICATION_TITLE, text),
            )
            .await;
            tokio::time::sleep(linger).await;
            if let Err(e) = presenter.dismiss(SYNC_NOTIFICATION_ID).await {
                warn!(error = %e, "Failed to dismiss sync notification");
            }
        });

        *self.task.lock().await = Some(task);
        Ok(Some(job_id))
    }

    /// Cancel the running pass. The notification shows the cancellation.
    pub async fn stop(&self) -> bool {
        self.coordinator.cancel_sync().await
    }

    /// Wait until the current run, including its linger, is over.
    pub async fn wait(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn show(&self, notification: Notification) {
        show(self.presenter.as_ref(), notification).await;
    }
}

async fn show(presenter: &dyn NotificationPresenter, notification: Notification) {
    if let Err(e) = presenter.show(&notification).await {
        warn!(error = %e, "Failed to show sync notification");
    }
}

async fn follow_progress(
    presenter: &dyn NotificationPresenter,
    mut events: tokio::sync::broadcast::Receiver<CoreEvent>,
    job_id: SyncJobId,
) {
    let job_id = job_id.to_string();
    loop {
        match events.recv().await {
            Ok(CoreEvent::Sync(event)) if event.job_id() == job_id => {
                if let SyncEvent::ItemStarted {
                    index,
                    total,
                    file_name,
                    ..
                } = &event
                {
                    show(
                        presenter,
                        Notification::ongoing(
                            SYNC_NOTIFICATION_ID,
                            NOTIFICATION_TITLE,
                            format!("Uploading: {} ({}/{})", file_name, index, total),
                        ),
                    )
                    .await;
                }
                if event.is_terminal() {
                    return;
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Notification progress lagged");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

fn outcome_text(report: &SyncReport) -> String {
    match report.status {
        SyncStatus::Completed => "Sync complete".to_string(),
        SyncStatus::Cancelled => "Sync cancelled".to_string(),
        _ => match &report.error_message {
            Some(message) => format!("Sync failed: {}", message),
            None => "Sync failed".to_string(),
        },
    }
}
