//! # Event Bus System
//!
//! Event-driven communication between the sync core modules using
//! `tokio::sync::broadcast`. Hosts subscribe to drive their UI (login state,
//! "last synced" labels, toast messages for failed uploads).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Auth Module ├──────────────>│           │
//! └─────────────┘               │           │
//!                               │ EventBus  │
//! ┌─────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Sync Module ├──────────────>│  channel) ├─────────────────>│ Subscriber │
//! └─────────────┘               │           │                  └────────────┘
//!                               │           │
//! ┌─────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ Album prefs ├──────────────>│           ├─────────────────>│ Subscriber │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::SignedOut { username: None }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "User signed out");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events; it can keep receiving.
//! - **`RecvError::Closed`**: all senders were dropped; treat as shutdown.
//!
//! `emit` fails when nobody is subscribed. Producers ignore that with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Server session events
    Auth(AuthEvent),
    /// Upload/sync job events
    Sync(SyncEvent),
    /// Album selection and media cursor events
    Media(MediaEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Media(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::LoginFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::ItemFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to the media server session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Login succeeded and the session was persisted.
    SignedIn {
        username: String,
        /// Normalized base URL (always ends with `/`)
        server_url: String,
    },
    /// Session cleared.
    SignedOut {
        /// User that was signed in, if any
        username: Option<String>,
    },
    /// Login attempt was refused or could not reach the server.
    LoginFailed { server_url: String, message: String },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::SignedOut { .. } => "User signed out",
            AuthEvent::LoginFailed { .. } => "Login failed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to upload sync jobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Sync job initiated.
    Started {
        job_id: String,
        /// Items found by the change detector
        pending_items: u64,
    },
    /// An item's upload began.
    ItemStarted {
        job_id: String,
        /// 1-based position in this job
        index: u64,
        total: u64,
        file_name: String,
        /// Whether the chunked upload path is used
        chunked: bool,
    },
    /// An item was accepted by the server and the cursor advanced.
    ItemUploaded {
        job_id: String,
        file_name: String,
        generation: i64,
    },
    /// An item could not be uploaded.
    ItemFailed {
        job_id: String,
        file_name: String,
        /// `NETWORK_ERROR`, `FILE_ERROR`, `SERVER_ERROR` or `UNKNOWN`
        reason: String,
        message: String,
    },
    /// Every pending item was uploaded.
    Completed {
        job_id: String,
        uploaded: u64,
        duration_secs: u64,
    },
    /// The job stopped before uploading every pending item.
    Failed {
        job_id: String,
        message: String,
        uploaded: u64,
        /// Whether running the sync again may succeed
        recoverable: bool,
    },
    /// Sync was cancelled by the user.
    Cancelled { job_id: String, uploaded: u64 },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::ItemStarted { .. } => "Uploading item",
            SyncEvent::ItemUploaded { .. } => "Item uploaded",
            SyncEvent::ItemFailed { .. } => "Item upload failed",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }

    /// Job the event belongs to.
    pub fn job_id(&self) -> &str {
        match self {
            SyncEvent::Started { job_id, .. }
            | SyncEvent::ItemStarted { job_id, .. }
            | SyncEvent::ItemUploaded { job_id, .. }
            | SyncEvent::ItemFailed { job_id, .. }
            | SyncEvent::Completed { job_id, .. }
            | SyncEvent::Failed { job_id, .. }
            | SyncEvent::Cancelled { job_id, .. } => job_id,
        }
    }

    /// True for the event that ends a job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::Completed { .. } | SyncEvent::Failed { .. } | SyncEvent::Cancelled { .. }
        )
    }
}

// ============================================================================
// Media Events
// ============================================================================

/// Events related to album selection and the media change cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MediaEvent {
    /// The set of albums selected for sync changed.
    AlbumSelectionChanged { selected: Vec<i64> },
    /// A media index version was seen for the first time and the cursor was
    /// placed at its current generation.
    CursorInitialized { version: String, generation: i64 },
}

impl MediaEvent {
    fn description(&self) -> &str {
        match self {
            MediaEvent::AlbumSelectionChanged { .. } => "Album selection changed",
            MediaEvent::CursorInitialized { .. } => "Media cursor initialized",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(job: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Completed {
            job_id: job.to_string(),
            uploaded: 3,
            duration_secs: 12,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus
            .emit(CoreEvent::Auth(AuthEvent::SignedOut { username: None }))
            .is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Sync(SyncEvent::Started {
            job_id: "job-1".to_string(),
            pending_items: 4,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter_skips_other_categories() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Sync(_)));

        bus.emit(CoreEvent::Media(MediaEvent::AlbumSelectionChanged {
            selected: vec![1, 2],
        }))
        .ok();
        bus.emit(completed("job-2")).ok();

        assert_eq!(stream.recv().await.unwrap(), completed("job-2"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_reports_missed_events() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());
        for i in 0..5 {
            bus.emit(completed(&format!("job-{i}"))).ok();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(3)))));
        assert_eq!(stream.try_recv().unwrap().unwrap(), completed("job-3"));
    }

    #[test]
    fn test_severity_and_description() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            job_id: "j".to_string(),
            message: "Merge poll timeout".to_string(),
            uploaded: 0,
            recoverable: true,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Sync failed");

        let item_failed = CoreEvent::Sync(SyncEvent::ItemFailed {
            job_id: "j".to_string(),
            file_name: "a.jpg".to_string(),
            reason: "NETWORK_ERROR".to_string(),
            message: "Connection reset".to_string(),
        });
        assert_eq!(item_failed.severity(), EventSeverity::Warning);
        assert!(EventSeverity::Error > EventSeverity::Warning);
    }

    #[test]
    fn test_sync_event_helpers() {
        let event = SyncEvent::Cancelled {
            job_id: "job-9".to_string(),
            uploaded: 1,
        };
        assert_eq!(event.job_id(), "job-9");
        assert!(event.is_terminal());
        assert!(!SyncEvent::Started {
            job_id: "x".to_string(),
            pending_items: 0
        }
        .is_terminal());
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Auth(AuthEvent::SignedIn {
            username: "alice".to_string(),
            server_url: "https://nas.local/".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Auth");
        assert_eq!(json["payload"]["event"], "SignedIn");
        assert_eq!(json["payload"]["username"], "alice");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
