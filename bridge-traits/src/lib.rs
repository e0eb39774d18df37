//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the photo sync core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform
//! (desktop, Android, iOS).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry, multipart bodies and TLS
//! - [`MediaUploadApi`](upload::MediaUploadApi) - Typed upload endpoints of the media server
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Platform Integration
//! - [`MediaIndex`](media::MediaIndex) - Read-only catalog of on-device photos and videos
//! - [`NotificationPresenter`](notification::NotificationPresenter) - Ongoing sync notification
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. The
//! upload engine classifies failures by variant, so implementations must map
//! transport failures to `Network`, server refusals to `Rejected` and local
//! file problems to `Io`.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod media;
pub mod notification;
pub mod storage;
pub mod time;
pub mod upload;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm, MultipartPart, RequestBody,
    RetryPolicy,
};
pub use media::{MediaAlbum, MediaIndex, MediaKind, MediaRecord};
pub use notification::{Notification, NotificationPresenter};
pub use storage::{SecureStore, SettingsStore, SettingsTransaction};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
pub use upload::{ChunkCheck, ChunkMerge, MediaUploadApi, MergeState, MergeStatus, UploadMetadata};
