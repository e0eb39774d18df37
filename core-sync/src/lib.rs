//! # Sync Module
//!
//! Uploads new and changed on-device media to the Filenest server.
//!
//! ## Overview
//!
//! A sync pass:
//! - Reads the selected albums and the generation cursor from settings
//! - Queries the platform media index for items changed since the cursor
//! - Uploads each item directly or in resumable chunks
//! - Advances the cursor after every accepted item
//!
//! ## Components
//!
//! - **Cursor** (`cursor`): Media index version and last synced generation
//! - **Albums** (`albums`): Which device albums take part in sync
//! - **Change Detector** (`detector`): Pending items in generation order
//! - **Upload Engine** (`upload`): Direct and chunked upload paths
//! - **Sync State** (`state`): Observable progress for UIs
//! - **Sync Job** (`job`): Job lifecycle with validated state transitions
//! - **Sync Coordinator** (`coordinator`): Single-flight pass orchestration

pub mod albums;
pub mod coordinator;
pub mod cursor;
pub mod detector;
pub mod error;
pub mod job;
pub mod state;
pub mod upload;

#[cfg(test)]
mod testing;

pub use albums::{AlbumEntry, AlbumSelection};
pub use coordinator::{SyncConfig, SyncCoordinator, SyncHandle};
pub use cursor::{CursorInit, SyncCursorStore};
pub use detector::{ChangeDetector, MediaSyncItem};
pub use error::{Result, SyncError};
pub use job::{ItemFailure, SyncJob, SyncJobId, SyncReport, SyncStatus};
pub use state::{SyncProgress, SyncState, SyncStateManager, SyncStep};
pub use upload::{UploadConfig, UploadEngine, UploadFailureReason, UploadResult};
