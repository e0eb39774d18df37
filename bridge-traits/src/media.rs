//! Platform Media Index
//!
//! The platform's catalog of on-device photos and videos (Android's
//! MediaStore, a scanned folder tree on desktop). The sync core only reads
//! from it: which albums exist, which items changed after a generation
//! marker, and the bytes of a given item.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Kind of media item. The wire name is what the server expects in `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown media kind: {}",
                other
            ))),
        }
    }
}

/// A device album (a "bucket" of media sharing a folder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaAlbum {
    pub bucket_id: i64,
    pub bucket_name: String,
}

/// One row of the platform media index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Opaque reference understood by [`MediaIndex::open_read`]
    pub content_ref: String,
    pub kind: MediaKind,
    pub bucket_id: i64,
    pub display_name: String,
    /// Size in bytes
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// Capture time, milliseconds since epoch
    pub date_taken: i64,
    /// Seconds since epoch
    pub date_added: i64,
    /// Seconds since epoch
    pub date_modified: i64,
    /// Milliseconds; 0 for images
    pub duration: i64,
    pub favorite: bool,
    pub generation_added: i64,
    pub generation_modified: i64,
}

/// Read-only access to the platform media index.
///
/// Generation markers are monotonically increasing per index `version()`. If
/// the version changes, previously stored markers are meaningless.
#[async_trait]
pub trait MediaIndex: Send + Sync {
    /// Bring the index up to date with the underlying storage.
    ///
    /// Platforms whose index is maintained by the OS leave this as a no-op.
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Opaque version of the index. Changes when generation numbers are reset.
    async fn version(&self) -> Result<String>;

    /// Highest generation number handed out so far.
    async fn current_generation(&self) -> Result<i64>;

    /// All albums that contain at least one image or video.
    async fn list_albums(&self) -> Result<Vec<MediaAlbum>>;

    /// Items in `bucket_ids` whose `generation_added` or `generation_modified`
    /// is strictly greater than `since_generation`. Order is unspecified.
    async fn query_changed(
        &self,
        bucket_ids: &[i64],
        since_generation: i64,
    ) -> Result<Vec<MediaRecord>>;

    /// Number of items [`MediaIndex::query_changed`] would return.
    async fn count_changed(&self, bucket_ids: &[i64], since_generation: i64) -> Result<u64> {
        Ok(self.query_changed(bucket_ids, since_generation).await?.len() as u64)
    }

    /// Open a fresh byte stream positioned at the start of the item.
    async fn open_read(
        &self,
        content_ref: &str,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
}
