//! # Change Detector
//!
//! Finds media in the selected albums that changed after the stored cursor.

use crate::albums::AlbumSelection;
use crate::cursor::SyncCursorStore;
use crate::error::Result;
use bridge_traits::media::{MediaIndex, MediaKind, MediaRecord};
use bridge_traits::upload::UploadMetadata;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A media item queued for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSyncItem {
    pub content_ref: String,
    pub kind: MediaKind,
    pub bucket_id: i64,
    pub file_name: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// Capture time in milliseconds
    pub date_taken: i64,
    pub date_added: i64,
    pub date_modified: i64,
    /// Milliseconds, 0 for images
    pub duration: i64,
    /// 0 or 1
    pub favorite: i32,
    pub generation_modified: i64,
}

impl MediaSyncItem {
    pub fn from_record(record: MediaRecord, sync_favorites: bool) -> Self {
        let duration = match record.kind {
            MediaKind::Video => record.duration,
            MediaKind::Image => 0,
        };
        let favorite = i32::from(sync_favorites && record.favorite);

        Self {
            content_ref: record.content_ref,
            kind: record.kind,
            bucket_id: record.bucket_id,
            file_name: record.display_name,
            size: record.size,
            width: record.width,
            height: record.height,
            date_taken: record.date_taken,
            date_added: record.date_added,
            date_modified: record.date_modified,
            duration,
            favorite,
            generation_modified: record.generation_modified,
        }
    }

    /// Stable identifier of a chunked upload session.
    pub fn file_id(&self) -> String {
        format!("{}-{}-{}", self.file_name, self.size, self.date_modified)
    }

    pub fn metadata(&self) -> UploadMetadata {
        UploadMetadata {
            kind: self.kind,
            file_name: self.file_name.clone(),
            size: self.size,
            width: self.width,
            height: self.height,
            duration: self.duration,
            date_token: self.date_taken,
            date_added: self.date_added,
            last_modified: self.date_modified,
            favorite: self.favorite,
        }
    }
}

pub struct ChangeDetector {
    index: Arc<dyn MediaIndex>,
    albums: AlbumSelection,
    cursor: SyncCursorStore,
    sync_favorites: bool,
}

impl ChangeDetector {
    pub fn new(
        index: Arc<dyn MediaIndex>,
        albums: AlbumSelection,
        cursor: SyncCursorStore,
        sync_favorites: bool,
    ) -> Self {
        Self {
            index,
            albums,
            cursor,
            sync_favorites,
        }
    }

    /// Pending items ordered by `generation_modified`, oldest first.
    #[instrument(skip(self))]
    pub async fn fetch_pending(&self) -> Result<Vec<MediaSyncItem>> {
        let buckets: Vec<i64> = self.albums.selected().await?.into_iter().collect();
        if buckets.is_empty() {
            debug!("No albums selected");
            return Ok(Vec::new());
        }
        self.cursor.reconcile_version(self.index.as_ref()).await?;
        let since = self.cursor.last_generation().await?;

        self.index.refresh().await?;
        let records = self.index.query_changed(&buckets, since).await?;

        let mut items: Vec<MediaSyncItem> = records
            .into_iter()
            .map(|r| MediaSyncItem::from_record(r, self.sync_favorites))
            .collect();
        items.sort_by_key(|item| item.generation_modified);

        debug!(since, count = items.len(), "Detected pending media");
        Ok(items)
    }

    pub async fn count_pending(&self) -> Result<u64> {
        let buckets: Vec<i64> = self.albums.selected().await?.into_iter().collect();
        if buckets.is_empty() {
            return Ok(0);
        }
        self.cursor.reconcile_version(self.index.as_ref()).await?;
        let since = self.cursor.last_generation().await?;

        self.index.refresh().await?;
        Ok(self.index.count_changed(&buckets, since).await?)
    }
}
