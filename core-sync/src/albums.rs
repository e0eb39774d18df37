//! Album selection persisted as a JSON list of bucket ids.

use crate::error::{Result, SyncError};
use bridge_traits::media::{MediaAlbum, MediaIndex};
use bridge_traits::storage::SettingsStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub const SELECTED_ALBUMS_KEY: &str = "selected_albums";

/// A device album with its selection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumEntry {
    pub bucket_id: i64,
    pub bucket_name: String,
    pub selected: bool,
}

#[derive(Clone)]
pub struct AlbumSelection {
    settings: Arc<dyn SettingsStore>,
}

impl AlbumSelection {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Selected bucket ids. A missing or unreadable value is the empty set.
    pub async fn selected(&self) -> Result<BTreeSet<i64>> {
        let raw = self
            .settings
            .get_string(SELECTED_ALBUMS_KEY)
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(BTreeSet::new());
        };

        match serde_json::from_str::<Vec<i64>>(&raw) {
            Ok(ids) => Ok(ids.into_iter().collect()),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable album selection");
                Ok(BTreeSet::new())
            }
        }
    }

    pub async fn set_selected(&self, selected: &BTreeSet<i64>) -> Result<()> {
        let ids: Vec<i64> = selected.iter().copied().collect();
        let raw = serde_json::to_string(&ids).map_err(|e| SyncError::Settings(e.to_string()))?;
        self.settings
            .set_string(SELECTED_ALBUMS_KEY, &raw)
            .await
            .map_err(|e| SyncError::Settings(e.to_string()))?;
        debug!(count = ids.len(), "Saved album selection");
        Ok(())
    }

    /// Flip one album in or out of the selection; returns the new set.
    pub async fn toggle(&self, bucket_id: i64) -> Result<BTreeSet<i64>> {
        let mut selected = self.selected().await?;
        if !selected.remove(&bucket_id) {
            selected.insert(bucket_id);
        }
        self.set_selected(&selected).await?;
        Ok(selected)
    }

    /// Device albums sorted by name, flagged with the current selection.
    pub async fn list_albums(&self, index: &dyn MediaIndex) -> Result<Vec<AlbumEntry>> {
        let selected = self.selected().await?;
        index.refresh().await?;
        let mut albums: Vec<MediaAlbum> = index.list_albums().await?;
        albums.sort_by(|a, b| {
            a.bucket_name
                .to_lowercase()
                .cmp(&b.bucket_name.to_lowercase())
                .then(a.bucket_id.cmp(&b.bucket_id))
        });
        albums.dedup_by_key(|a| a.bucket_id);

        Ok(albums
            .into_iter()
            .map(|album| AlbumEntry {
                selected: selected.contains(&album.bucket_id),
                bucket_id: album.bucket_id,
                bucket_name: album.bucket_name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_settings, FakeMediaIndex};

    #[tokio::test]
    async fn test_toggle_round_trip() {
        let albums = AlbumSelection::new(memory_settings().await);
        assert!(albums.selected().await.unwrap().is_empty());

        assert_eq!(albums.toggle(7).await.unwrap(), BTreeSet::from([7]));
        assert_eq!(albums.toggle(3).await.unwrap(), BTreeSet::from([3, 7]));
        assert_eq!(albums.toggle(7).await.unwrap(), BTreeSet::from([3]));
        assert_eq!(albums.selected().await.unwrap(), BTreeSet::from([3]));
    }

    #[tokio::test]
    async fn test_unreadable_json_is_empty() {
        let settings = memory_settings().await;
        settings
            .set_string(SELECTED_ALBUMS_KEY, "{not json")
            .await
            .unwrap();

        let albums = AlbumSelection::new(settings);
        assert!(albums.selected().await.unwrap().is_empty());
        assert_eq!(albums.toggle(1).await.unwrap(), BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn test_list_albums_sorted_with_flags() {
        let albums = AlbumSelection::new(memory_settings().await);
        albums.toggle(2).await.unwrap();

        let index = FakeMediaIndex::new("v", 0).with_albums(vec![
            MediaAlbum {
                bucket_id: 1,
                bucket_name: "Screenshots".to_string(),
            },
            MediaAlbum {
                bucket_id: 2,
                bucket_name: "Camera".to_string(),
            },
        ]);

        let listed = albums.list_albums(&index).await.unwrap();
        assert_eq!(listed[0].bucket_name, "Camera");
        assert!(listed[0].selected);
        assert_eq!(listed[1].bucket_name, "Screenshots");
        assert!(!listed[1].selected);
    }
}
