//! # Sync Cursor
//!
//! Persists how far the media index has been synced: the index version the
//! cursor belongs to and the last generation whose item reached the server.

use crate::error::{Result, SyncError};
use bridge_traits::media::MediaIndex;
use bridge_traits::storage::SettingsStore;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const MEDIA_STORE_VERSION_KEY: &str = "media_store_version";
pub const MEDIA_STORE_LAST_GEN_KEY: &str = "media_store_last_gen";
pub const LATEST_SYNC_TIME_KEY: &str = "latest_sync_time";

/// Cursor state written on first initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorInit {
    pub version: String,
    pub generation: i64,
}

#[derive(Clone)]
pub struct SyncCursorStore {
    settings: Arc<dyn SettingsStore>,
}

impl SyncCursorStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    /// Place the cursor at the index's current generation the first time a
    /// device runs, so existing media is not uploaded retroactively.
    ///
    /// When a cursor already exists for a different index version it is reset
    /// as in [`reconcile_version`](Self::reconcile_version).
    ///
    /// Returns the stored values when this call wrote the cursor and `None`
    /// when the stored cursor was kept.
    #[instrument(skip(self, index))]
    pub async fn initialize(&self, index: &dyn MediaIndex) -> Result<Option<CursorInit>> {
        if self.version().await?.is_some() {
            return self.reconcile_version(index).await;
        }

        index.refresh().await?;
        let version = index.version().await?;
        let generation = index.current_generation().await?;
        self.store(&version, generation).await?;

        info!(version = %version, generation, "Initialized media cursor");
        Ok(Some(CursorInit {
            version,
            generation,
        }))
    }

    /// Reset the cursor to generation 0 of the index if the stored version
    /// belongs to another index. Generations of different versions are not
    /// comparable, so everything the new index holds counts as pending.
    ///
    /// Does nothing before the cursor is initialized.
    pub async fn reconcile_version(&self, index: &dyn MediaIndex) -> Result<Option<CursorInit>> {
        let Some(stored) = self.version().await? else {
            return Ok(None);
        };
        let version = index.version().await?;
        if stored == version {
            debug!("Media cursor matches index version");
            return Ok(None);
        }

        self.store(&version, 0).await?;
        warn!(old = %stored, new = %version, "Media index version changed, cursor reset");
        Ok(Some(CursorInit {
            version,
            generation: 0,
        }))
    }

    async fn store(&self, version: &str, generation: i64) -> Result<()> {
        let mut tx = self.settings.begin_transaction().await.map_err(settings)?;
        tx.set_string(MEDIA_STORE_VERSION_KEY, version)
            .await
            .map_err(settings)?;
        tx.set_i64(MEDIA_STORE_LAST_GEN_KEY, generation)
            .await
            .map_err(settings)?;
        tx.commit().await.map_err(settings)
    }

    /// Stored media index version, if the cursor was initialized.
    pub async fn version(&self) -> Result<Option<String>> {
        let version = self
            .settings
            .get_string(MEDIA_STORE_VERSION_KEY)
            .await
            .map_err(settings)?;
        Ok(version.filter(|v| !v.is_empty()))
    }

    /// Last synced generation; 0 when never set.
    pub async fn last_generation(&self) -> Result<i64> {
        Ok(self
            .settings
            .get_i64(MEDIA_STORE_LAST_GEN_KEY)
            .await
            .map_err(settings)?
            .unwrap_or(0))
    }

    /// Move the cursor forward to `generation`. Lower values are ignored.
    ///
    /// Returns the cursor value after the call.
    pub async fn advance(&self, generation: i64) -> Result<i64> {
        let current = self.last_generation().await?;
        if generation <= current {
            debug!(current, generation, "Cursor not advanced");
            return Ok(current);
        }

        self.settings
            .set_i64(MEDIA_STORE_LAST_GEN_KEY, generation)
            .await
            .map_err(settings)?;
        debug!(generation, "Cursor advanced");
        Ok(generation)
    }

    /// Remember when the last complete pass finished (Unix millis).
    pub async fn record_sync_time(&self, millis: i64) -> Result<()> {
        self.settings
            .set_i64(LATEST_SYNC_TIME_KEY, millis)
            .await
            .map_err(settings)
    }

    /// Unix millis of the last complete pass; 0 when never synced.
    pub async fn latest_sync_time(&self) -> Result<i64> {
        Ok(self
            .settings
            .get_i64(LATEST_SYNC_TIME_KEY)
            .await
            .map_err(settings)?
            .unwrap_or(0))
    }
}

fn settings(err: bridge_traits::error::BridgeError) -> SyncError {
    SyncError::Settings(err.to_string())
}
