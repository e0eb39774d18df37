//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, settings, media index, notifications) into the shared Rust core
//! and exposes the operations a photo sync app needs: session management,
//! album selection, server browsing and upload passes. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap_desktop`].

pub mod error;
pub mod foreground;

#[cfg(test)]
mod testing;

pub use error::{CoreError, Result};
pub use foreground::ForegroundSyncHost;

use std::collections::BTreeSet;
use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    media::MediaIndex,
    notification::NotificationPresenter,
    storage::{SecureStore, SettingsStore},
    time::{Clock, SystemClock},
};
use chrono::{DateTime, TimeZone, Utc};
use core_auth::{Session, SessionManager};
use core_runtime::events::{CoreEvent, EventBus, EventStream, MediaEvent};
use core_runtime::{CoreConfig, FeatureFlags};
use core_sync::{
    AlbumEntry, AlbumSelection, SyncConfig, SyncCoordinator, SyncCursorStore, SyncJobId,
    SyncState, SyncStateManager,
};
use provider_filenest::{FilenestClient, MediaDetailItem, MediaListItem, PageData};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub media_index: Arc<dyn MediaIndex>,
    pub notification_presenter: Option<Arc<dyn NotificationPresenter>>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        secure_store: Arc<dyn SecureStore>,
        settings_store: Arc<dyn SettingsStore>,
        media_index: Arc<dyn MediaIndex>,
    ) -> Self {
        Self {
            http_client,
            secure_store,
            settings_store,
            media_index,
            notification_presenter: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notification_presenter(mut self, presenter: Arc<dyn NotificationPresenter>) -> Self {
        self.notification_presenter = Some(presenter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl TryFrom<&CoreConfig> for CoreDependencies {
    type Error = CoreError;

    fn try_from(config: &CoreConfig) -> Result<Self> {
        let settings_store = config.settings_store.clone().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "SettingsStore".to_string(),
            message: "No settings store was opened for this configuration".to_string(),
        })?;
        let media_index = config.media_index.clone().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "MediaIndex".to_string(),
            message: "No media index was opened for this configuration".to_string(),
        })?;

        Ok(Self {
            http_client: config.http_client.clone(),
            secure_store: config.secure_store.clone(),
            settings_store,
            media_index,
            notification_presenter: config.notification_presenter.clone(),
            clock: config.clock.clone(),
        })
    }
}

/// Tunables that are not bridges.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub event_buffer_size: usize,
    pub features: FeatureFlags,
    pub sync: SyncConfig,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            event_buffer_size: core_runtime::events::DEFAULT_EVENT_BUFFER_SIZE,
            features: FeatureFlags::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    deps: Arc<CoreDependencies>,
    features: FeatureFlags,
    event_bus: EventBus,
    sessions: Arc<SessionManager>,
    server: Arc<FilenestClient>,
    albums: AlbumSelection,
    cursor: SyncCursorStore,
    coordinator: SyncCoordinator,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    pub fn new(deps: CoreDependencies, mut options: ServiceOptions) -> Self {
        let event_bus = EventBus::new(options.event_buffer_size);
        let sessions = Arc::new(SessionManager::new(
            deps.http_client.clone(),
            deps.settings_store.clone(),
            deps.secure_store.clone(),
            event_bus.clone(),
        ));
        let server = Arc::new(FilenestClient::new(deps.http_client.clone(), sessions.clone()));

        options.sync.sync_favorites = options.features.sync_favorites;
        let coordinator = SyncCoordinator::new(
            options.sync,
            deps.media_index.clone(),
            deps.settings_store.clone(),
            server.clone(),
            event_bus.clone(),
            SyncStateManager::new(),
            deps.clock.clone(),
        );

        Self {
            albums: AlbumSelection::new(deps.settings_store.clone()),
            cursor: SyncCursorStore::new(deps.settings_store.clone()),
            deps: Arc::new(deps),
            features: options.features,
            event_bus,
            sessions,
            server,
            coordinator,
        }
    }

    /// Build a service from a validated configuration whose stores are open.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        config.validate()?;
        let deps = CoreDependencies::try_from(config)?;
        let options = ServiceOptions {
            event_buffer_size: config.event_buffer_size,
            features: config.features,
            sync: SyncConfig::default(),
        };
        Ok(Self::new(deps, options))
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub async fn login(&self, server_url: &str, username: &str, password: &str) -> Result<Session> {
        Ok(self.sessions.login(server_url, username, password).await?)
    }

    /// Clear the stored session. A running pass is cancelled first.
    pub async fn logout(&self) -> Result<()> {
        if self.coordinator.cancel_sync().await {
            info!("Cancelled running sync before logout");
        }
        Ok(self.sessions.logout().await?)
    }

    pub async fn is_logged_in(&self) -> Result<bool> {
        Ok(self.sessions.is_logged_in().await?)
    }

    pub async fn session(&self) -> Result<Option<Session>> {
        Ok(self.sessions.current_session().await?)
    }

    // ------------------------------------------------------------------
    // Device media
    // ------------------------------------------------------------------

    /// Place the sync cursor at the current media generation on first run.
    ///
    /// Returns true when the cursor was initialized by this call.
    #[instrument(skip(self))]
    pub async fn initialize_media_cursor(&self) -> Result<bool> {
        let init = self.cursor.initialize(self.deps.media_index.as_ref()).await?;
        match init {
            Some(init) => {
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Media(MediaEvent::CursorInitialized {
                        version: init.version,
                        generation: init.generation,
                    }));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn list_albums(&self) -> Result<Vec<AlbumEntry>> {
        Ok(self.albums.list_albums(self.deps.media_index.as_ref()).await?)
    }

    pub async fn toggle_album(&self, bucket_id: i64) -> Result<BTreeSet<i64>> {
        let selected = self.albums.toggle(bucket_id).await?;
        let _ = self
            .event_bus
            .emit(CoreEvent::Media(MediaEvent::AlbumSelectionChanged {
                selected: selected.iter().copied().collect(),
            }));
        Ok(selected)
    }

    pub async fn selected_albums(&self) -> Result<BTreeSet<i64>> {
        Ok(self.albums.selected().await?)
    }

    /// Items the next pass would upload. Failures count as zero.
    pub async fn pending_sync_count(&self) -> u64 {
        match self.coordinator.detector().count_pending().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count pending media");
                0
            }
        }
    }

    /// When the last complete pass finished, if ever.
    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let millis = self.cursor.latest_sync_time().await?;
        if millis <= 0 {
            return Ok(None);
        }
        Ok(Utc.timestamp_millis_opt(millis).single())
    }

    // ------------------------------------------------------------------
    // Server browsing
    // ------------------------------------------------------------------

    pub async fn server_media_count(&self) -> Result<i64> {
        Ok(self.server.count_media().await?)
    }

    pub async fn media_page(
        &self,
        album_id: Option<i64>,
        page_num: u32,
        page_size: u32,
    ) -> Result<PageData<MediaListItem>> {
        Ok(self.server.page(album_id, page_num, page_size).await?)
    }

    pub async fn media_detail(&self, id: i64) -> Result<MediaDetailItem> {
        Ok(self.server.fetch_media(id).await?)
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Start a background pass. Requires a stored session.
    pub async fn start_sync(&self) -> Result<SyncJobId> {
        self.sessions.require_session().await?;
        Ok(self.coordinator.start_sync().await?)
    }

    pub async fn cancel_sync(&self) -> bool {
        self.coordinator.cancel_sync().await
    }

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.coordinator.state().subscribe()
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Foreground host using the configured notification presenter.
    pub fn foreground_host(&self) -> Result<ForegroundSyncHost> {
        if !self.features.foreground_notifications {
            return Err(CoreError::CapabilityMissing {
                capability: "foreground_notifications".to_string(),
                message: "Foreground notifications are disabled".to_string(),
            });
        }
        let presenter = self
            .deps
            .notification_presenter
            .clone()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "NotificationPresenter".to_string(),
                message: "A notification presenter is required for foreground sync".to_string(),
            })?;
        Ok(self.foreground_host_with(presenter))
    }

    pub fn foreground_host_with(&self, presenter: Arc<dyn NotificationPresenter>) -> ForegroundSyncHost {
        ForegroundSyncHost::new(self.coordinator.clone(), self.event_bus.clone(), presenter)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Opens the SQLite settings store and the folder-scanning media index under
/// the configured data directory unless the configuration injects its own.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::CoreConfig;
/// use core_service::bootstrap_desktop;
///
/// let config = CoreConfig::builder()
///     .data_dir("/tmp/filenest")
///     .media_root("/home/me/Pictures")
///     .build()?;
/// let core = bootstrap_desktop(config).await?;
/// core.initialize_media_cursor().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(mut config: CoreConfig) -> Result<CoreService> {
    use bridge_desktop::{FsMediaIndex, SqliteSettingsStore};

    config.validate()?;

    if config.settings_store.is_none() {
        let store = SqliteSettingsStore::new(config.settings_db_path())
            .await
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        config.settings_store = Some(Arc::new(store));
    }

    if config.media_index.is_none() {
        let index = FsMediaIndex::open(config.media_index_db_path(), config.media_roots.clone())
            .await
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        config.media_index = Some(Arc::new(index));
    }

    info!(data_dir = ?config.data_dir, "Desktop core initialized");
    CoreService::from_config(&config)
}
