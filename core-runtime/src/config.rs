//! # Core Configuration Module
//!
//! Provides configuration management for the photo sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the bridges and settings the core needs. It enforces
//! fail-fast validation so a host learns about a missing capability when it
//! builds the config, not in the middle of an upload.
//!
//! ## Required Dependencies
//!
//! - `SecureStore` - session token persistence
//! - `HttpClient` - media server API
//! - `SettingsStore` - preferences, album selection and the sync cursor
//! - `MediaIndex` - the on-device photo/video catalog
//!
//! ## Optional Dependencies
//!
//! - `NotificationPresenter` - ongoing notification while syncing
//! - `Clock` - time source (defaults to the system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop defaults are used for
//! anything not provided: `KeyringSecureStore`, `ReqwestHttpClient`,
//! `LogNotificationPresenter`, and (opened asynchronously by the service at
//! startup) a `SqliteSettingsStore` and an `FsMediaIndex` under `data_dir`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/home/alex/.local/share/filenest-sync")
//!     .media_root("/home/alex/Pictures")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing data directory
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - data_dir is required");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, HttpClient, MediaIndex, NotificationPresenter, SecureStore, SettingsStore, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

/// File name of the settings database inside `data_dir`.
pub const SETTINGS_DB_FILE: &str = "settings.db";

/// File name of the desktop media catalog inside `data_dir`.
pub const MEDIA_INDEX_DB_FILE: &str = "media-index.db";

/// Core configuration for the photo sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for the settings database and media catalog
    pub data_dir: PathBuf,

    /// Folders scanned by the desktop media index
    pub media_roots: Vec<PathBuf>,

    /// HTTP client for the media server API
    pub http_client: Arc<dyn HttpClient>,

    /// Secure credential storage
    pub secure_store: Arc<dyn SecureStore>,

    /// User preferences storage. `None` means "open the desktop default".
    pub settings_store: Option<Arc<dyn SettingsStore>>,

    /// Platform media catalog. `None` means "open the desktop default".
    pub media_index: Option<Arc<dyn MediaIndex>>,

    /// Ongoing sync notification (optional)
    pub notification_presenter: Option<Arc<dyn NotificationPresenter>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("media_roots", &self.media_roots)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field(
                "settings_store",
                &self.settings_store.as_ref().map(|_| "SettingsStore { ... }"),
            )
            .field(
                "media_index",
                &self.media_index.as_ref().map(|_| "MediaIndex { ... }"),
            )
            .field(
                "notification_presenter",
                &self
                    .notification_presenter
                    .as_ref()
                    .map(|_| "NotificationPresenter { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Send the platform favorite flag with uploads instead of always 0
    pub sync_favorites: bool,

    /// Show an ongoing notification while syncing (requires NotificationPresenter)
    pub foreground_notifications: bool,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Location of the settings database used when no store is injected.
    pub fn settings_db_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_DB_FILE)
    }

    /// Location of the desktop media catalog used when no index is injected.
    pub fn media_index_db_path(&self) -> PathBuf {
        self.data_dir.join(MEDIA_INDEX_DB_FILE)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Data directory is not empty
    /// - Event buffer is non-zero
    /// - A media root exists when the desktop media index will be used
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.media_index.is_none() && self.media_roots.is_empty() {
            return Err(Error::Config(
                "No MediaIndex provided and no media roots configured. \
                 Use .media_root() to index a folder or inject a MediaIndex implementation."
                    .to_string(),
            ));
        }

        if self.media_roots.iter().any(|root| root.as_os_str().is_empty()) {
            return Err(Error::Config("Media root paths cannot be empty".to_string()));
        }

        if self.features.foreground_notifications && self.notification_presenter.is_none() {
            return Err(Error::Config(
                "Foreground notifications enabled but no NotificationPresenter provided. \
                 Disable the feature or inject a NotificationPresenter implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, mobile: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature to use the default. \
             Mobile: inject {}.",
            capability, purpose, mobile
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    let store: Arc<dyn SecureStore> = Arc::new(bridge_desktop::KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "session token persistence",
        "platform-native secure storage (Keychain/Keystore)",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::BridgeInit(format!("default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "talking to the media server",
        "the platform HTTP stack (OkHttp/URLSession)",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_notification_presenter() -> Option<Arc<dyn NotificationPresenter>> {
    let presenter: Arc<dyn NotificationPresenter> =
        Arc::new(bridge_desktop::LogNotificationPresenter::new());
    Some(presenter)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_notification_presenter() -> Option<Arc<dyn NotificationPresenter>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn check_async_defaults(
    _settings_store: &Option<Arc<dyn SettingsStore>>,
    _media_index: &Option<Arc<dyn MediaIndex>>,
) -> Result<()> {
    // Opened by the service once a runtime is available.
    Ok(())
}

#[cfg(not(feature = "desktop-shims"))]
fn check_async_defaults(
    settings_store: &Option<Arc<dyn SettingsStore>>,
    media_index: &Option<Arc<dyn MediaIndex>>,
) -> Result<()> {
    if settings_store.is_none() {
        return Err(capability_missing(
            "SettingsStore",
            "preferences and the sync cursor",
            "platform-native settings (DataStore/UserDefaults)",
        ));
    }
    if media_index.is_none() {
        return Err(capability_missing(
            "MediaIndex",
            "detecting new photos and videos",
            "the platform media catalog (MediaStore/PhotoKit)",
        ));
    }
    Ok(())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    media_roots: Vec<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    media_index: Option<Arc<dyn MediaIndex>>,
    notification_presenter: Option<Arc<dyn NotificationPresenter>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the directory holding the core's databases.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Adds a folder for the desktop media index to scan.
    pub fn media_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.media_roots.push(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn media_index(mut self, index: Arc<dyn MediaIndex>) -> Self {
        self.media_index = Some(index);
        self
    }

    pub fn notification_presenter(mut self, presenter: Arc<dyn NotificationPresenter>) -> Self {
        self.notification_presenter = Some(presenter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn sync_favorites(mut self, enabled: bool) -> Self {
        self.features.sync_favorites = enabled;
        self
    }

    pub fn foreground_notifications(mut self, enabled: bool) -> Self {
        self.features.foreground_notifications = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - `data_dir` was not set
    /// - A required bridge is missing and no platform default exists
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        check_async_defaults(&self.settings_store, &self.media_index)?;

        let notification_presenter = self
            .notification_presenter
            .or_else(provide_default_notification_presenter);

        let config = CoreConfig {
            data_dir,
            media_roots: self.media_roots,
            http_client,
            secure_store,
            settings_store: self.settings_store,
            media_index: self.media_index,
            notification_presenter,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
