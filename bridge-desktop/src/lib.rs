//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (retry, multipart, streaming)
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `SecureStore` using the `keyring` crate
//! - `MediaIndex` scanning media folders into a SQLite catalog
//! - `NotificationPresenter` writing notifications to the log
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsMediaIndex, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let data_dir = bridge_desktop::default_data_dir();
//!     let http = ReqwestHttpClient::new()?;
//!     let settings = SqliteSettingsStore::new(data_dir.join("settings.db")).await?;
//!     let index = FsMediaIndex::open(data_dir.join("media-index.db"), vec!["/home/me/Pictures".into()]).await?;
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod http;
mod media_index;
mod notification;
mod settings;

#[cfg(feature = "secure-store")]
mod secure_store;

use std::path::PathBuf;

pub use http::{ReqwestHttpClient, DEFAULT_TIMEOUT};
pub use media_index::{bucket_id_for, media_kind_for, FsMediaIndex, ScanSummary};
pub use notification::LogNotificationPresenter;
pub use settings::SqliteSettingsStore;

#[cfg(feature = "secure-store")]
pub use secure_store::{KeyringSecureStore, DEFAULT_SERVICE_NAME};

/// Application directory name under the platform data directory.
pub const APP_DIR_NAME: &str = "filenest-sync";

/// Per-user data directory for the settings database and media catalog.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
}

/// The user's picture folder, if the platform defines one.
pub fn default_media_roots() -> Vec<PathBuf> {
    dirs::picture_dir().into_iter().collect()
}
