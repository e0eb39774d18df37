//! # Authentication Module
//!
//! Session management for a self-hosted Filenest media server.
//!
//! ## Overview
//!
//! A device signs in once with a server address, username and password. The
//! server answers with an opaque token that authorizes every later API call.
//! This crate owns that exchange and the persisted session:
//!
//! - Login against `api/user/login` and logout
//! - Token persistence through the platform `SecureStore`
//! - Server URL and username persistence through the `SettingsStore`
//! - Auth state event emission

pub mod error;
pub mod manager;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::SessionManager;
pub use token_store::TokenStore;
pub use types::{normalize_base_url, Session};
