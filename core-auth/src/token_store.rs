//! Secure Token Storage
//!
//! Persists the media server session token through the platform
//! `SecureStore` (Keychain, Keystore, OS keyring).
//!
//! ## Security Features
//!
//! - Tokens are never logged or exposed in error messages
//! - Blank tokens are treated as "signed out"
//! - Unreadable entries are erased instead of being handed to the API layer
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::TokenStore;
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let token_store = TokenStore::new(secure_store);
//!
//! token_store.store_token("eyJhbGciOi...").await?;
//! let token = token_store.retrieve_token().await?;
//! token_store.delete_token().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::SERVER_TOKEN_KEY;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secure storage for the session token.
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        debug!("Initializing TokenStore");
        Self { secure_store }
    }

    /// Store the session token, overwriting any previous one.
    pub async fn store_token(&self, token: &str) -> Result<()> {
        self.secure_store
            .set_secret(SERVER_TOKEN_KEY, token.as_bytes())
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to store token in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!("Session token stored securely");
        Ok(())
    }

    /// Retrieve the session token.
    ///
    /// Returns `Ok(None)` when no token is stored or the stored token is
    /// blank. An entry that is not valid UTF-8 is deleted and reported as
    /// absent.
    pub async fn retrieve_token(&self) -> Result<Option<String>> {
        let data = self
            .secure_store
            .get_secret(SERVER_TOKEN_KEY)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to retrieve token from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        let Some(data) = data else {
            debug!("No session token found in storage");
            return Ok(None);
        };

        match String::from_utf8(data) {
            Ok(token) if token.trim().is_empty() => Ok(None),
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(error = %e, "Stored session token is corrupted, erasing it");
                if let Err(delete_err) = self.secure_store.delete_secret(SERVER_TOKEN_KEY).await {
                    warn!(error = %delete_err, "Failed to delete corrupted token");
                }
                Ok(None)
            }
        }
    }

    /// Delete the session token. Idempotent.
    pub async fn delete_token(&self) -> Result<()> {
        self.secure_store
            .delete_secret(SERVER_TOKEN_KEY)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to delete token from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!("Session token deleted");
        Ok(())
    }

    /// True when a non-blank token is stored.
    pub async fn has_token(&self) -> Result<bool> {
        Ok(self.retrieve_token().await?.is_some())
    }
}
