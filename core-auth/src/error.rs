use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Unexpected login response: {0}")]
    InvalidResponse(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Settings storage failed: {0}")]
    Settings(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl AuthError {
    /// True when the server could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(self, AuthError::Bridge(err) if err.is_network())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
