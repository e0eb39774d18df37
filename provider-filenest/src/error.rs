//! Error types for the Filenest provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// Filenest API errors
#[derive(Error, Debug)]
pub enum FilenestError {
    /// No session is stored on the device
    #[error("Not logged in to a media server")]
    NotAuthenticated,

    /// The stored session could not be read
    #[error("Session unavailable: {0}")]
    Session(String),

    /// An endpoint could not be resolved against the server URL
    #[error("Invalid endpoint '{path}': {reason}")]
    InvalidEndpoint { path: String, reason: String },

    /// The server answered with a non-200 envelope code
    #[error("Media server error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Failed to encode request parameters
    #[error("Failed to encode request: {0}")]
    EncodeError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Filenest operations
pub type Result<T> = std::result::Result<T, FilenestError>;

impl From<AuthError> for FilenestError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotAuthenticated => FilenestError::NotAuthenticated,
            AuthError::Bridge(e) => FilenestError::BridgeError(e),
            other => FilenestError::Session(other.to_string()),
        }
    }
}

impl From<FilenestError> for BridgeError {
    fn from(error: FilenestError) -> Self {
        match error {
            FilenestError::Api { code, message } => BridgeError::Rejected { code, message },
            FilenestError::BridgeError(e) => e,
            FilenestError::NotAuthenticated => {
                BridgeError::OperationFailed("Not logged in to a media server".to_string())
            }
            FilenestError::Session(msg) => {
                BridgeError::OperationFailed(format!("Session unavailable: {}", msg))
            }
            FilenestError::InvalidEndpoint { path, reason } => {
                BridgeError::OperationFailed(format!("Invalid endpoint '{}': {}", path, reason))
            }
            FilenestError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            FilenestError::EncodeError(msg) => {
                BridgeError::OperationFailed(format!("Encode error: {}", msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = FilenestError::Api {
            code: 500,
            message: "Disk full".to_string(),
        };

        assert_eq!(error.to_string(), "Media server error (code 500): Disk full");
    }

    #[test]
    fn test_api_error_becomes_rejection() {
        let bridge_error: BridgeError = FilenestError::Api {
            code: 403,
            message: "Forbidden".to_string(),
        }
        .into();

        assert!(matches!(
            bridge_error,
            BridgeError::Rejected { code: 403, ref message } if message == "Forbidden"
        ));
    }

    #[test]
    fn test_network_error_passes_through() {
        let bridge_error: BridgeError =
            FilenestError::BridgeError(BridgeError::Network("reset".to_string())).into();
        assert!(bridge_error.is_network());

        let from_auth: FilenestError = AuthError::NotAuthenticated.into();
        assert!(matches!(from_auth, FilenestError::NotAuthenticated));
    }
}
