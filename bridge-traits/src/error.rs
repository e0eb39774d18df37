use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The transport could not reach the server (DNS, refused/reset connection, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered but refused the request with a non-success envelope code.
    #[error("Server rejected request ({code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True for failures where retrying later on a better connection may succeed.
    pub fn is_network(&self) -> bool {
        matches!(self, BridgeError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
