use thiserror::Error;

/// Errors raised while assembling the runtime: configuration, logging and
/// the platform bridges behind them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A bridge the host must supply was not provided and has no desktop default.
    #[error("Missing {capability} bridge: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Bridge initialization failed: {0}")]
    BridgeInit(String),
}

pub type Result<T> = std::result::Result<T, Error>;
