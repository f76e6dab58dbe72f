//! Error types for the A/B testing lab

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the lab
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    ConfigInvalid(Vec<String>),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Detection stream errors
    #[error("Stream connection failed: {0}")]
    StreamConnection(String),

    #[error("Stream disconnected")]
    StreamDisconnected,

    #[error("Stream decode error: {0}")]
    StreamDecode(String),

    // Pump.fun protocol errors
    #[error("Bonding curve decode failed: {0}")]
    CurveDecode(String),

    #[error("Mint account decode failed: {0}")]
    MintDecode(String),

    #[error("Price calculation overflow")]
    PriceOverflow,

    // Trading errors
    #[error("Sell submission failed: {0}")]
    SellSubmit(String),

    // Position errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position rejected: {0}")]
    PositionRejected(String),

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    // Filter errors
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::RpcConnection(_)
                | Error::StreamDisconnected
                | Error::SellSubmit(_)
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from rusqlite errors
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
