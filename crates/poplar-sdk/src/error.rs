//! Error types for the Poplar SDK

use thiserror::Error;

use crate::ledger::LedgerError;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error types
#[derive(Error, Debug)]
pub enum SdkError {
    /// Malformed 32-byte entity identifier
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// Malformed 20-byte account address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed or out-of-range token amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Ledger read or write failed; the ledger's message is kept verbatim
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Content-store upload or fetch failed; the store's message is kept verbatim
    #[error("{0}")]
    ContentStore(String),

    /// Ledger returned data that does not fit the typed model
    #[error("Decode error: {0}")]
    Decode(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<poplar_ipfs_client::IpfsError> for SdkError {
    fn from(err: poplar_ipfs_client::IpfsError) -> Self {
        SdkError::ContentStore(err.to_string())
    }
}

impl From<crate::config::ConfigError> for SdkError {
    fn from(err: crate::config::ConfigError) -> Self {
        SdkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}
