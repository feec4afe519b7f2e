//! Error types for feeder-onchain.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OnchainError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Failed to decode hex key: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid node URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    #[error("Contract error: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gas endpoint returned no usable value")]
    GasEndpoint,

    #[error("Value {0} cannot be packed into 128 bits at precision 8")]
    ValueOutOfRange(f64),

    #[error("Timestamp {0} cannot be packed")]
    TimestampOutOfRange(i64),

    #[error("Submission failed: {0}")]
    Submission(String),
}

pub type OnchainResult<T> = Result<T, OnchainError>;
