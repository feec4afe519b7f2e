//! Error types for feeder-models.

use thiserror::Error;

/// Model error types.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid pair ticker: {0}")]
    InvalidPairTicker(String),

    #[error("Invalid exchange pair: {0}")]
    InvalidExchangePair(String),

    #[error("Invalid pool entry: {0}")]
    InvalidPool(String),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
