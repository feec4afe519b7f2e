//! Error types for feeder-processor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Tradesblock contains no trades")]
    EmptyBlock,

    #[error("Unresolved quote asset in block {0}")]
    UnresolvedAsset(String),

    #[error("USD quotation lookup failed for {blockchain}/{address}: {reason}")]
    QuoteLookup {
        blockchain: String,
        address: String,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown filter type: {0}")]
    UnknownFilter(String),

    #[error("Unknown metafilter type: {0}")]
    UnknownMetafilter(String),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
