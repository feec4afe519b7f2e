//! Error types for feeder-scrapers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] feeder_ws::WsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Number parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("Number parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{exchange}: too many read errors")]
    TooManyReadErrors { exchange: &'static str },

    #[error("{exchange}: no trades within the watchdog window")]
    WatchdogExpired { exchange: String },

    #[error("Trade channel closed")]
    ChannelClosed,

    #[error("No swap quoter configured for decentralized venue {0}")]
    MissingQuoter(String),

    #[error("Scraper for {0} not available")]
    UnsupportedExchange(String),

    #[error("Pool quote failed for {pool}: {reason}")]
    PoolQuote { pool: String, reason: String },

    #[error("Scraper task panicked: {0}")]
    TaskPanicked(String),
}

pub type ScraperResult<T> = Result<T, ScraperError>;
