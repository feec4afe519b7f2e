//! Error types for feeder-telemetry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid listen address: {0}")]
    ListenAddr(String),

    #[error("Logging init failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
