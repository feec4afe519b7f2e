//! Error types for feeder-config.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] feeder_models::ModelError),

    #[error("Invalid environment entry: {0}")]
    InvalidEnvEntry(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
