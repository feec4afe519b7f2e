//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Max connection retries reached after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Task {task_id} exceeded max retries")]
    TaskRetriesExceeded { task_id: u64 },

    #[error("Unknown task id: {0}")]
    UnknownTask(u64),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Whether the error indicates the transport is gone, as opposed to a
    /// recoverable per-message failure. Transport-closed errors exit the
    /// fetch loop immediately instead of counting against the error budget.
    pub fn is_transport_closed(&self) -> bool {
        use tokio_tungstenite::tungstenite::Error as TError;
        match self {
            Self::ConnectionClosed { .. } | Self::MaxRetriesExceeded { .. } => true,
            Self::Tungstenite(e) => matches!(
                e,
                TError::ConnectionClosed | TError::AlreadyClosed | TError::Io(_)
            ),
            _ => false,
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
