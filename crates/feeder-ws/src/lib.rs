//! Shared WebSocket plumbing for the venue scrapers.
//!
//! Provides:
//! - Session connect with capped retry and exponential backoff
//! - A cloneable write handle serializing all socket writes
//! - Per-pair subscription state tracking
//! - Token-bucket rate limiting with retryable task bookkeeping
//! - Heartbeat scheduling for venues that demand client pings

pub mod error;
pub mod heartbeat;
pub mod rate_limiter;
pub mod session;
pub mod subscription;

pub use error::{WsError, WsResult};
pub use heartbeat::Heartbeat;
pub use rate_limiter::{RateLimiter, SubscribeTask, TaskRegistry, TASK_MAX_RETRY};
pub use session::{SessionConfig, WsSession, WsWriteHandle, CONN_MAX_RETRY};
pub use subscription::{SubscriptionState, SubscriptionTracker};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
