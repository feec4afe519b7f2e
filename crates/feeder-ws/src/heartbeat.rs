//! Client heartbeat scheduling.
//!
//! Some venues (KuCoin) drop silent clients, so the scraper sends a ping
//! every `min(server_interval / 2, 10s)`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// Upper bound on the ping interval in seconds.
const PING_INTERVAL_CAP_SECS: u64 = 10;

/// Heartbeat schedule and last-activity bookkeeping.
pub struct Heartbeat {
    interval: Duration,
    last_message: RwLock<DateTime<Utc>>,
}

impl Heartbeat {
    /// Build from the server-announced ping interval in milliseconds.
    pub fn from_server_interval_ms(server_interval_ms: i64) -> Self {
        Self {
            interval: ping_interval(server_interval_ms),
            last_message: RwLock::new(Utc::now()),
        }
    }

    /// The interval at which pings should be written.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next ping is due.
    pub async fn wait(&self) {
        tokio::time::sleep(self.interval).await;
    }

    /// Any message arrived on the socket.
    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    /// Milliseconds since the last message.
    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }
}

/// `min(server_interval / 2, 10s)`, with a sane floor for bogus announcements.
pub fn ping_interval(server_interval_ms: i64) -> Duration {
    let half_ms = (server_interval_ms / 2).max(1000) as u64;
    Duration::from_millis(half_ms.min(PING_INTERVAL_CAP_SECS * 1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_interval_uses_half_server_interval() {
        assert_eq!(ping_interval(18000), Duration::from_secs(9));
    }

    #[test]
    fn test_ping_interval_capped_at_ten_seconds() {
        assert_eq!(ping_interval(60000), Duration::from_secs(10));
    }

    #[test]
    fn test_ping_interval_floor() {
        assert_eq!(ping_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn test_record_message() {
        let hb = Heartbeat::from_server_interval_ms(18000);
        hb.record_message();
        assert!(hb.time_since_last_message_ms() < 1000);
    }
}
