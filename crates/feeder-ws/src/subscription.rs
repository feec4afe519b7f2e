//! Per-pair subscription state tracking.
//!
//! Every pair a scraper owns moves through the same lifecycle:
//!
//! ```text
//! Unsubscribed --subscribe--> Subscribing --first data/ack--> Live
//!       ^                                                       |
//!       |                                                       | watchdog timeout
//!       +----------- unsubscribe + resubscribe <----------------+
//! ```
//!
//! Venues without explicit subscription acks mark a pair Live on its first
//! trade message instead.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Lifecycle state of one pair subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    Subscribing,
    Live,
    Resubscribing,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "UNSUBSCRIBED"),
            Self::Subscribing => write!(f, "SUBSCRIBING"),
            Self::Live => write!(f, "LIVE"),
            Self::Resubscribing => write!(f, "RESUBSCRIBING"),
        }
    }
}

/// Tracks subscription states for all pairs of one scraper.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    states: RwLock<HashMap<String, SubscriptionState>>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscribe request was written to the socket.
    pub fn mark_subscribing(&self, foreign_name: &str) {
        self.states
            .write()
            .insert(foreign_name.to_string(), SubscriptionState::Subscribing);
    }

    /// Data (or an ack) arrived for the pair.
    pub fn mark_live(&self, foreign_name: &str) {
        self.states
            .write()
            .insert(foreign_name.to_string(), SubscriptionState::Live);
    }

    /// The watchdog kicked off an unsubscribe/subscribe cycle.
    pub fn mark_resubscribing(&self, foreign_name: &str) {
        self.states
            .write()
            .insert(foreign_name.to_string(), SubscriptionState::Resubscribing);
    }

    /// The pair was unsubscribed and will not come back.
    pub fn mark_unsubscribed(&self, foreign_name: &str) {
        self.states
            .write()
            .insert(foreign_name.to_string(), SubscriptionState::Unsubscribed);
    }

    pub fn state(&self, foreign_name: &str) -> SubscriptionState {
        self.states
            .read()
            .get(foreign_name)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_live(&self, foreign_name: &str) -> bool {
        self.state(foreign_name) == SubscriptionState::Live
    }

    /// Number of pairs currently delivering data.
    pub fn live_count(&self) -> usize {
        self.states
            .read()
            .values()
            .filter(|s| **s == SubscriptionState::Live)
            .count()
    }

    /// Reset all pairs, e.g. after a reconnect invalidated the session.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let tracker = SubscriptionTracker::new();
        assert_eq!(tracker.state("BTC-USDT"), SubscriptionState::Unsubscribed);
        assert!(!tracker.is_live("BTC-USDT"));
    }

    #[test]
    fn test_lifecycle() {
        let tracker = SubscriptionTracker::new();
        tracker.mark_subscribing("BTC-USDT");
        assert_eq!(tracker.state("BTC-USDT"), SubscriptionState::Subscribing);

        tracker.mark_live("BTC-USDT");
        assert!(tracker.is_live("BTC-USDT"));

        tracker.mark_resubscribing("BTC-USDT");
        assert_eq!(tracker.state("BTC-USDT"), SubscriptionState::Resubscribing);

        tracker.mark_live("BTC-USDT");
        assert_eq!(tracker.live_count(), 1);
    }

    #[test]
    fn test_reset_clears_all() {
        let tracker = SubscriptionTracker::new();
        tracker.mark_live("BTC-USDT");
        tracker.mark_live("ETH-USDT");
        assert_eq!(tracker.live_count(), 2);
        tracker.reset();
        assert_eq!(tracker.live_count(), 0);
    }
}
