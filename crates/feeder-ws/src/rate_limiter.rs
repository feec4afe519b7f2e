//! Rate limiting and retryable subscription tasks.
//!
//! Venues that rate-limit subscription traffic (Crypto.com: 10 req/s) get a
//! token bucket in front of every subscribe/unsubscribe write, and a task
//! registry so a rejected request can be retried with the same payload.

use crate::error::{WsError, WsResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Maximum retries for a single subscribe/unsubscribe task.
pub const TASK_MAX_RETRY: u32 = 20;

/// Token bucket rate limiter.
pub struct RateLimiter {
    /// Maximum requests per window.
    max_requests: u32,
    /// Window size.
    window: Duration,
    /// Timestamps of recent requests.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `max_requests` per `window_secs` seconds.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    /// Limiter allowing `per_second` requests each second.
    pub fn per_second(per_second: u32) -> Self {
        Self::new(per_second, 1)
    }

    /// Whether a request may be sent right now.
    pub fn can_send(&self) -> bool {
        self.cleanup();
        self.timestamps.lock().len() < self.max_requests as usize
    }

    /// Record a sent request.
    pub fn record_send(&self) {
        self.cleanup();
        let mut timestamps = self.timestamps.lock();
        timestamps.push_back(Instant::now());
        if timestamps.len() >= self.max_requests as usize {
            warn!(
                count = timestamps.len(),
                max = self.max_requests,
                "Approaching rate limit"
            );
        }
    }

    /// Wait until a slot is free, then claim it.
    pub async fn acquire(&self) {
        while !self.can_send() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.record_send();
    }

    /// Requests recorded in the current window.
    pub fn current_count(&self) -> u32 {
        self.cleanup();
        self.timestamps.lock().len() as u32
    }

    fn cleanup(&self) {
        let cutoff = Instant::now() - self.window;
        let mut timestamps = self.timestamps.lock();
        while timestamps.front().is_some_and(|&t| t < cutoff) {
            timestamps.pop_front();
        }
    }
}

/// A subscribe/unsubscribe request that can be retried verbatim.
#[derive(Debug, Clone)]
pub struct SubscribeTask {
    pub method: String,
    pub channels: Vec<String>,
    pub retry_count: u32,
}

impl SubscribeTask {
    pub fn new(method: impl Into<String>, channels: Vec<String>) -> Self {
        Self {
            method: method.into(),
            channels,
            retry_count: 0,
        }
    }
}

impl std::fmt::Display for SubscribeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.channels.len() {
            0 => write!(f, "method={}, retry={}", self.method, self.retry_count),
            1 => write!(
                f,
                "method={}, channel={}, retry={}",
                self.method, self.channels[0], self.retry_count
            ),
            n => write!(
                f,
                "method={}, channel={} +{} more, retry={}",
                self.method,
                self.channels[0],
                n - 1,
                self.retry_count
            ),
        }
    }
}

/// Registry of in-flight subscription tasks keyed by request id.
#[derive(Default)]
pub struct TaskRegistry {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, SubscribeTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a task and return its request id.
    pub fn register(&self, task: SubscribeTask) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.tasks.lock().insert(id, task);
        id
    }

    /// Bump the retry count of a task and return it for resending.
    ///
    /// Fails when the id is unknown or the retry cap is exceeded.
    pub fn retry(&self, task_id: u64) -> WsResult<SubscribeTask> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(&task_id).ok_or(WsError::UnknownTask(task_id))?;
        task.retry_count += 1;
        if task.retry_count > TASK_MAX_RETRY {
            return Err(WsError::TaskRetriesExceeded { task_id });
        }
        Ok(task.clone())
    }

    /// Drop a completed task.
    pub fn complete(&self, task_id: u64) {
        self.tasks.lock().remove(&task_id);
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(10, 60);
        assert!(limiter.can_send());
        for _ in 0..5 {
            limiter.record_send();
        }
        assert!(limiter.can_send());
        assert_eq!(limiter.current_count(), 5);
    }

    #[test]
    fn test_rate_limiter_at_limit() {
        let limiter = RateLimiter::new(5, 60);
        for _ in 0..5 {
            limiter.record_send();
        }
        assert!(!limiter.can_send());
    }

    #[test]
    fn test_task_registry_retry() {
        let registry = TaskRegistry::new();
        let id = registry.register(SubscribeTask::new(
            "subscribe",
            vec!["trade.BTC_USDT".to_string()],
        ));

        let retried = registry.retry(id).unwrap();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.method, "subscribe");

        let retried = registry.retry(id).unwrap();
        assert_eq!(retried.retry_count, 2);
    }

    #[test]
    fn test_task_registry_retry_cap() {
        let registry = TaskRegistry::new();
        let id = registry.register(SubscribeTask::new("subscribe", vec![]));

        for _ in 0..TASK_MAX_RETRY {
            registry.retry(id).unwrap();
        }
        assert!(matches!(
            registry.retry(id),
            Err(WsError::TaskRetriesExceeded { .. })
        ));
    }

    #[test]
    fn test_task_registry_unknown_id() {
        let registry = TaskRegistry::new();
        assert!(matches!(registry.retry(99), Err(WsError::UnknownTask(99))));
    }

    #[test]
    fn test_task_registry_complete() {
        let registry = TaskRegistry::new();
        let id = registry.register(SubscribeTask::new("subscribe", vec![]));
        assert_eq!(registry.len(), 1);
        registry.complete(id);
        assert!(registry.is_empty());
    }
}
