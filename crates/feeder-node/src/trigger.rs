//! Periodic trigger source.
//!
//! Anything that writes a timestamp to the trigger channel can drive the
//! pipeline; the default source is a wall-clock ticker. The sender sits in
//! a slot so a config reload can swap in the new processor's channel
//! without restarting the ticker.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Swappable destination for trigger ticks.
pub type TriggerSlot = Arc<RwLock<mpsc::Sender<DateTime<Utc>>>>;

/// Emit a tick every @frequency until shutdown.
pub async fn run_trigger(frequency: Duration, slot: TriggerSlot, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(frequency);
    ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let sender = slot.read().await.clone();
                if sender.send(Utc::now()).await.is_err() {
                    // Receiver is gone, most likely mid-reload; the next
                    // tick will use the fresh sender.
                    debug!("Trigger receiver dropped");
                }
            }
        }
    }
}
