//! Liveness watchdogs.
//!
//! The per-pair watchdog owns no trade state: it only reads the shared
//! last-trade-time map written by the scraper's fetch loop and pushes the
//! pair onto the subscribe channel when it went quiet. What happens next
//! (usually unsubscribe + resubscribe) is the caller's decision.

use crate::LastTradeTimes;
use chrono::Utc;
use feeder_models::ExchangePair;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watch the liveness of one pair subscription.
pub async fn pair_watchdog(
    pair: ExchangePair,
    delay: Duration,
    last_trade_times: LastTradeTimes,
    subscribe_tx: mpsc::Sender<ExchangePair>,
    shutdown: CancellationToken,
) {
    info!(exchange = %pair.exchange, pair = %pair.foreign_name, delay_secs = delay.as_secs(), "Start watching pair");
    let threshold = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(60));
    let mut ticker = tokio::time::interval(delay);
    ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                let last = last_trade_times.read().get(&pair.foreign_name).copied();
                let stale = match last {
                    Some(t) => Utc::now() - t > threshold,
                    // Never traded since subscription: treat as stale.
                    None => true,
                };
                debug!(
                    exchange = %pair.exchange,
                    pair = %pair.foreign_name,
                    stale,
                    "Pair liveness check"
                );
                if stale {
                    warn!(exchange = %pair.exchange, pair = %pair.foreign_name, "Pair watchdog expired");
                    if subscribe_tx.send(pair.clone()).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feeder_models::{Pair as ModelPair, Asset};
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn exchange_pair(foreign: &str) -> ExchangePair {
        ExchangePair {
            exchange: "Binance".to_string(),
            foreign_name: foreign.to_string(),
            underlying_pair: ModelPair::new(Asset::default(), Asset::default()),
            watchdog_delay: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_pair_is_pushed_for_resubscription() {
        let times: LastTradeTimes = Arc::new(RwLock::new(HashMap::new()));
        times
            .write()
            .insert("AVAX-USDT".to_string(), Utc::now() - chrono::Duration::seconds(120));
        times.write().insert("BTC-USDT".to_string(), Utc::now());

        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        tokio::spawn(pair_watchdog(
            exchange_pair("AVAX-USDT"),
            Duration::from_secs(60),
            times.clone(),
            tx.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(pair_watchdog(
            exchange_pair("BTC-USDT"),
            Duration::from_secs(60),
            times.clone(),
            tx,
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;

        // Exactly the stale pair fires, the healthy one stays quiet.
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.foreign_name, "AVAX-USDT");
        assert!(rx.try_recv().is_err());

        shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_trades_keep_watchdog_quiet() {
        let times: LastTradeTimes = Arc::new(RwLock::new(HashMap::new()));
        times.write().insert("ETH-USDT".to_string(), Utc::now());

        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        tokio::spawn(pair_watchdog(
            exchange_pair("ETH-USDT"),
            Duration::from_secs(60),
            times.clone(),
            tx,
            shutdown.clone(),
        ));

        // Keep refreshing the trade time just before every check.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(59)).await;
            times.write().insert("ETH-USDT".to_string(), Utc::now());
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        assert!(rx.try_recv().is_err());
        shutdown.cancel();
    }
}
