//! Venue scrapers, watchdogs and the trade collector.
//!
//! One scraper per venue owns a single WebSocket session, normalizes wire
//! messages into [`feeder_models::Trade`]s and emits them on a channel. A
//! global watchdog per scraper and a per-pair watchdog per subscription
//! provide liveness; the supervisor restarts scrapers that die.

pub mod binance;
pub mod coinbase;
pub mod collector;
pub mod cryptodotcom;
pub mod error;
pub mod gateio;
pub mod kraken;
pub mod kucoin;
pub mod simulation;
#[cfg(test)]
pub(crate) mod testutil;
pub mod watchdog;

pub use collector::run_collector;
pub use error::{ScraperError, ScraperResult};
pub use simulation::SwapQuoter;

use chrono::{DateTime, Utc};
use feeder_models::exchange::{
    BINANCE_EXCHANGE, COINBASE_EXCHANGE, CRYPTODOTCOM_EXCHANGE, GATEIO_EXCHANGE, KRAKEN_EXCHANGE,
    KUCOIN_EXCHANGE, SIMULATION_EXCHANGE, UNISWAPV2_EXCHANGE,
};
use feeder_models::{ExchangePair, Pool, Trade};
use feeder_ws::{SubscriptionTracker, WsResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Error budget of a fetch loop before the scraper gives up.
pub(crate) const MAX_ERR_COUNT: u32 = 20;
/// Wait before exiting once the error budget is exhausted.
pub(crate) const RESTART_WAIT_TIME: Duration = Duration::from_secs(5);
/// Pause between unsubscribe and subscribe during a pair resubscription.
pub(crate) const RESUBSCRIBE_SLEEP: Duration = Duration::from_secs(2);
/// Pause before the supervisor restarts a dead scraper.
const SCRAPER_RESTART_DELAY: Duration = Duration::from_secs(2);

/// Shared map of last trade times, keyed by the pair's foreign name.
/// The scraper's fetch loop writes, the watchdogs read.
pub(crate) type LastTradeTimes = Arc<RwLock<HashMap<String, DateTime<Utc>>>>;

/// External collaborators a scraper may need.
#[derive(Clone, Default)]
pub struct ScraperDeps {
    /// On-chain quoter for the simulation scraper.
    pub quoter: Option<Arc<dyn SwapQuoter>>,
}

/// Run one scraper for @exchange until it fails, its watchdog expires or
/// shutdown is requested.
///
/// Centralized venues are wrapped with the global watchdog: the wrapper
/// forwards trades to @trades_tx and cancels the scraper when no trade
/// arrived for the venue's watchdog delay.
pub async fn run_scraper_once(
    exchange: &str,
    pairs: Vec<ExchangePair>,
    pools: Vec<Pool>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
    deps: &ScraperDeps,
) -> ScraperResult<()> {
    match exchange {
        BINANCE_EXCHANGE => {
            run_watched(exchange, trades_tx, shutdown, move |tx, token| {
                binance::run(pairs, tx, token)
            })
            .await
        }
        COINBASE_EXCHANGE => {
            run_watched(exchange, trades_tx, shutdown, move |tx, token| {
                coinbase::run(pairs, tx, token)
            })
            .await
        }
        CRYPTODOTCOM_EXCHANGE => {
            run_watched(exchange, trades_tx, shutdown, move |tx, token| {
                cryptodotcom::run(pairs, tx, token)
            })
            .await
        }
        GATEIO_EXCHANGE => {
            run_watched(exchange, trades_tx, shutdown, move |tx, token| {
                gateio::run(pairs, tx, token)
            })
            .await
        }
        KRAKEN_EXCHANGE => {
            run_watched(exchange, trades_tx, shutdown, move |tx, token| {
                kraken::run(pairs, tx, token)
            })
            .await
        }
        KUCOIN_EXCHANGE => {
            run_watched(exchange, trades_tx, shutdown, move |tx, token| {
                kucoin::run(pairs, tx, token)
            })
            .await
        }
        UNISWAPV2_EXCHANGE | SIMULATION_EXCHANGE => {
            let quoter = deps
                .quoter
                .clone()
                .ok_or_else(|| ScraperError::MissingQuoter(exchange.to_string()))?;
            simulation::run(pools, quoter, trades_tx, shutdown).await
        }
        other => Err(ScraperError::UnsupportedExchange(other.to_string())),
    }
}

/// Wrap a venue scraper with the global watchdog.
async fn run_watched<F, Fut>(
    exchange: &str,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
    scraper: F,
) -> ScraperResult<()>
where
    F: FnOnce(mpsc::Sender<Trade>, CancellationToken) -> Fut,
    Fut: Future<Output = ScraperResult<()>> + Send + 'static,
{
    let delay = Duration::from_secs(feeder_config::global_watchdog_delay(exchange).max(1) as u64);
    let child = shutdown.child_token();
    let (venue_tx, mut venue_rx) = mpsc::channel::<Trade>(32);
    let mut task = tokio::spawn(scraper(venue_tx, child.clone()));

    let mut last_trade = Instant::now();
    let mut wd_ticker = tokio::time::interval(delay);
    wd_ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            Some(trade) = venue_rx.recv() => {
                last_trade = Instant::now();
                if trades_tx.send(trade).await.is_err() {
                    child.cancel();
                    let _ = (&mut task).await;
                    return Err(ScraperError::ChannelClosed);
                }
            }
            result = &mut task => {
                return match result {
                    Ok(inner) => inner,
                    Err(e) => Err(ScraperError::TaskPanicked(e.to_string())),
                };
            }
            _ = wd_ticker.tick() => {
                if last_trade.elapsed() > delay {
                    warn!(
                        exchange,
                        elapsed_secs = last_trade.elapsed().as_secs(),
                        "Global watchdog expired, closing scraper"
                    );
                    child.cancel();
                    let _ = (&mut task).await;
                    return Err(ScraperError::WatchdogExpired {
                        exchange: exchange.to_string(),
                    });
                }
            }
            () = shutdown.cancelled() => {
                child.cancel();
                let _ = (&mut task).await;
                return Ok(());
            }
        }
    }
}

/// Supervisor over all scrapers.
///
/// Spawns one scraper per venue; each scraper signals its venue name on the
/// failover channel when it dies. The supervisor restarts it after a short
/// delay until shutdown.
pub async fn run_supervisor(
    exchangepair_map: HashMap<String, Vec<ExchangePair>>,
    pool_map: HashMap<String, Vec<Pool>>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
    deps: ScraperDeps,
) {
    let (failover_tx, mut failover_rx) = mpsc::channel::<String>(16);

    for exchange in exchangepair_map.keys().chain(pool_map.keys()) {
        spawn_scraper(
            exchange.clone(),
            &exchangepair_map,
            &pool_map,
            trades_tx.clone(),
            failover_tx.clone(),
            shutdown.clone(),
            deps.clone(),
        );
    }

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            Some(exchange) = failover_rx.recv() => {
                if shutdown.is_cancelled() {
                    return;
                }
                warn!(exchange = %exchange, "Restarting scraper after failover");
                tokio::time::sleep(SCRAPER_RESTART_DELAY).await;
                spawn_scraper(
                    exchange,
                    &exchangepair_map,
                    &pool_map,
                    trades_tx.clone(),
                    failover_tx.clone(),
                    shutdown.clone(),
                    deps.clone(),
                );
            }
        }
    }
}

fn spawn_scraper(
    exchange: String,
    exchangepair_map: &HashMap<String, Vec<ExchangePair>>,
    pool_map: &HashMap<String, Vec<Pool>>,
    trades_tx: mpsc::Sender<Trade>,
    failover_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
    deps: ScraperDeps,
) {
    let pairs = exchangepair_map.get(&exchange).cloned().unwrap_or_default();
    let pools = pool_map.get(&exchange).cloned().unwrap_or_default();
    tokio::spawn(async move {
        info!(exchange = %exchange, pairs = pairs.len(), pools = pools.len(), "Starting scraper");
        match run_scraper_once(&exchange, pairs, pools, trades_tx, shutdown.clone(), &deps).await {
            Ok(()) => info!(exchange = %exchange, "Scraper stopped"),
            Err(e) => error!(exchange = %exchange, error = %e, "Scraper died"),
        }
        if !shutdown.is_cancelled() {
            let _ = failover_tx.send(exchange).await;
        }
    });
}

/// Shared resubscription loop: per-pair watchdogs push expired pairs onto
/// the subscribe channel; each one is unsubscribed, left alone for two
/// seconds, then subscribed again.
pub(crate) async fn resubscribe_loop<F, Fut>(
    exchange: &'static str,
    mut subscribe_rx: mpsc::Receiver<ExchangePair>,
    subscriptions: Arc<SubscriptionTracker>,
    shutdown: CancellationToken,
    toggle: F,
) where
    F: Fn(ExchangePair, bool) -> Fut,
    Fut: Future<Output = WsResult<()>>,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            maybe = subscribe_rx.recv() => {
                let Some(pair) = maybe else { return };
                subscriptions.mark_resubscribing(&pair.foreign_name);
                if let Err(e) = toggle(pair.clone(), false).await {
                    error!(exchange, pair = %pair.foreign_name, error = %e, "Unsubscribe failed");
                } else {
                    info!(exchange, pair = %pair.foreign_name, "Unsubscribed pair");
                }
                tokio::time::sleep(RESUBSCRIBE_SLEEP).await;
                match toggle(pair.clone(), true).await {
                    Ok(()) => {
                        subscriptions.mark_subscribing(&pair.foreign_name);
                        info!(exchange, pair = %pair.foreign_name, "Resubscribed pair");
                    }
                    Err(e) => {
                        error!(exchange, pair = %pair.foreign_name, error = %e, "Resubscribe failed");
                    }
                }
            }
        }
    }
}

/// Initialize the last-trade-time map so fresh subscriptions are not
/// immediately flagged stale.
pub(crate) fn init_last_trade_times(pairs: &[ExchangePair]) -> LastTradeTimes {
    let now = Utc::now();
    let map = pairs
        .iter()
        .map(|p| (p.foreign_name.clone(), now))
        .collect::<HashMap<_, _>>();
    Arc::new(RwLock::new(map))
}

/// Record a trade for the pair watchdogs.
pub(crate) fn touch_pair(times: &LastTradeTimes, foreign_name: &str, time: DateTime<Utc>) {
    times.write().insert(foreign_name.to_string(), time);
}

/// Spawn the per-pair watchdogs and the resubscription driver channel.
pub(crate) fn spawn_pair_watchdogs(
    pairs: &[ExchangePair],
    times: &LastTradeTimes,
    shutdown: &CancellationToken,
) -> mpsc::Receiver<ExchangePair> {
    let (subscribe_tx, subscribe_rx) = mpsc::channel::<ExchangePair>(16);
    for pair in pairs {
        let delay = Duration::from_secs(feeder_config::pair_watchdog_delay(pair).max(1) as u64);
        tokio::spawn(watchdog::pair_watchdog(
            pair.clone(),
            delay,
            times.clone(),
            subscribe_tx.clone(),
            shutdown.clone(),
        ));
    }
    subscribe_rx
}
