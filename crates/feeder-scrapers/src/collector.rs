//! Trade collector.
//!
//! Fans in the trades of all scrapers, partitions them by exchange-pair
//! identifier into tradesblocks, and ships the whole map downstream on
//! every trigger tick. A fresh map is allocated for the next window, so a
//! tick is never half-delivered.

use crate::{run_supervisor, ScraperDeps};
use chrono::{DateTime, Utc};
use feeder_models::{exchangepair_map, pool_map, ExchangePair, Pool, Trade, TradesBlock};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Start scrapers for all venues in @exchange_pairs / @pools and collect
/// their trades into per-market tradesblocks.
pub async fn run_collector(
    exchange_pairs: Vec<ExchangePair>,
    pools: Vec<Pool>,
    tradesblock_tx: mpsc::Sender<HashMap<String, TradesBlock>>,
    trigger_rx: mpsc::Receiver<DateTime<Utc>>,
    shutdown: CancellationToken,
    deps: ScraperDeps,
) {
    let ep_map = exchangepair_map(&exchange_pairs);
    let p_map = pool_map(&pools);
    info!(
        venues = ep_map.len(),
        dex_venues = p_map.len(),
        "Collector starting scrapers"
    );

    // Fan-in channel for all scrapers.
    let (trades_tx, trades_rx) = mpsc::channel::<Trade>(1);
    tokio::spawn(run_supervisor(
        ep_map,
        p_map,
        trades_tx,
        shutdown.clone(),
        deps,
    ));

    collect_loop(trades_rx, trigger_rx, tradesblock_tx, shutdown).await;
}

/// The partition/close loop, separated from scraper spawning so it can be
/// driven directly in tests.
pub async fn collect_loop(
    mut trades_rx: mpsc::Receiver<Trade>,
    mut trigger_rx: mpsc::Receiver<DateTime<Utc>>,
    tradesblock_tx: mpsc::Sender<HashMap<String, TradesBlock>>,
    shutdown: CancellationToken,
) {
    let mut blocks: HashMap<String, TradesBlock> = HashMap::new();
    let mut window_start = Utc::now();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            Some(trade) = trades_rx.recv() => {
                let pair = trade.pair();
                let identifier = pair.exchange_pair_identifier(&trade.exchange.name);
                blocks
                    .entry(identifier)
                    .or_insert_with(|| TradesBlock::new(pair, window_start))
                    .push(trade);
            }
            Some(timestamp) = trigger_rx.recv() => {
                for block in blocks.values_mut() {
                    block.end_time = timestamp;
                }
                debug!(tradesblocks = blocks.len(), %timestamp, "Tick closed tradesblocks");
                // Ship the whole window and allocate a fresh map.
                let closed = std::mem::take(&mut blocks);
                if tradesblock_tx.send(closed).await.is_err() {
                    return;
                }
                window_start = timestamp;
            }
        }
    }
}
