//! DEX simulation scraper.
//!
//! Instead of observing real swaps, the scraper periodically asks an
//! on-chain router what a fixed-size swap would return and emits the
//! implied price as a synthetic trade. Pool metadata (token symbols,
//! decimals) is resolved once at startup through read-only contract calls.

use crate::{ScraperError, ScraperResult};
use async_trait::async_trait;
use chrono::Utc;
use feeder_models::exchange::SIMULATION_EXCHANGE;
use feeder_models::{Asset, Exchange, Pool, Trade};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Quote cadence.
const QUOTE_INTERVAL: Duration = Duration::from_secs(10);
/// Swap input: 1000 units of the base (stable) token.
const AMOUNT_IN: f64 = 1000.0;

/// Read-only view of a pool for simulated swaps.
///
/// Implementations live next to the chain client; the scraper only needs
/// token metadata and a hypothetical swap output.
#[async_trait]
pub trait SwapQuoter: Send + Sync {
    /// Resolve the pool's `(quote, base)` assets, including decimals.
    async fn pool_assets(&self, pool: &Pool) -> ScraperResult<(Asset, Asset)>;

    /// Units of @quote received for @amount_in units of @base.
    async fn amount_out(
        &self,
        pool: &Pool,
        base: &Asset,
        quote: &Asset,
        amount_in: f64,
    ) -> ScraperResult<f64>;
}

pub async fn run(
    pools: Vec<Pool>,
    quoter: Arc<dyn SwapQuoter>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    info!(pools = pools.len(), "Started simulation scraper");

    // Resolve pool metadata once.
    let mut resolved = Vec::with_capacity(pools.len());
    for pool in &pools {
        match quoter.pool_assets(pool).await {
            Ok((quote, base)) => resolved.push((pool.clone(), quote, base)),
            Err(e) => warn!(pool = %pool.address, error = %e, "Skipping pool, metadata lookup failed"),
        }
    }

    let mut ticker = tokio::time::interval(QUOTE_INTERVAL);
    ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                for (pool, quote, base) in &resolved {
                    match quote_pool(quoter.as_ref(), pool, quote, base).await {
                        Ok(trade) => {
                            if trades_tx.send(trade).await.is_err() {
                                return Err(ScraperError::ChannelClosed);
                            }
                        }
                        Err(e) => error!(pool = %pool.address, error = %e, "Pool quote failed"),
                    }
                }
            }
        }
    }
}

async fn quote_pool(
    quoter: &dyn SwapQuoter,
    pool: &Pool,
    quote: &Asset,
    base: &Asset,
) -> ScraperResult<Trade> {
    let amount_out = quoter.amount_out(pool, base, quote, AMOUNT_IN).await?;
    if amount_out <= 0.0 {
        return Err(ScraperError::PoolQuote {
            pool: pool.address.clone(),
            reason: format!("non-positive amount out: {amount_out}"),
        });
    }
    Ok(Trade {
        quote_token: quote.clone(),
        base_token: base.clone(),
        price: AMOUNT_IN / amount_out,
        volume: amount_out,
        time: Utc::now(),
        exchange: Exchange::decentralized(SIMULATION_EXCHANGE, &pool.blockchain),
        foreign_trade_id: String::new(),
        pool_address: pool.address.clone(),
    })
}
