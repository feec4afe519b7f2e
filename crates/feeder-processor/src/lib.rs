//! Two-stage aggregation pipeline.
//!
//! Stage 1 collapses each tradesblock into one USD-denominated price point;
//! stale points are then evicted, and Stage 2 collapses the survivors into
//! one point per quote asset. The processor never fails a tick: bad blocks
//! are skipped with a warning.

pub mod error;
pub mod filters;
pub mod metafilters;
pub mod quotation;

pub use error::{ProcessorError, ProcessorResult};
pub use filters::FilterType;
pub use metafilters::MetafilterType;
pub use quotation::{DiaApiQuoter, UsdQuoter};

use chrono::{DateTime, Utc};
use feeder_models::{
    exchange_by_name, remove_old_points, ExchangePair, FilterPoint, Pool, SourceType, TradesBlock,
};
use feeder_models::exchange::SIMULATION_EXCHANGE;
use feeder_scrapers::{run_collector, ScraperDeps};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Processor configuration.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Points older than `now - tolerance_seconds` are evicted before Stage 2.
    pub tolerance_seconds: i64,
    pub filter: FilterType,
    pub metafilter: MetafilterType,
}

impl ProcessorConfig {
    pub fn from_env() -> Self {
        let tolerance_seconds = feeder_config::env_or(
            "TOLERANCE_SECONDS",
            &feeder_config::DEFAULT_TOLERANCE_SECONDS.to_string(),
        )
        .parse()
        .unwrap_or(feeder_config::DEFAULT_TOLERANCE_SECONDS);
        Self {
            tolerance_seconds,
            filter: FilterType::from_env(),
            metafilter: MetafilterType::from_env(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tolerance_seconds: feeder_config::DEFAULT_TOLERANCE_SECONDS,
            filter: FilterType::default(),
            metafilter: MetafilterType::default(),
        }
    }
}

/// Run the processor and the collector feeding it.
///
/// The collector is spawned in the background with a dedicated tradesblock
/// channel (capacity 1, so the processor paces the collector) and this loop
/// handles one block map per tick until shutdown.
pub async fn run_processor(
    exchange_pairs: Vec<ExchangePair>,
    pools: Vec<Pool>,
    filters_tx: mpsc::Sender<Vec<FilterPoint>>,
    trigger_rx: mpsc::Receiver<DateTime<Utc>>,
    shutdown: CancellationToken,
    quoter: Arc<dyn UsdQuoter>,
    deps: ScraperDeps,
    config: ProcessorConfig,
) {
    info!(?config, "Start processor");
    let (tradesblock_tx, mut tradesblock_rx) = mpsc::channel::<HashMap<String, TradesBlock>>(1);
    tokio::spawn(run_collector(
        exchange_pairs,
        pools,
        tradesblock_tx,
        trigger_rx,
        shutdown.clone(),
        deps,
    ));

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            maybe = tradesblock_rx.recv() => {
                let Some(blocks) = maybe else { return };
                let points = process_tick(blocks, quoter.as_ref(), &config).await;
                if filters_tx.send(points).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Run both aggregation stages over one tick's tradesblocks.
pub async fn process_tick(
    blocks: HashMap<String, TradesBlock>,
    quoter: &dyn UsdQuoter,
    config: &ProcessorConfig,
) -> Vec<FilterPoint> {
    let mut points = Vec::with_capacity(blocks.len());

    for (identifier, block) in blocks {
        info!(identifier = %identifier, trades = block.len(), "Tradesblock");
        if !block.pair.quote_token.is_resolved() {
            warn!(identifier = %identifier, "Rejecting block with unresolved assets");
            continue;
        }
        let source = identifier
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string();
        let value = match config.filter {
            FilterType::LastPrice => filters::last_price(&block.trades, quoter, true).await,
        };
        match value {
            Ok((value, _)) => points.push(FilterPoint {
                pair: block.pair.clone(),
                source_type: source_type(&source),
                source,
                value,
                name: config.filter.name().to_string(),
                time: block.end_time,
            }),
            Err(e) => warn!(identifier = %identifier, error = %e, "Stage 1 filter failed, skipping block"),
        }
    }

    let (points, removed) = remove_old_points(points, config.tolerance_seconds, Utc::now());
    if removed > 0 {
        warn!(removed, "Removed old filter points");
    }

    metafilters::apply(config.metafilter, points)
}

fn source_type(exchange: &str) -> SourceType {
    if exchange == SIMULATION_EXCHANGE {
        return SourceType::Simulation;
    }
    match exchange_by_name(exchange) {
        Ok(venue) if venue.centralized => SourceType::Cex,
        Ok(_) => SourceType::Dex,
        Err(_) => SourceType::Cex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_mapping() {
        assert_eq!(source_type("Binance"), SourceType::Cex);
        assert_eq!(source_type("UniswapV2"), SourceType::Dex);
        assert_eq!(source_type("Simulation"), SourceType::Simulation);
    }

    #[test]
    fn test_config_default() {
        let config = ProcessorConfig::default();
        assert_eq!(config.tolerance_seconds, 20);
        assert_eq!(config.metafilter, MetafilterType::Median);
    }
}
