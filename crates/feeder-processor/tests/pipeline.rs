//! End-to-end aggregation scenarios driven through `process_tick`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use feeder_models::{Asset, Exchange, Pair, SourceType, Trade, TradesBlock};
use feeder_processor::{process_tick, ProcessorConfig, ProcessorError, UsdQuoter};
use std::collections::HashMap;

struct FixedQuoter(f64);

#[async_trait]
impl UsdQuoter for FixedQuoter {
    async fn usd_price(
        &self,
        _blockchain: &str,
        _address: &str,
    ) -> Result<f64, ProcessorError> {
        Ok(self.0)
    }
}

struct FailingQuoter;

#[async_trait]
impl UsdQuoter for FailingQuoter {
    async fn usd_price(&self, blockchain: &str, address: &str) -> Result<f64, ProcessorError> {
        Err(ProcessorError::QuoteLookup {
            blockchain: blockchain.to_string(),
            address: address.to_string(),
            reason: "stub".to_string(),
        })
    }
}

fn asset(symbol: &str) -> Asset {
    Asset {
        symbol: symbol.to_string(),
        address: format!("0x{}", symbol.to_lowercase()),
        blockchain: "Ethereum".to_string(),
        ..Default::default()
    }
}

fn trade(pair: &Pair, exchange: &str, price: f64, age_secs: i64) -> Trade {
    Trade {
        quote_token: pair.quote_token.clone(),
        base_token: pair.base_token.clone(),
        price,
        volume: 1.0,
        time: Utc::now() - Duration::seconds(age_secs),
        exchange: Exchange::centralized(exchange),
        foreign_trade_id: String::new(),
        pool_address: String::new(),
    }
}

fn block(pair: &Pair, exchange: &str, prices_and_ages: &[(f64, i64)]) -> (String, TradesBlock) {
    let now = Utc::now();
    let mut tb = TradesBlock::new(pair.clone(), now - Duration::seconds(20));
    tb.end_time = now;
    for (price, age) in prices_and_ages {
        tb.push(trade(pair, exchange, *price, *age));
    }
    (pair.exchange_pair_identifier(exchange), tb)
}

/// Single-venue happy path: three trades between ticks, USDT at 1.00.
#[tokio::test]
async fn single_venue_happy_path() {
    let pair = Pair::new(asset("BTC"), asset("USDT"));
    let (id, tb) = block(&pair, "Binance", &[(50000.0, 15), (50100.0, 10), (50050.0, 5)]);
    let blocks: HashMap<_, _> = [(id, tb)].into();

    let points = process_tick(blocks, &FixedQuoter(1.0), &ProcessorConfig::default()).await;
    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point.value, 50050.0);
    assert_eq!(point.pair.quote_token.symbol, "BTC");
    assert_eq!(point.name, "median");
    assert_eq!(point.source_type, SourceType::Cex);
}

/// Cross-venue median: ETH last prices 2000 and 2010 yield 2005.
#[tokio::test]
async fn cross_venue_median() {
    let pair = Pair::new(asset("ETH"), asset("USDT"));
    let (id1, tb1) = block(&pair, "Binance", &[(2000.0, 5)]);
    let (id2, tb2) = block(&pair, "Kraken", &[(2010.0, 4)]);
    let blocks: HashMap<_, _> = [(id1, tb1), (id2, tb2)].into();

    let points = process_tick(blocks, &FixedQuoter(1.0), &ProcessorConfig::default()).await;
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value, 2005.0);
    assert_eq!(points[0].pair.quote_token.symbol, "ETH");
}

/// Staleness eviction: the 30s-old point dies at tolerance 20s and the
/// median is computed over the survivors.
#[tokio::test]
async fn staleness_eviction() {
    let pair = Pair::new(asset("SOL"), asset("USDT"));

    let mut blocks = HashMap::new();
    for (venue, price, age) in [
        ("Binance", 25.0, 5i64),
        ("Kraken", 26.0, 15),
        ("GateIO", 27.0, 30),
    ] {
        let now = Utc::now();
        let mut tb = TradesBlock::new(pair.clone(), now - Duration::seconds(40));
        // A block that closed @age seconds ago.
        tb.end_time = now - Duration::seconds(age);
        tb.push(trade(&pair, venue, price, age));
        blocks.insert(pair.exchange_pair_identifier(venue), tb);
    }

    let points = process_tick(blocks, &FixedQuoter(1.0), &ProcessorConfig::default()).await;
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value, 25.5);
}

/// A failed USD lookup drops the affected block but not the tick.
#[tokio::test]
async fn lookup_failure_skips_block_only() {
    let usd_pair = Pair::new(asset("BTC"), Asset::fiat_usd());
    let usdt_pair = Pair::new(asset("BTC"), asset("USDT"));
    let (id1, tb1) = block(&usd_pair, "CoinBase", &[(50000.0, 5)]);
    let (id2, tb2) = block(&usdt_pair, "Binance", &[(50100.0, 5)]);
    let blocks: HashMap<_, _> = [(id1, tb1), (id2, tb2)].into();

    // Lookups fail: only the fiat-USD-denominated block survives.
    let points = process_tick(blocks, &FailingQuoter, &ProcessorConfig::default()).await;
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value, 50000.0);
}

/// Blocks whose assets were never resolved are rejected.
#[tokio::test]
async fn unresolved_assets_rejected() {
    let pair = Pair::new(Asset::default(), Asset::default());
    let (id, tb) = block(&pair, "Binance", &[(1.0, 5)]);
    let blocks: HashMap<_, _> = [(id, tb)].into();

    let points = process_tick(blocks, &FixedQuoter(1.0), &ProcessorConfig::default()).await;
    assert!(points.is_empty());
}

/// Empty blocks are skipped without aborting the tick.
#[tokio::test]
async fn empty_block_skipped() {
    let pair = Pair::new(asset("BTC"), asset("USDT"));
    let (good_id, good_tb) = block(&pair, "Binance", &[(50000.0, 5)]);
    let (empty_id, empty_tb) = block(&pair, "Kraken", &[]);
    let blocks: HashMap<_, _> = [(good_id, good_tb), (empty_id, empty_tb)].into();

    let points = process_tick(blocks, &FixedQuoter(1.0), &ProcessorConfig::default()).await;
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value, 50000.0);
}
