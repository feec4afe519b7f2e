//! Pairs and exchange pairs.

use crate::asset::Asset;
use crate::error::{ModelError, Result};
use crate::exchange::Pool;
use crate::PAIR_TICKER_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A market pair. The price of a pair is denominated in base per quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    #[serde(rename = "QuoteToken")]
    pub quote_token: Asset,
    #[serde(rename = "BaseToken")]
    pub base_token: Asset,
}

impl Pair {
    pub fn new(quote_token: Asset, base_token: Asset) -> Self {
        Self {
            quote_token,
            base_token,
        }
    }

    /// Identifier of this pair on @exchange, i.e. `Binance:BTC-USDT`.
    pub fn exchange_pair_identifier(&self, exchange: &str) -> String {
        format!(
            "{}:{}-{}",
            exchange, self.quote_token.symbol, self.base_token.symbol
        )
    }

    /// Ticker of the pair, i.e. `BTC-USDT`.
    pub fn ticker(&self) -> String {
        format!(
            "{}{}{}",
            self.quote_token.symbol, PAIR_TICKER_SEPARATOR, self.base_token.symbol
        )
    }
}

/// A pair as traded on a specific venue.
///
/// `foreign_name` is the venue's own ticker notation such as `BTC-USDT`;
/// each scraper is responsible for translating it into the format its API
/// expects. `underlying_pair` carries the resolved assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangePair {
    #[serde(rename = "Exchange")]
    pub exchange: String,
    #[serde(rename = "ForeignName")]
    pub foreign_name: String,
    #[serde(rename = "UnderlyingPair")]
    pub underlying_pair: Pair,
    /// Per-pair liveness threshold in seconds; 0 means use the env/default.
    #[serde(rename = "WatchDogDelay", default)]
    pub watchdog_delay: i64,
}

impl ExchangePair {
    pub fn identifier(&self) -> String {
        self.underlying_pair.exchange_pair_identifier(&self.exchange)
    }

    /// Split a foreign name such as `BTC-USDT` into quote and base tickers.
    pub fn split_foreign_name(foreign_name: &str) -> Result<(String, String)> {
        match foreign_name.split_once(PAIR_TICKER_SEPARATOR) {
            Some((quote, base)) if !quote.is_empty() && !base.is_empty() => {
                Ok((quote.to_string(), base.to_string()))
            }
            _ => Err(ModelError::InvalidPairTicker(foreign_name.to_string())),
        }
    }
}

/// Map a venue's symbol notation back onto the subscribed pairs.
///
/// Keyed by the concatenated tickers (`BTCUSDT`) so scrapers can resolve a
/// wire symbol without string parsing on the hot path.
pub fn ticker_pair_map(pairs: &[ExchangePair]) -> HashMap<String, Pair> {
    let mut map = HashMap::with_capacity(pairs.len());
    for ep in pairs {
        if let Ok((quote, base)) = ExchangePair::split_foreign_name(&ep.foreign_name) {
            map.insert(format!("{quote}{base}"), ep.underlying_pair.clone());
        }
    }
    map
}

/// Group exchange pairs by their venue name.
pub fn exchangepair_map(pairs: &[ExchangePair]) -> HashMap<String, Vec<ExchangePair>> {
    let mut map: HashMap<String, Vec<ExchangePair>> = HashMap::new();
    for ep in pairs {
        map.entry(ep.exchange.clone()).or_default().push(ep.clone());
    }
    map
}

/// Group pools by their venue name.
pub fn pool_map(pools: &[Pool]) -> HashMap<String, Vec<Pool>> {
    let mut map: HashMap<String, Vec<Pool>> = HashMap::new();
    for pool in pools {
        map.entry(pool.exchange.name.clone())
            .or_default()
            .push(pool.clone());
    }
    map
}
