//! JSON config file loading.
//!
//! Three file families live under the config directory:
//! - `exchangePairs/<venue>.json`: pairs plus per-pair watchdog delays
//! - `symbolIdentification/<venue>.json`: ticker -> (blockchain, address, decimals)
//! - `pools/<chain>.json`: pool addresses per chain
//!
//! plus the combined `pairs.json` used by the hot-reload watcher.

use crate::env::resolve_asset;
use crate::error::Result;
use feeder_models::{exchange_by_name, Asset, ExchangePair, Pair, Pool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// One pair entry of an exchangePairs file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEntry {
    #[serde(rename = "Pair")]
    pub pair: String,
    #[serde(rename = "WatchDogDelay", default)]
    pub watch_dog_delay: i64,
}

/// Per-venue pairs file: `{"ExchangePairs": [{"Pair": "BTC-USDT", "WatchDogDelay": 600}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsFile {
    #[serde(rename = "ExchangePairs")]
    pub exchange_pairs: Vec<PairEntry>,
}

/// One token of a symbolIdentification file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAsset {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Blockchain")]
    pub blockchain: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Decimals", default)]
    pub decimals: u8,
}

/// Per-venue symbol identification file: `{"Tokens": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolIdentification {
    #[serde(rename = "Tokens")]
    pub tokens: Vec<SymbolAsset>,
}

/// One pool entry of a pools file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Blockchain")]
    pub blockchain: String,
    #[serde(rename = "Order", default)]
    pub order: u8,
    #[serde(rename = "WatchDogDelay", default)]
    pub watch_dog_delay: i64,
}

/// Per-chain pools file: `{"Pools": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolsFile {
    #[serde(rename = "Pools")]
    pub pools: Vec<PoolEntry>,
}

/// Combined pairs file used for hot reload:
/// `{"ExchangePairs": [{"Binance": [{"Pair": "AAVE-USDT", "WatchDogDelay": 300}]}]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedPairsFile {
    #[serde(rename = "ExchangePairs")]
    pub exchange_pairs: Vec<HashMap<String, Vec<PairEntry>>>,
}

/// Ticker -> asset map for a venue from its symbolIdentification file.
///
/// A missing file yields an empty map; pairs then carry symbol-only assets.
pub fn symbol_map(config_dir: &Path, exchange: &str) -> HashMap<String, Asset> {
    let path = config_dir
        .join("symbolIdentification")
        .join(format!("{exchange}.json"));
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "No symbol identification file");
            return HashMap::new();
        }
    };
    let ident: SymbolIdentification = match serde_json::from_str(&content) {
        Ok(ident) => ident,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse symbol identification");
            return HashMap::new();
        }
    };
    ident
        .tokens
        .into_iter()
        .map(|t| {
            (
                t.symbol.clone(),
                Asset {
                    symbol: t.symbol.clone(),
                    name: t.symbol,
                    address: t.address,
                    decimals: t.decimals,
                    blockchain: t.blockchain,
                },
            )
        })
        .collect()
}

/// Load the exchange pairs of one venue from its config file.
pub fn pairs_from_config(config_dir: &Path, exchange: &str) -> Result<Vec<ExchangePair>> {
    let path = config_dir
        .join("exchangePairs")
        .join(format!("{exchange}.json"));
    let content = std::fs::read_to_string(&path)?;
    let file: PairsFile = serde_json::from_str(&content)?;
    let symbols = symbol_map(config_dir, exchange);
    Ok(build_pairs(exchange, &file.exchange_pairs, &symbols))
}

/// Load the pools of one decentralized venue from its config file.
pub fn pools_from_config(config_dir: &Path, exchange: &str) -> Result<Vec<Pool>> {
    let venue = exchange_by_name(exchange)?;
    let path = config_dir
        .join("pools")
        .join(format!("{}.json", venue.blockchain));
    let content = std::fs::read_to_string(&path)?;
    let file: PoolsFile = serde_json::from_str(&content)?;
    Ok(file
        .pools
        .into_iter()
        .map(|p| Pool {
            exchange: venue.clone(),
            address: p.address,
            blockchain: p.blockchain,
            order: p.order,
        })
        .collect())
}

/// Build exchange pairs from the combined pairs file.
pub fn pairs_from_combined(
    config: &CombinedPairsFile,
    config_dir: &Path,
) -> Vec<ExchangePair> {
    let mut pairs = Vec::new();
    for venue_map in &config.exchange_pairs {
        for (exchange, entries) in venue_map {
            if exchange_by_name(exchange).is_err() {
                warn!(exchange = %exchange, "Skipping unsupported venue in pairs config");
                continue;
            }
            let symbols = symbol_map(config_dir, exchange);
            pairs.extend(build_pairs(exchange, entries, &symbols));
        }
    }
    pairs
}

fn build_pairs(
    exchange: &str,
    entries: &[PairEntry],
    symbols: &HashMap<String, Asset>,
) -> Vec<ExchangePair> {
    let mut pairs = Vec::with_capacity(entries.len());
    for entry in entries {
        let foreign_name = entry.pair.trim();
        let (quote, base) = match ExchangePair::split_foreign_name(foreign_name) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(exchange, pair = foreign_name, error = %e, "Invalid pair in config");
                continue;
            }
        };
        pairs.push(ExchangePair {
            exchange: exchange.to_string(),
            foreign_name: foreign_name.to_string(),
            underlying_pair: Pair::new(
                resolve_asset(&quote, Some(symbols)),
                resolve_asset(&base, Some(symbols)),
            ),
            watchdog_delay: entry.watch_dog_delay,
        });
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_pairs_file_shape() {
        let raw = r#"{"ExchangePairs": [
            {"Binance": [{"Pair": "AAVE-USDT", "WatchDogDelay": 300}]},
            {"Kraken": [{"Pair": "BTC-USD", "WatchDogDelay": 60}, {"Pair": "bad"}]}
        ]}"#;
        let config: CombinedPairsFile = serde_json::from_str(raw).unwrap();
        let pairs = pairs_from_combined(&config, Path::new("/nonexistent"));
        // The malformed "bad" entry is dropped.
        assert_eq!(pairs.len(), 2);
        let kraken = pairs.iter().find(|p| p.exchange == "Kraken").unwrap();
        assert_eq!(kraken.watchdog_delay, 60);
        assert!(kraken.underlying_pair.base_token.is_fiat_usd());
    }

    #[test]
    fn test_pairs_file_shape() {
        let raw = r#"{"ExchangePairs": [{"Pair": "BTC-USDT", "WatchDogDelay": 600}]}"#;
        let file: PairsFile = serde_json::from_str(raw).unwrap();
        assert_eq!(file.exchange_pairs[0].watch_dog_delay, 600);
    }

    #[test]
    fn test_pools_file_shape() {
        let raw = r#"{"Pools": [{"Address": "0x0d4a", "Blockchain": "Ethereum", "Order": 1}]}"#;
        let file: PoolsFile = serde_json::from_str(raw).unwrap();
        assert_eq!(file.pools[0].order, 1);
    }
}
