//! Environment variable ingest.

use crate::error::{ConfigError, Result};
use feeder_models::{
    exchange_by_name, Asset, ExchangePair, Pair, Pool, ENV_SEPARATOR, EXCHANGE_PAIR_SEPARATOR,
};
use std::collections::HashMap;
use tracing::warn;

/// Read an environment variable, falling back to @default when unset or empty.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Environment key fragment for a venue name, i.e. `Crypto.com` -> `CRYPTODOTCOM`.
pub fn watchdog_env_key(exchange: &str) -> String {
    exchange
        .to_uppercase()
        .replace(".COM", "DOTCOM")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Scraper-level liveness threshold in seconds, from `<VENUE>_WATCHDOG_DELAY`.
pub fn global_watchdog_delay(exchange: &str) -> i64 {
    let key = format!("{}_WATCHDOG_DELAY", watchdog_env_key(exchange));
    parse_delay(&key, 300)
}

/// Pair-level liveness threshold in seconds, from `<VENUE>_WATCHDOG_<QUOTE>_<BASE>`.
///
/// The exchange pair's configured delay takes precedence when set.
pub fn pair_watchdog_delay(pair: &ExchangePair) -> i64 {
    if pair.watchdog_delay > 0 {
        return pair.watchdog_delay;
    }
    let (quote, base) = match ExchangePair::split_foreign_name(&pair.foreign_name) {
        Ok(parts) => parts,
        Err(_) => return 60,
    };
    let key = format!(
        "{}_WATCHDOG_{}_{}",
        watchdog_env_key(&pair.exchange),
        quote.to_uppercase(),
        base.to_uppercase()
    );
    parse_delay(&key, 60)
}

fn parse_delay(key: &str, default: i64) -> i64 {
    let raw = env_or(key, &default.to_string());
    raw.parse().unwrap_or_else(|e| {
        warn!(key, raw = %raw, error = %e, "Failed to parse watchdog delay, using default");
        default
    })
}

/// Parse the `EXCHANGEPAIRS` environment value, i.e.
/// `Binance:BTC-USDT,KuCoin:ETH-USDT`.
///
/// Underlying assets are resolved through the per-venue symbol maps when
/// available; unresolved symbols keep a bare, symbol-only asset.
pub fn exchange_pairs_from_env(
    raw: &str,
    symbol_maps: &HashMap<String, HashMap<String, Asset>>,
) -> Result<Vec<ExchangePair>> {
    let mut pairs = Vec::new();
    for entry in raw.split(ENV_SEPARATOR) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (exchange, foreign_name) = entry
            .split_once(EXCHANGE_PAIR_SEPARATOR)
            .ok_or_else(|| ConfigError::InvalidEnvEntry(entry.to_string()))?;
        exchange_by_name(exchange)?;
        let (quote, base) = ExchangePair::split_foreign_name(foreign_name)?;

        let symbols = symbol_maps.get(exchange);
        pairs.push(ExchangePair {
            exchange: exchange.to_string(),
            foreign_name: foreign_name.to_string(),
            underlying_pair: Pair::new(
                resolve_asset(&quote, symbols),
                resolve_asset(&base, symbols),
            ),
            watchdog_delay: 0,
        });
    }
    Ok(pairs)
}

/// Parse the `POOLS` environment value, i.e.
/// `UniswapV2:0x0d4a...1852:0`.
pub fn pools_from_env(raw: &str) -> Result<Vec<Pool>> {
    let mut pools = Vec::new();
    for entry in raw.split(ENV_SEPARATOR) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.split(EXCHANGE_PAIR_SEPARATOR);
        let exchange_name = parts
            .next()
            .ok_or_else(|| ConfigError::InvalidEnvEntry(entry.to_string()))?;
        let address = parts
            .next()
            .ok_or_else(|| ConfigError::InvalidEnvEntry(entry.to_string()))?;
        let order = parts.next().unwrap_or("0").parse::<u8>().map_err(|_| {
            ConfigError::InvalidValue {
                key: "POOLS".to_string(),
                value: entry.to_string(),
            }
        })?;
        if order > 2 {
            return Err(ConfigError::InvalidValue {
                key: "POOLS".to_string(),
                value: entry.to_string(),
            });
        }

        let exchange = exchange_by_name(exchange_name)?;
        let blockchain = exchange.blockchain.clone();
        pools.push(Pool {
            exchange,
            address: address.to_string(),
            blockchain,
            order,
        });
    }
    Ok(pools)
}

/// Resolve a ticker symbol to its full asset, or keep a symbol-only asset.
pub(crate) fn resolve_asset(symbol: &str, symbols: Option<&HashMap<String, Asset>>) -> Asset {
    if let Some(asset) = symbols.and_then(|m| m.get(symbol)) {
        return asset.clone();
    }
    if symbol == "USD" {
        return Asset::fiat_usd();
    }
    Asset {
        symbol: symbol.to_string(),
        ..Default::default()
    }
}
