//! Data model for the feeder pipeline.
//!
//! Contains assets, pairs, exchanges, trades, tradesblocks and filter points,
//! along with the grouping and aggregation helpers shared by the collector,
//! the processor and the oracle updater.

pub mod asset;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod pair;
pub mod stats;
pub mod trade;

pub use asset::Asset;
pub use error::{ModelError, Result};
pub use exchange::{exchange_by_name, supported_exchanges, Exchange, Pool};
pub use filter::{
    group_by_quote_asset, latest_timestamp, remove_old_points, values, FilterPoint, SourceType,
};
pub use pair::{exchangepair_map, pool_map, ticker_pair_map, ExchangePair, Pair};
pub use stats::{average, median, minimum};
pub use trade::{last_trade, Trade, TradesBlock};

/// Separator for entries in environment variables, i.e. `Binance:BTC-USDT,KuCoin:BTC-USDT`.
pub const ENV_SEPARATOR: &str = ",";
/// Separator for a pair ticker's assets, i.e. `BTC-USDT`.
pub const PAIR_TICKER_SEPARATOR: &str = "-";
/// Separator for a pair on a given exchange, i.e. `Binance:BTC-USDT`.
pub const EXCHANGE_PAIR_SEPARATOR: &str = ":";
