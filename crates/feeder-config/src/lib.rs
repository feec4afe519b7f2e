//! Configuration ingest.
//!
//! Markets and pools enter the feeder either through environment variables
//! (`EXCHANGEPAIRS`, `POOLS`) or through JSON config files
//! (`config/exchangePairs/<venue>.json`, `config/symbolIdentification/<venue>.json`,
//! `config/pools/<chain>.json`, or the combined `pairs.json`). The watcher
//! re-reads the combined file periodically and signals on hash change.

pub mod env;
pub mod error;
pub mod files;
pub mod watcher;

pub use env::{
    env_or, exchange_pairs_from_env, global_watchdog_delay, pair_watchdog_delay, pools_from_env,
    watchdog_env_key,
};
pub use error::{ConfigError, Result};
pub use files::{
    pairs_from_combined, pairs_from_config, pools_from_config, symbol_map, CombinedPairsFile,
    PairEntry, PairsFile, PoolsFile, SymbolIdentification,
};
pub use watcher::{config_hash, flatten_combined, watch_pairs_file};

/// Default trigger cadence in seconds.
pub const DEFAULT_FREQUENCY_SECONDS: u64 = 20;
/// Default staleness tolerance in seconds.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 20;
/// Default interval between config reload checks in seconds.
pub const CONFIG_RELOAD_SECONDS: u64 = 30;
