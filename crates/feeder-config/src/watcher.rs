//! Hot-reload watcher for the combined pairs file.
//!
//! The watcher re-reads the file on a fixed interval and computes an
//! order-independent digest over the flattened `(exchange, pair, watchdog)`
//! list. A changed digest means the effective pair set changed and the
//! scraper/processor stack must be restarted.

use crate::files::CombinedPairsFile;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One flattened config entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlatEntry {
    pub exchange: String,
    pub pair: String,
    pub watchdog: i64,
}

/// Flatten the combined config into a sorted entry list.
pub fn flatten_combined(config: &CombinedPairsFile) -> Vec<FlatEntry> {
    let mut entries = Vec::new();
    for venue_map in &config.exchange_pairs {
        for (exchange, pairs) in venue_map {
            for entry in pairs {
                entries.push(FlatEntry {
                    exchange: exchange.trim().to_string(),
                    pair: entry.pair.trim().to_string(),
                    watchdog: entry.watch_dog_delay,
                });
            }
        }
    }
    entries.sort();
    entries
}

/// Order-independent digest of the combined config.
pub fn config_hash(config: &CombinedPairsFile) -> String {
    let mut hasher = Sha1::new();
    for entry in flatten_combined(config) {
        hasher.update(entry.exchange.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(entry.pair.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(entry.watchdog.to_le_bytes());
        hasher.update(b"\x1e");
    }
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Watch the pairs file, sending the parsed config whenever its hash changes.
///
/// Read or parse failures leave the previous config in effect and are
/// retried on the next interval.
pub async fn watch_pairs_file(
    path: PathBuf,
    interval: Duration,
    seed_hash: String,
    changes_tx: mpsc::Sender<CombinedPairsFile>,
    shutdown: CancellationToken,
) {
    let mut last_hash = seed_hash;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }

        let config = match read_pairs_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Watcher: failed to load config");
                continue;
            }
        };

        let hash = config_hash(&config);
        if hash != last_hash {
            info!(path = %path.display(), "Config change detected");
            last_hash = hash;
            if changes_tx.send(config).await.is_err() {
                return;
            }
        }
    }
}

/// Read and parse the combined pairs file.
pub fn read_pairs_file(path: &Path) -> crate::error::Result<CombinedPairsFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::PairEntry;
    use std::collections::HashMap;

    fn config(entries: &[(&str, &str, i64)]) -> CombinedPairsFile {
        let mut maps: Vec<HashMap<String, Vec<PairEntry>>> = Vec::new();
        for (exchange, pair, watchdog) in entries {
            let mut map = HashMap::new();
            map.insert(
                exchange.to_string(),
                vec![PairEntry {
                    pair: pair.to_string(),
                    watch_dog_delay: *watchdog,
                }],
            );
            maps.push(map);
        }
        CombinedPairsFile {
            exchange_pairs: maps,
        }
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = config(&[("Binance", "BTC-USDT", 300), ("Kraken", "BTC-USD", 60)]);
        let b = config(&[("Kraken", "BTC-USD", 60), ("Binance", "BTC-USDT", 300)]);
        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn test_hash_changes_on_pair_change() {
        let a = config(&[("Binance", "BTC-USDT", 300)]);
        let b = config(&[("Binance", "ETH-USDT", 300)]);
        assert_ne!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn test_hash_changes_on_watchdog_change() {
        let a = config(&[("Binance", "BTC-USDT", 300)]);
        let b = config(&[("Binance", "BTC-USDT", 600)]);
        assert_ne!(config_hash(&a), config_hash(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_signals_on_change() {
        let dir = std::env::temp_dir().join(format!("feeder-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pairs.json");

        let initial = r#"{"ExchangePairs": [{"Binance": [{"Pair": "BTC-USDT", "WatchDogDelay": 300}]}]}"#;
        std::fs::write(&path, initial).unwrap();
        let seed = config_hash(&read_pairs_file(&path).unwrap());

        let (tx, mut rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(watch_pairs_file(
            path.clone(),
            Duration::from_secs(30),
            seed,
            tx,
            shutdown.clone(),
        ));

        // Unchanged file: no signal after one interval.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(rx.try_recv().is_err());

        // Changed file: signal within the next interval.
        let updated = r#"{"ExchangePairs": [{"Binance": [{"Pair": "ETH-USDT", "WatchDogDelay": 300}]}]}"#;
        std::fs::write(&path, updated).unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        let config = rx.recv().await.unwrap();
        assert_eq!(config.exchange_pairs.len(), 1);

        shutdown.cancel();
        let _ = handle.await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
