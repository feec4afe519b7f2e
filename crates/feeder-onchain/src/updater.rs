//! Oracle update executor.
//!
//! Consumes one Stage-2 batch per tick, packs the points into key/value
//! tuples and submits them in a single contract call. On failure the batch
//! is retried once against the backup endpoint; if that also fails the
//! tick is dropped, since the next tick supersedes it anyway.

use crate::contract::OracleWriter;
use crate::packing;
use alloy::primitives::U256;
use chrono::Utc;
use feeder_models::FilterPoint;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run the executor until the filters channel closes or shutdown fires.
pub async fn run_oracle_updater(
    mut filters_rx: mpsc::Receiver<Vec<FilterPoint>>,
    primary: Arc<dyn OracleWriter>,
    backup: Arc<dyn OracleWriter>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            maybe = filters_rx.recv() => {
                let Some(points) = maybe else { return };
                update_once(&points, primary.as_ref(), backup.as_ref()).await;
            }
        }
    }
}

/// Submit one tick's filter points.
pub async fn update_once(
    points: &[FilterPoint],
    primary: &dyn OracleWriter,
    backup: &dyn OracleWriter,
) {
    let timestamp = Utc::now().timestamp();
    let (keys, values) = encode_points(points, timestamp);
    if keys.is_empty() {
        return;
    }

    match primary.set_multiple_values(keys.clone(), values.clone()).await {
        Ok(tx_hash) => info!(keys = keys.len(), tx_hash = %tx_hash, "Oracle updated"),
        Err(e) => {
            warn!(error = %e, "Primary oracle update failed, trying backup");
            match backup.set_multiple_values(keys, values).await {
                Ok(tx_hash) => info!(tx_hash = %tx_hash, "Oracle updated via backup"),
                Err(e) => error!(error = %e, "Backup oracle update failed, dropping tick"),
            }
        }
    }
}

/// Encode filter points as aligned `(key, packed word)` vectors.
///
/// Keys are `<QUOTE>/USD`; Stage 2 already yields one point per asset, so
/// no key is duplicated within a call. Unpackable values are skipped.
pub fn encode_points(points: &[FilterPoint], timestamp: i64) -> (Vec<String>, Vec<U256>) {
    let mut keys = Vec::with_capacity(points.len());
    let mut values = Vec::with_capacity(points.len());
    for point in points {
        info!(
            source = %point.source_type,
            asset = %point.pair.quote_token.symbol,
            value = point.value,
            time = %point.time,
            "Filter point received"
        );
        match packing::pack(point.value, timestamp) {
            Ok(word) => {
                keys.push(format!("{}/USD", point.pair.quote_token.symbol));
                values.push(word);
            }
            Err(e) => warn!(
                asset = %point.pair.quote_token.symbol,
                error = %e,
                "Skipping unpackable filter point"
            ),
        }
    }
    (keys, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OnchainError, OnchainResult};
    use async_trait::async_trait;
    use chrono::Utc;
    use feeder_models::{Asset, Pair, SourceType};
    use parking_lot::Mutex;

    fn point(symbol: &str, value: f64) -> FilterPoint {
        FilterPoint {
            pair: Pair::new(
                Asset {
                    symbol: symbol.to_string(),
                    ..Default::default()
                },
                Asset::fiat_usd(),
            ),
            source_type: SourceType::Cex,
            source: String::new(),
            value,
            name: "median".to_string(),
            time: Utc::now(),
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        fail: bool,
        calls: Mutex<Vec<(Vec<String>, Vec<U256>)>>,
    }

    #[async_trait]
    impl OracleWriter for RecordingWriter {
        async fn set_multiple_values(
            &self,
            keys: Vec<String>,
            values: Vec<U256>,
        ) -> OnchainResult<String> {
            self.calls.lock().push((keys, values));
            if self.fail {
                Err(OnchainError::Submission("stub".to_string()))
            } else {
                Ok("0xabc".to_string())
            }
        }
    }

    #[test]
    fn test_encode_points_alignment() {
        let points = vec![point("BTC", 50050.0), point("ETH", 2005.0)];
        let (keys, values) = encode_points(&points, 1_700_000_000);
        assert_eq!(keys, vec!["BTC/USD", "ETH/USD"]);
        assert_eq!(values.len(), 2);
        let (v, ts) = packing::unpack(values[0]);
        assert_eq!(v, 50050.0);
        assert_eq!(ts, 1_700_000_000);
    }

    #[test]
    fn test_encode_skips_unpackable() {
        let points = vec![point("BTC", -1.0), point("ETH", 2005.0)];
        let (keys, values) = encode_points(&points, 1_700_000_000);
        assert_eq!(keys, vec!["ETH/USD"]);
        assert_eq!(values.len(), 1);
    }

    #[tokio::test]
    async fn test_primary_success_skips_backup() {
        let primary = RecordingWriter::default();
        let backup = RecordingWriter::default();
        update_once(&[point("BTC", 50050.0)], &primary, &backup).await;
        assert_eq!(primary.calls.lock().len(), 1);
        assert!(backup.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failover_to_backup() {
        let primary = RecordingWriter {
            fail: true,
            ..Default::default()
        };
        let backup = RecordingWriter::default();
        update_once(&[point("BTC", 50050.0)], &primary, &backup).await;
        assert_eq!(primary.calls.lock().len(), 1);
        let backup_calls = backup.calls.lock();
        assert_eq!(backup_calls.len(), 1);
        assert_eq!(backup_calls[0].0, vec!["BTC/USD"]);
    }

    #[tokio::test]
    async fn test_double_failure_drops_tick() {
        let primary = RecordingWriter {
            fail: true,
            ..Default::default()
        };
        let backup = RecordingWriter {
            fail: true,
            ..Default::default()
        };
        // Must not panic or retry endlessly.
        update_once(&[point("BTC", 50050.0)], &primary, &backup).await;
        assert_eq!(primary.calls.lock().len(), 1);
        assert_eq!(backup.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_not_submitted() {
        let primary = RecordingWriter::default();
        let backup = RecordingWriter::default();
        update_once(&[], &primary, &backup).await;
        assert!(primary.calls.lock().is_empty());
    }
}
