//! Stage 1 filters: one scalar price per tradesblock.

use crate::error::{ProcessorError, ProcessorResult};
use crate::quotation::UsdQuoter;
use chrono::{DateTime, Utc};
use feeder_models::{last_trade, Trade};

/// Per-market filter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    LastPrice,
}

impl FilterType {
    pub fn from_env() -> Self {
        let raw = feeder_config::env_or("FILTER_TYPE", "LastPrice");
        match raw.as_str() {
            "LastPrice" => Self::LastPrice,
            other => {
                tracing::warn!(filter = other, "Unknown filter type, using LastPrice");
                Self::LastPrice
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LastPrice => "lastprice",
        }
    }
}

/// Price of the most recent trade, optionally converted to USD by
/// multiplying with the base token's USD quotation. Fiat-USD bases skip
/// the lookup.
pub async fn last_price(
    trades: &[Trade],
    quoter: &dyn UsdQuoter,
    usd_price: bool,
) -> ProcessorResult<(f64, DateTime<Utc>)> {
    let last = last_trade(trades).ok_or(ProcessorError::EmptyBlock)?;
    if last.base_token.is_fiat_usd() {
        return Ok((last.price, last.time));
    }
    if !usd_price {
        return Ok((last.price, last.time));
    }
    let base_usd = quoter
        .usd_price(&last.base_token.blockchain, &last.base_token.address)
        .await?;
    Ok((base_usd * last.price, last.time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use feeder_models::{Asset, Exchange};

    struct FixedQuoter(f64);

    #[async_trait]
    impl UsdQuoter for FixedQuoter {
        async fn usd_price(&self, _blockchain: &str, _address: &str) -> ProcessorResult<f64> {
            Ok(self.0)
        }
    }

    struct FailingQuoter;

    #[async_trait]
    impl UsdQuoter for FailingQuoter {
        async fn usd_price(&self, blockchain: &str, address: &str) -> ProcessorResult<f64> {
            Err(ProcessorError::QuoteLookup {
                blockchain: blockchain.to_string(),
                address: address.to_string(),
                reason: "stub".to_string(),
            })
        }
    }

    fn trade(price: f64, secs: i64, base: Asset) -> Trade {
        Trade {
            quote_token: Asset {
                symbol: "BTC".to_string(),
                ..Default::default()
            },
            base_token: base,
            price,
            volume: 1.0,
            time: Utc.timestamp_opt(secs, 0).unwrap(),
            exchange: Exchange::centralized("Binance"),
            foreign_trade_id: String::new(),
            pool_address: String::new(),
        }
    }

    fn usdt() -> Asset {
        Asset {
            symbol: "USDT".to_string(),
            address: "0xdac1".to_string(),
            blockchain: "Ethereum".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_last_price_picks_latest_trade() {
        let trades = vec![
            trade(50000.0, 10, usdt()),
            trade(50100.0, 20, usdt()),
            trade(50050.0, 30, usdt()),
        ];
        let (price, time) = last_price(&trades, &FixedQuoter(1.0), true).await.unwrap();
        assert_eq!(price, 50050.0);
        assert_eq!(time.timestamp(), 30);
    }

    #[tokio::test]
    async fn test_last_price_multiplies_base_quotation() {
        let trades = vec![trade(50000.0, 10, usdt())];
        let (price, _) = last_price(&trades, &FixedQuoter(1.001), true).await.unwrap();
        assert!((price - 50050.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_fiat_usd_base_skips_lookup() {
        let trades = vec![trade(50000.0, 10, Asset::fiat_usd())];
        // The failing quoter would error if it were consulted.
        let (price, _) = last_price(&trades, &FailingQuoter, true).await.unwrap();
        assert_eq!(price, 50000.0);
    }

    #[tokio::test]
    async fn test_empty_block_fails() {
        let result = last_price(&[], &FixedQuoter(1.0), true).await;
        assert!(matches!(result, Err(ProcessorError::EmptyBlock)));
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let trades = vec![trade(50000.0, 10, usdt())];
        assert!(last_price(&trades, &FailingQuoter, true).await.is_err());
    }
}
