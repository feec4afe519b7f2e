//! Trades and tradesblocks.

use crate::asset::Asset;
use crate::exchange::Exchange;
use crate::pair::Pair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized trade.
///
/// Volume sign convention: positive = buy, negative = sell; the exact
/// folding of the wire side flag is venue-specific and preserved as-is by
/// each scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub quote_token: Asset,
    pub base_token: Asset,
    pub price: f64,
    pub volume: f64,
    pub time: DateTime<Utc>,
    pub exchange: Exchange,
    pub foreign_trade_id: String,
    /// Set for trades originating from a pool.
    #[serde(default)]
    pub pool_address: String,
}

impl Trade {
    /// The pair this trade belongs to.
    pub fn pair(&self) -> Pair {
        Pair::new(self.quote_token.clone(), self.base_token.clone())
    }
}

/// Trades of a single (venue, pair) market bounded by two consecutive ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradesBlock {
    pub pair: Pair,
    pub trades: Vec<Trade>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TradesBlock {
    pub fn new(pair: Pair, start_time: DateTime<Utc>) -> Self {
        Self {
            pair,
            trades: Vec::new(),
            start_time,
            end_time: start_time,
        }
    }

    pub fn push(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

/// The most recent trade of the slice.
pub fn last_trade(trades: &[Trade]) -> Option<&Trade> {
    trades.iter().max_by_key(|t| t.time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trade_at(secs: i64, price: f64) -> Trade {
        Trade {
            quote_token: Asset::default(),
            base_token: Asset::default(),
            price,
            volume: 1.0,
            time: Utc.timestamp_opt(secs, 0).unwrap(),
            exchange: Exchange::default(),
            foreign_trade_id: String::new(),
            pool_address: String::new(),
        }
    }

    #[test]
    fn test_last_trade_picks_most_recent() {
        let trades = vec![trade_at(10, 1.0), trade_at(30, 3.0), trade_at(20, 2.0)];
        assert_eq!(last_trade(&trades).unwrap().price, 3.0);
    }

    #[test]
    fn test_last_trade_empty() {
        assert!(last_trade(&[]).is_none());
    }

    #[test]
    fn test_block_accumulates() {
        let mut block = TradesBlock::new(Pair::default(), Utc::now());
        assert!(block.is_empty());
        block.push(trade_at(1, 1.0));
        block.push(trade_at(2, 2.0));
        assert_eq!(block.len(), 2);
    }
}
