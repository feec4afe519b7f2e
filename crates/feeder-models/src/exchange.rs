//! Exchange and pool types plus the registry of supported venues.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};

pub const BINANCE_EXCHANGE: &str = "Binance";
pub const COINBASE_EXCHANGE: &str = "CoinBase";
pub const CRYPTODOTCOM_EXCHANGE: &str = "Crypto.com";
pub const GATEIO_EXCHANGE: &str = "GateIO";
pub const KRAKEN_EXCHANGE: &str = "Kraken";
pub const KUCOIN_EXCHANGE: &str = "KuCoin";

pub const UNISWAPV2_EXCHANGE: &str = "UniswapV2";
pub const SIMULATION_EXCHANGE: &str = "Simulation";

pub const ETHEREUM: &str = "Ethereum";

/// A marketplace, centralized or decentralized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Centralized")]
    pub centralized: bool,
    #[serde(rename = "Blockchain", default)]
    pub blockchain: String,
}

impl Exchange {
    pub fn centralized(name: &str) -> Self {
        Self {
            name: name.to_string(),
            centralized: true,
            blockchain: String::new(),
        }
    }

    pub fn decentralized(name: &str, blockchain: &str) -> Self {
        Self {
            name: name.to_string(),
            centralized: false,
            blockchain: blockchain.to_string(),
        }
    }
}

/// Look up a supported venue by name.
pub fn exchange_by_name(name: &str) -> Result<Exchange> {
    match name {
        BINANCE_EXCHANGE | COINBASE_EXCHANGE | CRYPTODOTCOM_EXCHANGE | GATEIO_EXCHANGE
        | KRAKEN_EXCHANGE | KUCOIN_EXCHANGE => Ok(Exchange::centralized(name)),
        UNISWAPV2_EXCHANGE | SIMULATION_EXCHANGE => Ok(Exchange::decentralized(name, ETHEREUM)),
        _ => Err(ModelError::UnknownExchange(name.to_string())),
    }
}

/// All supported venue names.
pub fn supported_exchanges() -> &'static [&'static str] {
    &[
        BINANCE_EXCHANGE,
        COINBASE_EXCHANGE,
        CRYPTODOTCOM_EXCHANGE,
        GATEIO_EXCHANGE,
        KRAKEN_EXCHANGE,
        KUCOIN_EXCHANGE,
        UNISWAPV2_EXCHANGE,
        SIMULATION_EXCHANGE,
    ]
}

/// A liquidity pool on a decentralized venue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(rename = "Exchange")]
    pub exchange: Exchange,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Blockchain")]
    pub blockchain: String,
    /// Swap direction handling: 0 = pool order, 1 = reversed, 2 = both.
    #[serde(rename = "Order", default)]
    pub order: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_by_name() {
        let binance = exchange_by_name(BINANCE_EXCHANGE).unwrap();
        assert!(binance.centralized);

        let uniswap = exchange_by_name(UNISWAPV2_EXCHANGE).unwrap();
        assert!(!uniswap.centralized);
        assert_eq!(uniswap.blockchain, ETHEREUM);

        assert!(matches!(
            exchange_by_name("Hotbit"),
            Err(ModelError::UnknownExchange(_))
        ));
    }
}
