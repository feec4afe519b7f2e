//! Asset type covering everything from fiat to on-chain tokens.

use serde::{Deserialize, Serialize};

/// Blockchain name used for fiat currencies.
pub const FIAT_BLOCKCHAIN: &str = "Fiat";
/// ISO 4217 numeric code for the US dollar, used as its address.
pub const FIAT_USD_ADDRESS: &str = "840";

/// An asset traded on some venue. Identity is `(blockchain, address)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Decimals", default)]
    pub decimals: u8,
    #[serde(rename = "Blockchain")]
    pub blockchain: String,
}

impl Asset {
    /// Globally unique identifier of the asset.
    pub fn identifier(&self) -> String {
        format!("{}-{}", self.blockchain, self.address)
    }

    /// Fiat US dollar.
    pub fn fiat_usd() -> Self {
        Self {
            symbol: "USD".to_string(),
            name: "US Dollar".to_string(),
            address: FIAT_USD_ADDRESS.to_string(),
            decimals: 2,
            blockchain: FIAT_BLOCKCHAIN.to_string(),
        }
    }

    /// Whether this asset is fiat USD, in which case USD quotation lookups are skipped.
    pub fn is_fiat_usd(&self) -> bool {
        self.blockchain == FIAT_BLOCKCHAIN && self.address == FIAT_USD_ADDRESS
    }

    /// Whether the asset carries a resolved identity.
    ///
    /// Scrapers emit zero-valued assets when a venue ticker is not in the
    /// subscribed set; the processor rejects those blocks.
    pub fn is_resolved(&self) -> bool {
        !self.symbol.is_empty()
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.symbol, self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        let asset = Asset {
            symbol: "WETH".to_string(),
            address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
            blockchain: "Ethereum".to_string(),
            ..Default::default()
        };
        assert_eq!(
            asset.identifier(),
            "Ethereum-0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
        );
    }

    #[test]
    fn test_fiat_usd() {
        let usd = Asset::fiat_usd();
        assert!(usd.is_fiat_usd());
        assert_eq!(usd.identifier(), "Fiat-840");

        let usdt = Asset {
            symbol: "USDT".to_string(),
            address: "0xdac17f958d2ee523a2206206994597c13d831ec7".to_string(),
            blockchain: "Ethereum".to_string(),
            ..Default::default()
        };
        assert!(!usdt.is_fiat_usd());
    }

    #[test]
    fn test_unresolved_asset() {
        assert!(!Asset::default().is_resolved());
        assert!(Asset::fiat_usd().is_resolved());
    }
}
