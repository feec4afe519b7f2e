//! USD quotation lookup with a short TTL cache.
//!
//! The quoter is consulted once per non-fiat base token and tick; the cache
//! keeps the fan-out bounded when many markets share a base token.

use crate::error::{ProcessorError, ProcessorResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.diadata.org/v1/assetQuotation";
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Source of USD prices for base tokens.
#[async_trait]
pub trait UsdQuoter: Send + Sync {
    /// Current USD price of the asset at `blockchain/address`.
    async fn usd_price(&self, blockchain: &str, address: &str) -> ProcessorResult<f64>;
}

#[derive(Debug, Deserialize)]
struct AssetQuotation {
    #[serde(rename = "Price")]
    price: f64,
    #[serde(rename = "VolumeYesterdayUSD", default)]
    #[allow(dead_code)]
    volume_yesterday_usd: f64,
}

/// Quoter backed by the DIA asset-quotation API.
pub struct DiaApiQuoter {
    client: reqwest::Client,
    base_url: String,
    ttl: Duration,
    cache: Mutex<HashMap<(String, String), (f64, Instant)>>,
}

impl DiaApiQuoter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &(String, String)) -> Option<f64> {
        let cache = self.cache.lock();
        cache
            .get(key)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(price, _)| *price)
    }
}

impl Default for DiaApiQuoter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsdQuoter for DiaApiQuoter {
    async fn usd_price(&self, blockchain: &str, address: &str) -> ProcessorResult<f64> {
        let key = (blockchain.to_string(), address.to_string());
        if let Some(price) = self.cached(&key) {
            return Ok(price);
        }

        let url = format!("{}/{}/{}", self.base_url, blockchain, address);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProcessorError::QuoteLookup {
                blockchain: blockchain.to_string(),
                address: address.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        let quotation: AssetQuotation = response.json().await?;
        debug!(blockchain, address, price = quotation.price, "USD quotation fetched");

        self.cache
            .lock()
            .insert(key, (quotation.price, Instant::now()));
        Ok(quotation.price)
    }
}
