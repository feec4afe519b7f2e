//! Gas price policy.
//!
//! Astar (chain 592) publishes a gasnow-style endpoint; everywhere else the
//! node's suggestion is bumped by 10% and rounded up.

use crate::error::{OnchainError, OnchainResult};
use alloy::providers::{DynProvider, Provider};
use serde::Deserialize;
use tracing::debug;

pub const ASTAR_CHAIN_ID: i64 = 592;
const ASTAR_GAS_URL: &str = "https://gas.astar.network/api/gasnow?network=astar";

#[derive(Debug, Deserialize)]
struct GasNowResponse {
    data: GasNowData,
}

#[derive(Debug, Deserialize)]
struct GasNowData {
    #[serde(default)]
    fast: f64,
}

/// Gas price in wei for the given chain.
pub async fn gas_price(
    provider: &DynProvider,
    chain_id: i64,
    http: &reqwest::Client,
) -> OnchainResult<u128> {
    match chain_id {
        ASTAR_CHAIN_ID => astar_fast(http, ASTAR_GAS_URL).await,
        _ => {
            let suggested = provider.get_gas_price().await?;
            let bumped = bump_gas_price(suggested);
            debug!(suggested, bumped, "Gas price suggestion");
            Ok(bumped)
        }
    }
}

/// 110% of the suggestion, rounded up.
pub fn bump_gas_price(suggested: u128) -> u128 {
    suggested.saturating_add(suggested.div_ceil(10))
}

async fn astar_fast(http: &reqwest::Client, url: &str) -> OnchainResult<u128> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(OnchainError::GasEndpoint);
    }
    let gasnow: GasNowResponse = response.json().await?;
    if gasnow.data.fast <= 0.0 {
        return Err(OnchainError::GasEndpoint);
    }
    Ok(gasnow.data.fast as u128)
}
