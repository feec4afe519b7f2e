//! Oracle contract binding and providers.

use crate::error::{OnchainError, OnchainResult};
use crate::gas;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::info;

sol! {
    #[sol(rpc)]
    contract OracleMultiUpdate {
        function setMultipleValues(string[] calldata keys, uint256[] calldata compressedValues) external;
    }
}

/// Build a wallet-backed HTTP provider for @node_url.
pub fn make_provider(node_url: &str, signer: PrivateKeySigner) -> OnchainResult<DynProvider> {
    let url = node_url
        .parse::<reqwest::Url>()
        .map_err(|_| OnchainError::InvalidUrl(node_url.to_string()))?;
    let wallet = EthereumWallet::from(signer);
    let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);
    Ok(provider.erased())
}

/// Sink for one tick's key/value batch.
#[async_trait]
pub trait OracleWriter: Send + Sync {
    /// Submit the batch; returns the transaction hash.
    async fn set_multiple_values(
        &self,
        keys: Vec<String>,
        values: Vec<U256>,
    ) -> OnchainResult<String>;
}

/// Writer bound to a deployed multi-update oracle contract.
pub struct ContractWriter {
    provider: DynProvider,
    contract: Address,
    chain_id: i64,
    http: reqwest::Client,
    /// Label for logs, i.e. "primary" or "backup".
    label: &'static str,
}

impl ContractWriter {
    pub fn new(
        provider: DynProvider,
        contract: Address,
        chain_id: i64,
        label: &'static str,
    ) -> Self {
        Self {
            provider,
            contract,
            chain_id,
            http: reqwest::Client::new(),
            label,
        }
    }

    /// Native-token balance of @address, in whole units.
    pub async fn native_balance(&self, address: Address) -> OnchainResult<f64> {
        let wei = self.provider.get_balance(address).await?;
        Ok(wei_to_units(wei))
    }
}

fn wei_to_units(wei: U256) -> f64 {
    // Good enough for a monitoring gauge.
    let (quot, rem) = wei.div_rem(U256::from(1_000_000_000_000_000_000u128));
    quot.to::<u128>() as f64 + rem.to::<u128>() as f64 / 1e18
}

#[async_trait]
impl OracleWriter for ContractWriter {
    async fn set_multiple_values(
        &self,
        keys: Vec<String>,
        values: Vec<U256>,
    ) -> OnchainResult<String> {
        let gas_price = gas::gas_price(&self.provider, self.chain_id, &self.http).await?;
        let oracle = OracleMultiUpdate::new(self.contract, self.provider.clone());

        let pending = oracle
            .setMultipleValues(keys, values)
            .gas_price(gas_price)
            .send()
            .await?;
        let tx_hash = *pending.tx_hash();
        info!(
            endpoint = self.label,
            gas_price,
            tx_hash = %tx_hash,
            "Oracle update submitted"
        );
        Ok(format!("{tx_hash:#x}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wei_to_units() {
        assert_eq!(wei_to_units(U256::from(1_000_000_000_000_000_000u128)), 1.0);
        assert_eq!(wei_to_units(U256::from(500_000_000_000_000_000u128)), 0.5);
        assert_eq!(wei_to_units(U256::ZERO), 0.0);
    }
}
