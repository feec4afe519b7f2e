//! On-chain swap quoter backing the simulation scraper.
//!
//! Token metadata comes from read-only ERC-20 calls against the pool's two
//! tokens; quotes go through the router's `getAmountsOut`.

use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use async_trait::async_trait;
use feeder_models::{Asset, Pool};
use feeder_scrapers::{ScraperError, ScraperResult, SwapQuoter};
use tracing::debug;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }

    #[sol(rpc)]
    contract IUniswapPair {
        function token0() external view returns (address);
        function token1() external view returns (address);
    }

    #[sol(rpc)]
    contract ISwapRouter {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
    }
}

/// Quoter over a Uniswap-style router.
pub struct RouterQuoter {
    provider: DynProvider,
    router: Address,
}

impl RouterQuoter {
    pub fn new(provider: DynProvider, router: Address) -> Self {
        Self { provider, router }
    }

    async fn token_asset(&self, address: Address, blockchain: &str) -> ScraperResult<Asset> {
        let erc20 = IERC20::new(address, self.provider.clone());
        let decimals = erc20.decimals().call().await.map_err(|e| quote_err(address, e))?;
        let symbol = erc20.symbol().call().await.map_err(|e| quote_err(address, e))?;
        Ok(Asset {
            symbol: symbol.clone(),
            name: symbol,
            address: format!("{address:#x}"),
            decimals,
            blockchain: blockchain.to_string(),
        })
    }
}

fn quote_err(address: Address, e: impl std::fmt::Display) -> ScraperError {
    ScraperError::PoolQuote {
        pool: format!("{address:#x}"),
        reason: e.to_string(),
    }
}

fn parse_token_address(asset: &Asset) -> ScraperResult<Address> {
    asset.address.parse().map_err(|_| ScraperError::PoolQuote {
        pool: asset.address.clone(),
        reason: "invalid token address".to_string(),
    })
}

#[async_trait]
impl SwapQuoter for RouterQuoter {
    async fn pool_assets(&self, pool: &Pool) -> ScraperResult<(Asset, Asset)> {
        let pool_address: Address =
            pool.address
                .parse()
                .map_err(|_| ScraperError::PoolQuote {
                    pool: pool.address.clone(),
                    reason: "invalid pool address".to_string(),
                })?;
        let pair = IUniswapPair::new(pool_address, self.provider.clone());
        let token0 = pair.token0().call().await.map_err(|e| quote_err(pool_address, e))?;
        let token1 = pair.token1().call().await.map_err(|e| quote_err(pool_address, e))?;

        let asset0 = self.token_asset(token0, &pool.blockchain).await?;
        let asset1 = self.token_asset(token1, &pool.blockchain).await?;
        // token0 is the base (stable) side in pool order; a reversed pool
        // flips the roles.
        let (base, quote) = if pool.order == 1 {
            (asset1, asset0)
        } else {
            (asset0, asset1)
        };
        debug!(pool = %pool.address, quote = %quote.symbol, base = %base.symbol, "Resolved pool assets");
        Ok((quote, base))
    }

    async fn amount_out(
        &self,
        pool: &Pool,
        base: &Asset,
        quote: &Asset,
        amount_in: f64,
    ) -> ScraperResult<f64> {
        let base_address = parse_token_address(base)?;
        let quote_address = parse_token_address(quote)?;
        let amount_in_wei = to_wei(amount_in, base.decimals).ok_or_else(|| {
            ScraperError::PoolQuote {
                pool: pool.address.clone(),
                reason: format!("amount in {amount_in} not representable"),
            }
        })?;

        let router = ISwapRouter::new(self.router, self.provider.clone());
        let amounts = router
            .getAmountsOut(amount_in_wei, vec![base_address, quote_address])
            .call()
            .await
            .map_err(|e| quote_err(self.router, e))?;
        let out = amounts.last().copied().unwrap_or(U256::ZERO);
        Ok(from_wei(out, quote.decimals))
    }
}

fn to_wei(amount: f64, decimals: u8) -> Option<U256> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let scaled = amount * 10f64.powi(decimals as i32);
    if scaled >= u128::MAX as f64 {
        return None;
    }
    Some(U256::from(scaled as u128))
}

fn from_wei(amount: U256, decimals: u8) -> f64 {
    let divisor = 10f64.powi(decimals as i32);
    // Saturate beyond u128; such quotes are rejected as implausible anyway.
    let capped = if amount > U256::from(u128::MAX) {
        u128::MAX
    } else {
        amount.to::<u128>()
    };
    capped as f64 / divisor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wei() {
        assert_eq!(to_wei(1000.0, 6), Some(U256::from(1_000_000_000u64)));
        assert_eq!(to_wei(0.5, 18), Some(U256::from(500_000_000_000_000_000u128)));
        assert!(to_wei(-1.0, 6).is_none());
        assert!(to_wei(f64::NAN, 6).is_none());
    }

    #[test]
    fn test_from_wei() {
        assert_eq!(from_wei(U256::from(1_000_000u64), 6), 1.0);
        assert_eq!(from_wei(U256::from(500_000_000_000_000_000u128), 18), 0.5);
    }

    #[test]
    fn test_wei_round_trip() {
        let wei = to_wei(1234.56, 6).unwrap();
        assert!((from_wei(wei, 6) - 1234.56).abs() < 1e-6);
    }
}
