use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };

use crate::enums::Chain;
use crate::error::{ AppError, Result };

pub mod jupiter;
pub mod uniswap;

pub use jupiter::JupiterSwapExecutor;
pub use uniswap::UniswapV2SwapExecutor;

const BPS_DENOMINATOR: u128 = 10_000;

/// Submitted swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub tx_hash: String,
    /// Amount spent, in the input asset's smallest unit.
    pub amount_in: String,
}

/// Executes trades with an already-resolved secret key.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    /// Spend a fixed amount of the chain's native currency on `token_address`.
    async fn buy(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        native_amount: f64,
        slippage_bps: u32
    ) -> Result<SwapResult>;

    /// Sell `percent` of the wallet's current holdings of `token_address`.
    async fn sell_percentage(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        percent: f64,
        slippage_bps: u32
    ) -> Result<SwapResult>;
}

/// Dispatches each call to the executor registered for its chain.
#[derive(Default)]
pub struct SwapRouter {
    executors: HashMap<Chain, Arc<dyn SwapExecutor>>,
}

impl SwapRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, chain: Chain, executor: Arc<dyn SwapExecutor>) {
        self.executors.insert(chain, executor);
    }

    pub fn supported_chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.executors.keys().copied().collect();
        chains.sort_by_key(|c| c.as_str());
        chains
    }

    fn executor(&self, chain: Chain) -> Result<&Arc<dyn SwapExecutor>> {
        self.executors
            .get(&chain)
            .ok_or_else(|| AppError::External(format!("Trading is not available on {}", chain.display_name())))
    }
}

#[async_trait]
impl SwapExecutor for SwapRouter {
    async fn buy(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        native_amount: f64,
        slippage_bps: u32
    ) -> Result<SwapResult> {
        self.executor(chain)?.buy(secret, chain, token_address, native_amount, slippage_bps).await
    }

    async fn sell_percentage(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        percent: f64,
        slippage_bps: u32
    ) -> Result<SwapResult> {
        self.executor(chain)?.sell_percentage(secret, chain, token_address, percent, slippage_bps).await
    }
}

/// Convert a decimal amount to base units, rejecting anything that rounds to zero.
pub(crate) fn to_base_units(amount: f64, decimals: u32) -> Result<u128> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::InvalidInput(format!("Invalid amount: {}", amount)));
    }

    let units = (amount * 10f64.powi(decimals as i32)).floor();
    if units < 1.0 {
        return Err(AppError::External("Amount too small".to_string()));
    }
    Ok(units as u128)
}

/// `balance * percent / 100`, computed in hundredths of a percent.
pub(crate) fn percentage_of(balance: u128, percent: f64) -> Result<u128> {
    if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
        return Err(AppError::InvalidInput(format!("Invalid sell percentage: {}", percent)));
    }

    let share_bps = (percent * 100.0).round() as u128;
    let amount = balance.saturating_mul(share_bps) / BPS_DENOMINATOR;
    if amount == 0 {
        return Err(AppError::External("Amount too small".to_string()));
    }
    Ok(amount)
}

/// Lowest acceptable output for a quote under the given slippage.
pub(crate) fn minimum_output(expected: u128, slippage_bps: u32) -> u128 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps as u128);
    expected.saturating_mul(keep) / BPS_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units(1.5, 9).unwrap(), 1_500_000_000);
        assert_eq!(to_base_units(0.000000001, 9).unwrap(), 1);
        assert!(matches!(to_base_units(0.0000000001, 9), Err(AppError::External(_))));
        assert!(matches!(to_base_units(-1.0, 9), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_percentage_of_holdings() {
        assert_eq!(percentage_of(1_000, 50.0).unwrap(), 500);
        assert_eq!(percentage_of(1_000, 100.0).unwrap(), 1_000);
        assert_eq!(percentage_of(3_000, 33.33).unwrap(), 999);
    }

    #[test]
    fn test_percentage_rounding_to_zero_is_too_small() {
        match percentage_of(1, 50.0) {
            Err(AppError::External(msg)) => assert_eq!(msg, "Amount too small"),
            other => panic!("unexpected: {:?}", other.map(|v| v.to_string())),
        }
        assert!(matches!(percentage_of(0, 100.0), Err(AppError::External(_))));
    }

    #[test]
    fn test_minimum_output() {
        assert_eq!(minimum_output(10_000, 100), 9_900);
        assert_eq!(minimum_output(10_000, 0), 10_000);
        assert_eq!(minimum_output(10_000, 20_000), 0);
    }

    #[tokio::test]
    async fn test_router_rejects_unregistered_chain() {
        let router = SwapRouter::new();
        let result = router.buy("secret", Chain::Base, "0xtoken", 1.0, 100).await;
        assert!(matches!(result, Err(AppError::External(_))));
        assert!(router.supported_chains().is_empty());
    }
}
