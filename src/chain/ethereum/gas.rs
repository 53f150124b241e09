//! Gas estimation for operator payments

use super::{ChainProvider, GasPrice};
use crate::error::BridgeResult;

use ethers::types::U256;
use tracing::debug;

const COIN_TRANSFER_GAS: u64 = 21_000;
const TOKEN_TRANSFER_GAS: u64 = 65_000;

/// Gas limits and prices for Ethereum payouts
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
        }
    }

    /// Gas limit for a coin or ERC-20 transfer
    pub fn transfer_gas_limit(&self, token: bool) -> U256 {
        if !token {
            // plain value transfers cost exactly this much
            return U256::from(COIN_TRANSFER_GAS);
        }
        let base_gas = U256::from(TOKEN_TRANSFER_GAS);
        let buffer = base_gas * self.gas_limit_buffer_percent / 100;
        base_gas + buffer
    }

    /// Current gas price with the configured buffer applied
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> BridgeResult<GasPrice> {
        let gas_price = provider.get_gas_price().await?;
        let buffered = self.buffer(gas_price);
        debug!("Gas price for {}: {:?}", provider.platform(), buffered);
        Ok(buffered)
    }

    fn buffer(&self, gas_price: GasPrice) -> GasPrice {
        match gas_price {
            GasPrice::Legacy(price) => {
                let buffer = price * self.gas_price_buffer_percent / 100;
                GasPrice::Legacy(price + buffer)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let fee_buffer = max_fee_per_gas * self.gas_price_buffer_percent / 100;
                let priority_buffer =
                    max_priority_fee_per_gas * self.gas_price_buffer_percent / 100;
                GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee_per_gas + fee_buffer,
                    max_priority_fee_per_gas: max_priority_fee_per_gas + priority_buffer,
                }
            }
        }
    }

    /// Upper bound on the fee paid, in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> U256 {
        match gas_price {
            GasPrice::Legacy(price) => gas_limit * *price,
            GasPrice::Eip1559 { max_fee_per_gas, .. } => gas_limit * *max_fee_per_gas,
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_limits() {
        let gas = GasEstimator::new();
        assert_eq!(gas.transfer_gas_limit(false), U256::from(21_000u64));
        assert_eq!(gas.transfer_gas_limit(true), U256::from(78_000u64));
    }

    #[test]
    fn test_price_buffer() {
        let gas = GasEstimator::new();
        match gas.buffer(GasPrice::Legacy(U256::from(100u64))) {
            GasPrice::Legacy(p) => assert_eq!(p, U256::from(110u64)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            GasEstimator::calculate_cost(U256::from(21_000u64), &GasPrice::Legacy(U256::from(2u64))),
            U256::from(42_000u64)
        );
    }
}
