//! # Allocation Engine
//!
//! Splits a single deposit (denominated in the deposit asset) into the two values that should
//! end up in `asset0` and `asset1` so a range position over `[tick_lower, tick_upper]` can be
//! minted with as little leftover as possible.
//!
//! ## Algorithm
//!
//! 1. Edge cases: zero-width range splits in half, price below the range is all `asset0`,
//!    price at/above the range is all `asset1`.
//! 2. In range: interpolate the `asset0` share linearly by the current tick's position in the
//!    range, turn it into a native `asset0` amount with the oracle USD price and decimals.
//! 3. Refine: derive the exact `asset1` amount that pairs with that `asset0` amount for the
//!    same liquidity at the current sqrt price.
//! 4. Rescale both legs back to USD and then onto `total_value` so they sum exactly.
//!
//! Steps 2-3 run on a large reference notional so integer rounding cannot skew the ratio.

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{ZapError, ZapResult};
use crate::price_feeds::{UsdPriceResolver, WAD};
use crate::types::PoolState;
use crate::v3_math::{
    get_amount1_delta, get_liquidity_for_amount0, get_sqrt_ratio_at_tick, mul_div,
};

/// Reference notional for the in-range refinement: 1e12 USD, WAD-scaled.
const REFERENCE_NOTIONAL_WAD: U256 = U256([0x4674edea40000000, 0xc9f2c9cd0, 0, 0]); // 1e30

/// Deposit split, in deposit-asset units. `value0 + value1` always equals the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub value0: U256,
    pub value1: U256,
}

pub struct AllocationEngine {
    prices: Arc<UsdPriceResolver>,
}

impl AllocationEngine {
    pub fn new(prices: Arc<UsdPriceResolver>) -> Self {
        Self { prices }
    }

    pub fn prices(&self) -> &Arc<UsdPriceResolver> {
        &self.prices
    }

    pub async fn allocate(
        &self,
        total_value: U256,
        asset0: Address,
        asset1: Address,
        tick_lower: i32,
        tick_upper: i32,
        pool_state: PoolState,
    ) -> ZapResult<Allocation> {
        if let Some(split) = edge_case_split(total_value, tick_lower, tick_upper, pool_state.tick) {
            debug!(
                tick = pool_state.tick,
                tick_lower, tick_upper, "allocation resolved by edge case"
            );
            return Ok(split);
        }
        if total_value.is_zero() {
            return Ok(Allocation {
                value0: U256::zero(),
                value1: U256::zero(),
            });
        }

        // 2. interpolated asset0 share, WAD-scaled
        let share0 = U256::from((tick_upper as i64 - pool_state.tick as i64) as u64) * WAD
            / U256::from((tick_upper as i64 - tick_lower as i64) as u64);
        let usd0 = mul_div(REFERENCE_NOTIONAL_WAD, share0, WAD)?;

        let price0 = self.prices.usd_price(asset0).await?;
        let price1 = self.prices.usd_price(asset1).await?;
        let decimals0 = self.prices.decimals(asset0).await?;
        let decimals1 = self.prices.decimals(asset1).await?;

        let amount0 = mul_div(usd0, U256::exp10(decimals0 as usize), price0)?;

        // 3. asset1 needed for the same liquidity
        let sqrt_lower = get_sqrt_ratio_at_tick(tick_lower)?;
        let sqrt_upper = get_sqrt_ratio_at_tick(tick_upper)?;
        let sqrt_price = pool_state.sqrt_price_x96.max(sqrt_lower);
        let liquidity = get_liquidity_for_amount0(sqrt_price, sqrt_upper, amount0)?;
        let amount1 = get_amount1_delta(sqrt_lower, sqrt_price, liquidity, true)?;

        // 4. back to USD, then onto total_value
        let usd0 = mul_div(amount0, price0, U256::exp10(decimals0 as usize))?;
        let usd1 = mul_div(amount1, price1, U256::exp10(decimals1 as usize))?;
        let usd_total = usd0
            .checked_add(usd1)
            .ok_or(ZapError::Math("allocate: usd total"))?;
        if usd_total.is_zero() {
            return Err(ZapError::Math("allocate: zero usd total"));
        }

        // floor: the rounding remainder stays with asset0
        let value1 = mul_div(total_value, usd1, usd_total)?;
        let value0 = total_value - value1;

        debug!(
            %total_value, %value0, %value1, tick = pool_state.tick,
            "allocation resolved in range"
        );
        Ok(Allocation { value0, value1 })
    }
}

/// Splits that need no pricing at all.
pub fn edge_case_split(
    total_value: U256,
    tick_lower: i32,
    tick_upper: i32,
    current_tick: i32,
) -> Option<Allocation> {
    if tick_upper == tick_lower {
        let value0 = total_value / 2;
        return Some(Allocation {
            value0,
            value1: total_value - value0,
        });
    }
    if current_tick < tick_lower {
        return Some(Allocation {
            value0: total_value,
            value1: U256::zero(),
        });
    }
    if current_tick >= tick_upper {
        return Some(Allocation {
            value0: U256::zero(),
            value1: total_value,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_cases() {
        let total = U256::from(1001u64);

        let below = edge_case_split(total, -100, 100, -101).unwrap();
        assert_eq!((below.value0, below.value1), (total, U256::zero()));

        let above = edge_case_split(total, -100, 100, 100).unwrap();
        assert_eq!((above.value0, above.value1), (U256::zero(), total));

        let zero_width = edge_case_split(total, 50, 50, 50).unwrap();
        assert_eq!(zero_width.value0, U256::from(500u64));
        assert_eq!(zero_width.value1, U256::from(501u64));

        assert!(edge_case_split(total, -100, 100, 0).is_none());
        assert!(edge_case_split(total, -100, 100, -100).is_none());
    }

    #[test]
    fn test_reference_notional() {
        assert_eq!(REFERENCE_NOTIONAL_WAD, U256::exp10(30));
    }
}
