//! # Swap Executor
//!
//! Executes a [`SwapRoute`] for an exact input amount with a slippage floor.
//!
//! Single-hop routes go straight to the route's pool, multi-hop routes are encoded as a
//! `token | tickSpacing | token ...` path and executed in one router call. The output is
//! measured as the operator's balance delta of the last token, and anything below
//! `minOut = expected * (10000 - bps) / 10000` is an `InsufficientOutput` error, never a
//! partial result.

use ethers::types::{Address, U256, U512};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::collaborators::{Quoter, SingleSwap, SwapRouter, TokenLedger};
use crate::errors::{ZapError, ZapResult};
use crate::metrics;
use crate::pool_state_cache::PoolStateCache;
use crate::router::SwapRoute;
use crate::settings;
use crate::v3_math::quote_at_sqrt_price;

pub const BPS_DENOMINATOR: u32 = 10_000;

/// Where the expected output of a swap came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSource {
    Quoter,
    Projection,
}

impl ExpectedSource {
    fn as_str(&self) -> &'static str {
        match self {
            ExpectedSource::Quoter => "quoter",
            ExpectedSource::Projection => "projection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedOutput {
    pub amount: U256,
    pub source: ExpectedSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub amount_out: U256,
    pub expected: ExpectedOutput,
    pub min_out: U256,
}

/// Slippage bounds in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippagePolicy {
    pub default_bps: u32,
    pub max_bps: u32,
    pub projection_discount_bps: u32,
}

impl SlippagePolicy {
    pub fn from_settings(zap: &settings::Zap) -> Self {
        Self {
            default_bps: zap.default_slippage_bps.min(BPS_DENOMINATOR),
            max_bps: zap.max_slippage_bps.min(BPS_DENOMINATOR),
            projection_discount_bps: zap.projection_discount_bps.min(BPS_DENOMINATOR),
        }
    }

    /// Zero means "use the default"; anything else is clamped to the maximum.
    pub fn effective_bps(&self, requested_bps: u32) -> u32 {
        let bps = if requested_bps == 0 {
            self.default_bps
        } else {
            requested_bps
        };
        bps.min(self.max_bps)
    }
}

/// `amount * (10000 - bps) / 10000`, rounding down.
pub fn apply_slippage(amount: U256, bps: u32) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(bps) as u64;
    let scaled = amount.full_mul(U256::from(keep)) / U512::from(BPS_DENOMINATOR as u64);
    // scaled <= amount
    U256::try_from(scaled).unwrap_or(amount)
}

pub struct SwapExecutor {
    operator: Address,
    router: Arc<dyn SwapRouter>,
    quoter: Option<Arc<dyn Quoter>>,
    tokens: Arc<dyn TokenLedger>,
    pools: Arc<PoolStateCache>,
    slippage: SlippagePolicy,
}

impl SwapExecutor {
    pub fn new(
        operator: Address,
        router: Arc<dyn SwapRouter>,
        quoter: Option<Arc<dyn Quoter>>,
        tokens: Arc<dyn TokenLedger>,
        pools: Arc<PoolStateCache>,
        slippage: SlippagePolicy,
    ) -> Self {
        Self {
            operator,
            router,
            quoter,
            tokens,
            pools,
            slippage,
        }
    }

    pub fn slippage(&self) -> &SlippagePolicy {
        &self.slippage
    }

    /// Conservative expected output: the quoter when it answers, else a discounted
    /// projection through each hop's current pool price.
    pub async fn expected_output(&self, route: &SwapRoute, amount_in: U256) -> ZapResult<ExpectedOutput> {
        if let Some(quoter) = &self.quoter {
            match quoter.quote_exact_input(route.encode_path()?, amount_in).await {
                Ok(amount) if !amount.is_zero() => {
                    return Ok(ExpectedOutput {
                        amount,
                        source: ExpectedSource::Quoter,
                    })
                }
                Ok(_) => debug!("Quoter returned zero for {:?}, projecting", route.tokens),
                Err(e) => warn!("Quoter failed for {:?}: {}, projecting", route.tokens, e),
            }
        }

        let projected = self.project_output(route, amount_in).await?;
        Ok(ExpectedOutput {
            amount: apply_slippage(projected, self.slippage.projection_discount_bps),
            source: ExpectedSource::Projection,
        })
    }

    /// Output at each pool's current price, ignoring fees and depth.
    pub async fn project_output(&self, route: &SwapRoute, amount_in: U256) -> ZapResult<U256> {
        route.validate_shape()?;
        let mut amount = amount_in;
        for (hop, pool) in route.pools.iter().enumerate() {
            let immutables = self.pools.immutables(*pool).await?;
            let state = self.pools.slot0(*pool).await?;
            let zero_for_one = route.tokens[hop] == immutables.token0;
            amount = quote_at_sqrt_price(amount, state.sqrt_price_x96, zero_for_one)?;
        }
        Ok(amount)
    }

    /// Swaps `amount_in` of `route.token_in()` for `route.token_out()`; the output lands
    /// with the operator.
    pub async fn swap(
        &self,
        route: &SwapRoute,
        amount_in: U256,
        max_slippage_bps: u32,
        deadline: u64,
    ) -> ZapResult<SwapOutcome> {
        if amount_in.is_zero() {
            return Err(ZapError::ZeroAmount);
        }
        route.validate_shape()?;

        let bps = self.slippage.effective_bps(max_slippage_bps);
        let expected = self.expected_output(route, amount_in).await?;
        let min_out = apply_slippage(expected.amount, bps);
        metrics::increment_expected_output_source(expected.source.as_str());

        let token_out = route.token_out();
        let before = self.tokens.balance_of(token_out, self.operator).await?;

        if route.hops() == 1 {
            self.router
                .swap_single(SingleSwap {
                    pool: route.pools[0],
                    token_in: route.token_in(),
                    token_out,
                    tick_spacing: route.tick_spacings[0],
                    amount_in,
                    amount_out_min: min_out,
                    recipient: self.operator,
                    deadline,
                })
                .await?;
        } else {
            self.router
                .swap_path(route.encode_path()?, amount_in, min_out, self.operator, deadline)
                .await?;
        }

        let after = self.tokens.balance_of(token_out, self.operator).await?;
        let amount_out = after.saturating_sub(before);
        if amount_out < min_out {
            return Err(ZapError::InsufficientOutput {
                actual: amount_out,
                minimum: min_out,
            });
        }

        metrics::increment_swap(route.hops());
        debug!(
            hops = route.hops(),
            %amount_in, %amount_out, %min_out, bps,
            "swap executed"
        );
        Ok(SwapOutcome {
            amount_out,
            expected,
            min_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_slippage() {
        let policy = SlippagePolicy {
            default_bps: 100,
            max_bps: 1000,
            projection_discount_bps: 50,
        };
        assert_eq!(policy.effective_bps(0), 100);
        assert_eq!(policy.effective_bps(30), 30);
        assert_eq!(policy.effective_bps(5000), 1000);
    }

    #[test]
    fn test_apply_slippage() {
        assert_eq!(apply_slippage(U256::from(1000u64), 100), U256::from(990u64));
        assert_eq!(apply_slippage(U256::from(999u64), 100), U256::from(989u64));
        assert_eq!(apply_slippage(U256::from(1000u64), 20_000), U256::zero());
        assert_eq!(apply_slippage(U256::MAX, 0), U256::MAX);
    }
}
