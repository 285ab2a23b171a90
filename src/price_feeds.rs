// src/price_feeds.rs

use dashmap::DashMap;
use ethers::types::{Address, U256};
use log::{debug, warn};
use std::sync::Arc;

use crate::collaborators::{PriceOracle, TokenLedger};
use crate::errors::{ZapError, ZapResult};
use crate::metrics;
use crate::v3_math::mul_div;

/// 1e18 fixed-point unit used for oracle rates and USD prices.
pub const WAD: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// One step of the oracle fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSource {
    /// Direct `src -> dst` quote
    Direct,
    /// Quote routed through an intermediate asset
    Connector(Address),
}

impl RateSource {
    fn connector(&self) -> Option<Address> {
        match self {
            RateSource::Direct => None,
            RateSource::Connector(c) => Some(*c),
        }
    }
}

/// Ordered list of sources tried until one yields a non-zero `(rate, weight)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    connectors: Vec<Address>,
}

impl FallbackPolicy {
    pub fn new(connectors: Vec<Address>) -> Self {
        Self { connectors }
    }

    /// Direct quote first, then every connector that is neither endpoint, in priority order.
    pub fn sources(&self, src: Address, dst: Address) -> Vec<RateSource> {
        std::iter::once(RateSource::Direct)
            .chain(
                self.connectors
                    .iter()
                    .filter(|c| **c != src && **c != dst)
                    .map(|c| RateSource::Connector(*c)),
            )
            .collect()
    }
}

/// USD price resolution against the spot-rate oracle.
///
/// The deposit asset is the USD reference: its price is exactly 1.0 and every other asset is
/// quoted into it. Prices are WAD-scaled USD per whole token.
///
/// ## Usage
///
/// ```rust,ignore
/// let resolver = UsdPriceResolver::new(oracle, tokens, usdc, FallbackPolicy::new(connectors), 10);
/// let weth_usd = resolver.usd_price(weth).await?;
/// ```
pub struct UsdPriceResolver {
    oracle: Arc<dyn PriceOracle>,
    tokens: Arc<dyn TokenLedger>,
    usd_reference: Address,
    policy: FallbackPolicy,
    threshold_filter: u32,
    pub token_decimals_cache: Arc<DashMap<Address, u8>>,
}

impl UsdPriceResolver {
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        tokens: Arc<dyn TokenLedger>,
        usd_reference: Address,
        policy: FallbackPolicy,
        threshold_filter: u32,
    ) -> Self {
        Self {
            oracle,
            tokens,
            usd_reference,
            policy,
            threshold_filter,
            token_decimals_cache: Arc::new(DashMap::new()),
        }
    }

    pub fn usd_reference(&self) -> Address {
        self.usd_reference
    }

    pub async fn decimals(&self, token: Address) -> ZapResult<u8> {
        if let Some(d) = self.token_decimals_cache.get(&token) {
            return Ok(*d);
        }
        let decimals = self.tokens.decimals(token).await?;
        self.token_decimals_cache.insert(token, decimals);
        Ok(decimals)
    }

    /// Raw reference units per raw `asset` unit, WAD-scaled.
    ///
    /// A failing oracle call counts as "no quote" for that source; only when every source is
    /// exhausted does this return `PriceUnavailable`.
    pub async fn rate_to_reference(&self, asset: Address) -> ZapResult<U256> {
        if asset == self.usd_reference {
            return Ok(WAD);
        }

        for source in self.policy.sources(asset, self.usd_reference) {
            match self
                .oracle
                .get_rate(asset, self.usd_reference, source.connector(), self.threshold_filter)
                .await
            {
                Ok((rate, weight)) if !rate.is_zero() && !weight.is_zero() => {
                    if source != RateSource::Direct {
                        metrics::increment_connector_fallback();
                    }
                    debug!("Rate for {:?} via {:?}: {}", asset, source, rate);
                    return Ok(rate);
                }
                Ok(_) => debug!("No liquidity for {:?} via {:?}", asset, source),
                Err(e) => warn!("Oracle call for {:?} via {:?} failed: {}", asset, source, e),
            }
        }

        Err(ZapError::PriceUnavailable(asset))
    }

    /// WAD-scaled USD price of one whole token of `asset`.
    pub async fn usd_price(&self, asset: Address) -> ZapResult<U256> {
        if asset == self.usd_reference {
            return Ok(WAD);
        }
        let rate = self.rate_to_reference(asset).await?;
        let asset_decimals = self.decimals(asset).await?;
        let reference_decimals = self.decimals(self.usd_reference).await?;
        mul_div(
            rate,
            U256::exp10(asset_decimals as usize),
            U256::exp10(reference_decimals as usize),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_skips_endpoints() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        let c = Address::from_low_u64_be(3);
        let policy = FallbackPolicy::new(vec![a, c, b]);

        assert_eq!(
            policy.sources(a, b),
            vec![RateSource::Direct, RateSource::Connector(c)]
        );
        assert_eq!(FallbackPolicy::new(vec![]).sources(a, b), vec![RateSource::Direct]);
    }
}
