//! # Router Module
//!
//! Swap path discovery between the deposit asset and the two assets of a position.
//!
//! Pools are looked up in the pool registry by `(assetA, assetB, tickSpacing)`, probing the
//! configured tick spacings in ascending order. A leg is routed directly when a pool exists,
//! otherwise through the first connector asset for which both hops resolve.
//!
//! Lookups go through a TTL cache keyed by the canonical pair and spacing. A cached answer is
//! the registry's answer from at most `ttl` ago, so the cache never changes a result beyond
//! that window.

pub mod route;

use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheMetricsSnapshot, TtlCache};
use crate::collaborators::PoolRegistry;
use crate::errors::ZapResult;
use crate::settings;
use crate::types::canonical_pair;

pub use route::{LegRoute, RoutePlan, RouteStatus, SwapRoute};

type PoolKey = (Address, Address, i32);

/// Result of [`RouteFinder::find_pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLookup {
    pub pool: Address,
    pub tick_spacing: i32,
    pub exists: bool,
}

impl PoolLookup {
    fn missing() -> Self {
        Self {
            pool: Address::zero(),
            tick_spacing: 0,
            exists: false,
        }
    }
}

pub struct RouteFinder {
    registry: Arc<dyn PoolRegistry>,
    deposit_asset: Address,
    tick_spacings: Vec<i32>,
    connectors: Vec<Address>,
    pool_cache: TtlCache<PoolKey, Option<Address>>,
}

impl RouteFinder {
    pub fn new(registry: Arc<dyn PoolRegistry>, deposit_asset: Address, config: &settings::Router) -> Self {
        let mut tick_spacings = config.tick_spacings.clone();
        tick_spacings.sort_unstable();
        tick_spacings.dedup();
        Self {
            registry,
            deposit_asset,
            tick_spacings,
            connectors: config.connectors.clone(),
            pool_cache: TtlCache::new("route_pool_lookup", config.cache_ttl()),
        }
    }

    pub fn deposit_asset(&self) -> Address {
        self.deposit_asset
    }

    pub fn connectors(&self) -> &[Address] {
        &self.connectors
    }

    async fn lookup(&self, key: PoolKey) -> ZapResult<Option<Address>> {
        if let Some(cached) = self.pool_cache.get(&key) {
            return Ok(cached);
        }
        let pool = self
            .registry
            .get_pool(key.0, key.1, key.2)
            .await?
            .filter(|p| !p.is_zero());
        self.pool_cache.insert(key, pool);
        Ok(pool)
    }

    /// First pool for the pair across the ascending tick spacings. Argument order is irrelevant.
    pub async fn find_pool(&self, asset_a: Address, asset_b: Address) -> ZapResult<PoolLookup> {
        if asset_a == asset_b {
            return Ok(PoolLookup::missing());
        }
        let (token0, token1) = canonical_pair(asset_a, asset_b);
        for &tick_spacing in &self.tick_spacings {
            if let Some(pool) = self.lookup((token0, token1, tick_spacing)).await? {
                return Ok(PoolLookup {
                    pool,
                    tick_spacing,
                    exists: true,
                });
            }
        }
        Ok(PoolLookup::missing())
    }

    /// Direct pool first, then a two-hop path through each connector in priority order.
    pub async fn resolve_leg(&self, from: Address, to: Address) -> ZapResult<LegRoute> {
        if from == to {
            return Ok(LegRoute::NotRequired);
        }

        let direct = self.find_pool(from, to).await?;
        if direct.exists {
            return Ok(LegRoute::Found(SwapRoute::direct(
                from,
                to,
                direct.pool,
                direct.tick_spacing,
            )));
        }

        for &connector in &self.connectors {
            if connector == from || connector == to {
                continue;
            }
            let first = self.find_pool(from, connector).await?;
            if !first.exists {
                continue;
            }
            let second = self.find_pool(connector, to).await?;
            if second.exists {
                debug!(?from, ?to, ?connector, "two-hop route resolved");
                return Ok(LegRoute::Found(SwapRoute::two_hop(
                    from,
                    connector,
                    to,
                    (first.pool, first.tick_spacing),
                    (second.pool, second.tick_spacing),
                )));
            }
        }

        debug!(?from, ?to, "no route");
        Ok(LegRoute::Missing)
    }

    /// Routes from the deposit asset into each position asset.
    ///
    /// When one asset is the deposit asset, the other leg swaps through `target_pool`.
    pub async fn find_route_for_open(
        &self,
        asset0: Address,
        asset1: Address,
        target_pool: Address,
        target_tick_spacing: i32,
    ) -> ZapResult<RoutePlan> {
        let deposit = self.deposit_asset;
        let plan = if asset0 == deposit {
            RoutePlan::new(
                LegRoute::NotRequired,
                self.target_leg(deposit, asset1, target_pool, target_tick_spacing),
            )
        } else if asset1 == deposit {
            RoutePlan::new(
                self.target_leg(deposit, asset0, target_pool, target_tick_spacing),
                LegRoute::NotRequired,
            )
        } else {
            RoutePlan::new(
                self.resolve_leg(deposit, asset0).await?,
                self.resolve_leg(deposit, asset1).await?,
            )
        };
        debug!(status = %plan.status, "open route plan");
        Ok(plan)
    }

    fn target_leg(&self, from: Address, to: Address, pool: Address, tick_spacing: i32) -> LegRoute {
        if from == to {
            LegRoute::NotRequired
        } else {
            LegRoute::Found(SwapRoute::direct(from, to, pool, tick_spacing))
        }
    }

    /// Routes from each position asset back into the deposit asset.
    pub async fn find_route_for_close(&self, asset0: Address, asset1: Address) -> ZapResult<RoutePlan> {
        let plan = RoutePlan::new(
            self.resolve_leg(asset0, self.deposit_asset).await?,
            self.resolve_leg(asset1, self.deposit_asset).await?,
        );
        debug!(status = %plan.status, "close route plan");
        Ok(plan)
    }

    /// Pre-populates the lookup cache for every configured spacing of each pair.
    ///
    /// Returns the number of `(pair, spacing)` combinations that resolved to a pool.
    pub async fn warm_up(&self, pairs: &[(Address, Address)]) -> ZapResult<usize> {
        let mut resolved = 0usize;
        for &(a, b) in pairs {
            if a == b {
                continue;
            }
            let (token0, token1) = canonical_pair(a, b);
            for &tick_spacing in &self.tick_spacings {
                if self.lookup((token0, token1, tick_spacing)).await?.is_some() {
                    resolved += 1;
                }
            }
        }
        info!(
            "Route cache warm-up: {} pairs, {} pools resolved, {} entries cached",
            pairs.len(),
            resolved,
            self.pool_cache.len()
        );
        Ok(resolved)
    }

    pub fn clear_cache(&self) {
        self.pool_cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.pool_cache.purge_expired()
    }

    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.pool_cache.metrics()
    }
}
