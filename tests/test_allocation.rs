//! Deposit split and oracle pricing
//!
//! Runs the allocation engine against the simulated oracle: the balanced split at the middle
//! of a symmetric range, the exact-sum guarantee, edge ranges, connector fallback and the
//! "every source failed" error.

mod common;

use async_trait::async_trait;
use common::World;
use ethers::types::{Address, U256};
use itertools::iproduct;
use mig_zap_sdk::allocation::AllocationEngine;
use mig_zap_sdk::collaborators::PriceOracle;
use mig_zap_sdk::price_feeds::{FallbackPolicy, UsdPriceResolver, WAD};
use mig_zap_sdk::simulation::FailPoint;
use mig_zap_sdk::types::PoolState;
use mig_zap_sdk::v3_math::get_sqrt_ratio_at_tick;
use mig_zap_sdk::{ZapError, ZapResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn resolver(world: &World) -> Arc<UsdPriceResolver> {
    Arc::new(UsdPriceResolver::new(
        world.chain.clone(),
        world.chain.clone(),
        world.usdc,
        FallbackPolicy::new(vec![world.hub]),
        10,
    ))
}

fn state_at(tick: i32) -> PoolState {
    PoolState {
        sqrt_price_x96: get_sqrt_ratio_at_tick(tick).unwrap(),
        tick,
    }
}

/// 1000 units into a symmetric range around the current tick splits 500 / 500
#[tokio::test]
async fn test_balanced_split_at_range_center() {
    let world = World::new();
    let engine = AllocationEngine::new(resolver(&world));

    let split = engine
        .allocate(U256::from(1000u64), world.usdc, world.tok, -1000, 1000, state_at(0))
        .await
        .unwrap();

    assert_eq!(split.value0, U256::from(500u64));
    assert_eq!(split.value1, U256::from(500u64));
}

/// An odd total leaves the indivisible unit with asset0
#[tokio::test]
async fn test_remainder_goes_to_asset0() {
    let world = World::new();
    let engine = AllocationEngine::new(resolver(&world));

    for (total, value0, value1) in [(1001u64, 501u64, 500u64), (1, 1, 0), (3, 2, 1)] {
        let split = engine
            .allocate(U256::from(total), world.usdc, world.tok, -1000, 1000, state_at(0))
            .await
            .unwrap();
        assert_eq!(
            (split.value0, split.value1),
            (U256::from(value0), U256::from(value1)),
            "total {}",
            total
        );
    }
}

/// value0 + value1 == total for every range, tick and amount combination
#[tokio::test]
async fn test_split_always_sums_to_total() {
    let world = World::new();
    let engine = AllocationEngine::new(resolver(&world));

    let totals = [1u64, 7, 999, 1_000_000, 123_456_789_012];
    let ranges = [(-1000, 1000), (-600, 1200), (-20, 10), (-887_270, 887_270)];
    let ticks = [-1500, -600, -15, 0, 7, 999, 1200, 5000];

    for (total, (lower, upper), tick) in iproduct!(totals, ranges, ticks) {
        let total = U256::from(total);
        let split = engine
            .allocate(total, world.usdc, world.tok, lower, upper, state_at(tick))
            .await
            .unwrap();
        assert_eq!(
            split.value0 + split.value1,
            total,
            "sum broken for total {} range [{}, {}] tick {}",
            total,
            lower,
            upper,
            tick
        );
    }
}

/// Below the range everything goes to asset0, at or above it everything goes to asset1
#[tokio::test]
async fn test_out_of_range_splits() {
    let world = World::new();
    let engine = AllocationEngine::new(resolver(&world));
    let total = U256::from(1_000_000u64);

    let below = engine
        .allocate(total, world.usdc, world.tok, -100, 100, state_at(-101))
        .await
        .unwrap();
    assert_eq!((below.value0, below.value1), (total, U256::zero()));

    let at_upper = engine
        .allocate(total, world.usdc, world.tok, -100, 100, state_at(100))
        .await
        .unwrap();
    assert_eq!((at_upper.value0, at_upper.value1), (U256::zero(), total));
}

/// A price nearer the lower bound puts more value into asset0
#[tokio::test]
async fn test_split_follows_price_position() {
    let world = World::new();
    let engine = AllocationEngine::new(resolver(&world));
    let total = U256::from(1_000_000u64);

    let near_lower = engine
        .allocate(total, world.usdc, world.tok, -1000, 1000, state_at(-800))
        .await
        .unwrap();
    let near_upper = engine
        .allocate(total, world.usdc, world.tok, -1000, 1000, state_at(800))
        .await
        .unwrap();

    assert!(near_lower.value0 > near_lower.value1);
    assert!(near_upper.value0 < near_upper.value1);
}

/// Deposit asset prices at exactly 1.0; others are scaled by decimals
#[tokio::test]
async fn test_usd_prices() {
    let world = World::new();
    let prices = resolver(&world);

    assert_eq!(prices.usd_price(world.usdc).await.unwrap(), WAD);
    assert_eq!(prices.usd_price(world.tok).await.unwrap(), WAD);

    // 18-decimal asset worth 2000 USD: 2000e6 raw USDC per 1e18 raw units
    let rate = U256::from(2000u64) * U256::exp10(6);
    world
        .chain
        .set_rate(world.reward, world.usdc, None, rate, U256::one())
        .unwrap();
    assert_eq!(
        prices.usd_price(world.reward).await.unwrap(),
        U256::from(2000u64) * WAD
    );
}

/// `alt` has no direct quote, only one through the `hub` connector
#[tokio::test]
async fn test_connector_fallback() {
    let world = World::new();
    let prices = resolver(&world);

    assert_eq!(prices.rate_to_reference(world.alt).await.unwrap(), WAD);
}

/// A failing direct quote counts as "no quote" and the connector is tried next
#[tokio::test]
async fn test_oracle_error_falls_through() {
    let world = World::new();
    let doubled = WAD * U256::from(2u64);
    world
        .chain
        .set_rate(world.tok, world.usdc, Some(world.hub), doubled, U256::one())
        .unwrap();
    let prices = resolver(&world);

    world.chain.fail_next(FailPoint::Oracle);
    assert_eq!(prices.rate_to_reference(world.tok).await.unwrap(), doubled);
    // next call is healthy again and uses the direct quote
    assert_eq!(prices.rate_to_reference(world.tok).await.unwrap(), WAD);
}

/// No source quotes the asset: PriceUnavailable, and the allocation fails with it
#[tokio::test]
async fn test_price_unavailable() {
    let world = World::new();
    let unpriced = world.chain.create_token(6).unwrap();
    let prices = resolver(&world);

    assert_eq!(
        prices.usd_price(unpriced).await,
        Err(ZapError::PriceUnavailable(unpriced))
    );

    let engine = AllocationEngine::new(prices);
    let result = engine
        .allocate(U256::from(1000u64), world.usdc, unpriced, -1000, 1000, state_at(0))
        .await;
    assert_eq!(result, Err(ZapError::PriceUnavailable(unpriced)));
}

/// Oracle that always errors and counts how often it was asked
struct BrokenOracle {
    calls: AtomicUsize,
}

#[async_trait]
impl PriceOracle for BrokenOracle {
    async fn get_rate(
        &self,
        _src: Address,
        _dst: Address,
        _connector: Option<Address>,
        _threshold_filter: u32,
    ) -> ZapResult<(U256, U256)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ZapError::backend("execution reverted"))
    }
}

/// Every source is tried once, in order, before giving up
#[tokio::test]
async fn test_all_sources_exhausted() {
    let world = World::new();
    let oracle = Arc::new(BrokenOracle {
        calls: AtomicUsize::new(0),
    });
    let second_connector = world.alt;
    let prices = UsdPriceResolver::new(
        oracle.clone(),
        world.chain.clone(),
        world.usdc,
        FallbackPolicy::new(vec![world.hub, world.tok, second_connector]),
        10,
    );

    assert_eq!(
        prices.rate_to_reference(world.tok).await,
        Err(ZapError::PriceUnavailable(world.tok))
    );
    // direct + hub + alt; `tok` itself is skipped as a connector
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}
