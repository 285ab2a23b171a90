//! Route discovery
//!
//! Pool lookup across tick spacings, one/two-hop legs, open/close plans and the lookup cache.

mod common;

use async_trait::async_trait;
use common::World;
use ethers::types::Address;
use itertools::Itertools;
use mig_zap_sdk::collaborators::PoolRegistry;
use mig_zap_sdk::router::{LegRoute, RouteFinder, RouteStatus, SwapRoute};
use mig_zap_sdk::settings;
use mig_zap_sdk::ZapResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Registry wrapper counting every lookup that reaches the chain
struct CountingRegistry {
    inner: Arc<dyn PoolRegistry>,
    calls: AtomicUsize,
}

impl CountingRegistry {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolRegistry for CountingRegistry {
    async fn get_pool(
        &self,
        asset_a: Address,
        asset_b: Address,
        tick_spacing: i32,
    ) -> ZapResult<Option<Address>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_pool(asset_a, asset_b, tick_spacing).await
    }
}

fn counting(world: &World) -> Arc<CountingRegistry> {
    Arc::new(CountingRegistry {
        inner: world.chain.clone(),
        calls: AtomicUsize::new(0),
    })
}

fn finder(world: &World, registry: Arc<dyn PoolRegistry>, ttl_seconds: u64) -> RouteFinder {
    let config = settings::Router {
        cache_ttl_seconds: ttl_seconds,
        ..world.settings.router.clone()
    };
    RouteFinder::new(registry, world.usdc, &config)
}

/// find_pool(a, b) == find_pool(b, a) for every token pair
#[tokio::test]
async fn test_lookup_is_order_independent() {
    let world = World::new();
    let finder = finder(&world, world.chain.clone(), 300);
    let tokens = [world.usdc, world.tok, world.hub, world.alt, world.iso];

    for (a, b) in tokens.iter().copied().tuple_combinations() {
        let forward = finder.find_pool(a, b).await.unwrap();
        let backward = finder.find_pool(b, a).await.unwrap();
        assert_eq!(forward, backward, "lookup differs for {:?}/{:?}", a, b);
    }

    let main = finder.find_pool(world.tok, world.usdc).await.unwrap();
    assert!(main.exists);
    assert_eq!(main.pool, world.main_pool);
    assert_eq!(main.tick_spacing, 10);
    assert!(!finder.find_pool(world.usdc, world.alt).await.unwrap().exists);
    assert!(!finder.find_pool(world.usdc, world.usdc).await.unwrap().exists);
}

/// The smallest configured spacing with a pool wins
#[tokio::test]
async fn test_lookup_prefers_smallest_spacing() {
    let world = World::new();
    let wide = world.chain.create_pool(world.usdc, world.alt, 2000, 0, 100).unwrap();
    let narrow = world.chain.create_pool(world.alt, world.usdc, 50, 0, 100).unwrap();
    let finder = finder(&world, world.chain.clone(), 300);

    let found = finder.find_pool(world.usdc, world.alt).await.unwrap();
    assert_eq!(found.pool, narrow);
    assert_eq!(found.tick_spacing, 50);
    assert_ne!(found.pool, wide);
}

/// Pools at spacings outside the configured list are never found
#[tokio::test]
async fn test_unconfigured_spacing_ignored() {
    let world = World::new();
    world.chain.create_pool(world.usdc, world.iso, 60, 0, 100).unwrap();
    let finder = finder(&world, world.chain.clone(), 300);

    assert!(!finder.find_pool(world.usdc, world.iso).await.unwrap().exists);
}

/// Direct pools beat connectors; otherwise the first connector with both hops is used
#[tokio::test]
async fn test_leg_resolution() {
    let world = World::new();
    let finder = finder(&world, world.chain.clone(), 300);

    assert_eq!(
        finder.resolve_leg(world.usdc, world.tok).await.unwrap(),
        LegRoute::Found(SwapRoute::direct(world.usdc, world.tok, world.main_pool, 10))
    );
    assert_eq!(
        finder.resolve_leg(world.usdc, world.alt).await.unwrap(),
        LegRoute::Found(SwapRoute::two_hop(
            world.usdc,
            world.hub,
            world.alt,
            (world.hub_pool, 50),
            (world.alt_hub_pool, 200),
        ))
    );
    assert_eq!(
        finder.resolve_leg(world.usdc, world.usdc).await.unwrap(),
        LegRoute::NotRequired
    );
    assert_eq!(
        finder.resolve_leg(world.usdc, world.iso).await.unwrap(),
        LegRoute::Missing
    );
}

/// A connector equal to either endpoint is skipped
#[tokio::test]
async fn test_connector_endpoint_skipped() {
    let world = World::new();
    let finder = finder(&world, world.chain.clone(), 300);

    // the only connector is the source itself
    assert_eq!(
        finder.resolve_leg(world.hub, world.iso).await.unwrap(),
        LegRoute::Missing
    );
}

/// With the deposit asset on one side, the other leg swaps through the target pool
#[tokio::test]
async fn test_open_plan_uses_target_pool() {
    let world = World::new();
    let finder = finder(&world, world.chain.clone(), 300);

    let plan = finder
        .find_route_for_open(world.usdc, world.tok, world.main_pool, 10)
        .await
        .unwrap();
    assert_eq!(plan.status, RouteStatus::Success);
    assert_eq!(plan.route0, LegRoute::NotRequired);
    assert_eq!(
        plan.route1,
        LegRoute::Found(SwapRoute::direct(world.usdc, world.tok, world.main_pool, 10))
    );
}

/// Neither asset is the deposit asset: both legs resolved independently
#[tokio::test]
async fn test_open_plan_for_foreign_pair() {
    let world = World::new();
    let finder = finder(&world, world.chain.clone(), 300);

    // tok was created before alt, so tok is token0
    let plan = finder
        .find_route_for_open(world.tok, world.alt, world.alt_tok_pool, 10)
        .await
        .unwrap();
    assert_eq!(plan.status, RouteStatus::Success);
    assert_eq!(plan.route0.route().map(|r| r.hops()), Some(1));
    assert_eq!(plan.route1.route().map(|r| r.hops()), Some(2));

    let partial = finder
        .find_route_for_open(world.tok, world.iso, world.iso_pool, 10)
        .await
        .unwrap();
    assert_eq!(partial.status, RouteStatus::PartialSuccess);
    assert!(partial.route1.is_missing());
    assert_eq!(partial.status.to_string(), "PARTIAL_SUCCESS");
}

/// Close plans route each asset back into the deposit asset
#[tokio::test]
async fn test_close_plans() {
    let world = World::new();
    let finder = finder(&world, world.chain.clone(), 300);

    let plan = finder.find_route_for_close(world.tok, world.alt).await.unwrap();
    assert_eq!(plan.status, RouteStatus::Success);
    let back = plan.route1.route().unwrap();
    assert_eq!(back.token_in(), world.alt);
    assert_eq!(back.token_out(), world.usdc);
    assert_eq!(back.tokens, vec![world.alt, world.hub, world.usdc]);

    let deposit_side = finder.find_route_for_close(world.usdc, world.tok).await.unwrap();
    assert_eq!(deposit_side.route0, LegRoute::NotRequired);
    assert_eq!(deposit_side.status, RouteStatus::Success);

    let stranded = world.chain.create_token(6).unwrap();
    let none = finder.find_route_for_close(world.iso, stranded).await.unwrap();
    assert_eq!(none.status, RouteStatus::NoRoute);
    assert_eq!(none.status.to_string(), "NO_ROUTE");
}

/// Cached and uncached finders give identical answers
#[tokio::test]
async fn test_cache_is_transparent() {
    let world = World::new();
    let cached = finder(&world, world.chain.clone(), 300);
    let uncached = finder(&world, world.chain.clone(), 0);
    let tokens = [world.usdc, world.tok, world.hub, world.alt, world.iso];

    for (a, b) in tokens.iter().copied().tuple_combinations() {
        for _ in 0..2 {
            assert_eq!(
                cached.resolve_leg(a, b).await.unwrap(),
                uncached.resolve_leg(a, b).await.unwrap()
            );
        }
    }
    assert!(cached.cache_metrics().hits > 0);
}

/// Repeat lookups, including negative ones, do not reach the registry
#[tokio::test]
async fn test_repeat_lookups_hit_cache() {
    let world = World::new();
    let registry = counting(&world);
    let finder = finder(&world, registry.clone(), 300);

    finder.find_pool(world.usdc, world.tok).await.unwrap();
    finder.find_pool(world.usdc, world.iso).await.unwrap();
    let after_first = registry.calls();
    assert!(after_first > 0);

    finder.find_pool(world.tok, world.usdc).await.unwrap();
    finder.find_pool(world.iso, world.usdc).await.unwrap();
    assert_eq!(registry.calls(), after_first);
}

/// warm_up fills the cache; clear_cache empties it again
#[tokio::test]
async fn test_warm_up_and_clear() {
    let world = World::new();
    let registry = counting(&world);
    let finder = finder(&world, registry.clone(), 300);
    let spacings = world.settings.router.tick_spacings.len();

    let resolved = finder
        .warm_up(&[(world.usdc, world.tok), (world.hub, world.alt), (world.usdc, world.iso)])
        .await
        .unwrap();
    assert_eq!(resolved, 2);
    assert_eq!(registry.calls(), 3 * spacings);
    assert_eq!(finder.cache_metrics().cache_size, 3 * spacings);

    finder.resolve_leg(world.usdc, world.tok).await.unwrap();
    assert_eq!(registry.calls(), 3 * spacings);

    finder.clear_cache();
    assert_eq!(finder.cache_metrics().cache_size, 0);
    finder.resolve_leg(world.usdc, world.tok).await.unwrap();
    assert!(registry.calls() > 3 * spacings);
}
