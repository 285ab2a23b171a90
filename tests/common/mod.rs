//! Shared simulated-world fixture for the integration tests.
#![allow(dead_code)]

use ethers::types::{Address, U256};
use mig_zap_sdk::collaborators::Collaborators;
use mig_zap_sdk::price_feeds::WAD;
use mig_zap_sdk::settings::{self, Settings};
use mig_zap_sdk::{PositionLifecycleManager, SimulatedChain};
use std::sync::Arc;

pub const FEE_PIPS: u32 = 100; // 0.01%

pub fn units(n: u64) -> U256 {
    U256::from(n) * U256::exp10(6)
}

/// Tokens, pools and accounts shared by the lifecycle/router/allocation tests.
///
/// All pool prices are 1:1 and every token except `reward` has 6 decimals.
///
/// - `usdc` (deposit asset) / `tok` at spacing 10: the main pool, with a gauge
/// - `usdc` / `hub` at spacing 50 and `hub` / `alt` at spacing 200: `alt` is two hops away
/// - `alt` / `tok` at spacing 10: a pool with neither side being the deposit asset
/// - `iso` / `tok` at spacing 10: `iso` has no path to the deposit asset
pub struct World {
    pub chain: Arc<SimulatedChain>,
    pub operator: Address,
    pub alice: Address,
    pub bob: Address,
    pub usdc: Address,
    pub tok: Address,
    pub hub: Address,
    pub alt: Address,
    pub iso: Address,
    pub reward: Address,
    pub main_pool: Address,
    pub hub_pool: Address,
    pub alt_hub_pool: Address,
    pub alt_tok_pool: Address,
    pub iso_pool: Address,
    pub gauge: Address,
    pub settings: Settings,
}

impl World {
    pub fn new() -> Self {
        let operator = Address::from_low_u64_be(0x0a11ce0);
        let alice = Address::from_low_u64_be(0xa1);
        let bob = Address::from_low_u64_be(0xb0b);
        let chain = Arc::new(SimulatedChain::new(operator));

        let usdc = chain.create_token(6).unwrap();
        let tok = chain.create_token(6).unwrap();
        let hub = chain.create_token(6).unwrap();
        let alt = chain.create_token(6).unwrap();
        let iso = chain.create_token(6).unwrap();
        let reward = chain.create_token(18).unwrap();

        let reserves = units(1_000_000);
        let pool = |a, b, spacing| {
            let p = chain.create_pool(a, b, spacing, 0, FEE_PIPS).unwrap();
            chain.seed_pool(p, reserves, reserves).unwrap();
            p
        };
        let main_pool = pool(usdc, tok, 10);
        let hub_pool = pool(usdc, hub, 50);
        let alt_hub_pool = pool(hub, alt, 200);
        let alt_tok_pool = pool(alt, tok, 10);
        let iso_pool = pool(iso, tok, 10);

        let gauge = chain.create_gauge(main_pool, reward).unwrap();

        let one = U256::one();
        chain.set_rate(tok, usdc, None, WAD, one).unwrap();
        chain.set_rate(hub, usdc, None, WAD, one).unwrap();
        chain.set_rate(alt, usdc, Some(hub), WAD, one).unwrap();
        chain.set_rate(iso, usdc, None, WAD, one).unwrap();

        for account in [alice, bob] {
            chain.mint_tokens(usdc, account, units(10_000)).unwrap();
            chain.approve(usdc, account, operator, U256::MAX).unwrap();
            chain.approve_positions(account, operator).unwrap();
        }

        let settings = Settings {
            zap: settings::Zap::with_deposit_asset(usdc),
            router: settings::Router {
                connectors: vec![hub],
                ..settings::Router::default()
            },
            pool_cache: settings::PoolCache::default(),
            contracts: settings::Contracts::default(),
            rpc: settings::Rpc::default(),
        };

        Self {
            chain,
            operator,
            alice,
            bob,
            usdc,
            tok,
            hub,
            alt,
            iso,
            reward,
            main_pool,
            hub_pool,
            alt_hub_pool,
            alt_tok_pool,
            iso_pool,
            gauge,
            settings,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::from_backend(self.chain.clone(), self.operator)
    }

    pub fn manager(&self) -> PositionLifecycleManager {
        PositionLifecycleManager::new(self.collaborators(), &self.settings)
    }

    pub fn deadline(&self) -> u64 {
        self.chain.now() + 600
    }

    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.chain.balance(token, holder).unwrap()
    }
}
