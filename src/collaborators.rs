//! # External Collaborators
//!
//! This module defines the call contracts of everything the zap orchestrates but does not
//! implement: the position registry, the pool registry and pools, the swap router and quoter,
//! the incentive gauge, the price oracle and the token ledger. The lifecycle manager only ever
//! talks to these traits, so the same open/close code runs against a live chain
//! ([`crate::adapters::evm::EvmBackend`]) or the in-memory
//! [`crate::simulation::SimulatedChain`].
//!
//! ## Atomicity
//!
//! A backend must also implement [`StateCheckpoint`]. The manager takes a checkpoint before
//! the first value-moving step and reverts to it on any failure, so an aborted open/close
//! leaves no trace in balances, positions or stakes.
//!
//! ## Adding a New Backend
//!
//! 1. Implement every trait below for your backend type
//! 2. Build a [`Collaborators`] bundle with [`Collaborators::from_backend`]
//! 3. Hand the bundle to [`crate::lifecycle::PositionLifecycleManager::new`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use mig_zap_sdk::collaborators::Collaborators;
//! use mig_zap_sdk::simulation::SimulatedChain;
//! use ethers::types::Address;
//! use std::sync::Arc;
//!
//! let operator = Address::from_low_u64_be(0xa11ce);
//! let chain = Arc::new(SimulatedChain::new(operator));
//! let collaborators = Collaborators::from_backend(chain, operator);
//! ```

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;

use crate::errors::ZapResult;
use crate::types::{MintRequest, MintResult, PoolImmutables, PoolState, PositionInfo};

/// Pool registry (`getPool(tokenA, tokenB, tickSpacing)`).
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    /// Returns the pool for the pair at the given tick spacing, `None` if it does not exist.
    ///
    /// Implementations must accept the two assets in either order.
    async fn get_pool(
        &self,
        asset_a: Address,
        asset_b: Address,
        tick_spacing: i32,
    ) -> ZapResult<Option<Address>>;
}

/// Read access to individual pools.
#[async_trait]
pub trait PoolReader: Send + Sync {
    /// Current sqrt price and tick (`slot0()`).
    async fn slot0(&self, pool: Address) -> ZapResult<PoolState>;

    /// `token0()`, `token1()` and `tickSpacing()` in one round-trip where possible.
    async fn immutables(&self, pool: Address) -> ZapResult<PoolImmutables>;
}

/// Non-fungible position registry.
///
/// Calls are issued by the zap operator account; ownership checks are the registry's job.
#[async_trait]
pub trait PositionRegistry: Send + Sync {
    async fn mint(&self, request: MintRequest) -> ZapResult<MintResult>;

    async fn decrease_liquidity(
        &self,
        position_id: U256,
        liquidity: u128,
        amount0_min: U256,
        amount1_min: U256,
        deadline: u64,
    ) -> ZapResult<(U256, U256)>;

    async fn collect(
        &self,
        position_id: U256,
        recipient: Address,
        amount0_max: u128,
        amount1_max: u128,
    ) -> ZapResult<(U256, U256)>;

    /// Destroys an empty position (zero liquidity, nothing owed).
    async fn burn(&self, position_id: U256) -> ZapResult<()>;

    async fn owner_of(&self, position_id: U256) -> ZapResult<Address>;

    async fn positions(&self, position_id: U256) -> ZapResult<PositionInfo>;

    /// Moves a position between holders; fails unless the operator may move it.
    async fn transfer_from(&self, from: Address, to: Address, position_id: U256) -> ZapResult<()>;
}

/// One hop executed directly against a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleSwap {
    pub pool: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub tick_spacing: i32,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub recipient: Address,
    pub deadline: u64,
}

/// Swap execution. Output is observed by the caller through balance deltas.
#[async_trait]
pub trait SwapRouter: Send + Sync {
    async fn swap_single(&self, swap: SingleSwap) -> ZapResult<()>;

    /// Exact-input swap along an encoded `token | tickSpacing | token | ...` path.
    async fn swap_path(
        &self,
        path: Bytes,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
        deadline: u64,
    ) -> ZapResult<()>;
}

/// Off-chain quoting of an encoded path.
#[async_trait]
pub trait Quoter: Send + Sync {
    async fn quote_exact_input(&self, path: Bytes, amount_in: U256) -> ZapResult<U256>;
}

/// Staking/incentive contract holding positions on behalf of depositors.
#[async_trait]
pub trait IncentiveGauge: Send + Sync {
    /// Gauge registered for a pool, if incentives exist.
    async fn gauge_for_pool(&self, pool: Address) -> ZapResult<Option<Address>>;

    async fn deposit(&self, gauge: Address, position_id: U256) -> ZapResult<()>;

    async fn withdraw(&self, gauge: Address, position_id: U256) -> ZapResult<()>;

    async fn earned(&self, gauge: Address, account: Address, position_id: U256) -> ZapResult<U256>;

    /// Harvests accrued rewards of a position to its depositor.
    async fn get_reward(&self, gauge: Address, position_id: U256) -> ZapResult<()>;

    async fn reward_token(&self, gauge: Address) -> ZapResult<Address>;
}

/// Spot-rate oracle (`getRate(src, dst, connector, thresholdFilter)`).
///
/// `rate` is the amount of raw `dst` units per raw `src` unit scaled by 1e18. A zero rate or
/// weight means there is no liquidity through that connector. `connector = None` asks for the
/// direct quote.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_rate(
        &self,
        src: Address,
        dst: Address,
        connector: Option<Address>,
        threshold_filter: u32,
    ) -> ZapResult<(U256, U256)>;
}

/// ERC-20 balances. Transfers are sent from the operator account.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn balance_of(&self, token: Address, holder: Address) -> ZapResult<U256>;

    async fn decimals(&self, token: Address) -> ZapResult<u8>;

    async fn transfer(&self, token: Address, to: Address, amount: U256) -> ZapResult<()>;

    /// Pulls `amount` using the allowance `from` granted the operator.
    async fn transfer_from(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ZapResult<()>;
}

/// Opaque handle returned by [`StateCheckpoint::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointId(pub u64);

/// All-or-nothing execution support.
#[async_trait]
pub trait StateCheckpoint: Send + Sync {
    async fn checkpoint(&self) -> ZapResult<CheckpointId>;

    /// Discards every state change made since `id`.
    async fn revert_to(&self, id: CheckpointId) -> ZapResult<()>;

    /// Keeps every state change made since `id`.
    async fn commit(&self, id: CheckpointId) -> ZapResult<()>;
}

/// Time source for deadline checks (block timestamp on a live chain).
#[async_trait]
pub trait Clock: Send + Sync {
    async fn now(&self) -> ZapResult<u64>;
}

/// Every collaborator the lifecycle manager needs, plus the operator account it acts as.
#[derive(Clone)]
pub struct Collaborators {
    pub operator: Address,
    pub pool_registry: Arc<dyn PoolRegistry>,
    pub pool_reader: Arc<dyn PoolReader>,
    pub positions: Arc<dyn PositionRegistry>,
    pub router: Arc<dyn SwapRouter>,
    pub quoter: Option<Arc<dyn Quoter>>,
    pub gauges: Arc<dyn IncentiveGauge>,
    pub oracle: Arc<dyn PriceOracle>,
    pub tokens: Arc<dyn TokenLedger>,
    pub checkpoints: Arc<dyn StateCheckpoint>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Wires a single backend that implements every collaborator trait.
    pub fn from_backend<B>(backend: Arc<B>, operator: Address) -> Self
    where
        B: PoolRegistry
            + PoolReader
            + PositionRegistry
            + SwapRouter
            + Quoter
            + IncentiveGauge
            + PriceOracle
            + TokenLedger
            + StateCheckpoint
            + Clock
            + 'static,
    {
        Self {
            operator,
            pool_registry: backend.clone(),
            pool_reader: backend.clone(),
            positions: backend.clone(),
            router: backend.clone(),
            quoter: Some(backend.clone()),
            gauges: backend.clone(),
            oracle: backend.clone(),
            tokens: backend.clone(),
            checkpoints: backend.clone(),
            clock: backend,
        }
    }

    /// Drops the quoter so expected outputs come from pool-price projection.
    pub fn without_quoter(mut self) -> Self {
        self.quoter = None;
        self
    }
}
