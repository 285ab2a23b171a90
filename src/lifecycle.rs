//! # Position Lifecycle Manager
//!
//! Opens and closes concentrated-liquidity positions from a single deposit asset as atomic
//! operations.
//!
//! ## Open
//!
//! `Idle -> Funded -> Allocated -> Swapped -> Minted -> {Staked | Returned} -> Refunded`
//!
//! ## Close
//!
//! `Idle -> Unstaked? -> Collected -> LiquidityRemoved -> Burned -> SwappedBack -> Settled`
//!
//! ## Atomicity
//!
//! Caller input (deadline, amount, tick range, routes, authorization) is validated before any
//! value moves. The backend is then checkpointed; any failure after that reverts to the
//! checkpoint, so callers observe either the complete operation or nothing. Stake ledger
//! updates are staged during execution and applied only once the checkpoint is committed.
//!
//! ## Reentrancy
//!
//! `open`, `close` and `claim_rewards` share one lock. A call made while another is in
//! progress on the same manager (including a nested call triggered from inside a collaborator)
//! fails with [`ZapError::Reentrancy`].

use ethers::types::{Address, U256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::allocation::{Allocation, AllocationEngine};
use crate::collaborators::Collaborators;
use crate::errors::{ZapError, ZapResult};
use crate::metrics;
use crate::pool_state_cache::PoolStateCache;
use crate::price_feeds::{FallbackPolicy, UsdPriceResolver};
use crate::router::{RouteFinder, RoutePlan, SwapRoute};
use crate::settings::Settings;
use crate::staking_ledger::{
    InMemoryStakeLedger, StagedChange, StakedPositionRecord, StakedPositionStore,
};
use crate::swap_executor::{apply_slippage, SlippagePolicy, SwapExecutor};
use crate::types::{MintRequest, PoolImmutables, PoolState, PositionInfo};
use crate::v3_math::{get_amounts_for_liquidity, get_sqrt_ratio_at_tick, validate_tick_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStage {
    Idle,
    Funded,
    Allocated,
    Swapped,
    Minted,
    Staked,
    Returned,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStage {
    Idle,
    Unstaked,
    Collected,
    LiquidityRemoved,
    Burned,
    SwappedBack,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenParams {
    pub caller: Address,
    pub pool: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// Deposit-asset units pulled from the caller
    pub amount_in: U256,
    /// 0 selects the default; clamped to the configured maximum
    pub max_slippage_bps: u32,
    pub deadline: u64,
    pub stake: bool,
    /// Caller-supplied routes from the deposit asset into token0/token1
    pub route0: Option<SwapRoute>,
    pub route1: Option<SwapRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReceipt {
    pub position_id: U256,
    pub liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
    pub allocation: Allocation,
    /// Undeposited leftovers returned to the caller
    pub refund0: U256,
    pub refund1: U256,
    /// Gauge holding the position, when staked
    pub gauge: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPreview {
    pub pool: PoolImmutables,
    pub pool_state: PoolState,
    pub allocation: Allocation,
    pub routes: RoutePlan,
    /// Projected token amounts after swapping; `None` when the leg has no route
    pub expected0: Option<U256>,
    pub expected1: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseParams {
    pub caller: Address,
    pub position_id: U256,
    /// Floor on the deposit-asset total returned
    pub min_amount_out: U256,
    pub max_slippage_bps: u32,
    pub deadline: u64,
    /// Caller-supplied routes from token0/token1 back into the deposit asset
    pub route0: Option<SwapRoute>,
    pub route1: Option<SwapRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReceipt {
    /// Deposit-asset total transferred to the caller
    pub amount_out: U256,
    pub fees0: U256,
    pub fees1: U256,
    pub amount0_removed: U256,
    pub amount1_removed: U256,
    pub reward_token: Option<Address>,
    pub reward_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub reward_token: Address,
    pub amount: U256,
}

struct ReentrancyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReentrancyGuard<'a> {
    fn acquire(flag: &'a AtomicBool, operation: &'static str) -> ZapResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ZapError::Reentrancy(operation))?;
        Ok(Self { flag })
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct OpenContext {
    pool: PoolImmutables,
    gauge: Option<Address>,
    slippage_bps: u32,
}

struct CloseContext {
    info: PositionInfo,
    stake: Option<StakedPositionRecord>,
    slippage_bps: u32,
}

/// Runs zap open/close/claim sequences against one set of collaborators.
///
/// Every sequence checkpoints the whole backend state and reverts it on failure, so at most one
/// sequence may be in flight per manager. `open`, `close` and `claim_rewards` share a single
/// lock: a nested call from inside a collaborator and an independent concurrent caller on the
/// same manager are both rejected with [`ZapError::Reentrancy`] instead of waiting. Callers that
/// need parallel zaps use one manager (and one backend) per stream of work.
pub struct PositionLifecycleManager {
    collaborators: Collaborators,
    deposit_asset: Address,
    pools: Arc<PoolStateCache>,
    allocation: AllocationEngine,
    routes: Arc<RouteFinder>,
    swaps: SwapExecutor,
    stakes: Arc<dyn StakedPositionStore>,
    lock: AtomicBool,
}

impl PositionLifecycleManager {
    pub fn new(collaborators: Collaborators, settings: &Settings) -> Self {
        Self::with_store(collaborators, settings, Arc::new(InMemoryStakeLedger::new()))
    }

    pub fn with_store(
        collaborators: Collaborators,
        settings: &Settings,
        stakes: Arc<dyn StakedPositionStore>,
    ) -> Self {
        metrics::describe_metrics();

        let deposit_asset = settings.zap.deposit_asset;
        let pools = Arc::new(PoolStateCache::new(
            collaborators.pool_reader.clone(),
            settings.pool_cache.ttl(),
        ));
        let prices = Arc::new(UsdPriceResolver::new(
            collaborators.oracle.clone(),
            collaborators.tokens.clone(),
            deposit_asset,
            FallbackPolicy::new(settings.router.connectors.clone()),
            settings.zap.oracle_threshold_filter,
        ));
        let routes = Arc::new(RouteFinder::new(
            collaborators.pool_registry.clone(),
            deposit_asset,
            &settings.router,
        ));
        let swaps = SwapExecutor::new(
            collaborators.operator,
            collaborators.router.clone(),
            collaborators.quoter.clone(),
            collaborators.tokens.clone(),
            pools.clone(),
            SlippagePolicy::from_settings(&settings.zap),
        );

        Self {
            collaborators,
            deposit_asset,
            pools,
            allocation: AllocationEngine::new(prices),
            routes,
            swaps,
            stakes,
            lock: AtomicBool::new(false),
        }
    }

    pub fn deposit_asset(&self) -> Address {
        self.deposit_asset
    }

    pub fn route_finder(&self) -> &Arc<RouteFinder> {
        &self.routes
    }

    pub fn allocation_engine(&self) -> &AllocationEngine {
        &self.allocation
    }

    pub fn swap_executor(&self) -> &SwapExecutor {
        &self.swaps
    }

    pub fn pool_cache(&self) -> &Arc<PoolStateCache> {
        &self.pools
    }

    /// Beneficial owner of a position while the manager has it staked.
    pub fn beneficial_owner(&self, position_id: U256) -> Option<Address> {
        self.stakes.get(position_id).map(|r| r.beneficial_owner)
    }

    pub fn staked_positions_of(&self, owner: Address) -> Vec<U256> {
        self.stakes.positions_of(owner)
    }

    /// Rewards accrued to a staked position and not yet harvested. Zero when not staked.
    pub async fn pending_rewards(&self, position_id: U256) -> ZapResult<U256> {
        match self.stakes.get(position_id) {
            Some(record) => {
                self.collaborators
                    .gauges
                    .earned(record.gauge, self.collaborators.operator, position_id)
                    .await
            }
            None => Ok(U256::zero()),
        }
    }

    async fn ensure_not_expired(&self, deadline: u64) -> ZapResult<()> {
        let now = self.collaborators.clock.now().await?;
        if now > deadline {
            return Err(ZapError::ExpiredDeadline { deadline, now });
        }
        Ok(())
    }

    /// Dry run of [`PositionLifecycleManager::open`]: allocation, routes and projected amounts.
    pub async fn preview_open(
        &self,
        pool: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount_in: U256,
    ) -> ZapResult<OpenPreview> {
        let immutables = self.pools.immutables(pool).await?;
        validate_tick_range(tick_lower, tick_upper, immutables.tick_spacing)?;
        let pool_state = self.pools.slot0(pool).await?;
        let allocation = self
            .allocation
            .allocate(
                amount_in,
                immutables.token0,
                immutables.token1,
                tick_lower,
                tick_upper,
                pool_state,
            )
            .await?;
        let routes = self
            .routes
            .find_route_for_open(immutables.token0, immutables.token1, pool, immutables.tick_spacing)
            .await?;

        let mut expected = [None, None];
        for (leg, asset) in [immutables.token0, immutables.token1].into_iter().enumerate() {
            let value = if leg == 0 { allocation.value0 } else { allocation.value1 };
            expected[leg] = if asset == self.deposit_asset {
                Some(value)
            } else if value.is_zero() {
                Some(U256::zero())
            } else if let Some(route) = routes.leg(leg).route() {
                Some(self.swaps.expected_output(route, value).await?.amount)
            } else {
                None
            };
        }

        Ok(OpenPreview {
            pool: immutables,
            pool_state,
            allocation,
            routes,
            expected0: expected[0],
            expected1: expected[1],
        })
    }

    /// Deposits `amount_in` of the deposit asset into a new position over
    /// `[tick_lower, tick_upper]` of `pool`, staked or handed to the caller.
    #[instrument(
        skip(self, params),
        fields(op_id = %Uuid::new_v4(), caller = ?params.caller, pool = ?params.pool)
    )]
    pub async fn open(&self, params: OpenParams) -> ZapResult<OpenReceipt> {
        let _guard = ReentrancyGuard::acquire(&self.lock, "open")?;
        let started = Instant::now();

        let ctx = match self.validate_open(&params).await {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.abort("open", OpenStage::Idle, e)),
        };

        let checkpoint = self.collaborators.checkpoints.checkpoint().await?;
        let mut stage = OpenStage::Idle;
        match self.execute_open(&params, &ctx, &mut stage).await {
            Ok((receipt, staged)) => {
                self.collaborators.checkpoints.commit(checkpoint).await?;
                for change in staged {
                    change.apply(self.stakes.as_ref());
                }
                metrics::increment_operation("open");
                metrics::record_operation_duration("open", started.elapsed());
                info!(
                    position_id = %receipt.position_id,
                    liquidity = receipt.liquidity,
                    staked = receipt.gauge.is_some(),
                    "position opened"
                );
                Ok(receipt)
            }
            Err(e) => {
                if let Err(revert_err) = self.collaborators.checkpoints.revert_to(checkpoint).await {
                    error!("Failed to revert open checkpoint: {}", revert_err);
                }
                Err(self.abort("open", stage, e))
            }
        }
    }

    async fn validate_open(&self, params: &OpenParams) -> ZapResult<OpenContext> {
        self.ensure_not_expired(params.deadline).await?;
        if params.amount_in.is_zero() {
            return Err(ZapError::ZeroAmount);
        }

        let pool = self.pools.immutables(params.pool).await?;
        validate_tick_range(params.tick_lower, params.tick_upper, pool.tick_spacing)?;

        if let Some(route) = &params.route0 {
            route.validate_endpoints(self.deposit_asset, pool.token0)?;
        }
        if let Some(route) = &params.route1 {
            route.validate_endpoints(self.deposit_asset, pool.token1)?;
        }

        let gauge = if params.stake {
            Some(
                self.collaborators
                    .gauges
                    .gauge_for_pool(params.pool)
                    .await?
                    .ok_or(ZapError::NoGauge(params.pool))?,
            )
        } else {
            None
        };

        Ok(OpenContext {
            pool,
            gauge,
            slippage_bps: self.swaps.slippage().effective_bps(params.max_slippage_bps),
        })
    }

    async fn execute_open(
        &self,
        params: &OpenParams,
        ctx: &OpenContext,
        stage: &mut OpenStage,
    ) -> ZapResult<(OpenReceipt, Vec<StagedChange>)> {
        let c = &self.collaborators;
        let pool = &ctx.pool;
        let mut staged = Vec::new();

        c.tokens
            .transfer_from(self.deposit_asset, params.caller, c.operator, params.amount_in)
            .await?;
        *stage = OpenStage::Funded;

        let pool_state = self.pools.slot0(params.pool).await?;
        let allocation = self
            .allocation
            .allocate(
                params.amount_in,
                pool.token0,
                pool.token1,
                params.tick_lower,
                params.tick_upper,
                pool_state,
            )
            .await?;
        *stage = OpenStage::Allocated;
        debug!(value0 = %allocation.value0, value1 = %allocation.value1, "allocated");

        let caller_routes = [params.route0.as_ref(), params.route1.as_ref()];
        let assets = [pool.token0, pool.token1];
        let values = [allocation.value0, allocation.value1];
        let needs_finder = (0..2).any(|leg| {
            assets[leg] != self.deposit_asset && !values[leg].is_zero() && caller_routes[leg].is_none()
        });
        let plan = if needs_finder {
            Some(
                self.routes
                    .find_route_for_open(pool.token0, pool.token1, params.pool, pool.tick_spacing)
                    .await?,
            )
        } else {
            None
        };

        let mut amounts = [U256::zero(), U256::zero()];
        for leg in 0..2 {
            if assets[leg] == self.deposit_asset {
                amounts[leg] = values[leg];
                continue;
            }
            if values[leg].is_zero() {
                continue;
            }
            let route = caller_routes[leg]
                .or_else(|| plan.as_ref().and_then(|p| p.leg(leg).route()))
                .ok_or(ZapError::NoRoute {
                    from: self.deposit_asset,
                    to: assets[leg],
                })?;
            let outcome = self
                .swaps
                .swap(route, values[leg], ctx.slippage_bps, params.deadline)
                .await?;
            amounts[leg] = outcome.amount_out;
        }
        *stage = OpenStage::Swapped;

        let minted = c
            .positions
            .mint(MintRequest {
                token0: pool.token0,
                token1: pool.token1,
                tick_spacing: pool.tick_spacing,
                tick_lower: params.tick_lower,
                tick_upper: params.tick_upper,
                amount0_desired: amounts[0],
                amount1_desired: amounts[1],
                amount0_min: apply_slippage(amounts[0], ctx.slippage_bps),
                amount1_min: apply_slippage(amounts[1], ctx.slippage_bps),
                recipient: c.operator,
                deadline: params.deadline,
            })
            .await?;
        *stage = OpenStage::Minted;
        debug!(position_id = %minted.position_id, liquidity = minted.liquidity, "minted");

        match ctx.gauge {
            Some(gauge) => {
                c.gauges.deposit(gauge, minted.position_id).await?;
                staged.push(StagedChange::Record(
                    minted.position_id,
                    StakedPositionRecord {
                        beneficial_owner: params.caller,
                        gauge,
                    },
                ));
                *stage = OpenStage::Staked;
            }
            None => {
                c.positions
                    .transfer_from(c.operator, params.caller, minted.position_id)
                    .await?;
                *stage = OpenStage::Returned;
            }
        }

        let refund0 = amounts[0].saturating_sub(minted.amount0);
        let refund1 = amounts[1].saturating_sub(minted.amount1);
        for (token, refund) in [(pool.token0, refund0), (pool.token1, refund1)] {
            if !refund.is_zero() {
                c.tokens.transfer(token, params.caller, refund).await?;
            }
        }
        *stage = OpenStage::Refunded;

        Ok((
            OpenReceipt {
                position_id: minted.position_id,
                liquidity: minted.liquidity,
                amount0: minted.amount0,
                amount1: minted.amount1,
                allocation,
                refund0,
                refund1,
                gauge: ctx.gauge,
            },
            staged,
        ))
    }

    /// Unwinds a position (staked or held by the caller) back into the deposit asset.
    #[instrument(
        skip(self, params),
        fields(op_id = %Uuid::new_v4(), caller = ?params.caller, position_id = %params.position_id)
    )]
    pub async fn close(&self, params: CloseParams) -> ZapResult<CloseReceipt> {
        let _guard = ReentrancyGuard::acquire(&self.lock, "close")?;
        let started = Instant::now();

        let ctx = match self.validate_close(&params).await {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.abort("close", CloseStage::Idle, e)),
        };

        let checkpoint = self.collaborators.checkpoints.checkpoint().await?;
        let mut stage = CloseStage::Idle;
        match self.execute_close(&params, &ctx, &mut stage).await {
            Ok((receipt, staged)) => {
                self.collaborators.checkpoints.commit(checkpoint).await?;
                for change in staged {
                    change.apply(self.stakes.as_ref());
                }
                metrics::increment_operation("close");
                metrics::record_operation_duration("close", started.elapsed());
                info!(
                    amount_out = %receipt.amount_out,
                    reward = %receipt.reward_amount,
                    "position closed"
                );
                Ok(receipt)
            }
            Err(e) => {
                if let Err(revert_err) = self.collaborators.checkpoints.revert_to(checkpoint).await {
                    error!("Failed to revert close checkpoint: {}", revert_err);
                }
                Err(self.abort("close", stage, e))
            }
        }
    }

    async fn validate_close(&self, params: &CloseParams) -> ZapResult<CloseContext> {
        self.ensure_not_expired(params.deadline).await?;

        let stake = self.stakes.get(params.position_id);
        match stake {
            Some(record) if record.beneficial_owner != params.caller => {
                return Err(ZapError::NotBeneficialOwner {
                    caller: params.caller,
                    position_id: params.position_id,
                });
            }
            Some(_) => {}
            None => {
                let owner = self.collaborators.positions.owner_of(params.position_id).await?;
                if owner != params.caller {
                    return Err(ZapError::Unauthorized {
                        caller: params.caller,
                        position_id: params.position_id,
                    });
                }
            }
        }

        let info = self.collaborators.positions.positions(params.position_id).await?;
        if let Some(route) = &params.route0 {
            route.validate_endpoints(info.token0, self.deposit_asset)?;
        }
        if let Some(route) = &params.route1 {
            route.validate_endpoints(info.token1, self.deposit_asset)?;
        }

        Ok(CloseContext {
            info,
            stake,
            slippage_bps: self.swaps.slippage().effective_bps(params.max_slippage_bps),
        })
    }

    async fn execute_close(
        &self,
        params: &CloseParams,
        ctx: &CloseContext,
        stage: &mut CloseStage,
    ) -> ZapResult<(CloseReceipt, Vec<StagedChange>)> {
        let c = &self.collaborators;
        let id = params.position_id;
        let info = &ctx.info;
        let mut staged = Vec::new();

        let mut reward = None;
        match ctx.stake {
            Some(record) => {
                let reward_token = c.gauges.reward_token(record.gauge).await?;
                let before = c.tokens.balance_of(reward_token, c.operator).await?;
                c.gauges.get_reward(record.gauge, id).await?;
                c.gauges.withdraw(record.gauge, id).await?;
                let after = c.tokens.balance_of(reward_token, c.operator).await?;
                reward = Some((reward_token, after.saturating_sub(before)));
                staged.push(StagedChange::Clear(id));
                *stage = CloseStage::Unstaked;
            }
            None => {
                c.positions.transfer_from(params.caller, c.operator, id).await?;
            }
        }

        let (fees0, fees1) = c.positions.collect(id, c.operator, u128::MAX, u128::MAX).await?;
        *stage = CloseStage::Collected;

        let (mut removed0, mut removed1) = (U256::zero(), U256::zero());
        if info.liquidity > 0 {
            let pool = c
                .pool_registry
                .get_pool(info.token0, info.token1, info.tick_spacing)
                .await?
                .ok_or_else(|| ZapError::backend(format!("no pool for position {}", id)))?;
            let state = self.pools.slot0(pool).await?;
            let (expected0, expected1) = get_amounts_for_liquidity(
                state.sqrt_price_x96,
                get_sqrt_ratio_at_tick(info.tick_lower)?,
                get_sqrt_ratio_at_tick(info.tick_upper)?,
                U256::from(info.liquidity),
                false,
            )?;
            c.positions
                .decrease_liquidity(
                    id,
                    info.liquidity,
                    apply_slippage(expected0, ctx.slippage_bps),
                    apply_slippage(expected1, ctx.slippage_bps),
                    params.deadline,
                )
                .await?;
            let collected = c.positions.collect(id, c.operator, u128::MAX, u128::MAX).await?;
            removed0 = collected.0;
            removed1 = collected.1;
        }
        *stage = CloseStage::LiquidityRemoved;

        c.positions.burn(id).await?;
        *stage = CloseStage::Burned;

        let assets = [info.token0, info.token1];
        let amounts = [fees0 + removed0, fees1 + removed1];
        let caller_routes = [params.route0.as_ref(), params.route1.as_ref()];
        let needs_finder = (0..2).any(|leg| {
            assets[leg] != self.deposit_asset && !amounts[leg].is_zero() && caller_routes[leg].is_none()
        });
        let plan = if needs_finder {
            Some(self.routes.find_route_for_close(info.token0, info.token1).await?)
        } else {
            None
        };

        let mut total = U256::zero();
        for leg in 0..2 {
            if assets[leg] == self.deposit_asset {
                total += amounts[leg];
                continue;
            }
            if amounts[leg].is_zero() {
                continue;
            }
            let route = caller_routes[leg]
                .or_else(|| plan.as_ref().and_then(|p| p.leg(leg).route()))
                .ok_or(ZapError::NoRoute {
                    from: assets[leg],
                    to: self.deposit_asset,
                })?;
            let outcome = self
                .swaps
                .swap(route, amounts[leg], ctx.slippage_bps, params.deadline)
                .await?;
            total += outcome.amount_out;
        }
        *stage = CloseStage::SwappedBack;

        if total < params.min_amount_out {
            return Err(ZapError::InsufficientOutput {
                actual: total,
                minimum: params.min_amount_out,
            });
        }

        if !total.is_zero() {
            c.tokens.transfer(self.deposit_asset, params.caller, total).await?;
        }
        if let Some((reward_token, amount)) = reward {
            if !amount.is_zero() {
                c.tokens.transfer(reward_token, params.caller, amount).await?;
            }
        }
        *stage = CloseStage::Settled;

        Ok((
            CloseReceipt {
                amount_out: total,
                fees0,
                fees1,
                amount0_removed: removed0,
                amount1_removed: removed1,
                reward_token: reward.map(|(token, _)| token),
                reward_amount: reward.map(|(_, amount)| amount).unwrap_or_default(),
            },
            staged,
        ))
    }

    /// Harvests the incentive rewards of a staked position to its beneficial owner.
    #[instrument(skip(self), fields(op_id = %Uuid::new_v4()))]
    pub async fn claim_rewards(
        &self,
        caller: Address,
        position_id: U256,
        deadline: u64,
    ) -> ZapResult<ClaimReceipt> {
        let _guard = ReentrancyGuard::acquire(&self.lock, "claim_rewards")?;

        let record = match self.validate_claim(caller, position_id, deadline).await {
            Ok(record) => record,
            Err(e) => return Err(self.abort("claim", CloseStage::Idle, e)),
        };

        let c = &self.collaborators;
        let checkpoint = c.checkpoints.checkpoint().await?;
        let result = async {
            let reward_token = c.gauges.reward_token(record.gauge).await?;
            let before = c.tokens.balance_of(reward_token, c.operator).await?;
            c.gauges.get_reward(record.gauge, position_id).await?;
            let after = c.tokens.balance_of(reward_token, c.operator).await?;
            let amount = after.saturating_sub(before);
            if !amount.is_zero() {
                c.tokens.transfer(reward_token, caller, amount).await?;
            }
            Ok(ClaimReceipt { reward_token, amount })
        }
        .await;

        match result {
            Ok(receipt) => {
                c.checkpoints.commit(checkpoint).await?;
                metrics::increment_operation("claim");
                info!(amount = %receipt.amount, "rewards claimed");
                Ok(receipt)
            }
            Err(e) => {
                if let Err(revert_err) = c.checkpoints.revert_to(checkpoint).await {
                    error!("Failed to revert claim checkpoint: {}", revert_err);
                }
                Err(self.abort("claim", CloseStage::Idle, e))
            }
        }
    }

    async fn validate_claim(
        &self,
        caller: Address,
        position_id: U256,
        deadline: u64,
    ) -> ZapResult<StakedPositionRecord> {
        self.ensure_not_expired(deadline).await?;
        match self.stakes.get(position_id) {
            Some(record) if record.beneficial_owner == caller => Ok(record),
            _ => Err(ZapError::NotBeneficialOwner { caller, position_id }),
        }
    }

    fn abort<S: std::fmt::Debug>(&self, operation: &'static str, stage: S, err: ZapError) -> ZapError {
        warn!(?stage, kind = err.kind().as_str(), "{} aborted: {}", operation, err);
        metrics::increment_abort(operation, err.kind().as_str());
        err
    }
}
