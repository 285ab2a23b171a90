//! # Simulated Chain
//!
//! In-memory implementation of every collaborator trait, for tests and offline planning.
//!
//! - ERC-20 balances and allowances
//! - Pools that swap at their current price minus a fee, paying out of their own balances
//! - A pool registry keyed by canonical pair and tick spacing
//! - Position NFTs with exact concentrated-liquidity amount math
//! - Incentive gauges with manually accrued rewards
//! - A rate oracle keyed by `(src, dst, connector)`
//! - A settable clock
//! - Checkpoints as a stack of full state copies
//!
//! Failures can be injected at any collaborator call with [`SimulatedChain::fail_next`].

mod backend;

use ethers::types::{Address, U256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::collaborators::CheckpointId;
use crate::errors::{ZapError, ZapResult};
use crate::types::{canonical_pair, PositionInfo};
use crate::v3_math::get_sqrt_ratio_at_tick;

/// Collaborator calls that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    TokenTransfer,
    TokenTransferFrom,
    Swap,
    Quote,
    Mint,
    DecreaseLiquidity,
    Collect,
    Burn,
    PositionTransfer,
    GaugeDeposit,
    GaugeWithdraw,
    GetReward,
    Oracle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPool {
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    /// Swap fee in hundredths of a bip (1e-6)
    pub fee_pips: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPosition {
    pub owner: Address,
    pub pool: Address,
    pub info: PositionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimGauge {
    pub pool: Address,
    pub reward_token: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimStake {
    pub gauge: Address,
    pub depositor: Address,
    pub rewards: U256,
}

/// Everything a checkpoint captures. Comparable, so tests can assert "nothing changed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimState {
    pub balances: HashMap<(Address, Address), U256>,
    pub allowances: HashMap<(Address, Address, Address), U256>,
    pub nft_approvals: HashSet<(Address, Address)>,
    pub decimals: HashMap<Address, u8>,
    pub pools: HashMap<Address, SimPool>,
    pub registry: HashMap<(Address, Address, i32), Address>,
    pub positions: HashMap<U256, SimPosition>,
    pub next_position_id: u64,
    pub gauges: HashMap<Address, SimGauge>,
    pub stakes: HashMap<U256, SimStake>,
    pub rates: HashMap<(Address, Address, Option<Address>), (U256, U256)>,
}

impl SimState {
    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        *self.balances.entry((token, holder)).or_default() += amount;
    }

    fn debit(&mut self, token: Address, holder: Address, amount: U256) -> ZapResult<()> {
        let balance = self.balance(token, holder);
        if balance < amount {
            return Err(ZapError::backend(format!(
                "ERC20: transfer amount exceeds balance ({:?} holds {} of {:?}, needs {})",
                holder, balance, token, amount
            )));
        }
        self.balances.insert((token, holder), balance - amount);
        Ok(())
    }

    fn move_tokens(&mut self, token: Address, from: Address, to: Address, amount: U256) -> ZapResult<()> {
        self.debit(token, from, amount)?;
        self.credit(token, to, amount);
        Ok(())
    }

    fn pool(&self, pool: Address) -> ZapResult<&SimPool> {
        self.pools
            .get(&pool)
            .ok_or_else(|| ZapError::backend(format!("unknown pool {:?}", pool)))
    }

    fn position_mut(&mut self, position_id: U256) -> ZapResult<&mut SimPosition> {
        self.positions
            .get_mut(&position_id)
            .ok_or_else(|| ZapError::backend(format!("ERC721: invalid token ID {}", position_id)))
    }
}

/// In-memory chain acting on behalf of one operator account.
pub struct SimulatedChain {
    operator: Address,
    state: Mutex<SimState>,
    checkpoints: Mutex<Vec<(CheckpointId, SimState)>>,
    next_checkpoint: AtomicU64,
    next_address: AtomicU64,
    now: AtomicU64,
    armed: Mutex<HashSet<FailPoint>>,
}

impl SimulatedChain {
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            state: Mutex::new(SimState {
                next_position_id: 1,
                ..SimState::default()
            }),
            checkpoints: Mutex::new(Vec::new()),
            next_checkpoint: AtomicU64::new(1),
            next_address: AtomicU64::new(1),
            now: AtomicU64::new(1_700_000_000),
            armed: Mutex::new(HashSet::new()),
        }
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    fn state(&self) -> ZapResult<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| ZapError::backend("simulation state lock poisoned"))
    }

    fn fresh_address(&self) -> Address {
        let n = self.next_address.fetch_add(1, Ordering::Relaxed);
        Address::from_low_u64_be(0x5151_0000_0000 + n)
    }

    /// Makes the next call at `point` fail with a backend error.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.insert(point);
        }
    }

    fn trip(&self, point: FailPoint) -> ZapResult<()> {
        let fired = self
            .armed
            .lock()
            .map(|mut armed| armed.remove(&point))
            .unwrap_or(false);
        if fired {
            return Err(ZapError::backend(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    pub fn set_time(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::Relaxed);
    }

    /// Copy of the full state, for before/after comparisons.
    pub fn snapshot(&self) -> ZapResult<SimState> {
        Ok(self.state()?.clone())
    }

    pub fn open_checkpoints(&self) -> usize {
        self.checkpoints.lock().map(|c| c.len()).unwrap_or(0)
    }

    // ----- tokens -----

    /// Registers a token with the given decimals and returns its address.
    pub fn create_token(&self, decimals: u8) -> ZapResult<Address> {
        let token = self.fresh_address();
        self.state()?.decimals.insert(token, decimals);
        Ok(token)
    }

    pub fn mint_tokens(&self, token: Address, holder: Address, amount: U256) -> ZapResult<()> {
        self.state()?.credit(token, holder, amount);
        Ok(())
    }

    pub fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> ZapResult<()> {
        self.state()?.allowances.insert((token, owner, spender), amount);
        Ok(())
    }

    pub fn balance(&self, token: Address, holder: Address) -> ZapResult<U256> {
        Ok(self.state()?.balance(token, holder))
    }

    /// `setApprovalForAll(operator, true)` on the position registry.
    pub fn approve_positions(&self, owner: Address, operator: Address) -> ZapResult<()> {
        self.state()?.nft_approvals.insert((owner, operator));
        Ok(())
    }

    // ----- pools -----

    /// Creates and registers a pool at `tick` and returns its address.
    pub fn create_pool(
        &self,
        token_a: Address,
        token_b: Address,
        tick_spacing: i32,
        tick: i32,
        fee_pips: u32,
    ) -> ZapResult<Address> {
        let (token0, token1) = canonical_pair(token_a, token_b);
        let sqrt_price_x96 = get_sqrt_ratio_at_tick(tick)?;
        let pool = self.fresh_address();
        let mut state = self.state()?;
        if state.registry.contains_key(&(token0, token1, tick_spacing)) {
            return Err(ZapError::backend("pool already exists"));
        }
        state.pools.insert(
            pool,
            SimPool {
                token0,
                token1,
                tick_spacing,
                sqrt_price_x96,
                tick,
                fee_pips,
            },
        );
        state.registry.insert((token0, token1, tick_spacing), pool);
        Ok(pool)
    }

    /// Gives a pool reserves to pay swaps and withdrawals from.
    pub fn seed_pool(&self, pool: Address, amount0: U256, amount1: U256) -> ZapResult<()> {
        let mut state = self.state()?;
        let (token0, token1) = {
            let p = state.pool(pool)?;
            (p.token0, p.token1)
        };
        state.credit(token0, pool, amount0);
        state.credit(token1, pool, amount1);
        Ok(())
    }

    pub fn set_pool_tick(&self, pool: Address, tick: i32) -> ZapResult<()> {
        let sqrt_price_x96 = get_sqrt_ratio_at_tick(tick)?;
        let mut state = self.state()?;
        let p = state
            .pools
            .get_mut(&pool)
            .ok_or_else(|| ZapError::backend("unknown pool"))?;
        p.tick = tick;
        p.sqrt_price_x96 = sqrt_price_x96;
        Ok(())
    }

    pub fn set_pool_fee(&self, pool: Address, fee_pips: u32) -> ZapResult<()> {
        let mut state = self.state()?;
        let p = state
            .pools
            .get_mut(&pool)
            .ok_or_else(|| ZapError::backend("unknown pool"))?;
        p.fee_pips = fee_pips;
        Ok(())
    }

    // ----- positions -----

    pub fn position(&self, position_id: U256) -> ZapResult<Option<SimPosition>> {
        Ok(self.state()?.positions.get(&position_id).cloned())
    }

    /// Credits swap fees to a position, paid out of freshly minted pool reserves.
    pub fn accrue_fees(&self, position_id: U256, amount0: U256, amount1: U256) -> ZapResult<()> {
        let mut state = self.state()?;
        let (pool, token0, token1) = {
            let p = state.position_mut(position_id)?;
            p.info.tokens_owed0 = p.info.tokens_owed0.saturating_add(amount0.low_u128());
            p.info.tokens_owed1 = p.info.tokens_owed1.saturating_add(amount1.low_u128());
            (p.pool, p.info.token0, p.info.token1)
        };
        state.credit(token0, pool, amount0);
        state.credit(token1, pool, amount1);
        Ok(())
    }

    // ----- gauges -----

    pub fn create_gauge(&self, pool: Address, reward_token: Address) -> ZapResult<Address> {
        let gauge = self.fresh_address();
        self.state()?
            .gauges
            .insert(gauge, SimGauge { pool, reward_token });
        Ok(gauge)
    }

    /// Accrues rewards to a staked position, funding the gauge.
    pub fn accrue_rewards(&self, position_id: U256, amount: U256) -> ZapResult<()> {
        let mut state = self.state()?;
        let gauge = {
            let stake = state
                .stakes
                .get_mut(&position_id)
                .ok_or_else(|| ZapError::backend("position not staked"))?;
            stake.rewards += amount;
            stake.gauge
        };
        let reward_token = state
            .gauges
            .get(&gauge)
            .map(|g| g.reward_token)
            .ok_or_else(|| ZapError::backend("unknown gauge"))?;
        state.credit(reward_token, gauge, amount);
        Ok(())
    }

    // ----- oracle -----

    /// `rate` is WAD-scaled raw `dst` per raw `src`.
    pub fn set_rate(
        &self,
        src: Address,
        dst: Address,
        connector: Option<Address>,
        rate: U256,
        weight: U256,
    ) -> ZapResult<()> {
        self.state()?.rates.insert((src, dst, connector), (rate, weight));
        Ok(())
    }

    // ----- checkpoints -----

    fn push_checkpoint(&self) -> ZapResult<CheckpointId> {
        let copy = self.state()?.clone();
        let id = CheckpointId(self.next_checkpoint.fetch_add(1, Ordering::Relaxed));
        self.checkpoints
            .lock()
            .map_err(|_| ZapError::backend("checkpoint lock poisoned"))?
            .push((id, copy));
        Ok(id)
    }

    fn pop_checkpoint(&self, id: CheckpointId, restore: bool) -> ZapResult<()> {
        let mut stack = self
            .checkpoints
            .lock()
            .map_err(|_| ZapError::backend("checkpoint lock poisoned"))?;
        let position = stack
            .iter()
            .position(|(cp, _)| *cp == id)
            .ok_or_else(|| ZapError::backend(format!("unknown checkpoint {:?}", id)))?;
        // later checkpoints are discarded with this one
        let saved = stack.drain(position..).next().map(|(_, state)| state);
        drop(stack);
        if let (true, Some(saved)) = (restore, saved) {
            *self.state()? = saved;
        }
        Ok(())
    }
}
