use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

use super::{FailPoint, SimPosition, SimStake, SimState, SimulatedChain};
use crate::collaborators::{
    CheckpointId, Clock, IncentiveGauge, PoolReader, PoolRegistry, PositionRegistry, PriceOracle,
    Quoter, SingleSwap, StateCheckpoint, SwapRouter, TokenLedger,
};
use crate::errors::{ZapError, ZapResult};
use crate::router::SwapRoute;
use crate::types::{canonical_pair, MintRequest, MintResult, PoolImmutables, PoolState, PositionInfo};
use crate::v3_math::{
    get_amounts_for_liquidity, get_liquidity_for_amounts, get_sqrt_ratio_at_tick, mul_div,
    quote_at_sqrt_price, to_liquidity, validate_tick_range,
};

const FEE_DENOMINATOR: u64 = 1_000_000;

impl SimState {
    /// Output of one hop at the pool's price, net of the pool fee.
    fn hop_output(&self, pool: Address, token_in: Address, amount_in: U256) -> ZapResult<(Address, U256)> {
        let p = self.pool(pool)?;
        let (zero_for_one, token_out) = if token_in == p.token0 {
            (true, p.token1)
        } else if token_in == p.token1 {
            (false, p.token0)
        } else {
            return Err(ZapError::backend(format!("{:?} not in pool {:?}", token_in, pool)));
        };
        let fee = mul_div(amount_in, U256::from(p.fee_pips), U256::from(FEE_DENOMINATOR))?;
        let out = quote_at_sqrt_price(amount_in - fee, p.sqrt_price_x96, zero_for_one)?;
        Ok((token_out, out))
    }

    fn execute_hop(
        &mut self,
        pool: Address,
        payer: Address,
        token_in: Address,
        amount_in: U256,
        recipient: Address,
    ) -> ZapResult<(Address, U256)> {
        let (token_out, out) = self.hop_output(pool, token_in, amount_in)?;
        self.move_tokens(token_in, payer, pool, amount_in)?;
        self.move_tokens(token_out, pool, recipient, out)
            .map_err(|_| ZapError::backend(format!("pool {:?} lacks liquidity", pool)))?;
        Ok((token_out, out))
    }

    /// Resolves an encoded path into pools via the registry.
    fn path_pools(&self, path: &[u8]) -> ZapResult<Vec<(Address, Address)>> {
        let (tokens, spacings) = SwapRoute::decode_path(path)?;
        tokens
            .windows(2)
            .zip(spacings)
            .map(|(pair, spacing)| {
                let (t0, t1) = canonical_pair(pair[0], pair[1]);
                self.registry
                    .get(&(t0, t1, spacing))
                    .map(|pool| (*pool, pair[0]))
                    .ok_or_else(|| ZapError::backend("path pool not found"))
            })
            .collect()
    }

    fn require_position_operator(&self, position: &SimPosition, operator: Address) -> ZapResult<()> {
        if position.owner == operator || self.nft_approvals.contains(&(position.owner, operator)) {
            Ok(())
        } else {
            Err(ZapError::backend("Not approved"))
        }
    }
}

impl SimulatedChain {
    fn check_deadline(&self, deadline: u64) -> ZapResult<()> {
        if self.now() > deadline {
            return Err(ZapError::backend("Transaction too old"));
        }
        Ok(())
    }
}

#[async_trait]
impl PoolRegistry for SimulatedChain {
    async fn get_pool(
        &self,
        asset_a: Address,
        asset_b: Address,
        tick_spacing: i32,
    ) -> ZapResult<Option<Address>> {
        let (token0, token1) = canonical_pair(asset_a, asset_b);
        Ok(self.state()?.registry.get(&(token0, token1, tick_spacing)).copied())
    }
}

#[async_trait]
impl PoolReader for SimulatedChain {
    async fn slot0(&self, pool: Address) -> ZapResult<PoolState> {
        let state = self.state()?;
        let p = state.pool(pool)?;
        Ok(PoolState {
            sqrt_price_x96: p.sqrt_price_x96,
            tick: p.tick,
        })
    }

    async fn immutables(&self, pool: Address) -> ZapResult<PoolImmutables> {
        let state = self.state()?;
        let p = state.pool(pool)?;
        Ok(PoolImmutables {
            address: pool,
            token0: p.token0,
            token1: p.token1,
            tick_spacing: p.tick_spacing,
        })
    }
}

#[async_trait]
impl PositionRegistry for SimulatedChain {
    async fn mint(&self, request: MintRequest) -> ZapResult<MintResult> {
        self.trip(FailPoint::Mint)?;
        self.check_deadline(request.deadline)?;
        let operator = self.operator;
        let mut state = self.state()?;

        if request.token0 >= request.token1 {
            return Err(ZapError::backend("tokens not sorted"));
        }
        let pool = *state
            .registry
            .get(&(request.token0, request.token1, request.tick_spacing))
            .ok_or_else(|| ZapError::backend("pool does not exist"))?;
        validate_tick_range(request.tick_lower, request.tick_upper, request.tick_spacing)?;

        let sqrt_price = state.pool(pool)?.sqrt_price_x96;
        let sqrt_lower = get_sqrt_ratio_at_tick(request.tick_lower)?;
        let sqrt_upper = get_sqrt_ratio_at_tick(request.tick_upper)?;
        let liquidity = get_liquidity_for_amounts(
            sqrt_price,
            sqrt_lower,
            sqrt_upper,
            request.amount0_desired,
            request.amount1_desired,
        )?;
        if liquidity.is_zero() {
            return Err(ZapError::backend("zero liquidity"));
        }
        let (amount0, amount1) =
            get_amounts_for_liquidity(sqrt_price, sqrt_lower, sqrt_upper, liquidity, true)?;
        if amount0 < request.amount0_min || amount1 < request.amount1_min {
            return Err(ZapError::backend("Price slippage check"));
        }

        state.move_tokens(request.token0, operator, pool, amount0)?;
        state.move_tokens(request.token1, operator, pool, amount1)?;

        let position_id = U256::from(state.next_position_id);
        state.next_position_id += 1;
        let liquidity = to_liquidity(liquidity)?;
        state.positions.insert(
            position_id,
            SimPosition {
                owner: request.recipient,
                pool,
                info: PositionInfo {
                    token0: request.token0,
                    token1: request.token1,
                    tick_spacing: request.tick_spacing,
                    tick_lower: request.tick_lower,
                    tick_upper: request.tick_upper,
                    liquidity,
                    tokens_owed0: 0,
                    tokens_owed1: 0,
                },
            },
        );

        Ok(MintResult {
            position_id,
            liquidity,
            amount0,
            amount1,
        })
    }

    async fn decrease_liquidity(
        &self,
        position_id: U256,
        liquidity: u128,
        amount0_min: U256,
        amount1_min: U256,
        deadline: u64,
    ) -> ZapResult<(U256, U256)> {
        self.trip(FailPoint::DecreaseLiquidity)?;
        self.check_deadline(deadline)?;
        let operator = self.operator;
        let mut state = self.state()?;

        let position = state.position_mut(position_id)?.clone();
        state.require_position_operator(&position, operator)?;
        if liquidity > position.info.liquidity {
            return Err(ZapError::backend("liquidity exceeds position"));
        }

        let sqrt_price = state.pool(position.pool)?.sqrt_price_x96;
        let (amount0, amount1) = get_amounts_for_liquidity(
            sqrt_price,
            get_sqrt_ratio_at_tick(position.info.tick_lower)?,
            get_sqrt_ratio_at_tick(position.info.tick_upper)?,
            U256::from(liquidity),
            false,
        )?;
        if amount0 < amount0_min || amount1 < amount1_min {
            return Err(ZapError::backend("Price slippage check"));
        }

        let p = state.position_mut(position_id)?;
        p.info.liquidity -= liquidity;
        p.info.tokens_owed0 = p.info.tokens_owed0.saturating_add(amount0.low_u128());
        p.info.tokens_owed1 = p.info.tokens_owed1.saturating_add(amount1.low_u128());
        Ok((amount0, amount1))
    }

    async fn collect(
        &self,
        position_id: U256,
        recipient: Address,
        amount0_max: u128,
        amount1_max: u128,
    ) -> ZapResult<(U256, U256)> {
        self.trip(FailPoint::Collect)?;
        let operator = self.operator;
        let mut state = self.state()?;

        let position = state.position_mut(position_id)?.clone();
        state.require_position_operator(&position, operator)?;
        let amount0 = position.info.tokens_owed0.min(amount0_max);
        let amount1 = position.info.tokens_owed1.min(amount1_max);

        state.move_tokens(position.info.token0, position.pool, recipient, U256::from(amount0))?;
        state.move_tokens(position.info.token1, position.pool, recipient, U256::from(amount1))?;
        let p = state.position_mut(position_id)?;
        p.info.tokens_owed0 -= amount0;
        p.info.tokens_owed1 -= amount1;
        Ok((U256::from(amount0), U256::from(amount1)))
    }

    async fn burn(&self, position_id: U256) -> ZapResult<()> {
        self.trip(FailPoint::Burn)?;
        let operator = self.operator;
        let mut state = self.state()?;
        let position = state.position_mut(position_id)?.clone();
        state.require_position_operator(&position, operator)?;
        if position.info.liquidity != 0 || position.info.tokens_owed0 != 0 || position.info.tokens_owed1 != 0 {
            return Err(ZapError::backend("Not cleared"));
        }
        state.positions.remove(&position_id);
        Ok(())
    }

    async fn owner_of(&self, position_id: U256) -> ZapResult<Address> {
        Ok(self.state()?.position_mut(position_id)?.owner)
    }

    async fn positions(&self, position_id: U256) -> ZapResult<PositionInfo> {
        Ok(self.state()?.position_mut(position_id)?.info.clone())
    }

    async fn transfer_from(&self, from: Address, to: Address, position_id: U256) -> ZapResult<()> {
        self.trip(FailPoint::PositionTransfer)?;
        let operator = self.operator;
        let mut state = self.state()?;
        let position = state.position_mut(position_id)?.clone();
        if position.owner != from {
            return Err(ZapError::backend("ERC721: transfer from incorrect owner"));
        }
        state.require_position_operator(&position, operator)?;
        state.position_mut(position_id)?.owner = to;
        Ok(())
    }
}

#[async_trait]
impl SwapRouter for SimulatedChain {
    async fn swap_single(&self, swap: SingleSwap) -> ZapResult<()> {
        self.trip(FailPoint::Swap)?;
        self.check_deadline(swap.deadline)?;
        let operator = self.operator;
        let mut state = self.state()?;

        let (token_out, out) =
            state.hop_output(swap.pool, swap.token_in, swap.amount_in)?;
        if token_out != swap.token_out {
            return Err(ZapError::backend("token_out does not match pool"));
        }
        if out < swap.amount_out_min {
            return Err(ZapError::InsufficientOutput {
                actual: out,
                minimum: swap.amount_out_min,
            });
        }
        state.execute_hop(swap.pool, operator, swap.token_in, swap.amount_in, swap.recipient)?;
        Ok(())
    }

    async fn swap_path(
        &self,
        path: Bytes,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
        deadline: u64,
    ) -> ZapResult<()> {
        self.trip(FailPoint::Swap)?;
        self.check_deadline(deadline)?;
        let operator = self.operator;
        let mut state = self.state()?;

        let hops = state.path_pools(&path)?;
        let last = hops.len() - 1;
        let mut amount = amount_in;
        for (i, (pool, token_in)) in hops.into_iter().enumerate() {
            let to = if i == last { recipient } else { operator };
            let (_, out) = state.execute_hop(pool, operator, token_in, amount, to)?;
            amount = out;
        }
        if amount < amount_out_min {
            return Err(ZapError::InsufficientOutput {
                actual: amount,
                minimum: amount_out_min,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Quoter for SimulatedChain {
    async fn quote_exact_input(&self, path: Bytes, amount_in: U256) -> ZapResult<U256> {
        self.trip(FailPoint::Quote)?;
        let state = self.state()?;
        let mut amount = amount_in;
        for (pool, token_in) in state.path_pools(&path)? {
            amount = state.hop_output(pool, token_in, amount)?.1;
        }
        Ok(amount)
    }
}

#[async_trait]
impl IncentiveGauge for SimulatedChain {
    async fn gauge_for_pool(&self, pool: Address) -> ZapResult<Option<Address>> {
        Ok(self
            .state()?
            .gauges
            .iter()
            .find(|(_, g)| g.pool == pool)
            .map(|(gauge, _)| *gauge))
    }

    async fn deposit(&self, gauge: Address, position_id: U256) -> ZapResult<()> {
        self.trip(FailPoint::GaugeDeposit)?;
        let operator = self.operator;
        let mut state = self.state()?;
        let gauge_pool = state
            .gauges
            .get(&gauge)
            .map(|g| g.pool)
            .ok_or_else(|| ZapError::backend("unknown gauge"))?;
        let position = state.position_mut(position_id)?.clone();
        if position.pool != gauge_pool {
            return Err(ZapError::backend("position not in gauge pool"));
        }
        if position.owner != operator {
            return Err(ZapError::backend("not position owner"));
        }
        state.position_mut(position_id)?.owner = gauge;
        state.stakes.insert(
            position_id,
            SimStake {
                gauge,
                depositor: operator,
                rewards: U256::zero(),
            },
        );
        Ok(())
    }

    async fn withdraw(&self, gauge: Address, position_id: U256) -> ZapResult<()> {
        self.trip(FailPoint::GaugeWithdraw)?;
        let operator = self.operator;
        let mut state = self.state()?;
        pay_rewards(&mut state, gauge, position_id, operator)?;
        state.stakes.remove(&position_id);
        state.position_mut(position_id)?.owner = operator;
        Ok(())
    }

    async fn earned(&self, gauge: Address, account: Address, position_id: U256) -> ZapResult<U256> {
        let state = self.state()?;
        Ok(state
            .stakes
            .get(&position_id)
            .filter(|s| s.gauge == gauge && s.depositor == account)
            .map(|s| s.rewards)
            .unwrap_or_default())
    }

    async fn get_reward(&self, gauge: Address, position_id: U256) -> ZapResult<()> {
        self.trip(FailPoint::GetReward)?;
        let operator = self.operator;
        let mut state = self.state()?;
        pay_rewards(&mut state, gauge, position_id, operator)
    }

    async fn reward_token(&self, gauge: Address) -> ZapResult<Address> {
        self.state()?
            .gauges
            .get(&gauge)
            .map(|g| g.reward_token)
            .ok_or_else(|| ZapError::backend("unknown gauge"))
    }
}

fn pay_rewards(state: &mut SimState, gauge: Address, position_id: U256, caller: Address) -> ZapResult<()> {
    let stake = state
        .stakes
        .get(&position_id)
        .cloned()
        .ok_or_else(|| ZapError::backend("position not staked"))?;
    if stake.gauge != gauge || stake.depositor != caller {
        return Err(ZapError::backend("not depositor"));
    }
    let reward_token = state
        .gauges
        .get(&gauge)
        .map(|g| g.reward_token)
        .ok_or_else(|| ZapError::backend("unknown gauge"))?;
    if !stake.rewards.is_zero() {
        state.move_tokens(reward_token, gauge, caller, stake.rewards)?;
    }
    if let Some(s) = state.stakes.get_mut(&position_id) {
        s.rewards = U256::zero();
    }
    Ok(())
}

#[async_trait]
impl PriceOracle for SimulatedChain {
    async fn get_rate(
        &self,
        src: Address,
        dst: Address,
        connector: Option<Address>,
        _threshold_filter: u32,
    ) -> ZapResult<(U256, U256)> {
        self.trip(FailPoint::Oracle)?;
        Ok(self
            .state()?
            .rates
            .get(&(src, dst, connector))
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TokenLedger for SimulatedChain {
    async fn balance_of(&self, token: Address, holder: Address) -> ZapResult<U256> {
        Ok(self.state()?.balance(token, holder))
    }

    async fn decimals(&self, token: Address) -> ZapResult<u8> {
        self.state()?
            .decimals
            .get(&token)
            .copied()
            .ok_or_else(|| ZapError::backend(format!("unknown token {:?}", token)))
    }

    async fn transfer(&self, token: Address, to: Address, amount: U256) -> ZapResult<()> {
        self.trip(FailPoint::TokenTransfer)?;
        let operator = self.operator;
        self.state()?.move_tokens(token, operator, to, amount)
    }

    async fn transfer_from(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ZapResult<()> {
        self.trip(FailPoint::TokenTransferFrom)?;
        let operator = self.operator;
        let mut state = self.state()?;
        if from != operator {
            let allowance = state
                .allowances
                .get(&(token, from, operator))
                .copied()
                .unwrap_or_default();
            if allowance < amount {
                return Err(ZapError::backend("ERC20: insufficient allowance"));
            }
            state.allowances.insert((token, from, operator), allowance - amount);
        }
        state.move_tokens(token, from, to, amount)
    }
}

#[async_trait]
impl StateCheckpoint for SimulatedChain {
    async fn checkpoint(&self) -> ZapResult<CheckpointId> {
        self.push_checkpoint()
    }

    async fn revert_to(&self, id: CheckpointId) -> ZapResult<()> {
        self.pop_checkpoint(id, true)
    }

    async fn commit(&self, id: CheckpointId) -> ZapResult<()> {
        self.pop_checkpoint(id, false)
    }
}

#[async_trait]
impl Clock for SimulatedChain {
    async fn now(&self) -> ZapResult<u64> {
        Ok(SimulatedChain::now(self))
    }
}
