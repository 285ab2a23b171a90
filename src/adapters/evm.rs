// EVM backend - every collaborator trait over ethers contract bindings
//
// Write calls are eth_call'ed first to surface reverts and read return values, then sent
// from the operator account. Checkpoints map to evm_snapshot / evm_revert, so atomic
// open/close needs a node that supports them (anvil/hardhat fork).

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::builders::ContractCall;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockNumber, Bytes, U256, U64};
use log::{debug, info};
use std::sync::Arc;

use crate::collaborators::{
    CheckpointId, Clock, IncentiveGauge, PoolReader, PoolRegistry, PositionRegistry, PriceOracle,
    Quoter, SingleSwap, StateCheckpoint, SwapRouter, TokenLedger,
};
use crate::contracts::{
    ClGauge, ClPool, ClPoolFactory, CollectParams, DecreaseLiquidityParams, Erc20,
    ExactInputParams, ExactInputSingleParams, MintParams, NonfungiblePositionManager, QuoterV2,
    SpotRateOracle, SwapRouter as SwapRouterContract, Voter,
};
use crate::errors::{ZapError, ZapResult};
use crate::settings;
use crate::types::{MintRequest, MintResult, PoolImmutables, PoolState, PositionInfo};

pub struct EvmBackend<M: Middleware> {
    client: Arc<M>,
    operator: Address,
    contracts: settings::Contracts,
}

impl<M: Middleware + 'static> EvmBackend<M> {
    pub fn new(client: Arc<M>, operator: Address, contracts: settings::Contracts) -> Self {
        Self {
            client,
            operator,
            contracts,
        }
    }

    pub fn client(&self) -> &Arc<M> {
        &self.client
    }

    pub fn has_quoter(&self) -> bool {
        !self.contracts.quoter.is_zero()
    }

    /// eth_call, then send and wait for a successful receipt.
    async fn execute<D: Detokenize + Send + Sync>(&self, call: ContractCall<M, D>) -> ZapResult<D> {
        let call = call.from(self.operator);
        let value = call.call().await.map_err(ZapError::backend)?;
        let pending = call.send().await.map_err(ZapError::backend)?;
        let receipt = pending
            .await
            .map_err(ZapError::backend)?
            .ok_or_else(|| ZapError::backend("transaction dropped from mempool"))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(ZapError::backend(format!(
                "transaction {:?} reverted",
                receipt.transaction_hash
            )));
        }
        debug!("tx {:?} mined in block {:?}", receipt.transaction_hash, receipt.block_number);
        Ok(value)
    }

    async fn ensure_allowance(&self, token: Address, spender: Address, amount: U256) -> ZapResult<()> {
        let erc20 = Erc20::new(token, self.client.clone());
        let allowance = erc20
            .allowance(self.operator, spender)
            .call()
            .await
            .map_err(ZapError::backend)?;
        if allowance < amount {
            info!("Approving {:?} to spend {:?}", spender, token);
            self.execute(erc20.approve(spender, U256::MAX)).await?;
        }
        Ok(())
    }

    fn position_manager(&self) -> NonfungiblePositionManager<M> {
        NonfungiblePositionManager::new(self.contracts.position_manager, self.client.clone())
    }
}

#[async_trait]
impl<M: Middleware + 'static> PoolRegistry for EvmBackend<M> {
    async fn get_pool(
        &self,
        asset_a: Address,
        asset_b: Address,
        tick_spacing: i32,
    ) -> ZapResult<Option<Address>> {
        let factory = ClPoolFactory::new(self.contracts.pool_factory, self.client.clone());
        let pool = factory
            .get_pool(asset_a, asset_b, tick_spacing)
            .call()
            .await
            .map_err(ZapError::backend)?;
        Ok(Some(pool).filter(|p| !p.is_zero()))
    }
}

#[async_trait]
impl<M: Middleware + 'static> PoolReader for EvmBackend<M> {
    async fn slot0(&self, pool: Address) -> ZapResult<PoolState> {
        let contract = ClPool::new(pool, self.client.clone());
        let (sqrt_price_x96, tick, _, _, _, _) =
            contract.slot_0().call().await.map_err(ZapError::backend)?;
        Ok(PoolState {
            sqrt_price_x96,
            tick,
        })
    }

    async fn immutables(&self, pool: Address) -> ZapResult<PoolImmutables> {
        let contract = ClPool::new(pool, self.client.clone());
        let token0_call = contract.token_0();
        let token1_call = contract.token_1();
        let spacing_call = contract.tick_spacing();
        let (token0, token1, tick_spacing) =
            tokio::try_join!(token0_call.call(), token1_call.call(), spacing_call.call())
                .map_err(ZapError::backend)?;
        Ok(PoolImmutables {
            address: pool,
            token0,
            token1,
            tick_spacing,
        })
    }
}

#[async_trait]
impl<M: Middleware + 'static> PositionRegistry for EvmBackend<M> {
    async fn mint(&self, request: MintRequest) -> ZapResult<MintResult> {
        let manager = self.contracts.position_manager;
        self.ensure_allowance(request.token0, manager, request.amount0_desired).await?;
        self.ensure_allowance(request.token1, manager, request.amount1_desired).await?;

        let params = MintParams {
            token_0: request.token0,
            token_1: request.token1,
            tick_spacing: request.tick_spacing,
            tick_lower: request.tick_lower,
            tick_upper: request.tick_upper,
            amount_0_desired: request.amount0_desired,
            amount_1_desired: request.amount1_desired,
            amount_0_min: request.amount0_min,
            amount_1_min: request.amount1_min,
            recipient: request.recipient,
            deadline: U256::from(request.deadline),
            sqrt_price_x96: U256::zero(),
        };
        let (position_id, liquidity, amount0, amount1) =
            self.execute(self.position_manager().mint(params)).await?;
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
        let params = DecreaseLiquidityParams {
            token_id: position_id,
            liquidity,
            amount_0_min: amount0_min,
            amount_1_min: amount1_min,
            deadline: U256::from(deadline),
        };
        self.execute(self.position_manager().decrease_liquidity(params))
            .await
    }

    async fn collect(
        &self,
        position_id: U256,
        recipient: Address,
        amount0_max: u128,
        amount1_max: u128,
    ) -> ZapResult<(U256, U256)> {
        let params = CollectParams {
            token_id: position_id,
            recipient,
            amount_0_max: amount0_max,
            amount_1_max: amount1_max,
        };
        self.execute(self.position_manager().collect(params)).await
    }

    async fn burn(&self, position_id: U256) -> ZapResult<()> {
        self.execute(self.position_manager().burn(position_id)).await
    }

    async fn owner_of(&self, position_id: U256) -> ZapResult<Address> {
        self.position_manager()
            .owner_of(position_id)
            .call()
            .await
            .map_err(ZapError::backend)
    }

    async fn positions(&self, position_id: U256) -> ZapResult<PositionInfo> {
        let (_, _, token0, token1, tick_spacing, tick_lower, tick_upper, liquidity, _, _, owed0, owed1) =
            self.position_manager()
                .positions(position_id)
                .call()
                .await
                .map_err(ZapError::backend)?;
        Ok(PositionInfo {
            token0,
            token1,
            tick_spacing,
            tick_lower,
            tick_upper,
            liquidity,
            tokens_owed0: owed0,
            tokens_owed1: owed1,
        })
    }

    async fn transfer_from(&self, from: Address, to: Address, position_id: U256) -> ZapResult<()> {
        self.execute(self.position_manager().transfer_from(from, to, position_id))
            .await
    }
}

#[async_trait]
impl<M: Middleware + 'static> SwapRouter for EvmBackend<M> {
    async fn swap_single(&self, swap: SingleSwap) -> ZapResult<()> {
        let router = self.contracts.swap_router;
        self.ensure_allowance(swap.token_in, router, swap.amount_in).await?;
        let params = ExactInputSingleParams {
            token_in: swap.token_in,
            token_out: swap.token_out,
            tick_spacing: swap.tick_spacing,
            recipient: swap.recipient,
            deadline: U256::from(swap.deadline),
            amount_in: swap.amount_in,
            amount_out_minimum: swap.amount_out_min,
            sqrt_price_limit_x96: U256::zero(),
        };
        let contract = SwapRouterContract::new(router, self.client.clone());
        self.execute(contract.exact_input_single(params)).await?;
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
        let router = self.contracts.swap_router;
        let token_in = path
            .get(..20)
            .map(Address::from_slice)
            .ok_or_else(|| ZapError::InvalidRouteShape("empty path".into()))?;
        self.ensure_allowance(token_in, router, amount_in).await?;
        let params = ExactInputParams {
            path,
            recipient,
            deadline: U256::from(deadline),
            amount_in,
            amount_out_minimum: amount_out_min,
        };
        let contract = SwapRouterContract::new(router, self.client.clone());
        self.execute(contract.exact_input(params)).await?;
        Ok(())
    }
}

#[async_trait]
impl<M: Middleware + 'static> Quoter for EvmBackend<M> {
    async fn quote_exact_input(&self, path: Bytes, amount_in: U256) -> ZapResult<U256> {
        if !self.has_quoter() {
            return Err(ZapError::backend("no quoter configured"));
        }
        let quoter = QuoterV2::new(self.contracts.quoter, self.client.clone());
        let (amount_out, _, _, _) = quoter
            .quote_exact_input(path, amount_in)
            .call()
            .await
            .map_err(ZapError::backend)?;
        Ok(amount_out)
    }
}

#[async_trait]
impl<M: Middleware + 'static> IncentiveGauge for EvmBackend<M> {
    async fn gauge_for_pool(&self, pool: Address) -> ZapResult<Option<Address>> {
        let voter = Voter::new(self.contracts.voter, self.client.clone());
        let gauge = voter.gauges(pool).call().await.map_err(ZapError::backend)?;
        Ok(Some(gauge).filter(|g| !g.is_zero()))
    }

    async fn deposit(&self, gauge: Address, position_id: U256) -> ZapResult<()> {
        let manager = self.position_manager();
        let approved = manager
            .is_approved_for_all(self.operator, gauge)
            .call()
            .await
            .map_err(ZapError::backend)?;
        if !approved {
            self.execute(manager.set_approval_for_all(gauge, true)).await?;
        }
        let contract = ClGauge::new(gauge, self.client.clone());
        self.execute(contract.deposit(position_id)).await
    }

    async fn withdraw(&self, gauge: Address, position_id: U256) -> ZapResult<()> {
        let contract = ClGauge::new(gauge, self.client.clone());
        self.execute(contract.withdraw(position_id)).await
    }

    async fn earned(&self, gauge: Address, account: Address, position_id: U256) -> ZapResult<U256> {
        ClGauge::new(gauge, self.client.clone())
            .earned(account, position_id)
            .call()
            .await
            .map_err(ZapError::backend)
    }

    async fn get_reward(&self, gauge: Address, position_id: U256) -> ZapResult<()> {
        let contract = ClGauge::new(gauge, self.client.clone());
        self.execute(contract.get_reward(position_id)).await
    }

    async fn reward_token(&self, gauge: Address) -> ZapResult<Address> {
        ClGauge::new(gauge, self.client.clone())
            .reward_token()
            .call()
            .await
            .map_err(ZapError::backend)
    }
}

#[async_trait]
impl<M: Middleware + 'static> PriceOracle for EvmBackend<M> {
    async fn get_rate(
        &self,
        src: Address,
        dst: Address,
        connector: Option<Address>,
        threshold_filter: u32,
    ) -> ZapResult<(U256, U256)> {
        SpotRateOracle::new(self.contracts.price_oracle, self.client.clone())
            .get_rate(
                src,
                dst,
                connector.unwrap_or_default(),
                U256::from(threshold_filter),
            )
            .call()
            .await
            .map_err(ZapError::backend)
    }
}

#[async_trait]
impl<M: Middleware + 'static> TokenLedger for EvmBackend<M> {
    async fn balance_of(&self, token: Address, holder: Address) -> ZapResult<U256> {
        Erc20::new(token, self.client.clone())
            .balance_of(holder)
            .call()
            .await
            .map_err(ZapError::backend)
    }

    async fn decimals(&self, token: Address) -> ZapResult<u8> {
        Erc20::new(token, self.client.clone())
            .decimals()
            .call()
            .await
            .map_err(ZapError::backend)
    }

    async fn transfer(&self, token: Address, to: Address, amount: U256) -> ZapResult<()> {
        let erc20 = Erc20::new(token, self.client.clone());
        if !self.execute(erc20.transfer(to, amount)).await? {
            return Err(ZapError::backend(format!("transfer of {:?} returned false", token)));
        }
        Ok(())
    }

    async fn transfer_from(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> ZapResult<()> {
        let erc20 = Erc20::new(token, self.client.clone());
        if !self.execute(erc20.transfer_from(from, to, amount)).await? {
            return Err(ZapError::backend(format!("transferFrom of {:?} returned false", token)));
        }
        Ok(())
    }
}

#[async_trait]
impl<M: Middleware + 'static> StateCheckpoint for EvmBackend<M> {
    async fn checkpoint(&self) -> ZapResult<CheckpointId> {
        let id: U256 = self
            .client
            .provider()
            .request("evm_snapshot", Vec::<()>::new())
            .await
            .map_err(ZapError::backend)?;
        Ok(CheckpointId(id.low_u64()))
    }

    async fn revert_to(&self, id: CheckpointId) -> ZapResult<()> {
        let reverted: bool = self
            .client
            .provider()
            .request("evm_revert", [U256::from(id.0)])
            .await
            .map_err(ZapError::backend)?;
        if !reverted {
            return Err(ZapError::backend(format!("evm_revert to {:?} refused", id)));
        }
        Ok(())
    }

    async fn commit(&self, _id: CheckpointId) -> ZapResult<()> {
        // executed transactions are already final; the snapshot is simply abandoned
        Ok(())
    }
}

#[async_trait]
impl<M: Middleware + 'static> Clock for EvmBackend<M> {
    async fn now(&self) -> ZapResult<u64> {
        let block = self
            .client
            .get_block(BlockNumber::Latest)
            .await
            .map_err(ZapError::backend)?
            .ok_or_else(|| ZapError::backend("latest block unavailable"))?;
        Ok(block.timestamp.low_u64())
    }
}
