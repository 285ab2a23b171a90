//! Common types exchanged with the external collaborators.

pub mod conversions;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Orders two assets the way pool registries key them (lower address first).
pub fn canonical_pair(asset_a: Address, asset_b: Address) -> (Address, Address) {
    if asset_a < asset_b {
        (asset_a, asset_b)
    } else {
        (asset_b, asset_a)
    }
}

/// Live `slot0()` snapshot of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub sqrt_price_x96: U256,
    pub tick: i32,
}

/// Fields of a pool that never change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolImmutables {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
}

/// Position registry view of a position (`positions(id)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
}

/// Arguments of `mint(...)` on the position registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    pub token0: Address,
    pub token1: Address,
    pub tick_spacing: i32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount0_desired: U256,
    pub amount1_desired: U256,
    pub amount0_min: U256,
    pub amount1_min: U256,
    pub recipient: Address,
    pub deadline: u64,
}

/// Return values of `mint(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintResult {
    pub position_id: U256,
    pub liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
}
