// Contracts Module - ABIs of the external collaborators

pub mod cl_pool;
pub mod erc20;
pub mod gauge;
pub mod position_manager;
pub mod price_oracle;
pub mod swap_router;

// Public exports
pub use cl_pool::{ClPool, ClPoolFactory};
pub use erc20::Erc20;
pub use gauge::{ClGauge, Voter};
pub use position_manager::{
    CollectParams, DecreaseLiquidityParams, MintParams, NonfungiblePositionManager,
};
pub use price_oracle::SpotRateOracle;
pub use swap_router::{ExactInputParams, ExactInputSingleParams, QuoterV2, SwapRouter};
