use ethers::prelude::abigen;

// Concentrated-liquidity pool keyed by tick spacing (no fee tier in the key).
// Exact Solidity widths matter for decoding:
// - uint160 sqrtPriceX96
// - int24 tick / tickSpacing

abigen!(
    ClPool,
    r#"[
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, bool unlocked)
        function token0() external view returns (address)
        function token1() external view returns (address)
        function tickSpacing() external view returns (int24)
        function liquidity() external view returns (uint128)
    ]"#
);

abigen!(
    ClPoolFactory,
    r#"[
        function getPool(address tokenA, address tokenB, int24 tickSpacing) external view returns (address pool)
        function tickSpacings() external view returns (int24[])
    ]"#
);
