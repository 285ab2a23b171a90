use ethers::prelude::abigen;

abigen!(
    NonfungiblePositionManager,
    r#"[
        struct MintParams { address token0; address token1; int24 tickSpacing; int24 tickLower; int24 tickUpper; uint256 amount0Desired; uint256 amount1Desired; uint256 amount0Min; uint256 amount1Min; address recipient; uint256 deadline; uint160 sqrtPriceX96; }
        struct DecreaseLiquidityParams { uint256 tokenId; uint128 liquidity; uint256 amount0Min; uint256 amount1Min; uint256 deadline; }
        struct CollectParams { uint256 tokenId; address recipient; uint128 amount0Max; uint128 amount1Max; }
        function mint(MintParams calldata params) external payable returns (uint256 tokenId, uint128 liquidity, uint256 amount0, uint256 amount1)
        function decreaseLiquidity(DecreaseLiquidityParams calldata params) external payable returns (uint256 amount0, uint256 amount1)
        function collect(CollectParams calldata params) external payable returns (uint256 amount0, uint256 amount1)
        function burn(uint256 tokenId) external payable
        function ownerOf(uint256 tokenId) external view returns (address)
        function positions(uint256 tokenId) external view returns (uint96 nonce, address operator, address token0, address token1, int24 tickSpacing, int24 tickLower, int24 tickUpper, uint128 liquidity, uint256 feeGrowthInside0LastX128, uint256 feeGrowthInside1LastX128, uint128 tokensOwed0, uint128 tokensOwed1)
        function transferFrom(address from, address to, uint256 tokenId) external
        function isApprovedForAll(address owner, address operator) external view returns (bool)
        function setApprovalForAll(address operator, bool approved) external
    ]"#
);
