use ethers::prelude::abigen;

// Path layout for exactInput: token (20) | tickSpacing (int24, 3) | token (20) | ...

abigen!(
    SwapRouter,
    r#"[
        struct ExactInputSingleParams { address tokenIn; address tokenOut; int24 tickSpacing; address recipient; uint256 deadline; uint256 amountIn; uint256 amountOutMinimum; uint160 sqrtPriceLimitX96; }
        struct ExactInputParams { bytes path; address recipient; uint256 deadline; uint256 amountIn; uint256 amountOutMinimum; }
        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut)
        function exactInput(ExactInputParams calldata params) external payable returns (uint256 amountOut)
    ]"#
);

// Not a view function on-chain; always eth_call it.
abigen!(
    QuoterV2,
    r#"[
        function quoteExactInput(bytes path, uint256 amountIn) external returns (uint256 amountOut, uint160[] sqrtPriceX96AfterList, uint32[] initializedTicksCrossedList, uint256 gasEstimate)
    ]"#
);
