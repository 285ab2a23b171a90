use ethers::prelude::abigen;

// connector = address(0) asks for the direct quote.
// rate: raw dst units per raw src unit, 1e18-scaled. A zero rate or weight means no liquidity.

abigen!(
    SpotRateOracle,
    r#"[
        function getRate(address srcToken, address dstToken, address connector, uint256 thresholdFilter) external view returns (uint256 rate, uint256 weight)
    ]"#
);
