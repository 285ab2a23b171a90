use ethers::prelude::abigen;

abigen!(
    ClGauge,
    r#"[
        function deposit(uint256 tokenId) external
        function withdraw(uint256 tokenId) external
        function getReward(uint256 tokenId) external
        function earned(address account, uint256 tokenId) external view returns (uint256)
        function rewardToken() external view returns (address)
        function pool() external view returns (address)
    ]"#
);

abigen!(
    Voter,
    r#"[
        function gauges(address pool) external view returns (address)
        function isAlive(address gauge) external view returns (bool)
    ]"#
);
