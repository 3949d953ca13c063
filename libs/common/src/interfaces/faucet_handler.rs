use alloy_sol_types::sol;

sol! {
    interface IFaucetHandler  {
        function lastGrant(address requester) external view returns (uint256);

        function totalGranted() external view returns (uint256);

        function totalClaimers() external view returns (uint256);

        function cooldownPeriod() external view returns (uint256);

        function balanceCap() external view returns (uint256);

        event FaucetGranted(address indexed requester, uint256 amount);

        event FaucetDenied(address indexed requester, string reason);
    }
}
