use alloy_sol_types::sol;

sol! {
    interface IFaucetRequest  {
        function request() external;

        event FaucetRequested(address indexed requester);
    }
}
