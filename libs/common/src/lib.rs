pub mod amount;

pub mod interfaces {
    pub mod faucet_handler;
    pub mod faucet_request;
}
