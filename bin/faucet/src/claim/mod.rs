mod machine;
mod state;

pub use machine::{ClaimConfig, ClaimMachine, SuccessCallback};
pub use state::{first_line, ClaimAttempt, ClaimEvent, ClaimState, TRANSACTION_FAILED};
