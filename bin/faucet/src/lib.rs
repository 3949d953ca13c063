// bin/faucet/src/lib.rs

pub mod chain;
pub mod claim;
pub mod clock;
pub mod config;
pub mod display;
pub mod eligibility;
pub mod feed;
pub mod stats;
pub mod task;

// Re-export commonly used items
pub use claim::{ClaimMachine, ClaimState};
pub use eligibility::{EligibilityEngine, EligibilitySnapshot};
pub use feed::{FeedEntry, LiveFeed};
