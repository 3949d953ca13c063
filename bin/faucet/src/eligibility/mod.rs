mod engine;
mod snapshot;

pub use engine::{EligibilityEngine, EngineConfig, EngineHandle};
pub use snapshot::{
    seconds_remaining, EligibilityFacts, EligibilitySnapshot, DEFAULT_BALANCE_CAP,
    DEFAULT_COOLDOWN_SECS,
};
