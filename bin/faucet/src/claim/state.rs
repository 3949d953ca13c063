use alloy_primitives::B256;
use serde::Serialize;
use std::fmt;

/// Message shown when a mined claim transaction failed
pub const TRANSACTION_FAILED: &str = "Transaction failed";

/// Lifecycle of one claim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimState {
    Idle,
    Pending,
    Confirming,
    Success,
    /// Kept for display completeness. Denials are only observed through the
    /// live feed, nothing transitions a claim attempt here.
    Denied,
    Error,
}

impl ClaimState {
    /// States that auto-return to idle after the display window
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimState::Success | ClaimState::Error | ClaimState::Denied)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, ClaimState::Pending | ClaimState::Confirming)
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClaimState::Idle => "idle",
            ClaimState::Pending => "pending",
            ClaimState::Confirming => "confirming",
            ClaimState::Success => "success",
            ClaimState::Denied => "denied",
            ClaimState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Inputs driving [`ClaimAttempt::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimEvent {
    Initiate,
    /// The node accepted the submission and issued a transaction hash
    HandleAssigned(B256),
    Confirmed,
    /// Mined but failed
    Reverted,
    /// Raw failure message from submission or from waiting on the receipt
    SubmissionFailed(String),
    Reset,
}

/// Current attempt as seen by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimAttempt {
    pub state: ClaimState,
    pub tx_hash: Option<B256>,
    pub error_message: Option<String>,
}

impl Default for ClaimAttempt {
    fn default() -> Self {
        Self::idle()
    }
}

impl ClaimAttempt {
    pub fn idle() -> Self {
        Self {
            state: ClaimState::Idle,
            tx_hash: None,
            error_message: None,
        }
    }

    /// Next attempt after `event`, or None if `event` is not valid in the
    /// current state.
    pub fn apply(&self, event: ClaimEvent) -> Option<Self> {
        use ClaimState::*;

        match (self.state, event) {
            (Idle, ClaimEvent::Initiate) => Some(Self {
                state: Pending,
                tx_hash: None,
                error_message: None,
            }),
            (Pending, ClaimEvent::HandleAssigned(tx_hash)) => Some(Self {
                state: Confirming,
                tx_hash: Some(tx_hash),
                error_message: None,
            }),
            (Confirming, ClaimEvent::Confirmed) => Some(Self {
                state: Success,
                ..self.clone()
            }),
            (Confirming, ClaimEvent::Reverted) => Some(Self {
                state: Error,
                error_message: Some(TRANSACTION_FAILED.to_string()),
                ..self.clone()
            }),
            (Pending | Confirming, ClaimEvent::SubmissionFailed(message)) => Some(Self {
                state: Error,
                error_message: Some(first_line(&message)),
                ..self.clone()
            }),
            (Idle, ClaimEvent::Reset) => None,
            (_, ClaimEvent::Reset) => Some(Self::idle()),
            _ => None,
        }
    }
}

/// First line of a failure message; verbose diagnostics after the first
/// line break are dropped.
pub fn first_line(message: &str) -> String {
    let line = message.lines().next().unwrap_or_default().trim_end();
    if line.is_empty() {
        TRANSACTION_FAILED.to_string()
    } else {
        line.to_string()
    }
}
