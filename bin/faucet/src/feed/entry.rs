use crate::chain::{FaucetEvent, DEFAULT_DENIAL_REASON};
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use common::amount::Amount;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Granted,
    Denied,
}

/// One observed grant or denial, normalised for display.
/// Entries are never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub id: String,
    pub address: Address,
    pub kind: FeedKind,
    /// Present only for denials
    pub reason: Option<String>,
    /// Present only for grants
    pub amount: Option<Amount>,
    /// Client receipt time, not chain time
    pub observed_at: DateTime<Utc>,
}

impl FeedEntry {
    pub fn from_event(event: &FaucetEvent, id: String) -> Self {
        match event {
            FaucetEvent::Granted(e) => Self {
                id,
                address: e.requester,
                kind: FeedKind::Granted,
                reason: None,
                amount: Some(e.amount),
                observed_at: e.received_at,
            },
            FaucetEvent::Denied(e) => {
                let reason = if e.reason.is_empty() {
                    DEFAULT_DENIAL_REASON.to_string()
                } else {
                    e.reason.clone()
                };
                Self {
                    id,
                    address: e.requester,
                    kind: FeedKind::Denied,
                    reason: Some(reason),
                    amount: None,
                    observed_at: e.received_at,
                }
            }
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with(SYNTHETIC_ID_PREFIX)
    }
}

pub(crate) const SYNTHETIC_ID_PREFIX: &str = "synthetic:";

/// Fallback identity for events without a transaction hash and log index.
/// The sequence number keeps distinct events apart; re-deliveries of such
/// events are not recognised as duplicates.
pub(crate) fn synthetic_id(observed_at: DateTime<Utc>, address: Address, seq: u64) -> String {
    format!(
        "{}{}:{}:{}",
        SYNTHETIC_ID_PREFIX,
        observed_at.timestamp_millis(),
        address,
        seq
    )
}
