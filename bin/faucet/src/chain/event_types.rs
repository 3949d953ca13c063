//! Event types for the faucet handler contract
//!
//! The handler emits one of two events per processed request:
//! - FaucetGranted: tokens were transferred to the requester
//! - FaucetDenied: the request was refused (cooldown, balance cap, empty faucet)

use alloy_primitives::{Address, Log as PrimitiveLog, B256, U256};
use alloy_sol_types::{SolEvent, SolValue};
use chrono::{DateTime, Utc};
use common::amount::Amount;
use common::interfaces::faucet_handler::IFaucetHandler::{FaucetDenied, FaucetGranted};

/// Reason shown for a denial whose payload could not be decoded
pub const DEFAULT_DENIAL_REASON: &str = "cooldown";

/// Where a log came from, when the source knows it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOrigin {
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub block_number: Option<u64>,
}

impl LogOrigin {
    pub fn new(tx_hash: Option<B256>, log_index: Option<u64>, block_number: Option<u64>) -> Self {
        Self {
            tx_hash: tx_hash.filter(|h| *h != B256::ZERO),
            log_index,
            block_number,
        }
    }

    /// Stable identity of the on-chain log: `{tx_hash}-{log_index}`.
    /// None unless both halves are known.
    pub fn event_id(&self) -> Option<String> {
        match (self.tx_hash, self.log_index) {
            (Some(tx_hash), Some(log_index)) => Some(format!("{:?}-{}", tx_hash, log_index)),
            _ => None,
        }
    }
}

/// Parsed FaucetGranted event
#[derive(Debug, Clone)]
pub struct GrantedEvent {
    /// Address that received the grant
    pub requester: Address,
    /// Granted amount (18 decimals)
    pub amount: Amount,
    pub origin: LogOrigin,
    /// Timestamp when event was received
    pub received_at: DateTime<Utc>,
}

/// Parsed FaucetDenied event
#[derive(Debug, Clone)]
pub struct DeniedEvent {
    /// Address whose request was refused
    pub requester: Address,
    /// Human readable reason emitted by the handler
    pub reason: String,
    pub origin: LogOrigin,
    /// Timestamp when event was received
    pub received_at: DateTime<Utc>,
}

/// Faucet event delivered by an event source
#[derive(Debug, Clone)]
pub enum FaucetEvent {
    Granted(GrantedEvent),
    Denied(DeniedEvent),
}

impl FaucetEvent {
    pub fn requester(&self) -> Address {
        match self {
            FaucetEvent::Granted(e) => e.requester,
            FaucetEvent::Denied(e) => e.requester,
        }
    }

    pub fn origin(&self) -> &LogOrigin {
        match self {
            FaucetEvent::Granted(e) => &e.origin,
            FaucetEvent::Denied(e) => &e.origin,
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            FaucetEvent::Granted(e) => e.received_at,
            FaucetEvent::Denied(e) => e.received_at,
        }
    }
}

/// Event signature constants
pub struct EventSignatures;

impl EventSignatures {
    /// FaucetGranted event signature (topic0)
    pub fn granted() -> B256 {
        FaucetGranted::SIGNATURE_HASH
    }

    /// FaucetDenied event signature (topic0)
    pub fn denied() -> B256 {
        FaucetDenied::SIGNATURE_HASH
    }

    /// Both signatures, for log filters
    pub fn all() -> Vec<B256> {
        vec![Self::granted(), Self::denied()]
    }
}

/// Decode a log with the generated event types (typed watcher path)
pub fn parse_log(log: &PrimitiveLog, origin: LogOrigin) -> Result<FaucetEvent, EventParseError> {
    let topic0 = log.topics().first().ok_or(EventParseError::NoTopics)?;

    let received_at = Utc::now();

    if *topic0 == EventSignatures::granted() {
        let decoded = FaucetGranted::decode_log(log)
            .map_err(|e| EventParseError::DecodeError(e.to_string()))?;

        Ok(FaucetEvent::Granted(GrantedEvent {
            requester: decoded.requester,
            amount: Amount::from_u256_saturating(decoded.amount),
            origin,
            received_at,
        }))
    } else if *topic0 == EventSignatures::denied() {
        let decoded = FaucetDenied::decode_log(log)
            .map_err(|e| EventParseError::DecodeError(e.to_string()))?;

        Ok(FaucetEvent::Denied(DeniedEvent {
            requester: decoded.requester,
            reason: decoded.reason.clone(),
            origin,
            received_at,
        }))
    } else {
        Err(EventParseError::UnknownSignature(*topic0))
    }
}

/// Decode a log by hand from its topics and data (raw push path).
///
/// topic0 selects the event, topic1 is the requester left-padded to a word.
/// A denial payload that does not decode as an ABI string falls back to
/// [`DEFAULT_DENIAL_REASON`].
pub fn decode_raw_log(
    topics: &[B256],
    data: &[u8],
    origin: LogOrigin,
) -> Result<FaucetEvent, EventParseError> {
    let topic0 = topics.first().ok_or(EventParseError::NoTopics)?;
    let received_at = Utc::now();

    let requester = || {
        topics
            .get(1)
            .map(|word| Address::from_word(*word))
            .ok_or_else(|| EventParseError::DecodeError("missing requester topic".to_string()))
    };

    if *topic0 == EventSignatures::granted() {
        let amount = if data.len() >= 32 {
            U256::from_be_slice(&data[..32])
        } else {
            U256::ZERO
        };

        Ok(FaucetEvent::Granted(GrantedEvent {
            requester: requester()?,
            amount: Amount::from_u256_saturating(amount),
            origin,
            received_at,
        }))
    } else if *topic0 == EventSignatures::denied() {
        Ok(FaucetEvent::Denied(DeniedEvent {
            requester: requester()?,
            reason: decode_reason(data),
            origin,
            received_at,
        }))
    } else {
        Err(EventParseError::UnknownSignature(*topic0))
    }
}

fn decode_reason(data: &[u8]) -> String {
    match String::abi_decode(data) {
        Ok(reason) if !reason.is_empty() => reason,
        Ok(_) => DEFAULT_DENIAL_REASON.to_string(),
        Err(e) => {
            tracing::debug!(%e, len = data.len(), "Undecodable denial reason");
            DEFAULT_DENIAL_REASON.to_string()
        }
    }
}

/// Errors that can occur during event parsing
#[derive(Debug, Clone)]
pub enum EventParseError {
    /// Log has no topics
    NoTopics,
    /// Failed to decode event data
    DecodeError(String),
    /// Unknown event signature
    UnknownSignature(B256),
}

impl std::fmt::Display for EventParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventParseError::NoTopics => write!(f, "Log has no topics"),
            EventParseError::DecodeError(msg) => write!(f, "Failed to decode event: {}", msg),
            EventParseError::UnknownSignature(sig) => {
                write!(f, "Unknown event signature: {}", sig)
            }
        }
    }
}

impl std::error::Error for EventParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    fn requester_topic(address: Address) -> B256 {
        address.into_word()
    }

    #[test]
    fn test_event_signatures_are_distinct() {
        assert_ne!(EventSignatures::granted(), EventSignatures::denied());
        assert_ne!(EventSignatures::granted(), B256::ZERO);
        assert_eq!(EventSignatures::all().len(), 2);
    }

    #[test]
    fn test_event_id_requires_hash_and_index() {
        let hash = B256::repeat_byte(0xab);
        assert!(LogOrigin::new(Some(hash), Some(3), None)
            .event_id()
            .unwrap()
            .ends_with("-3"));
        assert!(LogOrigin::new(Some(hash), None, None).event_id().is_none());
        assert!(LogOrigin::new(None, Some(3), None).event_id().is_none());
        // A zero hash is what some nodes send for pending logs
        assert!(LogOrigin::new(Some(B256::ZERO), Some(3), None).event_id().is_none());
    }

    #[test]
    fn test_raw_granted_decode() {
        let requester = Address::repeat_byte(0x11);
        let amount = U256::from(500_000_000_000_000_000u128);
        let topics = vec![EventSignatures::granted(), requester_topic(requester)];

        let event = decode_raw_log(&topics, &amount.to_be_bytes::<32>(), LogOrigin::default())
            .unwrap();

        match event {
            FaucetEvent::Granted(e) => {
                assert_eq!(e.requester, requester);
                assert_eq!(e.amount, Amount::from_u128_raw(500_000_000_000_000_000));
            }
            other => panic!("expected grant, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_denied_decodes_reason() {
        let requester = Address::repeat_byte(0x22);
        let topics = vec![EventSignatures::denied(), requester_topic(requester)];
        let data = "balance too high".to_string().abi_encode();

        let event = decode_raw_log(&topics, &data, LogOrigin::default()).unwrap();

        match event {
            FaucetEvent::Denied(e) => {
                assert_eq!(e.requester, requester);
                assert_eq!(e.reason, "balance too high");
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_denied_falls_back_to_cooldown() {
        let topics = vec![
            EventSignatures::denied(),
            requester_topic(Address::repeat_byte(0x33)),
        ];

        let event = decode_raw_log(&topics, &[0xde, 0xad], LogOrigin::default()).unwrap();

        match event {
            FaucetEvent::Denied(e) => assert_eq!(e.reason, DEFAULT_DENIAL_REASON),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_decode_errors() {
        assert!(matches!(
            decode_raw_log(&[], &[], LogOrigin::default()),
            Err(EventParseError::NoTopics)
        ));
        assert!(matches!(
            decode_raw_log(&[EventSignatures::granted()], &[], LogOrigin::default()),
            Err(EventParseError::DecodeError(_))
        ));
        assert!(matches!(
            decode_raw_log(&[B256::repeat_byte(1)], &[], LogOrigin::default()),
            Err(EventParseError::UnknownSignature(_))
        ));
    }

    #[test]
    fn test_typed_parse_matches_raw_decode() {
        let requester = Address::repeat_byte(0x44);
        let data: Bytes = "faucet empty".to_string().abi_encode().into();
        let topics = vec![EventSignatures::denied(), requester_topic(requester)];
        let log = PrimitiveLog::new(Address::ZERO, topics.clone(), data.clone()).unwrap();

        let typed = parse_log(&log, LogOrigin::default()).unwrap();
        let raw = decode_raw_log(&topics, &data, LogOrigin::default()).unwrap();

        match (typed, raw) {
            (FaucetEvent::Denied(a), FaucetEvent::Denied(b)) => {
                assert_eq!(a.requester, b.requester);
                assert_eq!(a.reason, b.reason);
            }
            other => panic!("expected two denials, got {:?}", other),
        }
    }
}
