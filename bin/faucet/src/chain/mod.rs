//! Chain connectivity for the faucet client
//!
//! This module provides:
//! - Event types and decoding for FaucetGranted/FaucetDenied
//! - Transport traits for contract reads and claim submission, with an alloy binding
//! - Two interchangeable event sources: a typed log watcher and a raw WebSocket push subscription

mod errors;
mod event_types;
mod log_watcher;
mod reactive;
mod subscription;
mod transport;

pub use errors::ChainError;
pub use event_types::{
    decode_raw_log, parse_log, DeniedEvent, EventParseError, EventSignatures, FaucetEvent,
    GrantedEvent, LogOrigin, DEFAULT_DENIAL_REASON,
};
pub use log_watcher::{LogWatcherConfig, LogWatcherSource};
pub use reactive::{parse_ws_message, RawLog, ReactiveConfig, ReactiveSource, WsNotification};
pub use subscription::{EventSource, Subscription};
pub use transport::{
    AlloyTransport, FaucetReader, FaucetStats, FaucetWriter, StatsReader, TransportConfig,
};
