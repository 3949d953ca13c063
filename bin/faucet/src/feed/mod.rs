//! Live feed of faucet grants and denials
//!
//! The aggregator keeps the most recent entries, newest first. It does not
//! know which [`EventSource`](crate::chain::EventSource) produced an event.

mod aggregator;
mod entry;
mod live;

pub use aggregator::{FeedAggregator, FEED_CAPACITY};
pub use entry::{FeedEntry, FeedKind};
pub use live::{FeedHandle, LiveFeed};
