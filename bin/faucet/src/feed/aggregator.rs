use super::entry::{synthetic_id, FeedEntry};
use crate::chain::FaucetEvent;
use std::collections::VecDeque;

/// Number of entries retained by the live feed
pub const FEED_CAPACITY: usize = 20;

/// Newest-first list of at most [`FEED_CAPACITY`] feed entries.
///
/// Entries are prepended on arrival and the oldest is dropped once the
/// bound is exceeded. An event whose id is already retained is ignored.
#[derive(Debug)]
pub struct FeedAggregator {
    entries: VecDeque<FeedEntry>,
    synthetic_seq: u64,
}

impl Default for FeedAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedAggregator {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(FEED_CAPACITY + 1),
            synthetic_seq: 0,
        }
    }

    /// Normalise and insert an event. Returns the new entry, or None for a
    /// re-delivered event.
    pub fn ingest(&mut self, event: &FaucetEvent) -> Option<FeedEntry> {
        let id = match event.origin().event_id() {
            Some(id) => id,
            None => {
                self.synthetic_seq += 1;
                synthetic_id(event.received_at(), event.requester(), self.synthetic_seq)
            }
        };

        let entry = FeedEntry::from_event(event, id);
        self.insert(entry.clone()).then_some(entry)
    }

    /// Prepend an entry unless its id is already retained
    pub fn insert(&mut self, entry: FeedEntry) -> bool {
        if self.contains(&entry.id) {
            tracing::debug!(id = %entry.id, "Duplicate feed entry ignored");
            return false;
        }

        self.entries.push_front(entry);
        self.entries.truncate(FEED_CAPACITY);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Newest first
    pub fn entries(&self) -> Vec<FeedEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&FeedEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
