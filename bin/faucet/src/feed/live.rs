use super::aggregator::FeedAggregator;
use super::entry::FeedEntry;
use crate::chain::{EventSource, FaucetEvent};
use crate::task::ScopedTask;
use alloy_primitives::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Live view over one event source
pub struct LiveFeed {
    aggregator: Mutex<FeedAggregator>,
    entries_tx: watch::Sender<Vec<FeedEntry>>,
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveFeed {
    pub fn new() -> Self {
        let (entries_tx, _) = watch::channel(Vec::new());
        Self {
            aggregator: Mutex::new(FeedAggregator::new()),
            entries_tx,
        }
    }

    /// Subscribe `source` to `contract` and feed its events into a new live
    /// feed. The subscription lives until the returned handle is dropped.
    pub fn start(source: Arc<dyn EventSource>, contract: Address) -> FeedHandle {
        Self::start_with(Arc::new(Self::default()), source, contract)
    }

    pub fn start_with(
        feed: Arc<LiveFeed>,
        source: Arc<dyn EventSource>,
        contract: Address,
    ) -> FeedHandle {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let ingest = feed.clone();

        let (sink, mut events) = mpsc::unbounded_channel::<FaucetEvent>();

        // Setup is not aborted with the feed task; a subscription that
        // completes after teardown is released here.
        let setup_token = cancel_token.clone();
        let setup_source = source.clone();
        let setup = tokio::spawn(async move {
            match setup_source.subscribe(contract, sink).await {
                Ok(subscription) if setup_token.is_cancelled() => {
                    tracing::debug!(
                        source = setup_source.name(),
                        id = subscription.id(),
                        "Feed torn down during setup, releasing subscription"
                    );
                    subscription.unsubscribe();
                    None
                }
                Ok(subscription) => Some(subscription),
                Err(e) => {
                    tracing::warn!(source = setup_source.name(), "⚠️ Feed subscription failed: {}", e);
                    None
                }
            }
        });

        let task = ScopedTask::spawn(async move {
            let subscription = tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(source = source.name(), "Feed torn down before subscription was established");
                    return;
                }
                result = setup => match result {
                    Ok(Some(subscription)) => subscription,
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(source = source.name(), "⚠️ Feed setup task failed: {}", e);
                        return;
                    }
                },
            };

            tracing::info!(
                source = source.name(),
                id = subscription.id(),
                %contract,
                "📡 Live feed subscribed"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            ingest.ingest(&event);
                        }
                        None => {
                            tracing::warn!(source = source.name(), "Event source closed, feed is now stale");
                            break;
                        }
                    }
                }
            }

            subscription.unsubscribe();
        });

        FeedHandle {
            feed,
            cancel_token,
            _task: task,
        }
    }

    /// Insert one event and publish the updated list
    pub fn ingest(&self, event: &FaucetEvent) -> Option<FeedEntry> {
        let mut aggregator = self.aggregator.lock();
        let entry = aggregator.ingest(event)?;

        tracing::debug!(
            id = %entry.id,
            kind = ?entry.kind,
            address = %entry.address,
            "New feed entry"
        );
        self.entries_tx.send_replace(aggregator.entries());
        Some(entry)
    }

    /// Newest first
    pub fn entries(&self) -> Vec<FeedEntry> {
        self.entries_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<FeedEntry>> {
        self.entries_tx.subscribe()
    }
}

/// Owns a running feed subscription; dropping it unsubscribes
pub struct FeedHandle {
    feed: Arc<LiveFeed>,
    cancel_token: CancellationToken,
    _task: ScopedTask,
}

impl FeedHandle {
    pub fn feed(&self) -> &Arc<LiveFeed> {
        &self.feed
    }

    pub fn entries(&self) -> Vec<FeedEntry> {
        self.feed.entries()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<FeedEntry>> {
        self.feed.subscribe()
    }

    pub fn stop(self) {}
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
