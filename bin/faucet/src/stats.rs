//! Periodic faucet statistics
//!
//! Balance, total granted and unique claimers are re-read on an interval.
//! A failed read keeps the last known figures.

use crate::chain::{FaucetStats, StatsReader};
use crate::task::ScopedTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

pub const DEFAULT_STATS_REFRESH_SECS: u64 = 30;

pub struct StatsMonitor<S>
where
    S: StatsReader + ?Sized,
{
    reader: Arc<S>,
    refresh_interval: Duration,
    stats_tx: watch::Sender<Option<FaucetStats>>,
}

impl<S> StatsMonitor<S>
where
    S: StatsReader + ?Sized + 'static,
{
    pub fn new(reader: Arc<S>, refresh_interval: Duration) -> Self {
        let (stats_tx, _) = watch::channel(None);
        Self {
            reader,
            refresh_interval,
            stats_tx,
        }
    }

    /// Latest stats, None until the first successful read
    pub fn latest(&self) -> Option<FaucetStats> {
        *self.stats_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<FaucetStats>> {
        self.stats_tx.subscribe()
    }

    pub async fn refresh(&self) -> Option<FaucetStats> {
        match self.reader.read_stats().await {
            Ok(stats) => {
                self.stats_tx.send_if_modified(|current| {
                    if *current == Some(stats) {
                        false
                    } else {
                        *current = Some(stats);
                        true
                    }
                });
            }
            Err(e) => {
                tracing::warn!("Stats read failed, keeping previous: {}", e);
            }
        }
        self.latest()
    }

    /// Refresh immediately, then on every interval until the task is dropped
    pub fn start(self: &Arc<Self>) -> ScopedTask {
        let monitor = self.clone();
        ScopedTask::spawn(async move {
            let mut ticker = interval(monitor.refresh_interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.refresh().await;
            }
        })
    }
}
