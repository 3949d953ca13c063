//! Typed log watcher
//!
//! Polls `eth_getLogs` for FaucetGranted/FaucetDenied on the handler contract
//! and decodes them with the generated event types. Works against any HTTP
//! RPC endpoint.

use crate::chain::{
    parse_log, ChainError, EventSignatures, EventSource, FaucetEvent, LogOrigin, Subscription,
};
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use alloy_primitives::Address;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Configuration for the log watcher
#[derive(Debug, Clone)]
pub struct LogWatcherConfig {
    /// Polling interval in milliseconds
    pub polling_interval_ms: u64,
    /// Upper bound on blocks requested per eth_getLogs call
    pub max_block_range: u64,
}

impl Default for LogWatcherConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 3000,
            max_block_range: 1000,
        }
    }
}

/// Event source backed by log polling
pub struct LogWatcherSource<P>
where
    P: Provider + Clone,
{
    config: LogWatcherConfig,
    provider: P,
}

impl<P> LogWatcherSource<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(config: LogWatcherConfig, provider: P) -> Self {
        Self { config, provider }
    }
}

#[async_trait::async_trait]
impl<P> EventSource for LogWatcherSource<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "log-watcher"
    }

    async fn subscribe(
        &self,
        contract: Address,
        sink: mpsc::UnboundedSender<FaucetEvent>,
    ) -> Result<Subscription, ChainError> {
        let start_block = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        tracing::info!(
            %contract,
            from_block = start_block,
            interval_ms = self.config.polling_interval_ms,
            "📊 Watching faucet logs"
        );

        let cancel_token = CancellationToken::new();
        let poller = LogPoller {
            provider: self.provider.clone(),
            contract,
            last_processed_block: start_block,
            max_block_range: self.config.max_block_range.max(1),
            sink,
        };
        let handle = tokio::spawn(poller.run(
            Duration::from_millis(self.config.polling_interval_ms),
            cancel_token.clone(),
        ));

        Ok(Subscription::new(
            format!("logs:{}:{}", contract, start_block),
            cancel_token,
            handle,
        ))
    }
}

struct LogPoller<P> {
    provider: P,
    contract: Address,
    last_processed_block: u64,
    max_block_range: u64,
    sink: mpsc::UnboundedSender<FaucetEvent>,
}

impl<P> LogPoller<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn run(mut self, period: Duration, cancel_token: CancellationToken) {
        let mut poll_interval = interval(period.max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::debug!(contract = %self.contract, "Log watcher stopped");
                    break;
                }
                _ = poll_interval.tick() => {
                    match self.poll_events().await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::warn!("Feed receiver dropped, stopping log watcher");
                            break;
                        }
                        Err(e) => tracing::error!("Polling error: {}", e),
                    }
                }
            }
        }
    }

    /// Returns Ok(false) once nobody listens any more
    async fn poll_events(&mut self) -> Result<bool, ChainError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        if head <= self.last_processed_block {
            return Ok(true);
        }

        let from_block = self.last_processed_block + 1;
        let to_block = head.min(self.last_processed_block + self.max_block_range);

        tracing::trace!(from_block, to_block, "Polling faucet logs");

        let filter = Filter::new()
            .address(self.contract)
            .event_signature(EventSignatures::all())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        for log in logs {
            if log.removed {
                continue;
            }

            let origin = LogOrigin::new(log.transaction_hash, log.log_index, log.block_number);

            match parse_log(&log.inner, origin) {
                Ok(event) => {
                    if self.sink.send(event).is_err() {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse log: {}", e);
                }
            }
        }

        self.last_processed_block = to_block;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogWatcherConfig::default();
        assert_eq!(config.polling_interval_ms, 3000);
        assert_eq!(config.max_block_range, 1000);
    }

    #[tokio::test]
    async fn test_subscribe_fails_without_node() {
        // Nothing listens on port 9; setup must surface the error rather
        // than hand back a dead subscription.
        let provider = alloy::providers::ProviderBuilder::new()
            .connect_http("http://127.0.0.1:9".parse().unwrap());
        let source = LogWatcherSource::new(LogWatcherConfig::default(), provider);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = source.subscribe(Address::ZERO, tx).await;
        assert!(matches!(result, Err(ChainError::RpcError(_))));
    }

    #[tokio::test]
    async fn test_zero_polling_interval_runs_until_cancelled() {
        let provider = alloy::providers::ProviderBuilder::new()
            .connect_http("http://127.0.0.1:9".parse().unwrap());
        let (tx, _rx) = mpsc::unbounded_channel();
        let poller = LogPoller {
            provider,
            contract: Address::ZERO,
            last_processed_block: 0,
            max_block_range: 1000,
            sink: tx,
        };
        let cancel_token = CancellationToken::new();

        let task = tokio::spawn(poller.run(Duration::ZERO, cancel_token.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        cancel_token.cancel();
        assert!(task.await.is_ok(), "poller must not panic on a zero interval");
    }
}
