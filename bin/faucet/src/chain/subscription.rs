//! Event source abstraction shared by the typed log watcher and the raw
//! push subscription.

use crate::chain::{ChainError, FaucetEvent};
use alloy_primitives::Address;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A push-based producer of faucet events for one contract.
///
/// `subscribe` completes once the subscription is established; events are
/// then delivered to `sink` until the returned [`Subscription`] is dropped
/// or unsubscribed.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn subscribe(
        &self,
        contract: Address,
        sink: mpsc::UnboundedSender<FaucetEvent>,
    ) -> Result<Subscription, ChainError>;
}

/// Handle to a live subscription. Dropping it tears the subscription down.
pub struct Subscription {
    id: String,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(id: impl Into<String>, cancel_token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            id: id.into(),
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Subscription without a background task, for sources driven externally
    pub fn detached(id: impl Into<String>, cancel_token: CancellationToken) -> Self {
        Self {
            id: id.into(),
            cancel_token,
            handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }

    /// Explicit teardown; equivalent to dropping the handle
    pub fn unsubscribe(self) {
        tracing::debug!(id = %self.id, "Unsubscribing");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
