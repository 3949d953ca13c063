//! Transport collaborator: contract reads, claim submission and receipt
//! tracking over an alloy provider.
//!
//! The components never see the provider directly. They depend on the
//! [`FaucetReader`], [`FaucetWriter`] and [`StatsReader`] traits so tests can
//! substitute in-memory fakes.

use crate::chain::ChainError;
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy_primitives::{Address, B256, U256};
use alloy::sol;
use alloy_sol_types::SolCall;
use common::amount::Amount;
use common::interfaces::faucet_request::IFaucetRequest;
use std::time::Duration;
use tokio::time::interval;

sol! {
    /// View functions of the faucet handler
    #[sol(rpc)]
    interface IFaucetHandlerView {
        function lastGrant(address requester) external view returns (uint256);

        function totalGranted() external view returns (uint256);

        function totalClaimers() external view returns (uint256);

        function cooldownPeriod() external view returns (uint256);

        function balanceCap() external view returns (uint256);
    }
}

/// Consecutive receipt lookup failures tolerated while waiting for a receipt
const MAX_RECEIPT_ERRORS: u32 = 5;

/// Read side of the faucet, consumed by the eligibility engine
#[async_trait::async_trait]
pub trait FaucetReader: Send + Sync {
    /// Protocol cooldown in seconds, None when unset
    async fn read_cooldown_period(&self) -> Result<Option<u64>, ChainError>;

    /// Balance above which grants are refused, None when unset
    async fn read_balance_cap(&self) -> Result<Option<Amount>, ChainError>;

    /// Unix timestamp of the last grant to `address`, None if never granted
    async fn read_last_grant(&self, address: Address) -> Result<Option<u64>, ChainError>;

    /// Native balance of `address`
    async fn read_balance(&self, address: Address) -> Result<Amount, ChainError>;
}

/// Write side of the faucet, consumed by the claim machine
#[async_trait::async_trait]
pub trait FaucetWriter: Send + Sync {
    /// Submit the parameterless claim request, returning the transaction hash
    /// once the node accepted it
    async fn submit_claim(&self) -> Result<B256, ChainError>;

    /// Wait until the transaction is mined; Ok(false) means it reverted
    async fn await_confirmation(&self, tx_hash: B256) -> Result<bool, ChainError>;
}

/// Aggregate faucet figures shown next to the claim button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaucetStats {
    pub faucet_balance: Amount,
    pub total_granted: Amount,
    pub total_claimers: u64,
}

#[async_trait::async_trait]
pub trait StatsReader: Send + Sync {
    async fn read_stats(&self) -> Result<FaucetStats, ChainError>;
}

/// Configuration for the alloy transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Contract receiving `request()` calls
    pub request_address: Address,
    /// Contract holding grant state and emitting feed events
    pub handler_address: Address,
    /// Read cooldown and cap from the handler instead of using defaults
    pub fetch_parameters: bool,
    /// Interval between receipt lookups while confirming
    pub receipt_poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_address: Address::ZERO,
            handler_address: Address::ZERO,
            fetch_parameters: false,
            receipt_poll_interval_ms: 1000,
        }
    }
}

/// Faucet transport over an alloy provider - generic over provider type
pub struct AlloyTransport<P>
where
    P: Provider + Clone,
{
    config: TransportConfig,
    provider: P,
}

impl<P> AlloyTransport<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    pub fn new(config: TransportConfig, provider: P) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Refuse to operate against a node on a different chain
    pub async fn ensure_chain(&self, expected: u64) -> Result<(), ChainError> {
        let actual = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        if actual != expected {
            return Err(ChainError::WrongNetwork { expected, actual });
        }

        tracing::debug!(chain_id = actual, "Chain id verified");
        Ok(())
    }
}

fn non_zero_u64(value: U256) -> Option<u64> {
    let value = value.saturating_to::<u64>();
    (value != 0).then_some(value)
}

#[async_trait::async_trait]
impl<P> FaucetReader for AlloyTransport<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn read_cooldown_period(&self) -> Result<Option<u64>, ChainError> {
        if !self.config.fetch_parameters {
            return Ok(None);
        }

        let handler = IFaucetHandlerView::new(self.config.handler_address, &self.provider);
        let cooldown = handler
            .cooldownPeriod()
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("cooldownPeriod failed: {}", e)))?;

        Ok(non_zero_u64(cooldown))
    }

    async fn read_balance_cap(&self) -> Result<Option<Amount>, ChainError> {
        if !self.config.fetch_parameters {
            return Ok(None);
        }

        let handler = IFaucetHandlerView::new(self.config.handler_address, &self.provider);
        let cap = handler
            .balanceCap()
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("balanceCap failed: {}", e)))?;

        let cap = Amount::from_u256_saturating(cap);
        Ok((!cap.is_not()).then_some(cap))
    }

    async fn read_last_grant(&self, address: Address) -> Result<Option<u64>, ChainError> {
        let handler = IFaucetHandlerView::new(self.config.handler_address, &self.provider);
        let last_grant = handler
            .lastGrant(address)
            .call()
            .await
            .map_err(|e| {
                ChainError::ContractCallFailed(format!("lastGrant failed for {}: {}", address, e))
            })?;

        Ok(non_zero_u64(last_grant))
    }

    async fn read_balance(&self, address: Address) -> Result<Amount, ChainError> {
        let balance = self
            .provider
            .get_balance(address)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        Ok(Amount::from_u256_saturating(balance))
    }
}

#[async_trait::async_trait]
impl<P> FaucetWriter for AlloyTransport<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn submit_claim(&self) -> Result<B256, ChainError> {
        let call = IFaucetRequest::requestCall {};

        let tx = TransactionRequest::default()
            .to(self.config.request_address)
            .input(call.abi_encode().into());

        let pending_tx = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::SubmissionRejected(e.to_string()))?;

        let tx_hash = *pending_tx.tx_hash();
        tracing::info!(%tx_hash, request = %self.config.request_address, "Claim submitted");

        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: B256) -> Result<bool, ChainError> {
        let mut poll = interval(Duration::from_millis(self.config.receipt_poll_interval_ms.max(1)));
        let mut consecutive_errors = 0;

        loop {
            poll.tick().await;

            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    tracing::debug!(
                        %tx_hash,
                        block = receipt.block_number.unwrap_or(0),
                        status = receipt.status(),
                        "Receipt received"
                    );
                    return Ok(receipt.status());
                }
                Ok(None) => {
                    consecutive_errors = 0;
                    tracing::trace!(%tx_hash, "Receipt not yet available");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::warn!(%tx_hash, attempt = consecutive_errors, "Receipt lookup failed: {}", e);
                    if consecutive_errors >= MAX_RECEIPT_ERRORS {
                        return Err(ChainError::RpcError(e.to_string()));
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl<P> StatsReader for AlloyTransport<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn read_stats(&self) -> Result<FaucetStats, ChainError> {
        let handler = IFaucetHandlerView::new(self.config.handler_address, &self.provider);

        let faucet_balance = self
            .provider
            .get_balance(self.config.handler_address)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        let total_granted = handler
            .totalGranted()
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("totalGranted failed: {}", e)))?;

        let total_claimers = handler
            .totalClaimers()
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("totalClaimers failed: {}", e)))?;

        Ok(FaucetStats {
            faucet_balance: Amount::from_u256_saturating(faucet_balance),
            total_granted: Amount::from_u256_saturating(total_granted),
            total_claimers: total_claimers.saturating_to::<u64>(),
        })
    }
}
