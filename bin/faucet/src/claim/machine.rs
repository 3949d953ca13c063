use super::state::{ClaimAttempt, ClaimEvent, ClaimState};
use crate::chain::FaucetWriter;
use crate::task::ScopedTask;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Invoked once on every entry into `success`
pub type SuccessCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ClaimConfig {
    /// How long `success` / `error` stay visible before returning to idle
    pub display_window_ms: u64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            display_window_ms: 3000,
        }
    }
}

struct MachineInner {
    attempt: ClaimAttempt,
    /// Bumped on every new attempt and on reset; transitions carrying an
    /// older generation are discarded.
    generation: u64,
    driver: Option<ScopedTask>,
    reset_timer: Option<ScopedTask>,
}

/// Drives one claim attempt at a time through submission and confirmation.
///
/// The machine owns its driver task and the auto-reset timer. Both are
/// aborted when the machine is dropped, when [`ClaimMachine::reset`] is
/// called, or when a newer attempt starts.
pub struct ClaimMachine<W>
where
    W: FaucetWriter + ?Sized,
{
    writer: Arc<W>,
    config: ClaimConfig,
    on_success: Option<SuccessCallback>,
    inner: Mutex<MachineInner>,
    state_tx: watch::Sender<ClaimAttempt>,
}

impl<W> ClaimMachine<W>
where
    W: FaucetWriter + ?Sized + 'static,
{
    pub fn new(writer: Arc<W>, config: ClaimConfig) -> Self {
        let (state_tx, _) = watch::channel(ClaimAttempt::idle());
        Self {
            writer,
            config,
            on_success: None,
            inner: Mutex::new(MachineInner {
                attempt: ClaimAttempt::idle(),
                generation: 0,
                driver: None,
                reset_timer: None,
            }),
            state_tx,
        }
    }

    pub fn with_on_success(mut self, callback: SuccessCallback) -> Self {
        self.on_success = Some(callback);
        self
    }

    pub fn attempt(&self) -> ClaimAttempt {
        self.inner.lock().attempt.clone()
    }

    pub fn state(&self) -> ClaimState {
        self.inner.lock().attempt.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimAttempt> {
        self.state_tx.subscribe()
    }

    /// Start a new attempt. Returns false, leaving the state untouched, when
    /// the machine is not idle.
    ///
    /// Eligibility is checked by the caller.
    pub fn initiate_claim(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock();

        let Some(next) = inner.attempt.apply(ClaimEvent::Initiate) else {
            tracing::debug!(state = %inner.attempt.state, "Claim already in progress, ignoring");
            return false;
        };

        inner.generation += 1;
        inner.reset_timer = None;
        inner.attempt = next;
        self.state_tx.send_replace(inner.attempt.clone());

        let generation = inner.generation;
        inner.driver = Some(self.spawn_driver(generation));

        tracing::info!(generation, "🚰 Claim initiated");
        true
    }

    /// Return to idle immediately, abandoning any in-flight attempt
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.driver = None;
        inner.reset_timer = None;

        if inner.attempt.state != ClaimState::Idle {
            inner.attempt = ClaimAttempt::idle();
            self.state_tx.send_replace(inner.attempt.clone());
        }
    }

    fn spawn_driver(self: &Arc<Self>, generation: u64) -> ScopedTask {
        let writer = self.writer.clone();
        let machine = Arc::downgrade(self);

        ScopedTask::spawn(async move {
            let tx_hash = match writer.submit_claim().await {
                Ok(tx_hash) => tx_hash,
                Err(e) => {
                    tracing::warn!("❌ Claim submission failed: {}", e);
                    Self::deliver(&machine, generation, ClaimEvent::SubmissionFailed(e.to_string()));
                    return;
                }
            };

            tracing::info!(tx_hash = %tx_hash, "📤 Claim submitted");
            if !Self::deliver(&machine, generation, ClaimEvent::HandleAssigned(tx_hash)) {
                return;
            }

            let event = match writer.await_confirmation(tx_hash).await {
                Ok(true) => {
                    tracing::info!(tx_hash = %tx_hash, "✅ Claim confirmed");
                    ClaimEvent::Confirmed
                }
                Ok(false) => {
                    tracing::warn!(tx_hash = %tx_hash, "❌ Claim transaction reverted");
                    ClaimEvent::Reverted
                }
                Err(e) => {
                    tracing::warn!(tx_hash = %tx_hash, "❌ Waiting for claim receipt failed: {}", e);
                    ClaimEvent::SubmissionFailed(e.to_string())
                }
            };
            Self::deliver(&machine, generation, event);
        })
    }

    fn deliver(machine: &Weak<Self>, generation: u64, event: ClaimEvent) -> bool {
        match machine.upgrade() {
            Some(machine) => machine.transition(generation, event),
            None => false,
        }
    }

    /// Apply `event` if it belongs to the current attempt
    fn transition(self: &Arc<Self>, generation: u64, event: ClaimEvent) -> bool {
        let entered = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                tracing::debug!(generation, current = inner.generation, "Discarding stale claim transition");
                return false;
            }

            let Some(next) = inner.attempt.apply(event) else {
                return false;
            };
            inner.attempt = next;
            self.state_tx.send_replace(inner.attempt.clone());

            let state = inner.attempt.state;
            if state.is_terminal() {
                inner.reset_timer = Some(self.spawn_reset_timer(generation));
            }
            state
        };

        if entered == ClaimState::Success {
            if let Some(callback) = &self.on_success {
                callback();
            }
        }
        true
    }

    fn spawn_reset_timer(self: &Arc<Self>, generation: u64) -> ScopedTask {
        let window = Duration::from_millis(self.config.display_window_ms);
        let machine = Arc::downgrade(self);

        ScopedTask::spawn(async move {
            tokio::time::sleep(window).await;
            Self::deliver(&machine, generation, ClaimEvent::Reset);
        })
    }
}
