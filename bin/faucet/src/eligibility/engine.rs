use super::snapshot::{
    EligibilityFacts, EligibilitySnapshot, DEFAULT_BALANCE_CAP, DEFAULT_COOLDOWN_SECS,
};
use crate::chain::FaucetReader;
use crate::clock::Clock;
use crate::task::ScopedTask;
use alloy_primitives::Address;
use common::amount::Amount;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Configuration for the eligibility engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cooldown applied when the chain does not report one
    pub default_cooldown_secs: u64,
    /// Cap applied when the chain does not report one
    pub default_balance_cap: Amount,
    /// Countdown recompute interval
    pub tick_interval_ms: u64,
    /// Interval between on-chain re-reads
    pub poll_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_cooldown_secs: DEFAULT_COOLDOWN_SECS,
            default_balance_cap: DEFAULT_BALANCE_CAP,
            tick_interval_ms: 1000,
            poll_interval_secs: 15,
        }
    }
}

/// Last successfully read value of each source.
/// A failed read never overwrites what is here.
#[derive(Debug, Clone, Default)]
struct CachedFacts {
    cooldown_period: Option<u64>,
    balance_cap: Option<Amount>,
    last_grant: Option<u64>,
    balance: Option<Amount>,
    last_grant_loaded: bool,
}

struct EngineState {
    address: Option<Address>,
    /// Bumped on every address switch so in-flight reads can tell they are stale
    generation: u64,
    cached: CachedFacts,
}

/// Derives and publishes "can this address claim now".
///
/// Consumers observe snapshots through [`EligibilityEngine::subscribe`].
/// The countdown is recomputed from the grant timestamp on every tick, never
/// decremented, so sleeps and missed ticks do not accumulate drift.
pub struct EligibilityEngine<R>
where
    R: FaucetReader + ?Sized,
{
    reader: Arc<R>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    state: RwLock<EngineState>,
    snapshot_tx: watch::Sender<EligibilitySnapshot>,
    refetch_requested: Notify,
}

impl<R> EligibilityEngine<R>
where
    R: FaucetReader + ?Sized + 'static,
{
    pub fn new(reader: Arc<R>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let (snapshot_tx, _) = watch::channel(EligibilitySnapshot::disconnected());

        let engine = Self {
            reader,
            clock,
            config,
            state: RwLock::new(EngineState {
                address: None,
                generation: 0,
                cached: CachedFacts::default(),
            }),
            snapshot_tx,
            refetch_requested: Notify::new(),
        };
        engine.tick();
        engine
    }

    /// Observe snapshot changes; dropping the receiver unsubscribes
    pub fn subscribe(&self) -> watch::Receiver<EligibilitySnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> EligibilitySnapshot {
        *self.snapshot_tx.borrow()
    }

    pub fn is_eligible(&self) -> bool {
        self.snapshot_tx.borrow().eligible
    }

    pub fn address(&self) -> Option<Address> {
        self.state.read().address
    }

    /// Switch the observed account. Per-address facts are discarded, so the
    /// new address is not eligible until its facts have been read.
    pub fn set_address(&self, address: Option<Address>) {
        {
            let mut state = self.state.write();
            if state.address == address {
                return;
            }
            state.address = address;
            state.generation += 1;
            state.cached.last_grant = None;
            state.cached.balance = None;
            state.cached.last_grant_loaded = false;
        }

        tracing::info!(address = ?address, "Eligibility address changed");
        self.tick();
        if address.is_some() {
            self.request_refetch();
        }
    }

    fn facts(&self) -> EligibilityFacts {
        let state = self.state.read();
        let cached = &state.cached;

        EligibilityFacts {
            last_grant: cached.last_grant,
            cooldown_period_secs: cached
                .cooldown_period
                .unwrap_or(self.config.default_cooldown_secs),
            balance: cached.balance,
            balance_cap: cached.balance_cap.unwrap_or(self.config.default_balance_cap),
            loaded: cached.last_grant_loaded,
        }
    }

    /// Recompute from cached facts and the current time; publishes only on change
    pub fn tick(&self) -> EligibilitySnapshot {
        let address = self.address();
        let snapshot = EligibilitySnapshot::derive(address, &self.facts(), self.clock.now_secs());

        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        snapshot
    }

    /// Re-read every on-chain fact, then recompute.
    ///
    /// Each source is independent: a failing read is logged and keeps its
    /// previous value, the others still update.
    pub async fn refetch(&self) -> EligibilitySnapshot {
        let (address, generation) = {
            let state = self.state.read();
            (state.address, state.generation)
        };

        let (cooldown, cap) = tokio::join!(
            self.reader.read_cooldown_period(),
            self.reader.read_balance_cap(),
        );

        let per_address = match address {
            Some(addr) => {
                let (last_grant, balance) = tokio::join!(
                    self.reader.read_last_grant(addr),
                    self.reader.read_balance(addr),
                );
                Some((last_grant, balance))
            }
            None => None,
        };

        {
            let mut state = self.state.write();

            match cooldown {
                Ok(value) => state.cached.cooldown_period = value.filter(|v| *v > 0),
                Err(e) => tracing::warn!("Cooldown read failed, keeping previous: {}", e),
            }
            match cap {
                Ok(value) => state.cached.balance_cap = value.filter(|v| !v.is_not()),
                Err(e) => tracing::warn!("Balance cap read failed, keeping previous: {}", e),
            }

            // Results read for an earlier address session are dropped, even
            // when the same address has been selected again since
            if let Some((last_grant, balance)) = per_address {
                if state.generation == generation {
                    match last_grant {
                        Ok(value) => {
                            state.cached.last_grant = value.filter(|t| *t != 0);
                            state.cached.last_grant_loaded = true;
                        }
                        Err(e) => tracing::warn!("Last grant read failed, keeping previous: {}", e),
                    }
                    match balance {
                        Ok(value) => state.cached.balance = Some(value),
                        Err(e) => tracing::warn!("Balance read failed, keeping previous: {}", e),
                    }
                } else {
                    tracing::debug!("Address changed during refetch, discarding results");
                }
            }
        }

        let snapshot = self.tick();
        tracing::debug!(
            eligible = snapshot.eligible,
            seconds_remaining = snapshot.seconds_remaining,
            balance_too_high = snapshot.balance_too_high,
            "Eligibility refreshed"
        );
        snapshot
    }

    /// Ask the running engine loop to refetch as soon as possible.
    /// Safe to call from synchronous callbacks.
    pub fn request_refetch(&self) {
        self.refetch_requested.notify_one();
    }

    /// Spawn the countdown ticker and the refetch worker. Both stop when
    /// the handle is dropped.
    ///
    /// The ticker never awaits a read, so a slow or hung RPC cannot freeze
    /// the countdown.
    pub fn start(self: &Arc<Self>) -> EngineHandle {
        let cancel_token = CancellationToken::new();

        tracing::info!(
            tick_ms = self.config.tick_interval_ms,
            poll_secs = self.config.poll_interval_secs,
            "Eligibility engine started"
        );

        let engine = self.clone();
        let token = cancel_token.clone();
        let ticker = ScopedTask::spawn(async move {
            let mut tick = interval(Duration::from_millis(engine.config.tick_interval_ms.max(1)));
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        engine.tick();
                    }
                }
            }

            tracing::debug!("Eligibility ticker stopped");
        });

        let engine = self.clone();
        let token = cancel_token.clone();
        let refresher = ScopedTask::spawn(async move {
            let mut poll = interval(Duration::from_secs(engine.config.poll_interval_secs.max(1)));
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = poll.tick() => {}
                    _ = engine.refetch_requested.notified() => {
                        poll.reset();
                    }
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = engine.refetch() => {}
                }
            }

            tracing::debug!("Eligibility refresher stopped");
        });

        EngineHandle {
            cancel_token,
            _ticker: ticker,
            _refresher: refresher,
        }
    }
}

/// Keeps the engine tasks alive; dropping it stops them and their timers
pub struct EngineHandle {
    cancel_token: CancellationToken,
    _ticker: ScopedTask,
    _refresher: ScopedTask,
}

impl EngineHandle {
    pub fn stop(self) {}
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainError;
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const NOW: u64 = 1_700_000_000;

    struct FakeReader {
        cooldown: Mutex<Result<Option<u64>, ChainError>>,
        cap: Mutex<Result<Option<Amount>, ChainError>>,
        last_grant: Mutex<Result<Option<u64>, ChainError>>,
        balance: Mutex<Result<Amount, ChainError>>,
        reads: AtomicUsize,
        delay: Mutex<Option<Duration>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FakeReader {
        fn new() -> Self {
            Self {
                cooldown: Mutex::new(Ok(None)),
                cap: Mutex::new(Ok(None)),
                last_grant: Mutex::new(Ok(None)),
                balance: Mutex::new(Ok(Amount::ZERO)),
                reads: AtomicUsize::new(0),
                delay: Mutex::new(None),
                gate: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl FaucetReader for FakeReader {
        async fn read_cooldown_period(&self) -> Result<Option<u64>, ChainError> {
            self.cooldown.lock().clone()
        }

        async fn read_balance_cap(&self) -> Result<Option<Amount>, ChainError> {
            self.cap.lock().clone()
        }

        async fn read_last_grant(&self, _address: Address) -> Result<Option<u64>, ChainError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.last_grant.lock().clone()
        }

        async fn read_balance(&self, _address: Address) -> Result<Amount, ChainError> {
            self.balance.lock().clone()
        }
    }

    fn engine_with(
        reader: Arc<FakeReader>,
        clock: Arc<ManualClock>,
    ) -> Arc<EligibilityEngine<FakeReader>> {
        Arc::new(EligibilityEngine::new(
            reader,
            EngineConfig::default(),
            clock,
        ))
    }

    fn user() -> Address {
        Address::repeat_byte(0xaa)
    }

    #[tokio::test]
    async fn test_no_address_is_never_eligible() {
        let engine = engine_with(Arc::new(FakeReader::new()), Arc::new(ManualClock::new(NOW)));
        let snapshot = engine.refetch().await;
        assert!(!snapshot.eligible);
        assert!(snapshot.address.is_none());
    }

    #[tokio::test]
    async fn test_eligible_after_first_read() {
        let engine = engine_with(Arc::new(FakeReader::new()), Arc::new(ManualClock::new(NOW)));
        engine.set_address(Some(user()));
        assert!(!engine.is_eligible(), "unknown facts must not look eligible");

        let snapshot = engine.refetch().await;
        assert!(snapshot.eligible);
        assert!(engine.is_eligible());
    }

    #[tokio::test]
    async fn test_unset_parameters_use_defaults() {
        let reader = Arc::new(FakeReader::new());
        *reader.cooldown.lock() = Ok(Some(0));
        let engine = engine_with(reader, Arc::new(ManualClock::new(NOW)));

        let snapshot = engine.refetch().await;
        assert_eq!(snapshot.cooldown_period_secs, DEFAULT_COOLDOWN_SECS);
        assert_eq!(snapshot.balance_cap, DEFAULT_BALANCE_CAP);
    }

    #[tokio::test]
    async fn test_fetched_parameters_override_defaults() {
        let reader = Arc::new(FakeReader::new());
        *reader.cooldown.lock() = Ok(Some(3600));
        *reader.cap.lock() = Ok(Some(Amount::from_u128_raw(5)));
        let engine = engine_with(reader, Arc::new(ManualClock::new(NOW)));

        let snapshot = engine.refetch().await;
        assert_eq!(snapshot.cooldown_period_secs, 3600);
        assert_eq!(snapshot.balance_cap, Amount::from_u128_raw(5));
    }

    #[tokio::test]
    async fn test_countdown_follows_clock() {
        let reader = Arc::new(FakeReader::new());
        *reader.cooldown.lock() = Ok(Some(3600));
        *reader.last_grant.lock() = Ok(Some(NOW - 1800));
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = engine_with(reader, clock.clone());
        engine.set_address(Some(user()));

        let snapshot = engine.refetch().await;
        assert_eq!(snapshot.seconds_remaining, 1800);
        assert!(snapshot.on_cooldown);
        assert!(!snapshot.eligible);

        // A long sleep is absorbed in one tick, no drift
        clock.advance(1799);
        assert_eq!(engine.tick().seconds_remaining, 1);
        clock.advance(5);
        let snapshot = engine.tick();
        assert_eq!(snapshot.seconds_remaining, 0);
        assert!(snapshot.eligible);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_previous_facts() {
        let reader = Arc::new(FakeReader::new());
        *reader.last_grant.lock() = Ok(Some(NOW - 10));
        *reader.balance.lock() = Ok(Amount::from_u128_raw(42));
        let engine = engine_with(reader.clone(), Arc::new(ManualClock::new(NOW)));
        engine.set_address(Some(user()));
        let before = engine.refetch().await;

        *reader.last_grant.lock() = Err(ChainError::RpcError("boom".to_string()));
        *reader.balance.lock() = Err(ChainError::RpcError("boom".to_string()));
        let after = engine.refetch().await;

        assert_eq!(after.last_grant_timestamp, before.last_grant_timestamp);
        assert_eq!(after.current_balance, Some(Amount::from_u128_raw(42)));
        assert!(after.on_cooldown);
    }

    #[tokio::test]
    async fn test_address_change_discards_facts() {
        let reader = Arc::new(FakeReader::new());
        *reader.last_grant.lock() = Ok(Some(NOW - 10));
        let engine = engine_with(reader, Arc::new(ManualClock::new(NOW)));
        engine.set_address(Some(user()));
        assert!(engine.refetch().await.on_cooldown);

        engine.set_address(Some(Address::repeat_byte(0xbb)));
        let snapshot = engine.snapshot();
        assert!(!snapshot.on_cooldown);
        assert!(!snapshot.loaded);
        assert!(!snapshot.eligible);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let engine = engine_with(Arc::new(FakeReader::new()), Arc::new(ManualClock::new(NOW)));
        let mut rx = engine.subscribe();
        rx.borrow_and_update();

        engine.set_address(Some(user()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().address, Some(user()));

        // Recomputing identical facts does not notify
        engine.tick();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_polls_and_honours_refetch_requests() {
        let reader = Arc::new(FakeReader::new());
        let engine = engine_with(reader.clone(), Arc::new(ManualClock::new(NOW)));
        engine.set_address(Some(user()));

        let handle = engine.start();
        let mut rx = engine.subscribe();
        rx.wait_for(|s| s.eligible).await.unwrap();
        let initial_reads = reader.reads.load(Ordering::SeqCst);
        assert!(initial_reads >= 1);

        engine.request_refetch();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(reader.reads.load(Ordering::SeqCst) > initial_reads);

        drop(handle);
        let reads = reader.reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(reader.reads.load(Ordering::SeqCst), reads, "stopped engine must not poll");
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_without_refetch() {
        let reader = Arc::new(FakeReader::new());
        *reader.cooldown.lock() = Ok(Some(3600));
        *reader.last_grant.lock() = Ok(Some(NOW - 1800));
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = engine_with(reader.clone(), clock.clone());
        engine.set_address(Some(user()));
        engine.refetch().await;

        let _handle = engine.start();
        let mut rx = engine.subscribe();
        let mut reads = None;

        for step in 1..=5u64 {
            clock.advance(1);
            let seen = timeout(
                Duration::from_millis(1500),
                rx.wait_for(|s| s.seconds_remaining == 1800 - step),
            )
            .await;
            assert!(seen.is_ok(), "countdown did not reach {} s", 1800 - step);

            // The start-up read has settled once a full tick has elapsed
            let now_reads = reader.reads.load(Ordering::SeqCst);
            match reads {
                None if step >= 2 => reads = Some(now_reads),
                None => {}
                Some(first) => assert_eq!(now_reads, first, "tick must not re-read chain"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refetch_does_not_stall_countdown() {
        let reader = Arc::new(FakeReader::new());
        *reader.cooldown.lock() = Ok(Some(3600));
        *reader.last_grant.lock() = Ok(Some(NOW - 1800));
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = engine_with(reader.clone(), clock.clone());
        engine.set_address(Some(user()));
        engine.refetch().await;

        *reader.delay.lock() = Some(Duration::from_secs(30));
        let _handle = engine.start();
        engine.request_refetch();
        let mut rx = engine.subscribe();

        for step in 1..=10u64 {
            clock.advance(1);
            let seen = timeout(
                Duration::from_millis(1500),
                rx.wait_for(|s| s.seconds_remaining == 1800 - step),
            )
            .await;
            assert!(seen.is_ok(), "countdown stalled at step {}", step);
        }
    }

    #[tokio::test]
    async fn test_results_from_earlier_session_of_same_address_are_dropped() {
        let reader = Arc::new(FakeReader::new());
        *reader.last_grant.lock() = Ok(Some(NOW - 10));
        let (release, gate) = oneshot::channel();
        *reader.gate.lock() = Some(gate);
        let engine = engine_with(reader.clone(), Arc::new(ManualClock::new(NOW)));
        engine.set_address(Some(user()));

        let pending = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refetch().await }
        });
        while reader.reads.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        engine.set_address(Some(Address::repeat_byte(0xbb)));
        engine.set_address(Some(user()));
        release.send(()).unwrap();
        pending.await.unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.address, Some(user()));
        assert!(!snapshot.loaded);
        assert!(!snapshot.on_cooldown);
    }
}
