//! Pending two-way decisions bound to a deadline.
//!
//! A task that needs a human to confirm something (for example a redemption that
//! would overfund a goal) registers a held action under the triggering user's key.
//! A later, unrelated chat message resolves it with [`HoldRegistry::complete`] or
//! [`HoldRegistry::cancel`]; if nobody answers, the deadline cancels it.
//!
//! Completion, cancellation and the deadline race freely. Each action settles
//! exactly once; the losers see [`Resolution::NoPendingAction`] or do nothing.
//! Callbacks run synchronously on the settling path, outside any lock, so they
//! should be short: typically they submit a task to a
//! [`SerialQueue`](crate::SerialQueue).

mod action;
pub use action::HoldId;

mod key;
pub use key::HoldKey;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tracing::{debug, info, instrument, trace, warn};

use crate::{
    config::{ConflictPolicy, HoldConfig},
    error::CoreError,
    event::{Event, EventBus, EventKind},
    runtime::Spawner,
};
use action::{HeldAction, Ops};

/// Why a held action took its cancellation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// Explicit `cancel` call, e.g. the user answered "no".
    Declined,
    /// The deadline elapsed with no answer.
    Expired,
    /// A newer registration for the same key replaced it.
    Superseded,
    /// The registry was shut down while the action was pending.
    Shutdown,
}

impl CancelReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            CancelReason::Declined => "declined",
            CancelReason::Expired => "expired",
            CancelReason::Superseded => "superseded",
            CancelReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Result of a `complete` or `cancel` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    Cancelled,
    /// Nothing was pending for the key; no callback ran.
    NoPendingAction,
}

impl Resolution {
    #[inline]
    pub fn is_applied(&self) -> bool {
        !matches!(self, Resolution::NoPendingAction)
    }
}

/// Keyed registry holding at most one pending action per [`HoldKey`].
///
/// Clones share the same registry.
#[derive(Clone)]
pub struct HoldRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    cfg: HoldConfig,
    bus: EventBus,
    spawner: Spawner,
    entries: Mutex<HashMap<HoldKey, Arc<HeldAction>>>,
}

impl HoldRegistry {
    pub fn new(cfg: HoldConfig) -> Self {
        Self::with_bus(cfg, EventBus::default())
    }

    pub fn with_bus(cfg: HoldConfig, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: Arc::from(cfg.name.as_str()),
                cfg,
                bus,
                spawner: Spawner::capture(),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a pending action and start its deadline timer.
    ///
    /// Returns immediately. If `key` already has a pending action the configured
    /// [`ConflictPolicy`] decides: `Reject` fails with [`CoreError::HoldConflict`],
    /// `Replace` cancels the old one with [`CancelReason::Superseded`].
    ///
    /// The deadline timer runs on the caller's tokio runtime, or on the one the
    /// registry was built in. With neither, nothing is filed and
    /// [`CoreError::NoRuntime`] is returned.
    #[instrument(level = "debug", skip(self, key, on_complete, on_cancel), fields(registry = %self.inner.name, key = %key))]
    pub fn register<C, X>(
        &self,
        key: HoldKey,
        on_complete: C,
        on_cancel: X,
        timeout: Duration,
    ) -> Result<HoldId, CoreError>
    where
        C: FnOnce() + Send + 'static,
        X: FnOnce(CancelReason) + Send + 'static,
    {
        let Some(rt) = self.inner.spawner.handle() else {
            warn!("no tokio runtime for the deadline timer; registration rejected");
            return Err(CoreError::NoRuntime);
        };

        let action = Arc::new(HeldAction::new(
            key.clone(),
            Ops {
                on_complete: Box::new(on_complete),
                on_cancel: Box::new(on_cancel),
            },
        ));

        let displaced = {
            let mut entries = self.inner.lock();
            let occupied = entries.get(&key).is_some_and(|a| a.is_pending());

            if occupied && self.inner.cfg.conflict == ConflictPolicy::Reject {
                drop(entries);
                warn!("held action already pending; registration rejected");
                self.inner.publish(
                    Event::new(EventKind::HoldRejected, self.inner.name.clone())
                        .with_key(key.as_str())
                        .with_reason("conflict"),
                );
                return Err(CoreError::HoldConflict {
                    key: key.to_string(),
                });
            }
            entries.insert(key.clone(), Arc::clone(&action))
        };

        if let Some(old) = displaced
            && let Some(on_cancel) = old.take_for_cancel()
        {
            info!(old = %old.id, "pending held action superseded");
            self.inner.publish(
                Event::new(EventKind::HoldSuperseded, self.inner.name.clone())
                    .with_key(key.as_str())
                    .with_elapsed_ms(old.elapsed_ms()),
            );
            on_cancel(CancelReason::Superseded);
        }

        let id = action.id;
        rt.spawn(deadline(Arc::clone(&self.inner), action, timeout));

        debug!(%id, timeout_ms = timeout.as_millis() as u64, "held action registered");
        self.inner.publish(
            Event::new(EventKind::HoldRegistered, self.inner.name.clone())
                .with_key(key.as_str())
                .with_reason(format!("timeout {}ms", timeout.as_millis())),
        );
        Ok(id)
    }

    /// [`register`](Self::register) with the configured default deadline.
    pub fn register_default<C, X>(
        &self,
        key: HoldKey,
        on_complete: C,
        on_cancel: X,
    ) -> Result<HoldId, CoreError>
    where
        C: FnOnce() + Send + 'static,
        X: FnOnce(CancelReason) + Send + 'static,
    {
        let timeout = self.inner.cfg.default_timeout();
        self.register(key, on_complete, on_cancel, timeout)
    }

    /// Settle the pending action for `key` on its completion path.
    pub fn complete(&self, key: &HoldKey) -> Resolution {
        let Some((action, on_complete)) = self.inner.settle(key, |a| a.take_for_complete()) else {
            return self.inner.not_found(key);
        };

        info!(registry = %self.inner.name, %key, id = %action.id, "held action completed");
        self.inner.publish(
            Event::new(EventKind::HoldCompleted, self.inner.name.clone())
                .with_key(key.as_str())
                .with_elapsed_ms(action.elapsed_ms()),
        );
        on_complete();
        Resolution::Completed
    }

    /// Settle the pending action for `key` on its cancellation path.
    pub fn cancel(&self, key: &HoldKey) -> Resolution {
        let Some((action, on_cancel)) = self.inner.settle(key, |a| a.take_for_cancel()) else {
            return self.inner.not_found(key);
        };

        info!(registry = %self.inner.name, %key, id = %action.id, "held action cancelled");
        self.inner.publish(
            Event::new(EventKind::HoldCancelled, self.inner.name.clone())
                .with_key(key.as_str())
                .with_reason(CancelReason::Declined.as_label())
                .with_elapsed_ms(action.elapsed_ms()),
        );
        on_cancel(CancelReason::Declined);
        Resolution::Cancelled
    }

    pub fn is_pending(&self, key: &HoldKey) -> bool {
        self.inner.lock().get(key).is_some_and(|a| a.is_pending())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Cancel every pending action with [`CancelReason::Shutdown`].
    ///
    /// Returns how many actions were cancelled.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.inner.lock().drain().map(|(_, a)| a).collect();

        let mut cancelled = 0;
        for action in drained {
            if let Some(on_cancel) = action.take_for_cancel() {
                self.inner.publish(
                    Event::new(EventKind::HoldCancelled, self.inner.name.clone())
                        .with_key(action.key.as_str())
                        .with_reason(CancelReason::Shutdown.as_label())
                        .with_elapsed_ms(action.elapsed_ms()),
                );
                on_cancel(CancelReason::Shutdown);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(registry = %self.inner.name, cancelled, "pending held actions cancelled on shutdown");
        }
        cancelled
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<HoldKey, Arc<HeldAction>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: Event) {
        self.bus.publish(event);
    }

    /// Win the settlement for `key` and unfile the action, or return `None`.
    fn settle<T>(
        &self,
        key: &HoldKey,
        take: impl FnOnce(&HeldAction) -> Option<T>,
    ) -> Option<(Arc<HeldAction>, T)> {
        let mut entries = self.lock();
        let action = Arc::clone(entries.get(key)?);
        let op = take(&action)?;
        entries.remove(key);
        Some((action, op))
    }

    fn not_found(&self, key: &HoldKey) -> Resolution {
        trace!(registry = %self.name, %key, "no pending held action");
        self.publish(Event::new(EventKind::HoldNotFound, self.name.clone()).with_key(key.as_str()));
        Resolution::NoPendingAction
    }

    fn expire(&self, action: &HeldAction) {
        let Some(on_cancel) = action.take_for_cancel() else {
            return;
        };
        {
            let mut entries = self.lock();
            // The slot may already hold a newer registration for the same key.
            if entries.get(&action.key).is_some_and(|a| a.id == action.id) {
                entries.remove(&action.key);
            }
        }

        info!(registry = %self.name, key = %action.key, id = %action.id, "held action expired unanswered");
        self.publish(
            Event::new(EventKind::HoldExpired, self.name.clone())
                .with_key(action.key.as_str())
                .with_reason(CancelReason::Expired.as_label())
                .with_elapsed_ms(action.elapsed_ms()),
        );
        on_cancel(CancelReason::Expired);
    }
}

/// Deadline timer of one held action; stopped early when the action settles.
async fn deadline(inner: Arc<Inner>, action: Arc<HeldAction>, timeout: Duration) {
    tokio::select! {
        _ = action.timer.cancelled() => {
            trace!(id = %action.id, "deadline timer stopped");
        }
        _ = tokio::time::sleep(timeout) => inner.expire(&action),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    use super::*;

    /// Records which callbacks ran.
    #[derive(Clone, Default)]
    struct Probe {
        completed: Arc<AtomicUsize>,
        cancelled: Arc<Mutex<Vec<CancelReason>>>,
    }

    impl Probe {
        fn on_complete(&self) -> impl FnOnce() + Send + 'static {
            let completed = self.completed.clone();
            move || {
                completed.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_cancel(&self) -> impl FnOnce(CancelReason) + Send + 'static {
            let cancelled = self.cancelled.clone();
            move |reason: CancelReason| cancelled.lock().unwrap().push(reason)
        }

        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }

        fn cancelled(&self) -> Vec<CancelReason> {
            self.cancelled.lock().unwrap().clone()
        }
    }

    fn key(s: &str) -> HoldKey {
        HoldKey::new(s).unwrap()
    }

    fn registry() -> HoldRegistry {
        HoldRegistry::new(HoldConfig::default())
    }

    fn replacing_registry() -> HoldRegistry {
        HoldRegistry::new(HoldConfig::default().with_conflict(ConflictPolicy::Replace))
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_hold_is_cancelled_once_at_deadline() {
        let reg = registry();
        let probe = Probe::default();
        reg.register(key("alice"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(1000))
            .unwrap();

        sleep(Duration::from_millis(999)).await;
        assert!(probe.cancelled().is_empty());
        assert!(reg.is_pending(&key("alice")));

        sleep(Duration::from_millis(2)).await;
        assert_eq!(probe.cancelled(), vec![CancelReason::Expired]);
        assert_eq!(probe.completed(), 0);
        assert!(reg.is_empty());

        sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.cancelled().len(), 1);
        assert_eq!(reg.complete(&key("alice")), Resolution::NoPendingAction);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_before_deadline_suppresses_cancellation() {
        let reg = registry();
        let probe = Probe::default();
        reg.register(key("bob"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(1000))
            .unwrap();

        sleep(Duration::from_millis(200)).await;
        assert_eq!(reg.complete(&key("Bob")), Resolution::Completed);
        assert_eq!(probe.completed(), 1);

        assert_eq!(reg.cancel(&key("bob")), Resolution::NoPendingAction);
        assert_eq!(reg.complete(&key("bob")), Resolution::NoPendingAction);
        sleep(Duration::from_secs(5)).await;

        assert_eq!(probe.completed(), 1);
        assert!(probe.cancelled().is_empty());
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_runs_declined_path_once() {
        let reg = registry();
        let probe = Probe::default();
        reg.register(key("carol"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(500))
            .unwrap();

        assert_eq!(reg.cancel(&key("carol")), Resolution::Cancelled);
        assert_eq!(reg.cancel(&key("carol")), Resolution::NoPendingAction);
        sleep(Duration::from_secs(1)).await;

        assert_eq!(probe.cancelled(), vec![CancelReason::Declined]);
        assert_eq!(probe.completed(), 0);
    }

    #[tokio::test]
    async fn resolving_unknown_key_is_a_no_op() {
        let reg = registry();
        assert_eq!(reg.complete(&key("nobody")), Resolution::NoPendingAction);
        assert_eq!(reg.cancel(&key("nobody")), Resolution::NoPendingAction);
        assert!(!Resolution::NoPendingAction.is_applied());
    }

    #[tokio::test(start_paused = true)]
    async fn reject_policy_keeps_the_first_registration() {
        let reg = registry();
        let first = Probe::default();
        let second = Probe::default();

        reg.register(key("dave"), first.on_complete(), first.on_cancel(), Duration::from_secs(1))
            .unwrap();
        let err = reg
            .register(key("dave"), second.on_complete(), second.on_cancel(), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err, CoreError::HoldConflict { key: "dave".into() });

        assert_eq!(reg.complete(&key("dave")), Resolution::Completed);
        assert_eq!(first.completed(), 1);
        assert_eq!(second.completed(), 0);
        assert!(second.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn key_can_be_reused_after_settlement() {
        let reg = registry();
        let first = Probe::default();
        let second = Probe::default();

        reg.register(key("erin"), first.on_complete(), first.on_cancel(), Duration::from_millis(100))
            .unwrap();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(first.cancelled(), vec![CancelReason::Expired]);

        reg.register(key("erin"), second.on_complete(), second.on_cancel(), Duration::from_millis(100))
            .unwrap();
        assert_eq!(reg.complete(&key("erin")), Resolution::Completed);
        assert_eq!(second.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_policy_supersedes_the_old_action() {
        let reg = replacing_registry();
        let old = Probe::default();
        let new = Probe::default();

        reg.register(key("frank"), old.on_complete(), old.on_cancel(), Duration::from_millis(300))
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        reg.register(key("frank"), new.on_complete(), new.on_cancel(), Duration::from_millis(1000))
            .unwrap();
        assert_eq!(old.cancelled(), vec![CancelReason::Superseded]);

        // The old deadline passes without touching the new registration.
        sleep(Duration::from_millis(500)).await;
        assert!(reg.is_pending(&key("frank")));
        assert_eq!(old.cancelled().len(), 1);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(new.cancelled(), vec![CancelReason::Expired]);
        assert_eq!(old.completed() + new.completed(), 0);
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let reg = registry();
        let a = Probe::default();
        let b = Probe::default();

        reg.register(key("gina"), a.on_complete(), a.on_cancel(), Duration::from_millis(100))
            .unwrap();
        reg.register(key("hank"), b.on_complete(), b.on_cancel(), Duration::from_millis(100))
            .unwrap();
        assert_eq!(reg.len(), 2);

        assert_eq!(reg.complete(&key("gina")), Resolution::Completed);
        sleep(Duration::from_millis(200)).await;

        assert_eq!(a.completed(), 1);
        assert_eq!(b.cancelled(), vec![CancelReason::Expired]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_everything_pending() {
        let reg = registry();
        let a = Probe::default();
        let b = Probe::default();
        reg.register(key("ivy"), a.on_complete(), a.on_cancel(), Duration::from_secs(30))
            .unwrap();
        reg.register(key("jon"), b.on_complete(), b.on_cancel(), Duration::from_secs(30))
            .unwrap();

        assert_eq!(reg.shutdown(), 2);
        assert!(reg.is_empty());
        sleep(Duration::from_secs(60)).await;

        assert_eq!(a.cancelled(), vec![CancelReason::Shutdown]);
        assert_eq!(b.cancelled(), vec![CancelReason::Shutdown]);
    }

    #[tokio::test(start_paused = true)]
    async fn register_default_uses_configured_deadline() {
        let reg = HoldRegistry::new(HoldConfig {
            default_timeout_ms: 250,
            ..Default::default()
        });
        let probe = Probe::default();
        reg.register_default(key("kim"), probe.on_complete(), probe.on_cancel())
            .unwrap();

        sleep(Duration::from_millis(240)).await;
        assert!(probe.cancelled().is_empty());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.cancelled(), vec![CancelReason::Expired]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_answers_and_deadline_settle_exactly_once() {
        for round in 0..100u64 {
            let reg = registry();
            let probe = Probe::default();
            let k = key("racer");
            reg.register(k.clone(), probe.on_complete(), probe.on_cancel(), Duration::from_micros(round * 10))
                .unwrap();

            let yes = {
                let (reg, k) = (reg.clone(), k.clone());
                tokio::spawn(async move { reg.complete(&k) })
            };
            let no = {
                let (reg, k) = (reg.clone(), k.clone());
                tokio::spawn(async move { reg.cancel(&k) })
            };
            let yes = yes.await.unwrap();
            let no = no.await.unwrap();
            sleep(Duration::from_millis(5)).await;

            let applied = [yes, no].iter().filter(|r| r.is_applied()).count();
            let runs = probe.completed() + probe.cancelled().len();
            assert_eq!(runs, 1, "round {round}: exactly one callback");
            assert!(applied <= 1);
            assert_eq!(probe.completed(), usize::from(yes == Resolution::Completed));
            assert!(reg.is_empty());
        }
    }

    #[test]
    fn register_without_runtime_files_nothing() {
        let reg = registry();
        let probe = Probe::default();
        let outside = {
            let (reg, probe) = (reg.clone(), probe.clone());
            std::thread::spawn(move || {
                reg.register(key("viewer"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(10))
            })
            .join()
            .unwrap()
        };
        assert_eq!(outside, Err(CoreError::NoRuntime));
        assert!(reg.is_empty());

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            reg.register(key("viewer"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(10))
                .unwrap();
            sleep(Duration::from_millis(200)).await;
        });
        assert_eq!(probe.cancelled(), vec![CancelReason::Expired]);
        assert!(!reg.is_pending(&key("viewer")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn plain_thread_registration_still_expires() {
        let reg = registry();
        let probe = Probe::default();
        {
            let (reg, probe) = (reg.clone(), probe.clone());
            std::thread::spawn(move || {
                reg.register(key("viewer"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(20))
            })
            .join()
            .unwrap()
            .unwrap();
        }
        sleep(Duration::from_millis(300)).await;
        assert_eq!(probe.cancelled(), vec![CancelReason::Expired]);
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_reports_the_time_waited() {
        let rec = Arc::new(Recorder::default());
        let reg = HoldRegistry::with_bus(
            HoldConfig::default(),
            EventBus::new(vec![rec.clone() as Arc<dyn crate::event::Subscribe>]),
        );
        let probe = Probe::default();
        reg.register(key("lee"), probe.on_complete(), probe.on_cancel(), Duration::from_millis(400))
            .unwrap();

        sleep(Duration::from_millis(500)).await;
        let expired = rec.wait_for(EventKind::HoldExpired).await;
        assert_eq!(expired.elapsed_ms, Some(400));
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
        notify: tokio::sync::Notify,
    }

    impl Recorder {
        async fn wait_for(&self, kind: EventKind) -> Event {
            loop {
                let notified = self.notify.notified();
                if let Some(e) = self.seen.lock().unwrap().iter().find(|e| e.kind == kind) {
                    return e.clone();
                }
                notified.await;
            }
        }
    }

    #[async_trait::async_trait]
    impl crate::event::Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.clone());
            self.notify.notify_one();
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }
}
