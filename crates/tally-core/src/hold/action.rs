use std::{
    fmt,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{CancelReason, HoldKey};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Unique id of one registration.
///
/// A key can be registered again after settlement; the id tells registrations apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HoldId(Uuid);

impl HoldId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub(crate) type CompleteOp = Box<dyn FnOnce() + Send>;
pub(crate) type CancelOp = Box<dyn FnOnce(CancelReason) + Send>;

pub(crate) struct Ops {
    pub on_complete: CompleteOp,
    pub on_cancel: CancelOp,
}

/// A pending two-way decision.
///
/// `state` is the single-writer guard: whoever wins the `PENDING` compare-and-set
/// takes the callbacks and stops the deadline timer; every other path gets nothing.
pub(crate) struct HeldAction {
    pub id: HoldId,
    pub key: HoldKey,
    pub timer: CancellationToken,
    pub registered_at: Instant,
    state: AtomicU8,
    ops: Mutex<Option<Ops>>,
}

impl HeldAction {
    pub fn new(key: HoldKey, ops: Ops) -> Self {
        Self {
            id: HoldId::new(),
            key,
            timer: CancellationToken::new(),
            registered_at: Instant::now(),
            state: AtomicU8::new(PENDING),
            ops: Mutex::new(Some(ops)),
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn take_for_complete(&self) -> Option<CompleteOp> {
        self.settle(COMPLETED).map(|ops| ops.on_complete)
    }

    pub fn take_for_cancel(&self) -> Option<CancelOp> {
        self.settle(CANCELLED).map(|ops| ops.on_cancel)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.registered_at.elapsed().as_millis() as u64
    }

    fn settle(&self, to: u8) -> Option<Ops> {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.timer.cancel();
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn action(hits: Arc<AtomicUsize>) -> HeldAction {
        let h1 = hits.clone();
        HeldAction::new(
            HoldKey::new("viewer").unwrap(),
            Ops {
                on_complete: Box::new(move || {
                    h1.fetch_add(1, Ordering::SeqCst);
                }),
                on_cancel: Box::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn wait_time_follows_the_runtime_clock() {
        let a = action(Arc::new(AtomicUsize::new(0)));
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert_eq!(a.elapsed_ms(), 250);
    }

    #[test]
    fn only_first_settlement_gets_callbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let a = action(hits.clone());

        let complete = a.take_for_complete().expect("first settle wins");
        assert!(a.take_for_cancel().is_none());
        assert!(a.take_for_complete().is_none());
        assert!(!a.is_pending());
        assert!(a.timer.is_cancelled());

        complete();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn racing_threads_settle_exactly_once() {
        for _ in 0..200 {
            let hits = Arc::new(AtomicUsize::new(0));
            let a = Arc::new(action(hits.clone()));

            let threads: Vec<_> = (0..4)
                .map(|i| {
                    let a = a.clone();
                    std::thread::spawn(move || {
                        if i % 2 == 0 {
                            if let Some(op) = a.take_for_complete() {
                                op();
                            }
                        } else if let Some(op) = a.take_for_cancel() {
                            op(CancelReason::Declined);
                        }
                    })
                })
                .collect();
            for t in threads {
                t.join().unwrap();
            }
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }
    }
}
