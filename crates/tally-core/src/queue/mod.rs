//! FIFO executor that runs one asynchronous task at a time.
//!
//! The remote ledger has no transactions, so every read-modify-write against it goes
//! through one [`SerialQueue`]. Tasks run strictly in submission order and never
//! overlap; a failing, panicking or timed-out task is reported and the next one runs.

mod handle;
pub use handle::TaskHandle;

use std::{
    any::Any,
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    config::QueueConfig,
    error::TaskError,
    event::{Event, EventBus, EventKind},
    runtime::Spawner,
};

type Job = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

struct Queued {
    seq: u64,
    label: String,
    job: Job,
}

/// One slot of the FIFO: a submitted task, or a `flush` barrier that only wakes its
/// waiter and is never reported as a task.
enum Entry {
    Task(Queued),
    Barrier(oneshot::Sender<()>),
}

/// Handle to a serialized task queue. Clones share the same queue.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    task_timeout: Option<Duration>,
    bus: EventBus,
    spawner: Spawner,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Entry>,
    draining: bool,
    next_seq: u64,
}

impl SerialQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self::with_bus(cfg, EventBus::default())
    }

    /// Build a queue publishing to `bus`.
    ///
    /// When called inside a tokio runtime, that runtime also serves later
    /// submissions made from plain threads.
    pub fn with_bus(cfg: QueueConfig, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: Arc::from(cfg.name.as_str()),
                task_timeout: cfg.task_timeout(),
                bus,
                spawner: Spawner::capture(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append a task to the tail of the queue and return its completion signal.
    ///
    /// Never waits: the task runs later on a drain loop, which this call starts
    /// if the queue was idle. With no runtime to run on, the task is dropped, the
    /// queue is left as it was and the handle resolves to [`TaskError::NoRuntime`].
    #[instrument(level = "trace", skip(self, label, task), fields(queue = %self.inner.name))]
    pub fn submit<T, F>(&self, label: impl Into<String>, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = oneshot::channel();

        let Some(rt) = self.inner.spawner.handle() else {
            warn!(queue = %self.inner.name, task = %label, "no tokio runtime; task not queued");
            let _ = tx.send(Err(TaskError::NoRuntime));
            return TaskHandle::new(self.inner.lock().next_seq, rx);
        };

        let timeout = self.inner.task_timeout;
        let job: Job = Box::pin(async move {
            let result = run_guarded(task, timeout).await;
            let report = match &result {
                Ok(_) => Ok(()),
                Err(e) => Err(e.clone()),
            };
            // The submitter may have stopped listening.
            let _ = tx.send(result);
            report
        });

        let mut seq = 0;
        let start_drain = self.inner.enqueue(|next_seq| {
            seq = next_seq;
            Entry::Task(Queued {
                seq,
                label: label.clone(),
                job,
            })
        });

        trace!(seq, task = %label, "task queued");
        self.inner.publish(
            Event::new(EventKind::TaskSubmitted, self.inner.name.clone())
                .with_seq(seq)
                .with_task(label),
        );

        if start_drain {
            rt.spawn(drain(Arc::clone(&self.inner)));
        }
        TaskHandle::new(seq, rx)
    }

    /// Wait until every task submitted before this call has finished.
    ///
    /// The barrier takes no sequence number and publishes no events.
    pub async fn flush(&self) {
        let Some(rt) = self.inner.spawner.handle() else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if self.inner.enqueue(|_| Entry::Barrier(tx)) {
            rt.spawn(drain(Arc::clone(&self.inner)));
        }
        let _ = rx.await;
    }

    /// Tasks waiting behind the running one.
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .pending
            .iter()
            .filter(|e| matches!(e, Entry::Task(_)))
            .count()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: Event) {
        self.bus.publish(event);
    }

    /// Push an entry and mark the queue draining.
    ///
    /// `make` gets the sequence number the entry would take; only tasks consume it.
    /// Returns `true` when the caller must start the drain loop.
    fn enqueue(&self, make: impl FnOnce(u64) -> Entry) -> bool {
        let mut st = self.lock();
        let entry = make(st.next_seq);
        if matches!(entry, Entry::Task(_)) {
            st.next_seq += 1;
        }
        st.pending.push_back(entry);
        let start = !st.draining;
        st.draining = true;
        start
    }

    async fn run(&self, queued: Queued) {
        let Queued { seq, label, job } = queued;
        debug!(queue = %self.name, seq, task = %label, "task starting");
        self.publish(
            Event::new(EventKind::TaskStarting, self.name.clone())
                .with_seq(seq)
                .with_task(label.clone()),
        );

        let started = Instant::now();
        let result = job.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let event = match result {
            Ok(()) => {
                debug!(queue = %self.name, seq, task = %label, elapsed_ms, "task succeeded");
                Event::new(EventKind::TaskSucceeded, self.name.clone())
            }
            Err(e @ TaskError::Timeout { .. }) => {
                warn!(queue = %self.name, seq, task = %label, elapsed_ms, "{e}");
                Event::new(EventKind::TaskTimedOut, self.name.clone()).with_reason(e.to_string())
            }
            Err(e) => {
                error!(queue = %self.name, seq, task = %label, reason = %e, "task failed; continuing with next task");
                Event::new(EventKind::TaskFailed, self.name.clone()).with_reason(e.to_string())
            }
        };
        self.publish(
            event
                .with_seq(seq)
                .with_task(label)
                .with_elapsed_ms(elapsed_ms),
        );
    }
}

/// Run queued jobs one by one until the queue is empty.
async fn drain(inner: Arc<Inner>) {
    loop {
        let next = {
            let mut st = inner.lock();
            match st.pending.pop_front() {
                Some(entry) => entry,
                None => {
                    st.draining = false;
                    break;
                }
            }
        };
        match next {
            Entry::Task(queued) => inner.run(queued).await,
            Entry::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    trace!(queue = %inner.name, "queue idle");
    inner.publish(Event::new(EventKind::QueueIdle, inner.name.clone()));
}

/// Run a task on its own tokio task so a panic or a timeout stays contained.
async fn run_guarded<T, F>(task: F, timeout: Option<Duration>) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    let mut handle = tokio::spawn(task);

    let joined = match timeout {
        None => (&mut handle).await,
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                // Wait for the abort to land so the next task never overlaps this one.
                let _ = handle.await;
                return Err(TaskError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                });
            }
        },
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(TaskError::Panicked {
            reason: panic_reason(e.into_panic()),
        }),
        Err(_) => Err(TaskError::Dropped),
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
