//! Lifecycle events published by the queue and the hold registry.
//!
//! Subscribers (logging, metrics) receive them asynchronously through [`EventBus`].

mod bus;
pub use bus::EventBus;

use std::{sync::Arc, time::SystemTime};

use async_trait::async_trait;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // queue
    TaskSubmitted,
    TaskStarting,
    TaskSucceeded,
    TaskFailed,
    TaskTimedOut,
    QueueIdle,

    // holds
    HoldRegistered,
    HoldRejected,
    HoldCompleted,
    HoldCancelled,
    /// Deadline elapsed with no answer; the cancel path ran.
    HoldExpired,
    HoldSuperseded,
    HoldNotFound,
}

impl EventKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::TaskSubmitted => "task_submitted",
            EventKind::TaskStarting => "task_starting",
            EventKind::TaskSucceeded => "task_succeeded",
            EventKind::TaskFailed => "task_failed",
            EventKind::TaskTimedOut => "task_timed_out",
            EventKind::QueueIdle => "queue_idle",
            EventKind::HoldRegistered => "hold_registered",
            EventKind::HoldRejected => "hold_rejected",
            EventKind::HoldCompleted => "hold_completed",
            EventKind::HoldCancelled => "hold_cancelled",
            EventKind::HoldExpired => "hold_expired",
            EventKind::HoldSuperseded => "hold_superseded",
            EventKind::HoldNotFound => "hold_not_found",
        }
    }
}

/// A single lifecycle event.
///
/// Optional fields are filled in by the publisher when they make sense for the kind.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// Name of the queue or registry that emitted the event.
    pub source: Arc<str>,
    /// Submission sequence number of a task.
    pub seq: Option<u64>,
    /// Task label.
    pub task: Option<String>,
    /// Hold key.
    pub key: Option<String>,
    pub reason: Option<String>,
    pub elapsed_ms: Option<u64>,
    pub at: SystemTime,
}

impl Event {
    pub fn new(kind: EventKind, source: Arc<str>) -> Self {
        Self {
            kind,
            source,
            seq: None,
            task: None,
            key: None,
            reason: None,
            elapsed_ms: None,
            at: SystemTime::now(),
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}

/// Event consumer attached to an [`EventBus`].
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    fn name(&self) -> &'static str;

    /// Events buffered for this subscriber before new ones are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
