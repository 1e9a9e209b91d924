use std::borrow::Borrow;

use tally_core::{Event, EventKind};
use tracing::{debug, error, info, trace, warn};

/// Field accessors with log-friendly fallbacks.
pub trait View {
    fn kind(&self) -> EventKind;
    fn as_source(&self) -> &str;
    fn as_task(&self) -> &str;
    fn as_key(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn seq(&self) -> u64;
    fn elapsed_ms(&self) -> u64;
}

impl<T> View for T
where
    T: Borrow<Event>,
{
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
    #[inline]
    fn as_source(&self) -> &str {
        &self.borrow().source
    }
    #[inline]
    fn as_task(&self) -> &str {
        self.borrow().task.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_key(&self) -> &str {
        self.borrow().key.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn seq(&self) -> u64 {
        self.borrow().seq.unwrap_or(0)
    }
    #[inline]
    fn elapsed_ms(&self) -> u64 {
        self.borrow().elapsed_ms.unwrap_or(0)
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // queue
        EventKind::TaskSubmitted => "task appended to the queue",
        EventKind::TaskStarting => "task is starting",
        EventKind::TaskSucceeded => "task finished",
        EventKind::TaskFailed => "task failed; queue continues",
        EventKind::TaskTimedOut => "task exceeded its timeout and was aborted",
        EventKind::QueueIdle => "queue drained",

        // holds
        EventKind::HoldRegistered => "held action awaiting confirmation",
        EventKind::HoldRejected => "held action already pending for this key",
        EventKind::HoldCompleted => "held action confirmed",
        EventKind::HoldCancelled => "held action cancelled",
        EventKind::HoldExpired => "held action expired unanswered",
        EventKind::HoldSuperseded => "held action replaced by a newer one",
        EventKind::HoldNotFound => "no held action pending for this key",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());
    let source = e.as_source();

    match e.kind() {
        // queue
        EventKind::TaskSubmitted => trace!(source, seq = e.seq(), task = e.as_task(), "{msg}"),
        EventKind::TaskStarting => debug!(source, seq = e.seq(), task = e.as_task(), "{msg}"),
        EventKind::TaskSucceeded => debug!(
            source,
            seq = e.seq(),
            task = e.as_task(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        EventKind::TaskFailed => error!(
            source,
            seq = e.seq(),
            task = e.as_task(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::TaskTimedOut => warn!(
            source,
            seq = e.seq(),
            task = e.as_task(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        EventKind::QueueIdle => trace!(source, "{msg}"),

        // holds
        EventKind::HoldRegistered => info!(source, key = e.as_key(), reason = e.as_reason(), "{msg}"),
        EventKind::HoldRejected => warn!(source, key = e.as_key(), "{msg}"),
        EventKind::HoldCompleted => info!(source, key = e.as_key(), elapsed_ms = e.elapsed_ms(), "{msg}"),
        EventKind::HoldCancelled => info!(
            source,
            key = e.as_key(),
            reason = e.as_reason(),
            elapsed_ms = e.elapsed_ms(),
            "{msg}"
        ),
        EventKind::HoldExpired => warn!(source, key = e.as_key(), elapsed_ms = e.elapsed_ms(), "{msg}"),
        EventKind::HoldSuperseded => info!(source, key = e.as_key(), "{msg}"),
        EventKind::HoldNotFound => debug!(source, key = e.as_key(), "{msg}"),
    }
}
