use async_trait::async_trait;
use tally_core::{Event, Subscribe};

use crate::subscriber::view::log_event;

/// Events buffered before the bus starts dropping: a burst of about eighty queued
/// tasks, each publishing submitted, starting and finished.
const DEFAULT_CAPACITY: usize = 256;

/// Subscriber that writes every core event to the `tracing` log.
#[derive(Debug)]
pub struct Journal {
    capacity: usize,
}

impl Journal {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Journal with a custom event buffer, for feeds burstier than chat.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &Event) {
        log_event(event);
    }
    fn name(&self) -> &'static str {
        "journal"
    }
    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}
