use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::{Event, Subscribe};

/// Fan-out of events to subscribers.
///
/// Each subscriber gets its own bounded channel and worker task, so a slow
/// subscriber only loses its own events and publishers never wait.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<Vec<Sink>>,
}

struct Sink {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

impl EventBus {
    /// Spawn one worker per subscriber. Must be called inside a tokio runtime.
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let sinks = subscribers
            .into_iter()
            .map(|sub| {
                let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
                let name = sub.name();

                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        sub.on_event(&event).await;
                    }
                });
                Sink { name, tx }
            })
            .collect();

        Self {
            sinks: Arc::new(sinks),
        }
    }

    pub fn publish(&self, event: Event) {
        if self.sinks.is_empty() {
            return;
        }
        let event = Arc::new(event);

        for sink in self.sinks.iter() {
            match sink.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = sink.name, kind = event.kind.as_label(), "subscriber queue full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(subscriber = sink.name, kind = event.kind.as_label(), "subscriber worker gone; event dropped");
                }
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::event::EventKind;

    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
        notify: Notify,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.kind);
            self.notify.notify_one();
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn delivers_events_in_publish_order() {
        let rec = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let bus = EventBus::new(vec![rec.clone() as Arc<dyn Subscribe>]);
        let source: Arc<str> = Arc::from("test");

        bus.publish(Event::new(EventKind::TaskSubmitted, source.clone()));
        bus.publish(Event::new(EventKind::TaskStarting, source.clone()));
        bus.publish(Event::new(EventKind::TaskSucceeded, source));

        while rec.seen.lock().unwrap().len() < 3 {
            rec.notify.notified().await;
        }
        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![
                EventKind::TaskSubmitted,
                EventKind::TaskStarting,
                EventKind::TaskSucceeded
            ]
        );
    }

    #[test]
    fn empty_bus_needs_no_runtime() {
        let bus = EventBus::default();
        assert!(bus.is_empty());
        bus.publish(Event::new(EventKind::QueueIdle, Arc::from("q")));
    }
}
