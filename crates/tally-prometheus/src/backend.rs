use async_trait::async_trait;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};
use tally_core::{Event, EventKind, Subscribe};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics text is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Counters and histograms fed from core events. Clones share the same metrics.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    tasks_submitted: IntCounterVec,
    tasks_completed: IntCounterVec,
    task_duration: HistogramVec,
    holds_registered: IntCounterVec,
    holds_settled: IntCounterVec,
    hold_wait: HistogramVec,
}

impl PrometheusMetrics {
    /// Metrics registered in a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new())
    }

    /// Metrics registered in an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, MetricsError> {
        let tasks_submitted = IntCounterVec::new(
            Opts::new("tally_tasks_submitted_total", "Tasks appended to a serial queue"),
            &["queue"],
        )?;
        let tasks_completed = IntCounterVec::new(
            Opts::new("tally_tasks_completed_total", "Tasks that left a serial queue, by outcome"),
            &["queue", "outcome"],
        )?;
        let task_duration = HistogramVec::new(
            HistogramOpts::new("tally_task_duration_seconds", "Run time of queued tasks")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["queue"],
        )?;
        let holds_registered = IntCounterVec::new(
            Opts::new("tally_holds_registered_total", "Held action registrations"),
            &["registry", "result"],
        )?;
        let holds_settled = IntCounterVec::new(
            Opts::new("tally_holds_settled_total", "Held actions settled, by outcome"),
            &["registry", "outcome"],
        )?;
        let hold_wait = HistogramVec::new(
            HistogramOpts::new("tally_hold_wait_seconds", "Time from registration to settlement")
                .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["registry"],
        )?;

        registry.register(Box::new(tasks_submitted.clone()))?;
        registry.register(Box::new(tasks_completed.clone()))?;
        registry.register(Box::new(task_duration.clone()))?;
        registry.register(Box::new(holds_registered.clone()))?;
        registry.register(Box::new(holds_settled.clone()))?;
        registry.register(Box::new(hold_wait.clone()))?;

        Ok(Self {
            registry,
            tasks_submitted,
            tasks_completed,
            task_duration,
            holds_registered,
            holds_settled,
            hold_wait,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition of every metric in the registry.
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Update the metrics for one event.
    pub fn record(&self, event: &Event) {
        let source = event.source.as_ref();
        let seconds = event.elapsed_ms.map(|ms| ms as f64 / 1000.0);

        let task_outcome = match event.kind {
            EventKind::TaskSubmitted => {
                self.tasks_submitted.with_label_values(&[source]).inc();
                None
            }
            EventKind::TaskSucceeded => Some("succeeded"),
            EventKind::TaskFailed => Some("failed"),
            EventKind::TaskTimedOut => Some("timeout"),
            _ => None,
        };
        if let Some(outcome) = task_outcome {
            self.tasks_completed.with_label_values(&[source, outcome]).inc();
            if let Some(s) = seconds {
                self.task_duration.with_label_values(&[source]).observe(s);
            }
            return;
        }

        let hold_outcome = match event.kind {
            EventKind::HoldRegistered => {
                self.holds_registered.with_label_values(&[source, "accepted"]).inc();
                None
            }
            EventKind::HoldRejected => {
                self.holds_registered.with_label_values(&[source, "rejected"]).inc();
                None
            }
            EventKind::HoldCompleted => Some("completed"),
            EventKind::HoldCancelled => Some("cancelled"),
            EventKind::HoldExpired => Some("expired"),
            EventKind::HoldSuperseded => Some("superseded"),
            _ => None,
        };
        if let Some(outcome) = hold_outcome {
            self.holds_settled.with_label_values(&[source, outcome]).inc();
            if let Some(s) = seconds {
                self.hold_wait.with_label_values(&[source]).observe(s);
            }
        }
    }
}

#[async_trait]
impl Subscribe for PrometheusMetrics {
    async fn on_event(&self, event: &Event) {
        self.record(event);
    }
    fn name(&self) -> &'static str {
        "prometheus"
    }
    fn queue_capacity(&self) -> usize {
        4096
    }
}
