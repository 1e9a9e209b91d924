//! Prometheus metrics for the tally coordination core.
//!
//! [`PrometheusMetrics`] is a [`tally_core::Subscribe`] implementation; attach it to
//! the [`tally_core::EventBus`] shared by the queue and the hold registry.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tally_core::{EventBus, QueueConfig, SerialQueue, Subscribe};
//! use tally_prometheus::PrometheusMetrics;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let bus = EventBus::new(vec![Arc::new(metrics.clone()) as Arc<dyn Subscribe>]);
//! let queue = SerialQueue::with_bus(QueueConfig::default(), bus);
//! queue.flush().await;
//!
//! // Events reach subscribers asynchronously; scrape whenever convenient.
//! let _text = metrics.render()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `tally_tasks_submitted_total{queue}` - Counter
//! - `tally_tasks_completed_total{queue, outcome}` - Counter (`succeeded`, `failed`, `timeout`)
//! - `tally_task_duration_seconds{queue}` - Histogram
//! - `tally_holds_registered_total{registry, result}` - Counter (`accepted`, `rejected`)
//! - `tally_holds_settled_total{registry, outcome}` - Counter (`completed`, `cancelled`, `expired`, `superseded`)
//! - `tally_hold_wait_seconds{registry}` - Histogram, registration to settlement
//!
//! ## HTTP Server
//! No `/metrics` endpoint is served here; call [`PrometheusMetrics::render`] from
//! whatever HTTP framework the application already runs.

mod backend;
pub use backend::{MetricsError, PrometheusMetrics};

pub use prometheus::{Encoder, Registry, TextEncoder};
