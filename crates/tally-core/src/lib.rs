//! Coordination core for a chat bot that writes to a remote ledger.
//!
//! Events from independent sources (chat, redemptions, cheers) arrive concurrently,
//! but the remote document has no transactions. Three primitives turn them into a
//! strict, at-most-once sequence of mutations:
//!
//! - [`Deferred`]: a value resolved once at startup (API client, token) and awaited
//!   by any number of handlers.
//! - [`SerialQueue`]: FIFO executor; one task at a time, failures contained.
//! - [`HoldRegistry`]: per-user pending confirmations with a deadline.

mod config;
pub use config::{ConflictPolicy, HoldConfig, QueueConfig};

mod error;
pub use error::{CoreError, TaskError};

pub mod deferred;
pub use deferred::Deferred;

pub mod event;
pub use event::{Event, EventBus, EventKind, Subscribe};

pub mod hold;
pub use hold::{CancelReason, HoldId, HoldKey, HoldRegistry, Resolution};

pub mod queue;
pub use queue::{SerialQueue, TaskHandle};

mod runtime;
