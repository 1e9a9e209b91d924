use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration of a [`SerialQueue`](crate::SerialQueue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    /// Name used in logs and events.
    pub name: String,
    /// Abort a task that runs longer than this.
    ///
    /// `None` lets a task run forever; everything queued behind it waits.
    pub task_timeout_ms: Option<u64>,
}

impl QueueConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_task_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.task_timeout_ms = Some(timeout_ms);
        self
    }

    pub(crate) fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "ledger".to_string(),
            task_timeout_ms: None,
        }
    }
}

/// What [`HoldRegistry::register`](crate::HoldRegistry::register) does when the key
/// already has a pending action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Refuse the new registration; the pending one is untouched.
    #[default]
    Reject,
    /// Cancel the pending action (reason `Superseded`) and install the new one.
    Replace,
}

/// Configuration of a [`HoldRegistry`](crate::HoldRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HoldConfig {
    pub name: String,
    pub conflict: ConflictPolicy,
    /// Deadline used by `register_default`.
    pub default_timeout_ms: u64,
}

impl HoldConfig {
    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    pub(crate) fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            name: "holds".to_string(),
            conflict: ConflictPolicy::Reject,
            default_timeout_ms: 60_000,
        }
    }
}
