use thiserror::Error;

/// Errors reported synchronously by the coordination primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("deferred value has already been settled")]
    AlreadySettled,
    #[error("invalid hold key: {0:?}")]
    InvalidKey(String),
    #[error("a held action is already pending for {key}")]
    HoldConflict { key: String },
    #[error("no tokio runtime to run the deadline timer on")]
    NoRuntime,
}

/// Outcome of a queued task that did not finish successfully.
///
/// Delivered through the task's [`TaskHandle`](crate::TaskHandle); the queue itself
/// never stops because of one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {reason}")]
    Fail { reason: String },
    #[error("task exceeded its timeout of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("task panicked: {reason}")]
    Panicked { reason: String },
    #[error("task was dropped before reporting a result")]
    Dropped,
    #[error("task was not queued: no tokio runtime")]
    NoRuntime,
}

impl TaskError {
    /// Wrap any displayable error as a task failure.
    pub fn fail(reason: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            reason: reason.to_string(),
        }
    }

    /// Short label used in logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "failed",
            TaskError::Timeout { .. } => "timeout",
            TaskError::Panicked { .. } => "panicked",
            TaskError::Dropped => "dropped",
            TaskError::NoRuntime => "no_runtime",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_keeps_display_text() {
        let err = TaskError::fail(std::io::Error::other("sheet unreachable"));
        assert_eq!(
            err,
            TaskError::Fail {
                reason: "sheet unreachable".into()
            }
        );
        assert_eq!(err.to_string(), "task failed: sheet unreachable");
    }

    #[test]
    fn labels_are_distinct() {
        let labels = [
            TaskError::fail("x").as_label(),
            TaskError::Timeout { timeout_ms: 1 }.as_label(),
            TaskError::Panicked { reason: "x".into() }.as_label(),
            TaskError::Dropped.as_label(),
            TaskError::NoRuntime.as_label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
