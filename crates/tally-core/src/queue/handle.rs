use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::error::TaskError;

/// Completion signal of a task submitted to a [`SerialQueue`](super::SerialQueue).
///
/// Resolves with the task's own result, or with the reason it did not produce one.
/// Dropping the handle does not cancel the task.
#[must_use = "dropping a TaskHandle discards the task outcome"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    seq: u64,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(seq: u64, rx: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self { seq, rx }
    }

    /// Position of the task in its queue's submission order.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Dropped)))
    }
}
