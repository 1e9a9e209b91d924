//! Write-once, read-many container for values that become known asynchronously.
//!
//! Startup code resolves things like an API client or an access token exactly once,
//! while any number of handlers may ask for the value before or after that happens.
//! Waiters are woken through a [`Notify`]; nobody polls.

use std::{fmt, sync::Arc};

use tokio::sync::{Notify, OnceCell};
use tracing::trace;

use crate::error::CoreError;

/// A single-assignment value shared between one producer and many consumers.
///
/// Clones share the same slot. A second [`settle`](Deferred::settle) is rejected with
/// [`CoreError::AlreadySettled`] and leaves the first value in place.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    cell: OnceCell<T>,
    notify: Notify,
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: OnceCell::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Store the value and wake every waiter.
    pub fn settle(&self, value: T) -> Result<(), CoreError> {
        self.inner
            .cell
            .set(value)
            .map_err(|_| CoreError::AlreadySettled)?;

        trace!("deferred value settled");
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Wait until the value is settled and borrow it.
    ///
    /// Returns without suspending when the value is already known.
    pub async fn get(&self) -> &T {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a settle in between is not missed.
            notified.as_mut().enable();

            if let Some(value) = self.inner.cell.get() {
                return value;
            }
            notified.await;
        }
    }

    #[inline]
    pub fn try_get(&self) -> Option<&T> {
        self.inner.cell.get()
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.inner.cell.initialized()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_get() {
            Some(value) => f.debug_tuple("Deferred::Settled").field(value).finish(),
            None => f.write_str("Deferred::Pending"),
        }
    }
}
