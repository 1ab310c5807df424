//! Single-flight coordination for asynchronous operations.
//!
//! A `SingleFlight` slot runs an operation at most once and lets every
//! concurrent caller await the same execution and the same result. A
//! successful result stays memoized until `reset()`, so later callers observe
//! the completed outcome immediately. A failed result clears the slot, so the
//! next caller re-runs the operation instead of receiving a stale rejection.

use std::future::Future;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::errors::{WebboxError, WebboxResult};

type SharedOp<T> = Shared<BoxFuture<'static, Result<T, WebboxError>>>;

/// "Do at most once, let others await the same result" guard.
///
/// The slot is named after the operation it protects; the name only feeds
/// tracing output. The result type must be `Clone` because every waiter
/// receives its own copy of the single outcome.
pub(crate) struct SingleFlight<T: Clone> {
    name: &'static str,
    slot: Mutex<Option<SharedOp<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Run `op` at most once.
    ///
    /// The first caller installs the operation and drives it; callers arriving
    /// while it is outstanding (or after it succeeded) share the same result.
    /// `op` is only polled for the caller that installed it - for everyone
    /// else the provided future is dropped unpolled.
    pub(crate) async fn run<F>(&self, op: F) -> WebboxResult<T>
    where
        F: Future<Output = WebboxResult<T>> + Send + 'static,
    {
        let (shared, leader) = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(existing) => (existing.clone(), false),
                None => {
                    let shared = op.boxed().shared();
                    *slot = Some(shared.clone());
                    (shared, true)
                }
            }
        };

        if leader {
            tracing::debug!(op = self.name, "starting single-flight operation");
        } else {
            tracing::trace!(op = self.name, "joining in-flight operation");
        }

        let result = shared.clone().await;

        if result.is_err() {
            // Clear the slot so a later caller can retry, but only if it
            // still holds this run - a reset/retry may have replaced it.
            let mut slot = self.slot.lock();
            if slot.as_ref().is_some_and(|s| s.ptr_eq(&shared)) {
                tracing::debug!(op = self.name, "single-flight operation failed, clearing slot");
                *slot = None;
            }
        }

        result
    }

    /// Result of a completed run, if any.
    ///
    /// Returns `None` while the slot is empty or the operation is still
    /// outstanding.
    pub(crate) fn peek(&self) -> Option<WebboxResult<T>> {
        self.slot.lock().as_ref().and_then(|s| s.peek().cloned())
    }

    /// Forget any memoized run so the next caller starts fresh.
    pub(crate) fn reset(&self) {
        let mut slot = self.slot.lock();
        if slot.take().is_some() {
            tracing::trace!(op = self.name, "single-flight slot reset");
        }
    }
}

impl<T: Clone> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("name", &self.name)
            .finish()
    }
}
