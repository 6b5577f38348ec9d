//! Cancellation scopes for store operations.
//!
//! A [`Context`] is passed to every store operation. Operations check it on
//! entry and streaming operations re-check it before every yield. Cloned and
//! derived contexts share one cancel flag, so cancelling the parent stops
//! every operation that received a copy.
//!
//! ```
//! use kvstore::Context;
//! use std::time::Duration;
//!
//! let (cx, cancel) = Context::with_cancel();
//! let bounded = cx.with_timeout(Duration::from_secs(5));
//! assert!(bounded.check().is_ok());
//!
//! cancel.cancel();
//! assert!(bounded.check().unwrap_err().is_cancellation());
//! ```

use crate::error::{Error, Result};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelState {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before reading the flag so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancellation scope with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    state: Option<Arc<CancelState>>,
    deadline: Option<Instant>,
}

/// Handle that cancels every [`Context`] derived from [`Context::with_cancel`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Cancels the associated contexts. Idempotent.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Returns true once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable context and the handle that cancels it.
    #[must_use]
    pub fn with_cancel() -> (Self, CancelHandle) {
        let state = Arc::new(CancelState::default());
        let cx = Self {
            state: Some(Arc::clone(&state)),
            deadline: None,
        };
        (cx, CancelHandle { state })
    }

    /// Derives a context that also ends `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derives a context that also ends at `deadline`.
    ///
    /// The earlier of the parent's deadline and `deadline` wins.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            state: self.state.clone(),
            deadline: Some(deadline),
        }
    }

    /// The deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context ended, or `None` while it is live.
    ///
    /// Cancellation takes precedence over an elapsed deadline.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        if self.state.as_ref().is_some_and(|s| s.is_cancelled()) {
            return Some(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(Error::DeadlineExceeded);
        }
        None
    }

    /// Returns true once the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Fails with the cancellation error if the context has ended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::DeadlineExceeded`].
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Completes when the context is cancelled or its deadline passes.
    ///
    /// Never completes for [`Context::background`].
    pub async fn done(&self) {
        let cancelled = async {
            match &self.state {
                Some(state) => state.wait().await,
                None => std::future::pending::<()>().await,
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = cancelled => {},
                    () = tokio::time::sleep_until(deadline.into()) => {},
                }
            },
            None => cancelled.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[test]
    fn test_background_is_never_done() {
        let cx = Context::background();
        assert!(cx.check().is_ok());
        assert!(cx.deadline().is_none());
    }

    #[test]
    fn test_cancel_reaches_clones_and_derived() {
        let (cx, cancel) = Context::with_cancel();
        let clone = cx.clone();
        let derived = cx.with_timeout(Duration::from_secs(60));

        cancel.cancel();

        assert!(cancel.is_cancelled());
        assert!(matches!(clone.check(), Err(Error::Cancelled)));
        assert!(matches!(derived.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_elapsed_deadline() {
        let cx = Context::background().with_deadline(Instant::now());
        assert!(matches!(cx.check(), Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let later = Instant::now() + Duration::from_secs(100);

        let cx = Context::background().with_deadline(soon).with_deadline(later);
        assert_eq!(cx.deadline(), Some(soon));
    }

    #[tokio::test]
    async fn test_done_wakes_on_cancel() {
        let (cx, cancel) = Context::with_cancel();
        let waiter = tokio::spawn(async move { cx.done().await });

        tokio::task::yield_now().await;
        cancel.cancel();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("done() should wake after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_done_wakes_on_deadline() {
        let cx = Context::background().with_timeout(Duration::from_millis(10));
        timeout(Duration::from_secs(1), cx.done())
            .await
            .expect("done() should wake at the deadline");
        assert!(cx.is_done());
    }

    #[tokio::test]
    async fn test_background_done_stays_pending() {
        let cx = Context::background();
        assert!(
            timeout(Duration::from_millis(20), cx.done())
                .await
                .is_err()
        );
    }
}
