//! Run-wide cancellation.

use crate::errors::PipelineError;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
    parent: Option<CancellationToken>,
}

/// A cloneable handle for cooperative cancellation of a run.
///
/// Cancellation is idempotent; only the first reason is kept. Every clone
/// observes the same state. A child token is cancelled with its parent but
/// cancelling the child leaves the parent untouched.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is also cancelled when this one is.
    #[must_use]
    pub fn child_token(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                parent: Some(self.clone()),
                ..Inner::default()
            }),
        }
    }

    /// Requests cancellation and wakes every waiter.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            warn!(reason = %reason, "Run cancelled");
            *self.inner.reason.write() = Some(reason);
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self.inner.parent.as_ref().is_some_and(Self::is_cancelled)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner
            .reason
            .read()
            .clone()
            .or_else(|| self.inner.parent.as_ref().and_then(Self::reason))
    }

    /// Completes once the token or one of its ancestors is cancelled.
    pub async fn cancelled(&self) {
        let mut waits = vec![Box::pin(self.cancelled_here())];
        let mut ancestor = self.inner.parent.as_ref();
        while let Some(token) = ancestor {
            waits.push(Box::pin(token.cancelled_here()));
            ancestor = token.inner.parent.as_ref();
        }
        futures::future::select_all(waits).await;
    }

    async fn cancelled_here(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Cancels the token after `timeout` unless the handle is aborted first.
    #[must_use]
    pub fn cancel_after(&self, timeout: Duration) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            token.cancel(format!("run timed out after {:.1}s", timeout.as_secs_f64()));
        })
    }

    /// Runs `future` until it completes or the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or [`PipelineError::Cancelled`] if
    /// cancellation wins; the future is dropped in that case.
    pub async fn guard<T, F>(&self, future: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if self.is_cancelled() {
            return Err(self.as_error());
        }
        tokio::select! {
            result = future => result,
            () = self.cancelled() => Err(self.as_error()),
        }
    }

    fn as_error(&self) -> PipelineError {
        PipelineError::Cancelled(self.reason().unwrap_or_else(|| "cancelled".to_string()))
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
