//! Per-call cancellation that combines the caller's token with a timeout.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// What tripped an [`IterationCancellation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's token was cancelled.
    Caller,
    /// The per-iteration timeout elapsed.
    Timeout,
}

/// A token that trips when the caller cancels or the timeout elapses,
/// whichever comes first.
///
/// The token is a child of the caller's token, so it is detached from the
/// parent when this value is dropped. The timer only runs inside
/// [`guard`](Self::guard) and stops with it. Nothing outlives the call.
#[derive(Debug)]
pub struct IterationCancellation {
    token: CancellationToken,
    parent: Option<CancellationToken>,
    timeout: Option<Duration>,
    timed_out: AtomicBool,
}

impl IterationCancellation {
    pub fn new(parent: Option<&CancellationToken>, timeout: Option<Duration>) -> Self {
        let token = parent.map(CancellationToken::child_token).unwrap_or_default();
        Self {
            token,
            parent: parent.cloned(),
            timeout,
            timed_out: AtomicBool::new(false),
        }
    }

    /// The composite token to hand to the cancellable operation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` with the timeout armed.
    ///
    /// When the timeout elapses first, the token is cancelled and `fut` is
    /// still awaited so it can observe the token and return its own result.
    pub async fn guard<F: Future>(&self, fut: F) -> F::Output {
        let Some(timeout) = self.timeout else {
            return fut.await;
        };
        tokio::pin!(fut);
        tokio::select! {
            out = &mut fut => out,
            _ = tokio::time::sleep(timeout) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(timeout_ms, "Iteration timeout elapsed");
                self.timed_out.store(true, Ordering::SeqCst);
                self.token.cancel();
                fut.await
            }
        }
    }

    /// Why the token tripped, if it has.
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.token.is_cancelled() {
            return None;
        }
        if self.timed_out.load(Ordering::SeqCst)
            && !self.parent.as_ref().is_some_and(CancellationToken::is_cancelled)
        {
            Some(CancelReason::Timeout)
        } else {
            Some(CancelReason::Caller)
        }
    }
}
