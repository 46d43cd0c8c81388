use std::time::{Duration, Instant};

use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;

use crate::{TickbucketError, runtime};

/// Cancellation and deadline handle for [`TokenBucket::wait`](crate::TokenBucket::wait).
///
/// A context ends either when it is cancelled (through [`cancel`](Self::cancel) on any
/// clone, or through the [`CancellationToken`] it was built from) or when its deadline
/// passes. The two outcomes surface as distinct errors:
/// [`TickbucketError::Cancelled`] and [`TickbucketError::DeadlineExceeded`].
///
/// Clones share cancellation state.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tickbucket::{TickbucketError, WaitContext};
///
/// let ctx = WaitContext::new();
/// assert!(ctx.err().is_none());
///
/// ctx.clone().cancel();
/// assert_eq!(ctx.err(), Some(TickbucketError::Cancelled));
///
/// let ctx = WaitContext::with_timeout(Duration::ZERO);
/// assert_eq!(ctx.err(), Some(TickbucketError::DeadlineExceeded));
/// ```
#[derive(Clone, Debug, Default)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    /// Context that only ends when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that ends `timeout` from now, or earlier if cancelled.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that ends at `deadline`, or earlier if cancelled.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Context driven by an existing token.
    ///
    /// Pass a [`CancellationToken::child_token`] to have the wait end when a parent
    /// scope shuts down without letting the wait cancel the parent.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Same token, with a deadline added.
    pub fn deadline_at(self, deadline: Instant) -> Self {
        Self {
            token: self.token,
            deadline: Some(deadline),
        }
    }

    /// Cancel the context and every clone of it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the context was cancelled. Deadline expiry is not cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the context ended, or `None` while it is still live.
    ///
    /// Cancellation is reported ahead of deadline expiry when both hold.
    pub fn err(&self) -> Option<TickbucketError> {
        if self.token.is_cancelled() {
            return Some(TickbucketError::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(TickbucketError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context ends, yielding the reason.
    pub async fn done(&self) -> TickbucketError {
        let Some(deadline) = self.deadline else {
            self.token.cancelled().await;
            return TickbucketError::Cancelled;
        };

        let cancelled = self.token.cancelled();
        let expired = runtime::sleep_until(deadline);

        futures::pin_mut!(cancelled);
        futures::pin_mut!(expired);

        match future::select(cancelled, expired).await {
            Either::Left(_) => TickbucketError::Cancelled,
            Either::Right(_) if self.token.is_cancelled() => TickbucketError::Cancelled,
            Either::Right(_) => TickbucketError::DeadlineExceeded,
        }
    }
}
