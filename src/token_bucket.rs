use std::{fmt, sync::Arc};

use futures::future::{self, Either};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    Capacity, Rate, TickbucketError, TokenBucketOptions, WaitContext,
    refill::{Refiller, RefillerOptions},
};

/// State shared between the bucket handle and its refill task.
pub(crate) struct BucketState {
    pub capacity: u64,
    /// Invariant: `0 <= tokens <= capacity`.
    pub tokens: Mutex<u64>,
    /// Advisory wake-up for blocked waiters. At most one permit is stored.
    pub wakeup: Notify,
    pub shutdown: CancellationToken,
}

impl BucketState {
    pub(crate) fn try_take(&self) -> bool {
        let mut tokens = self.tokens.lock();

        if *tokens > 0 {
            *tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Token bucket rate limiter with a background refill task.
///
/// The bucket starts full with `capacity` tokens. A background task adds one token
/// every `1s / rate` (never exceeding `capacity`). Each admission consumes one token.
///
/// # Admission
///
/// - [`allow`](Self::allow): take a token now or report refusal. Never blocks.
/// - [`wait`](Self::wait): suspend the calling task until a token is taken or the
///   [`WaitContext`] ends.
///
/// # Thread Safety
///
/// The token count sits behind a single lock shared by admissions and the refill
/// task. The lock is held for O(1) work and never across an `.await`, so no two
/// callers can consume the same token.
///
/// # Semantics & Limitations
///
/// **No fairness:** blocked waiters are not queued. A fresh `allow` can take a token
/// ahead of a task that has been waiting longer, and the wake-up order among
/// waiters is unspecified.
///
/// **Advisory wake-ups:** each refill tick nudges at most one waiter. Nudges can be
/// coalesced or arrive when no token is left; waiters always re-check the count.
///
/// **Integer refill:** tokens accrue one per tick, so refill granularity is
/// `1s / rate`.
///
/// # Lifecycle
///
/// Construction spawns the refill task on the active async runtime, so it must run
/// inside one. [`shutdown`](Self::shutdown), or dropping the bucket, stops the
/// timer and ends the task. Shutdown does not wake blocked waiters: cancel them
/// through their [`WaitContext`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tickbucket::{TokenBucket, WaitContext};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), tickbucket::TickbucketError> {
/// let bucket = TokenBucket::try_new(10, 2)?;
///
/// assert!(bucket.allow());
/// assert!(bucket.allow());
/// assert!(!bucket.allow());
///
/// // Refilled within ~100ms.
/// bucket.wait(&WaitContext::with_timeout(Duration::from_secs(1))).await?;
///
/// bucket.shutdown();
/// bucket.stopped().await;
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket {
    rate: Rate,
    capacity: Capacity,
    state: Arc<BucketState>,
    terminated: CancellationToken,
}

impl TokenBucket {
    /// Create a full bucket and start its refill task.
    ///
    /// # Panics
    ///
    /// With `runtime-tokio`, panics when called outside a Tokio runtime.
    pub fn new(options: TokenBucketOptions) -> Self {
        let TokenBucketOptions { rate, capacity } = options;

        let state = Arc::new(BucketState {
            capacity: *capacity,
            tokens: Mutex::new(*capacity),
            wakeup: Notify::new(),
            shutdown: CancellationToken::new(),
        });
        let terminated = CancellationToken::new();

        Refiller::run(RefillerOptions {
            interval: rate.tick_interval(),
            state: state.clone(),
            terminated: terminated.clone(),
        });

        tracing::debug!(rate = *rate, capacity = *capacity, "token bucket created");

        Self {
            rate,
            capacity,
            state,
            terminated,
        }
    } // end constructor

    /// Validate `rate` (tokens per second) and `capacity`, then build the bucket.
    ///
    /// # Errors
    ///
    /// - [`TickbucketError::InvalidRate`] if `rate <= 0`
    /// - [`TickbucketError::InvalidCapacity`] if `capacity <= 0`
    ///
    /// Nothing is spawned when validation fails.
    pub fn try_new(rate: i64, capacity: i64) -> Result<Self, TickbucketError> {
        let rate = Rate::try_from(rate)?;
        let capacity = Capacity::try_from(capacity)?;

        Ok(Self::new(TokenBucketOptions { rate, capacity }))
    }

    /// Take one token if one is available.
    ///
    /// Returns `true` if a token was consumed, `false` otherwise. Never blocks or
    /// queues.
    pub fn allow(&self) -> bool {
        self.state.try_take()
    } // end method allow

    /// Take one token, suspending the calling task until one is available or `ctx`
    /// ends.
    ///
    /// # Behavior
    ///
    /// 1. If `ctx` has already ended, fail without touching the bucket (even when
    ///    tokens are available)
    /// 2. Try to take a token; return on success
    /// 3. Otherwise suspend until a refill nudge arrives or `ctx` ends
    /// 4. On a nudge go back to 2; the nudge does not reserve a token
    ///
    /// # Errors
    ///
    /// - [`TickbucketError::Cancelled`] if `ctx` is cancelled
    /// - [`TickbucketError::DeadlineExceeded`] if the deadline of `ctx` passes
    ///
    /// A failed wait never consumes a token.
    pub async fn wait(&self, ctx: &WaitContext) -> Result<(), TickbucketError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        loop {
            if self.state.try_take() {
                return Ok(());
            }

            let done_fut = ctx.done();
            let wakeup_fut = self.state.wakeup.notified();

            futures::pin_mut!(done_fut);
            futures::pin_mut!(wakeup_fut);

            match future::select(done_fut, wakeup_fut).await {
                Either::Left((err, _)) => {
                    tracing::trace!(error = %err, "token bucket wait ended without a token");
                    return Err(err);
                }
                Either::Right(_) => continue,
            }
        }
    } // end method wait

    /// Stop the refill timer and signal the refill task to exit.
    ///
    /// Idempotent. Once this returns, the token count is no longer replenished.
    /// Blocked waiters are not woken.
    pub fn shutdown(&self) {
        {
            let _tokens = self.state.tokens.lock();

            if self.state.shutdown.is_cancelled() {
                return;
            }

            self.state.shutdown.cancel();
        }

        tracing::debug!(rate = *self.rate, capacity = *self.capacity, "token bucket shut down");
    } // end method shutdown

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Resolve once the refill task has exited and released its timer.
    ///
    /// Only completes after [`shutdown`](Self::shutdown).
    pub async fn stopped(&self) {
        self.terminated.cancelled().await;
    }

    /// Snapshot of the current token count.
    pub fn available(&self) -> u64 {
        *self.state.tokens.lock()
    }

    /// Configured refill rate.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Configured burst capacity.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Arc<BucketState> {
        &self.state
    }
} // end of impl

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("rate", &*self.rate)
            .field("capacity", &*self.capacity)
            .field("available", &self.available())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
