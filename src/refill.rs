use std::{sync::Arc, time::Duration};

use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;

use crate::{
    runtime::{new_interval, spawn_task, tick},
    token_bucket::BucketState,
};

pub(crate) struct RefillerOptions {
    pub interval: Duration,
    pub state: Arc<BucketState>,
    pub terminated: CancellationToken,
}

/// Background replenishment loop, one per bucket.
pub(crate) struct Refiller; // end struct Refiller

impl Refiller {
    pub fn run(options: RefillerOptions) {
        let RefillerOptions {
            interval,
            state,
            terminated,
        } = options;

        spawn_task(async move {
            // Cancels `terminated` however this task ends, panics included.
            let _terminated = terminated.drop_guard();
            let mut refill_interval = new_interval(interval);

            // Tokio's interval ticks immediately on first await; discard that so the
            // first refill lands one period after start. Smol's interval already waits.
            #[cfg(feature = "runtime-tokio")]
            tick(&mut refill_interval).await;

            tracing::debug!(interval_ns = interval.as_nanos() as u64, "refill task started");

            loop {
                let shutdown_fut = state.shutdown.cancelled();
                let tick_fut = tick(&mut refill_interval);

                futures::pin_mut!(shutdown_fut);
                futures::pin_mut!(tick_fut);

                // `select` polls the left future first, so a pending shutdown wins
                // over a due tick.
                match future::select(shutdown_fut, tick_fut).await {
                    Either::Left(_) => break,
                    Either::Right(_) => Self::refill_once(&state),
                }
            }

            // Release the shared state before `_terminated` fires.
            drop(state);
            tracing::debug!("refill task stopped");
        });
    } // end method run

    /// Add one token (capped at capacity) and nudge one waiter.
    ///
    /// The nudge is sent even when the bucket was already full. If nobody is waiting,
    /// `Notify` keeps a single permit that later notifications coalesce into.
    pub(crate) fn refill_once(state: &BucketState) {
        {
            let mut tokens = state.tokens.lock();

            // Checked under the lock that `shutdown` also takes, so nothing is added
            // once `TokenBucket::shutdown` has returned.
            if state.shutdown.is_cancelled() {
                return;
            }

            if *tokens < state.capacity {
                *tokens += 1;
            }
        }

        state.wakeup.notify_one();
    } // end method refill_once
} // end impl Refiller
