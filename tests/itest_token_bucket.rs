#![cfg(feature = "runtime-tokio")]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use tickbucket::{CancellationToken, TickbucketError, TokenBucket, WaitContext};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admissions_never_exceed_capacity_plus_refill() {
    let rate = 50;
    let capacity = 5;

    let started = Instant::now();
    let bucket = Arc::new(TokenBucket::try_new(rate, capacity).unwrap());
    let ctx = WaitContext::with_timeout(Duration::from_millis(400));
    let admitted = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();

    for _ in 0..4 {
        let bucket = bucket.clone();
        let ctx = ctx.clone();
        let admitted = admitted.clone();

        handles.push(tokio::spawn(async move {
            loop {
                match bucket.wait(&ctx).await {
                    Ok(()) => {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TickbucketError::DeadlineExceeded) => break,
                    Err(err) => panic!("unexpected wait error: {err}"),
                }
            }
        }));
    }

    for _ in 0..2 {
        let bucket = bucket.clone();
        let ctx = ctx.clone();
        let admitted = admitted.clone();

        handles.push(tokio::spawn(async move {
            while ctx.err().is_none() {
                if bucket.allow() {
                    admitted.fetch_add(1, Ordering::Relaxed);
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let elapsed = started.elapsed();
    let admitted = admitted.load(Ordering::Relaxed);
    let bound = capacity as u64 + (elapsed.as_secs_f64() * rate as f64).floor() as u64;

    assert!(admitted <= bound, "admitted {admitted} > bound {bound}");
    // The initial burst plus a handful of refills, even on a slow machine.
    assert!(admitted >= capacity as u64 + 5, "admitted only {admitted}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_parent_token_releases_every_waiter() {
    let bucket = Arc::new(TokenBucket::try_new(1, 1).unwrap());
    assert!(bucket.allow());

    let parent = CancellationToken::new();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let bucket = bucket.clone();
            let ctx = WaitContext::from_token(parent.child_token());

            tokio::spawn(async move { bucket.wait(&ctx).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    parent.cancel();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter did not observe cancellation")
            .unwrap();

        assert_eq!(result, Err(TickbucketError::Cancelled));
    }

    assert_eq!(bucket.available(), 0);
}

#[tokio::test]
async fn blocked_wait_resumes_on_refill() {
    let bucket = TokenBucket::try_new(20, 1).unwrap();
    assert!(bucket.allow());

    let started = Instant::now();
    bucket
        .wait(&WaitContext::with_timeout(Duration::from_secs(1)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn shutdown_freezes_the_count() {
    let bucket = TokenBucket::try_new(100, 4).unwrap();
    assert!(bucket.allow());
    assert!(bucket.allow());

    bucket.shutdown();
    bucket.stopped().await;

    let before = bucket.available();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(bucket.available(), before);
}
