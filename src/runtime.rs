//! Thin shim over the async runtime selected by cargo feature.
//!
//! `runtime-tokio` takes precedence when both runtime features are enabled.

use std::{
    future::Future,
    time::{Duration, Instant},
};

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-smol")))]
compile_error!("enable one of the `runtime-tokio` or `runtime-smol` features");

#[cfg(feature = "runtime-tokio")]
pub(crate) type Interval = tokio::time::Interval;

#[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
pub(crate) type Interval = smol::Timer;

#[cfg(feature = "runtime-tokio")]
pub(crate) fn new_interval(period: Duration) -> Interval {
    tokio::time::interval(period)
}

#[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
pub(crate) fn new_interval(period: Duration) -> Interval {
    smol::Timer::interval(period)
}

#[cfg(feature = "runtime-tokio")]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

#[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    smol::spawn(fut).detach();
}

#[cfg(feature = "runtime-tokio")]
pub(crate) async fn tick(interval: &mut Interval) {
    interval.tick().await;
}

#[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
pub(crate) async fn tick(interval: &mut Interval) {
    use futures::StreamExt;
    interval.next().await;
}

#[cfg(feature = "runtime-tokio")]
pub(crate) async fn sleep_until(deadline: Instant) {
    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
}

#[cfg(all(feature = "runtime-smol", not(feature = "runtime-tokio")))]
pub(crate) async fn sleep_until(deadline: Instant) {
    smol::Timer::at(deadline).await;
}
