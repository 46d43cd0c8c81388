use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tickbucket::{TickbucketError, TokenBucket, WaitContext};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Mode {
    /// Every worker spins on `allow()`.
    Allow,
    /// Every worker blocks in `wait()`.
    Wait,
    /// Even workers spin on `allow()`, odd workers block in `wait()`.
    Mixed,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tickbucket-stress",
    about = "Load test / benchmark harness for tickbucket"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Mixed)]
    mode: Mode,

    /// Tokens per second.
    #[arg(long, default_value_t = 1000)]
    rate: i64,

    /// Burst capacity.
    #[arg(long, default_value_t = 100)]
    capacity: i64,

    #[arg(long, default_value_t = 8)]
    workers: usize,

    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    #[arg(long, default_value_t = 100)]
    sample_every: u64,

    /// Per-worker pacing for `allow()` callers. Unpaced when absent.
    #[arg(long)]
    target_qps: Option<u64>,

    /// Emit the crate's debug events.
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rejected: AtomicU64,
    waited: AtomicU64,
    wait_timeouts: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Role {
    Allow,
    Wait,
}

fn role_for(mode: Mode, worker: usize) -> Role {
    match mode {
        Mode::Allow => Role::Allow,
        Mode::Wait => Role::Wait,
        Mode::Mixed if worker % 2 == 0 => Role::Allow,
        Mode::Mixed => Role::Wait,
    }
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap()
}

fn print_results(args: &Args, elapsed: Duration, hist: &Histogram<u64>, counts: &Counts) {
    let allowed = counts.allowed.load(Ordering::Relaxed);
    let waited = counts.waited.load(Ordering::Relaxed);
    let admitted = allowed + waited;
    let bound = args.capacity as u64 + (elapsed.as_secs_f64() * args.rate as f64).floor() as u64;

    println!(
        "mode={:?} rate={} capacity={} workers={}",
        args.mode, args.rate, args.capacity, args.workers
    );
    println!(
        "elapsed_s={:.3} admitted={} admitted_per_s={:.0}",
        elapsed.as_secs_f64(),
        admitted,
        admitted as f64 / elapsed.as_secs_f64()
    );
    println!(
        "allowed={} rejected={} waited={} wait_timeouts={}",
        allowed,
        counts.rejected.load(Ordering::Relaxed),
        waited,
        counts.wait_timeouts.load(Ordering::Relaxed)
    );
    println!(
        "bound={} within_bound={}",
        bound,
        if admitted <= bound { "yes" } else { "NO" }
    );

    if !hist.is_empty() {
        println!(
            "wait_lat_us p50={} p95={} p99={} p999={} max={}",
            hist.value_at_quantile(0.50),
            hist.value_at_quantile(0.95),
            hist.value_at_quantile(0.99),
            hist.value_at_quantile(0.999),
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no wait latency samples collected");
    }
}

async fn run(args: Args) {
    let started = Instant::now();
    let bucket = match TokenBucket::try_new(args.rate, args.capacity) {
        Ok(bucket) => Arc::new(bucket),
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let ctx = WaitContext::with_timeout(Duration::from_secs(args.duration_s));
    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());

    let mut join = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let bucket = Arc::clone(&bucket);
        let ctx = ctx.clone();
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let args = args.clone();

        join.push(tokio::spawn(async move {
            let mut hist = new_histogram();
            let mut i = 0_u64;
            let mut next_deadline = Instant::now();

            while !stop.load(Ordering::Relaxed) {
                i = i.wrapping_add(1);

                match role_for(args.mode, worker) {
                    Role::Allow => {
                        if let Some(qps) = args.target_qps {
                            let per_op_ns = 1_000_000_000u64 / qps.max(1);
                            let now = Instant::now();
                            if now < next_deadline {
                                tokio::time::sleep(next_deadline - now).await;
                            }
                            next_deadline += Duration::from_nanos(per_op_ns);
                        }

                        if bucket.allow() {
                            counts.allowed.fetch_add(1, Ordering::Relaxed);
                        } else {
                            counts.rejected.fetch_add(1, Ordering::Relaxed);
                        }

                        tokio::task::yield_now().await;
                    }
                    Role::Wait => {
                        let sample = should_sample(i, args.sample_every);
                        let t0 = if sample { Some(Instant::now()) } else { None };

                        match bucket.wait(&ctx).await {
                            Ok(()) => {
                                counts.waited.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TickbucketError::DeadlineExceeded | TickbucketError::Cancelled) => {
                                counts.wait_timeouts.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                            Err(err) => panic!("unexpected wait error: {err}"),
                        }

                        if let Some(t0) = t0 {
                            let us = t0.elapsed().as_micros() as u64;
                            let _ = hist.record(us.max(1));
                        }
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);
    ctx.cancel();

    let mut merged = new_histogram();
    for j in join {
        let hist = j.await.unwrap();
        merged.add(&hist).unwrap();
    }

    let elapsed = started.elapsed();
    bucket.shutdown();
    bucket.stopped().await;

    print_results(&args, elapsed, &merged, &counts);
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.workers.max(2))
        .build()
        .unwrap();

    rt.block_on(run(args));
}
