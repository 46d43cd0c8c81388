use criterion::{Criterion, criterion_group, criterion_main};

// Constructing a bucket spawns onto the ambient runtime; only the tokio build is benched.
#[cfg(feature = "runtime-tokio")]
mod enabled {
    use std::{sync::Arc, thread};

    use criterion::Criterion;
    use std::hint::black_box;

    use tickbucket::{TokenBucket, WaitContext};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    pub fn bench_allow(c: &mut Criterion) {
        let rt = runtime();
        let mut group = c.benchmark_group("token_bucket/allow");
        group.sample_size(200);

        group.bench_function("admitted", |b| {
            let bucket = rt.block_on(async { TokenBucket::try_new(1, i64::MAX).unwrap() });

            b.iter(|| {
                black_box(bucket.allow());
            });
        });

        group.bench_function("rejected", |b| {
            let bucket = rt.block_on(async { TokenBucket::try_new(1, 1).unwrap() });
            bucket.allow();

            b.iter(|| {
                black_box(bucket.allow());
            });
        });

        group.finish();
    }

    pub fn bench_allow_contended(c: &mut Criterion) {
        let rt = runtime();
        let mut group = c.benchmark_group("token_bucket/allow_contended");
        group.sample_size(50);

        for threads in [2_usize, 4, 8] {
            group.bench_function(format!("threads={threads}"), |b| {
                let bucket =
                    Arc::new(rt.block_on(async { TokenBucket::try_new(1, i64::MAX).unwrap() }));

                b.iter(|| {
                    thread::scope(|s| {
                        for _ in 0..threads {
                            let bucket = &bucket;
                            s.spawn(move || {
                                for _ in 0..1_000 {
                                    black_box(bucket.allow());
                                }
                            });
                        }
                    });
                });
            });
        }

        group.finish();
    }

    pub fn bench_wait_ready(c: &mut Criterion) {
        let rt = runtime();
        let mut group = c.benchmark_group("token_bucket/wait");
        group.sample_size(200);

        group.bench_function("token_available", |b| {
            let bucket = rt.block_on(async { TokenBucket::try_new(1, i64::MAX).unwrap() });
            let ctx = WaitContext::new();

            b.iter(|| {
                rt.block_on(async {
                    black_box(bucket.wait(&ctx).await).unwrap();
                });
            });
        });

        group.finish();
    }
}

#[cfg(feature = "runtime-tokio")]
fn bench_allow(c: &mut Criterion) {
    enabled::bench_allow(c)
}

#[cfg(not(feature = "runtime-tokio"))]
fn bench_allow(_: &mut Criterion) {}

#[cfg(feature = "runtime-tokio")]
fn bench_allow_contended(c: &mut Criterion) {
    enabled::bench_allow_contended(c)
}

#[cfg(not(feature = "runtime-tokio"))]
fn bench_allow_contended(_: &mut Criterion) {}

#[cfg(feature = "runtime-tokio")]
fn bench_wait_ready(c: &mut Criterion) {
    enabled::bench_wait_ready(c)
}

#[cfg(not(feature = "runtime-tokio"))]
fn bench_wait_ready(_: &mut Criterion) {}

criterion_group!(benches, bench_allow, bench_allow_contended, bench_wait_ready);
criterion_main!(benches);
