use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tokio_test::{assert_ok, assert_ready_eq, task};

use rate_gate::{
    wrap, Decision, FixedWindowLimiter, LeakyBucketLimiter, Limiter, LimiterConfig,
    RateLimitExceeded, SlidingWindowLimiter, TokenBucketLimiter, WindowKey,
};

const DENY: Decision = Decision::Deny(RateLimitExceeded);

fn three_per_second() -> LimiterConfig {
    LimiterConfig::per_second(3).unwrap()
}

async fn check_n(limiter: &impl Limiter, n: usize) -> Vec<Decision> {
    let mut decisions = Vec::with_capacity(n);
    for _ in 0..n {
        decisions.push(limiter.check().await);
    }
    decisions
}

/// Run `callers` concurrent checks against `limiter`, each after a small random delay.
async fn check_concurrently(limiter: Arc<dyn Limiter>, callers: usize) -> HashMap<Decision, usize> {
    let seed = rand::random();
    println!("Seed: {seed}");
    let mut rng = SmallRng::seed_from_u64(seed);

    let handles = (0..callers)
        .map(|_| {
            let limiter = limiter.clone();
            let jitter = Duration::from_micros(rng.gen_range(0..500));
            tokio::spawn(async move {
                tokio::time::sleep(jitter).await;
                limiter.check().await
            })
        })
        .collect_vec();

    let mut decisions = Vec::with_capacity(callers);
    for handle in handles {
        decisions.push(handle.await.unwrap());
    }
    decisions.into_iter().counts()
}

/// `limit=3, unit=1s`: five checks, then one more after 1.1s.
async fn burst_then_recover(limiter: impl Limiter) {
    assert_eq!(
        check_n(&limiter, 5).await,
        [Decision::Admit, Decision::Admit, Decision::Admit, DENY, DENY]
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(limiter.check().await, Decision::Admit);
}

#[tokio::test(start_paused = true)]
async fn token_bucket_burst_then_recover() {
    burst_then_recover(TokenBucketLimiter::new(three_per_second())).await;
}

#[tokio::test(start_paused = true)]
async fn fixed_window_burst_then_recover() {
    burst_then_recover(FixedWindowLimiter::new(three_per_second())).await;
}

#[tokio::test(start_paused = true)]
async fn sliding_window_burst_then_recover() {
    burst_then_recover(SlidingWindowLimiter::new(three_per_second())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn token_bucket_under_contention() {
    let limiter = Arc::new(TokenBucketLimiter::new(
        LimiterConfig::new(5, Duration::from_secs(3600)).unwrap(),
    ));

    let tokens_seen = Arc::new(AtomicU64::new(0));
    let observer = tokio::spawn({
        let limiter = limiter.clone();
        let tokens_seen = tokens_seen.clone();
        async move {
            for _ in 0..1000 {
                let tokens = limiter.available();
                assert!(tokens <= limiter.capacity(), "tokens = {tokens}");
                tokens_seen.fetch_max(tokens, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        }
    });

    let counts = check_concurrently(limiter.clone(), 50).await;

    assert_eq!(counts.get(&Decision::Admit), Some(&5));
    assert_eq!(counts.get(&DENY), Some(&45));
    assert_eq!(limiter.available(), 0);

    observer.await.unwrap();
    assert!(tokens_seen.load(Ordering::SeqCst) <= 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fixed_window_under_contention() {
    let limiter = Arc::new(FixedWindowLimiter::new(
        LimiterConfig::new(10, Duration::from_secs(3600)).unwrap(),
    ));

    let counts = check_concurrently(limiter.clone(), 100).await;

    assert_eq!(counts.get(&Decision::Admit), Some(&10));
    assert_eq!(counts.get(&DENY), Some(&90));
    assert_eq!(limiter.count(WindowKey(0)), Some(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sliding_window_under_contention() {
    let limiter = Arc::new(SlidingWindowLimiter::new(
        LimiterConfig::new(10, Duration::from_secs(3600)).unwrap(),
    ));

    let counts = check_concurrently(limiter, 100).await;

    assert_eq!(counts.get(&Decision::Admit), Some(&10));
}

#[tokio::test(start_paused = true)]
async fn leaky_bucket_denies_without_blocking_when_full() {
    let limiter = LeakyBucketLimiter::new(LimiterConfig::per_second(1).unwrap(), 2).unwrap();

    let first = assert_ok!(limiter.try_enqueue());
    let second = assert_ok!(limiter.try_enqueue());

    let mut check = task::spawn(limiter.check());
    assert_ready_eq!(check.poll(), DENY);

    assert_eq!(first.admitted().await, Decision::Admit);
    assert_eq!(second.admitted().await, Decision::Admit);
}

#[tokio::test(start_paused = true)]
async fn leaky_bucket_spaces_out_decorated_calls() {
    let limiter = Arc::new(
        LeakyBucketLimiter::new(LimiterConfig::new(2, Duration::from_secs(1)).unwrap(), 10)
            .unwrap(),
    );

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let start = tokio::time::Instant::now();

    let handles = (0..4)
        .map(|i| {
            let order = order.clone();
            let rpc = wrap(
                move || {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(i);
                        Ok::<_, ()>(start.elapsed())
                    }
                },
                limiter.clone(),
            );
            // Tasks start in spawn order, so they queue in that order.
            tokio::spawn(async move { rpc.call().await })
        })
        .collect_vec();

    let mut elapsed = Vec::new();
    for handle in handles {
        elapsed.push(handle.await.unwrap().unwrap().unwrap());
    }

    assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3]);
    for (i, elapsed) in elapsed.into_iter().enumerate() {
        let expected = Duration::from_millis(500) * u32::try_from(i).unwrap();
        assert!(
            elapsed >= expected && elapsed <= expected + Duration::from_millis(10),
            "call {i}: elapsed = {elapsed:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn decorator_with_token_bucket() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rpc = wrap(
        {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst)) }
            }
        },
        TokenBucketLimiter::new(LimiterConfig::per_second(2).unwrap()),
    );

    assert_eq!(rpc.call().await, Ok(Ok(0)));
    assert_eq!(rpc.call().await, Ok(Ok(1)));
    assert_eq!(rpc.call().await, Err(RateLimitExceeded));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(rpc.call().await, Ok(Ok(2)));

    rpc.limiter().shutdown().await;
}
