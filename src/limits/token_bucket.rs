use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::{maintenance::Maintenance, Decision, Limiter, LimiterConfig};

/// A pool of `limit` permits, refilled at a steady rate.
///
/// Starts full. Each admitted call consumes one token. A background task adds one token every
/// [`unit / limit`](LimiterConfig::interval), starting one `unit` after construction, and never
/// fills beyond `limit`.
///
/// When `limit` doesn't divide `unit` the refill interval is truncated to whole nanoseconds, so
/// the bucket refills marginally faster than `limit` per `unit` (by at most one nanosecond per
/// token).
#[derive(Debug)]
pub struct TokenBucketLimiter {
    config: LimiterConfig,
    bucket: Arc<Bucket>,
    refill: Maintenance,
}

#[derive(Debug)]
struct Bucket {
    capacity: u64,
    tokens: AtomicU64,
}

impl TokenBucketLimiter {
    /// Create a full bucket and start refilling it.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(config: LimiterConfig) -> Self {
        Self::build(config, None)
    }

    /// Like [new()](Self::new()), stopping the refill task when `cancel` is cancelled.
    pub fn with_cancellation(config: LimiterConfig, cancel: &CancellationToken) -> Self {
        Self::build(config, Some(cancel))
    }

    fn build(config: LimiterConfig, parent: Option<&CancellationToken>) -> Self {
        let bucket = Arc::new(Bucket {
            capacity: config.limit(),
            tokens: AtomicU64::new(config.limit()),
        });

        tracing::debug!(
            limit = config.limit(),
            unit = ?config.unit(),
            "creating token bucket limiter"
        );

        let start = Instant::now() + config.unit();
        let refill = Maintenance::spawn("token bucket refill", parent, {
            let bucket = bucket.clone();
            move |cancel| async move {
                let mut ticker = interval_at(start, config.interval());
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let added = bucket.add_token();
                            tracing::trace!(added, "token bucket refill tick");
                        }
                    }
                }
            }
        });

        Self {
            config,
            bucket,
            refill,
        }
    }

    /// The number of tokens currently available.
    pub fn available(&self) -> u64 {
        self.bucket.tokens.load(Ordering::Acquire)
    }

    /// The maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.bucket.capacity
    }

    /// The limit and unit this bucket was created with.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Whether the refill task is still running.
    pub fn is_running(&self) -> bool {
        self.refill.is_running()
    }

    /// Stop refilling and wait for the refill task to finish.
    ///
    /// Checks can still take the remaining tokens.
    pub async fn shutdown(&self) {
        self.refill.shutdown().await;
    }
}

impl Bucket {
    /// Atomically take a token, if there is one.
    fn take_token(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(1)
            })
            .is_ok()
    }

    /// Atomically add a token, unless full.
    fn add_token(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                (tokens < self.capacity).then_some(tokens + 1)
            })
            .is_ok()
    }
}

#[async_trait]
impl Limiter for TokenBucketLimiter {
    async fn check(&self) -> Decision {
        let decision = Decision::from(self.bucket.take_token());
        if !decision.is_admitted() {
            tracing::trace!("token bucket empty");
        }
        decision
    }
}
