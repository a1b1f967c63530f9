use std::time::Duration;

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::{Decision, Limiter, LimiterConfig};

/// Approximates the number of calls in the last `unit`, using the counts of two adjacent fixed
/// windows.
///
/// The previous window's count is weighted by how much of it still overlaps the sliding interval
/// ending now:
///
/// ```text
/// estimate = previous * (1 - elapsed_in_current / unit) + current
/// ```
///
/// A call is admitted if `estimate < limit`. This smooths out the bursts a
/// [FixedWindowLimiter](super::FixedWindowLimiter) allows across window boundaries, assuming calls
/// in the previous window were evenly spread.
///
/// Windows are rolled over lazily by checks, so there is no background task.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: LimiterConfig,
    origin: Instant,
    counters: Mutex<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    window: u64,
    current: u64,
    previous: u64,
}

impl SlidingWindowLimiter {
    /// Create a limiter with empty windows.
    pub fn new(config: LimiterConfig) -> Self {
        tracing::debug!(
            limit = config.limit(),
            unit = ?config.unit(),
            "creating sliding window limiter"
        );

        Self {
            config,
            origin: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// The limit and unit this limiter was created with.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// The current estimate of calls admitted in the last `unit`.
    pub async fn estimate(&self) -> f64 {
        let mut counters = self.counters.lock().await;
        let elapsed = self.roll(&mut counters, Instant::now());
        counters.estimate(elapsed, self.config.unit())
    }

    pub(crate) async fn check_at(&self, now: Instant) -> Decision {
        let mut counters = self.counters.lock().await;
        self.decide(&mut counters, now)
    }

    fn decide(&self, counters: &mut Counters, now: Instant) -> Decision {
        let elapsed = self.roll(counters, now);

        let estimate = counters.estimate(elapsed, self.config.unit());
        if estimate < self.config.limit() as f64 {
            counters.current += 1;
            Decision::Admit
        } else {
            tracing::trace!(estimate, "sliding window full");
            Decision::DENY
        }
    }

    /// Roll the counters over to `now`'s window, returning how far into the stored window `now`
    /// is.
    fn roll(&self, counters: &mut Counters, now: Instant) -> Duration {
        let (window, elapsed) = self.position(now);
        if window < counters.window {
            // Already rolled over: the start of the stored window, with the previous window
            // fully overlapping.
            return Duration::ZERO;
        }
        counters.roll_to(window);
        elapsed
    }

    /// Which window `now` falls in, and how far into that window it is.
    fn position(&self, now: Instant) -> (u64, Duration) {
        let unit = self.config.unit().as_nanos();
        let since_origin = now.saturating_duration_since(self.origin).as_nanos();

        let window = u64::try_from(since_origin / unit).unwrap_or(u64::MAX);
        // Always less than `unit`, which is a Duration.
        let elapsed = u64::try_from(since_origin % unit).unwrap_or(u64::MAX);

        (window, Duration::from_nanos(elapsed))
    }
}

impl Counters {
    fn roll_to(&mut self, window: u64) {
        if window <= self.window {
            return;
        }
        self.previous = if window == self.window + 1 {
            self.current
        } else {
            0
        };
        self.current = 0;
        self.window = window;
    }

    fn estimate(&self, elapsed: Duration, unit: Duration) -> f64 {
        let overlap = 1.0 - elapsed.as_secs_f64() / unit.as_secs_f64();

        self.previous as f64 * overlap + self.current as f64
    }
}

#[async_trait]
impl Limiter for SlidingWindowLimiter {
    async fn check(&self) -> Decision {
        let mut counters = self.counters.lock().await;
        self.decide(&mut counters, Instant::now())
    }
}
