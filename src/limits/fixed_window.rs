use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{maintenance::Maintenance, Decision, Limiter, LimiterConfig};

/// Counts calls within discrete, non-overlapping windows of one `unit`.
///
/// Admits up to `limit` calls per window. Windows are aligned on the instant the limiter was
/// created, so window `n` covers `[created + n * unit, created + (n + 1) * unit)`.
///
/// A background task, ticking on every window boundary, evicts stale windows and pre-creates the
/// next one, so at most two windows (current and next) are ever stored.
///
/// Up to `2 * limit` calls can be admitted within one `unit` if they straddle a window boundary.
/// See [SlidingWindowLimiter](super::SlidingWindowLimiter) for an alternative.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: LimiterConfig,
    windows: Arc<Windows>,
    rotation: Maintenance,
}

/// Identifies a window: the number of whole units between the limiter's creation and the start
/// of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowKey(pub u64);

#[derive(Debug)]
struct Windows {
    origin: Instant,
    unit: Duration,
    counts: DashMap<WindowKey, u64>,
    /// The current window as of the latest rotation. Older windows are gone for good.
    rotated: AtomicU64,
}

impl FixedWindowLimiter {
    /// Create a limiter with the current and next windows open, and start rotating them.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(config: LimiterConfig) -> Self {
        Self::build(config, None)
    }

    /// Like [new()](Self::new()), stopping the rotation task when `cancel` is cancelled.
    pub fn with_cancellation(config: LimiterConfig, cancel: &CancellationToken) -> Self {
        Self::build(config, Some(cancel))
    }

    fn build(config: LimiterConfig, parent: Option<&CancellationToken>) -> Self {
        let origin = Instant::now();
        let windows = Arc::new(Windows {
            origin,
            unit: config.unit(),
            counts: DashMap::new(),
            rotated: AtomicU64::new(0),
        });
        windows.rotate(origin);

        tracing::debug!(
            limit = config.limit(),
            unit = ?config.unit(),
            "creating fixed window limiter"
        );

        let rotation = Maintenance::spawn("fixed window rotation", parent, {
            let windows = windows.clone();
            move |cancel| async move {
                let mut ticker = interval_at(origin + windows.unit, windows.unit);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let current = windows.rotate(Instant::now());
                            tracing::trace!(window = current.0, "fixed window rotated");
                        }
                    }
                }
            }
        });

        Self {
            config,
            windows,
            rotation,
        }
    }

    /// The window calls are currently counted in.
    pub fn current_window(&self) -> WindowKey {
        self.windows.key_at(Instant::now())
    }

    /// The number of calls admitted in a window, or `None` if the window isn't stored (already
    /// evicted, or not created yet).
    pub fn count(&self, window: WindowKey) -> Option<u64> {
        self.windows.counts.get(&window).map(|count| *count)
    }

    /// The number of windows currently stored.
    pub fn live_windows(&self) -> usize {
        self.windows.counts.len()
    }

    /// The limit and unit this limiter was created with.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Whether the rotation task is still running.
    pub fn is_running(&self) -> bool {
        self.rotation.is_running()
    }

    /// Stop rotating windows and wait for the rotation task to finish.
    ///
    /// Checks keep working, creating windows on demand, but stale windows are no longer evicted.
    pub async fn shutdown(&self) {
        self.rotation.shutdown().await;
    }
}

impl Windows {
    fn key_at(&self, now: Instant) -> WindowKey {
        let elapsed = now.saturating_duration_since(self.origin);
        let index = elapsed.as_nanos() / self.unit.as_nanos();

        WindowKey(u64::try_from(index).unwrap_or(u64::MAX))
    }

    fn rotated(&self) -> WindowKey {
        WindowKey(self.rotated.load(Ordering::SeqCst))
    }

    /// Evict windows older than the current one and make sure the next one exists.
    ///
    /// Returns the current window.
    fn rotate(&self, now: Instant) -> WindowKey {
        let current = self.key_at(now).max(self.rotated());

        // Published before evicting, so checks stop creating older windows.
        self.rotated.fetch_max(current.0, Ordering::SeqCst);

        self.counts.retain(|window, _| *window >= current);
        self.counts.entry(current).or_insert(0);
        self.counts
            .entry(WindowKey(current.0.saturating_add(1)))
            .or_insert(0);

        current
    }

    /// Atomically count a call in `window`, unless it already has `limit` calls.
    ///
    /// A window older than the latest rotation is replaced by the rotated current window. A
    /// window which doesn't exist yet counts as empty.
    fn try_increment(&self, window: WindowKey, limit: u64) -> bool {
        let mut window = window;
        loop {
            window = window.max(self.rotated());

            // Holds the shard's write lock until dropped.
            let entry = self.counts.entry(window);
            if window < self.rotated() {
                // Rotated in the meantime.
                drop(entry);
                continue;
            }

            let mut count = entry.or_insert(0);
            return if *count >= limit {
                false
            } else {
                *count += 1;
                true
            };
        }
    }
}

#[async_trait]
impl Limiter for FixedWindowLimiter {
    async fn check(&self) -> Decision {
        let window = self.windows.key_at(Instant::now());

        let decision = Decision::from(self.windows.try_increment(window, self.config.limit()));
        if !decision.is_admitted() {
            tracing::trace!(window = window.0, "fixed window full");
        }
        decision
    }
}
