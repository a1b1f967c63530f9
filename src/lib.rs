//! In-process rate limiters behind a single admission contract.

#![deny(missing_docs)]

#[cfg(doctest)]
use doc_comment::doctest;
#[cfg(doctest)]
doctest!("../README.md");

mod config;
mod error;
mod limiter;
pub mod limits;
mod maintenance;

pub use config::LimiterConfig;
pub use error::{ConfigError, RateLimitExceeded};
pub use limiter::{wrap, Decision, Limiter, RateLimited};
pub use limits::{
    FixedWindowLimiter, LeakyBucketLimiter, SlidingWindowLimiter, Ticket, TokenBucketLimiter,
    WindowKey,
};

/// Assert that a given duration has elapsed since `start`, within the given tolerance.
#[macro_export]
#[cfg(test)]
macro_rules! assert_elapsed {
    ($start:expr, $dur:expr, $tolerance:expr) => {{
        let elapsed = $start.elapsed();
        let lower: std::time::Duration = $dur;

        // Handles ms rounding
        assert!(
            elapsed >= lower && elapsed <= lower + $tolerance,
            "actual = {:?}, expected = {:?}",
            elapsed,
            lower
        );
    }};
}
