//! Error types.

use std::time::Duration;

use thiserror::Error;

/// Admission was refused by a [Limiter](crate::Limiter).
///
/// This is the only error a limiter produces while running. Callers decide their own
/// retry/backoff policy.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[error("rate limit exceeded")]
pub struct RateLimitExceeded;

/// An invalid limiter configuration, rejected before any limiter is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The limit must allow at least one call per unit.
    #[error("limit must be greater than zero")]
    ZeroLimit,

    /// The time unit must be non-zero.
    #[error("time unit must be greater than zero")]
    ZeroUnit,

    /// `unit / limit` would be shorter than one nanosecond.
    #[error("time unit {unit:?} is too short for a limit of {limit}")]
    UnitTooShort {
        #[allow(missing_docs)]
        unit: Duration,
        #[allow(missing_docs)]
        limit: u64,
    },

    /// A leaky bucket needs room for at least one pending call.
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    /// The queue capacity doesn't fit in memory on this platform.
    #[error("queue capacity {0} is too large")]
    QueueCapacityTooLarge(u64),
}
