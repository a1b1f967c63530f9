use std::time::Duration;

use crate::ConfigError;

/// How many calls a limiter admits per unit of time.
///
/// Validated on construction and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    limit: u64,
    unit: Duration,
}

impl LimiterConfig {
    /// Allow `limit` calls per `unit`.
    ///
    /// Fails if either is zero, or if `unit / limit` is shorter than a nanosecond.
    pub fn new(limit: u64, unit: Duration) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if unit.is_zero() {
            return Err(ConfigError::ZeroUnit);
        }
        if unit.as_nanos() < u128::from(limit) {
            return Err(ConfigError::UnitTooShort { unit, limit });
        }

        Ok(Self { limit, unit })
    }

    /// Allow `limit` calls per second.
    pub fn per_second(limit: u64) -> Result<Self, ConfigError> {
        Self::new(limit, Duration::from_secs(1))
    }

    /// The number of calls admitted per [unit](Self::unit).
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The length of one rate-limiting period.
    pub fn unit(&self) -> Duration {
        self.unit
    }

    /// Time between two consecutive permits at the steady rate: `unit / limit`.
    ///
    /// Truncated to whole nanoseconds when `limit` doesn't divide `unit`, so the steady rate can
    /// be very slightly faster than `limit` per `unit`.
    pub fn interval(&self) -> Duration {
        let nanos = self.unit.as_nanos() / u128::from(self.limit);

        // `unit` is a Duration, so `unit / limit` with limit >= 1 always fits.
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
