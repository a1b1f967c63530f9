use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::RateLimitExceeded;

pub use decorator::{wrap, RateLimited};

mod decorator;

/// Decides whether a call may proceed, given a rate budget.
///
/// Each implementation owns its configuration (limit and time unit) and its state. Limiters are
/// shared between many concurrent callers; every check-and-update is atomic.
#[async_trait]
pub trait Limiter: Debug + Send + Sync {
    /// Check whether the current call may proceed.
    ///
    /// Returns [Decision::Deny] as soon as the budget is exhausted; callers are never made to wait
    /// for capacity. The one exception is a [LeakyBucketLimiter](crate::limits::LeakyBucketLimiter),
    /// which waits for its queued call to be drained.
    async fn check(&self) -> Decision;
}

/// The outcome of a [Limiter] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The call may proceed.
    Admit,
    /// The call must not proceed.
    Deny(RateLimitExceeded),
}

impl Decision {
    pub(crate) const DENY: Decision = Decision::Deny(RateLimitExceeded);

    /// Whether the call may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }

    /// `Ok(())` on [Decision::Admit].
    pub fn into_result(self) -> Result<(), RateLimitExceeded> {
        match self {
            Decision::Admit => Ok(()),
            Decision::Deny(e) => Err(e),
        }
    }
}

impl From<bool> for Decision {
    fn from(admitted: bool) -> Self {
        if admitted {
            Decision::Admit
        } else {
            Decision::DENY
        }
    }
}

#[async_trait]
impl<L> Limiter for Arc<L>
where
    L: Limiter + ?Sized,
{
    async fn check(&self) -> Decision {
        (**self).check().await
    }
}

#[cfg(test)]
mod tests {
    use crate::{Decision, RateLimitExceeded};

    #[test]
    fn into_result() {
        assert_eq!(Decision::Admit.into_result(), Ok(()));
        assert_eq!(
            Decision::Deny(RateLimitExceeded).into_result(),
            Err(RateLimitExceeded)
        );
    }

    #[test]
    fn from_bool() {
        assert!(Decision::from(true).is_admitted());
        assert_eq!(Decision::from(false), Decision::Deny(RateLimitExceeded));
    }
}
