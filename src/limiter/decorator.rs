use std::{fmt, future::Future};

use super::Limiter;
use crate::RateLimitExceeded;

/// A wrapper which checks a [Limiter] before running an action.
///
/// When the limiter denies the call, the action is not run and [RateLimitExceeded] is returned
/// immediately. There is no retry and no backoff.
///
/// The action's own result is returned as-is, nested inside the limiter's result, so errors from
/// the action are never confused with (or masked by) a rate limit.
pub struct RateLimited<F, L> {
    action: F,
    limiter: L,
}

/// Wrap a zero-argument `action` so that every call is first checked against `limiter`.
///
/// Share one limiter between several actions by passing an `Arc`.
pub fn wrap<F, L>(action: F, limiter: L) -> RateLimited<F, L> {
    RateLimited { action, limiter }
}

impl<F, Fut, T, E, L> RateLimited<F, L>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: Limiter,
{
    /// Check the limiter, then run the action if admitted.
    pub async fn call(&self) -> Result<Result<T, E>, RateLimitExceeded> {
        self.limiter.check().await.into_result()?;

        Ok((self.action)().await)
    }
}

impl<F, L> RateLimited<F, L> {
    /// The limiter guarding the action.
    pub fn limiter(&self) -> &L {
        &self.limiter
    }
}

impl<F, L: fmt::Debug> fmt::Debug for RateLimited<F, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimited")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
