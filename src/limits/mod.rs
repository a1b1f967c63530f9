//! Algorithms for limiting the rate of calls.
//!
//! | Algorithm | Background task | Bursts |
//! |-|-|-|
//! | [TokenBucketLimiter] | refills tokens | up to `limit` at once |
//! | [LeakyBucketLimiter] | drains the queue | none, calls are spaced by `unit / limit` |
//! | [FixedWindowLimiter] | rotates windows | up to `2 * limit` across a window boundary |
//! | [SlidingWindowLimiter] | none | approximately `limit` per any interval of `unit` |
//!
//! Limiters with a background task spawn it on construction, so they must be created from within
//! a tokio runtime. The task stops when the limiter is [shut down](TokenBucketLimiter::shutdown),
//! dropped, or when the parent cancellation token it was created with is cancelled.

mod fixed_window;
mod leaky_bucket;
mod sliding_window;
mod token_bucket;

pub use fixed_window::{FixedWindowLimiter, WindowKey};
pub use leaky_bucket::{LeakyBucketLimiter, Ticket};
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;
