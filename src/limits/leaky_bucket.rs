use async_trait::async_trait;
use conv::ValueFrom;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot, Semaphore,
};
use tokio_util::sync::CancellationToken;

use crate::{
    maintenance::Maintenance, ConfigError, Decision, Limiter, LimiterConfig, RateLimitExceeded,
};

/// A bounded queue of pending calls, drained at a steady rate.
///
/// Queueing a call gives a [Ticket]. A background task pops tickets in FIFO order, admitting one,
/// then waiting [`unit / limit`](LimiterConfig::interval) before admitting the next. The caller
/// holding the ticket runs its own action once admitted; the limiter never runs it.
///
/// When the queue is full, new calls are denied straight away rather than waiting for space. The
/// queue capacity is independent of the rate, and bounds the amount of pending work.
///
/// As a [Limiter], [check()](Limiter::check()) queues a ticket and waits for it to be admitted.
#[derive(Debug)]
pub struct LeakyBucketLimiter {
    config: LimiterConfig,
    queue: mpsc::Sender<oneshot::Sender<()>>,
    drain: Maintenance,
}

/// A queued call, admitted when the [LeakyBucketLimiter] drains it.
///
/// Dropping a ticket gives up its place; the drain task skips it without waiting.
#[derive(Debug)]
#[must_use = "a ticket does nothing unless awaited"]
pub struct Ticket {
    signal: oneshot::Receiver<()>,
}

impl LeakyBucketLimiter {
    /// Create a queue holding up to `queue_capacity` pending calls, drained at `config`'s rate.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(config: LimiterConfig, queue_capacity: u64) -> Result<Self, ConfigError> {
        Self::build(config, queue_capacity, None)
    }

    /// Like [new()](Self::new()), stopping the drain task when `cancel` is cancelled.
    pub fn with_cancellation(
        config: LimiterConfig,
        queue_capacity: u64,
        cancel: &CancellationToken,
    ) -> Result<Self, ConfigError> {
        Self::build(config, queue_capacity, Some(cancel))
    }

    fn build(
        config: LimiterConfig,
        queue_capacity: u64,
        parent: Option<&CancellationToken>,
    ) -> Result<Self, ConfigError> {
        if queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        let capacity = usize::value_from(queue_capacity)
            .ok()
            .filter(|&c| c <= Semaphore::MAX_PERMITS)
            .ok_or(ConfigError::QueueCapacityTooLarge(queue_capacity))?;

        tracing::debug!(
            limit = config.limit(),
            unit = ?config.unit(),
            queue_capacity,
            "creating leaky bucket limiter"
        );

        let (queue, mut pending) = mpsc::channel::<oneshot::Sender<()>>(capacity);

        let leak_interval = config.interval();
        let drain = Maintenance::spawn("leaky bucket drain", parent, move |cancel| async move {
            loop {
                let ticket = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    ticket = pending.recv() => match ticket {
                        Some(ticket) => ticket,
                        // The limiter is gone.
                        None => break,
                    },
                };

                if ticket.send(()).is_err() {
                    tracing::trace!("skipping abandoned ticket");
                    continue;
                }
                tracing::trace!("leaky bucket admitted a ticket");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(leak_interval) => {}
                }
            }
            // Dropping `pending` here denies every ticket still queued.
        });

        Ok(Self {
            config,
            queue,
            drain,
        })
    }

    /// Queue a call without waiting.
    ///
    /// Fails immediately if the queue is full, or if the limiter has been shut down.
    pub fn try_enqueue(&self) -> Result<Ticket, RateLimitExceeded> {
        let (tx, rx) = oneshot::channel();
        match self.queue.try_send(tx) {
            Ok(()) => Ok(Ticket { signal: rx }),
            Err(TrySendError::Full(_)) => {
                tracing::trace!("leaky bucket queue full");
                Err(RateLimitExceeded)
            }
            Err(TrySendError::Closed(_)) => Err(RateLimitExceeded),
        }
    }

    /// The number of calls waiting to be admitted.
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// The maximum number of calls which can wait to be admitted.
    pub fn queue_capacity(&self) -> usize {
        self.queue.max_capacity()
    }

    /// The rate this bucket drains at.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Whether the drain task is still running.
    pub fn is_running(&self) -> bool {
        self.drain.is_running()
    }

    /// Stop draining and wait for the drain task to finish.
    ///
    /// Tickets still queued are denied, as are all later calls.
    pub async fn shutdown(&self) {
        self.drain.shutdown().await;
    }
}

impl Ticket {
    /// Wait until the call is admitted.
    ///
    /// Resolves to [Decision::Deny] if the limiter shuts down first.
    pub async fn admitted(self) -> Decision {
        Decision::from(self.signal.await.is_ok())
    }
}

#[async_trait]
impl Limiter for LeakyBucketLimiter {
    async fn check(&self) -> Decision {
        match self.try_enqueue() {
            Ok(ticket) => ticket.admitted().await,
            Err(e) => Decision::Deny(e),
        }
    }
}
