//! Background tasks owned by a limiter.

use std::future::Future;

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// A limiter's background task (refill, drain or rotation).
///
/// Spawned once, when the limiter is constructed. The task is handed a cancellation token which
/// it must observe on every tick. Dropping the `Maintenance` cancels the task.
#[derive(Debug)]
pub(crate) struct Maintenance {
    name: &'static str,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Maintenance {
    /// Spawn `task` on the current tokio runtime.
    ///
    /// The task runs on a child of `parent` when one is given, so cancelling the parent stops it
    /// too.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub(crate) fn spawn<F, Fut>(
        name: &'static str,
        parent: Option<&CancellationToken>,
        task: F,
    ) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);

        let fut = task(cancel.clone());
        let handle = tokio::spawn(async move {
            tracing::debug!(task = name, "maintenance task started");
            fut.await;
            tracing::debug!(task = name, "maintenance task stopped");
        });

        Self {
            name,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Whether the task is still running.
    pub(crate) fn is_running(&self) -> bool {
        match self.handle.try_lock() {
            Ok(handle) => handle.as_ref().is_some_and(|h| !h.is_finished()),
            // Someone is shutting the task down.
            Err(_) => false,
        }
    }

    /// Cancel the task and wait for it to finish.
    ///
    /// Idempotent. A panic inside the task is resumed on the caller.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    tracing::error!(task = self.name, "maintenance task panicked");
                    std::panic::resume_unwind(e.into_panic());
                }
                // Only happens if the runtime itself is shutting down.
                Err(_) => {}
            }
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
