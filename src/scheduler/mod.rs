//! Task scheduler and controlling context.
//!
//! Two halves cooperate:
//! - [`ControlContext`] is a single loop that owns the application state `S` and runs
//!   closures posted to it one at a time. Everything that mutates `S` (task
//!   continuations, retry decisions, API calls) goes through it, so `S` needs no locks.
//! - [`Scheduler`] runs task payloads on a bounded pool. When a payload finishes, the
//!   scheduler posts the task's continuation back onto the controlling context.
//!
//! Submission returns immediately. Two independently submitted tasks have no ordering
//! guarantee; callers that need ordering submit the next task from the previous task's
//! success continuation.

use crate::error::{Error, Result};
use crate::scheduler_task::{Task, TaskHandle};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Closure run on the controlling context
pub type Continuation<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Create a connected sender / controlling-context pair
pub fn control_channel<S: 'static>() -> (ContextSender<S>, ControlContext<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ContextSender { tx }, ControlContext { rx })
}

/// Posts closures onto the controlling context (cloneable)
pub struct ContextSender<S> {
    tx: mpsc::UnboundedSender<Continuation<S>>,
}

impl<S> Clone for ContextSender<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> ContextSender<S> {
    /// Run `f` on the controlling context
    ///
    /// Returns `Err(Error::ShuttingDown)` if the context has stopped.
    pub fn post(&self, f: impl FnOnce(&mut S) + Send + 'static) -> Result<()> {
        self.tx.send(Box::new(f)).map_err(|_| Error::ShuttingDown)
    }

    /// Run `f` on the controlling context and wait for its result
    pub async fn query<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move |state| {
            reply_tx.send(f(state)).ok();
        })?;
        reply_rx.await.map_err(|_| Error::ShuttingDown)
    }

    /// Whether the controlling context has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Single loop owning the state `S`
pub struct ControlContext<S> {
    rx: mpsc::UnboundedReceiver<Continuation<S>>,
}

impl<S: 'static> ControlContext<S> {
    /// Run posted closures in order until `shutdown` fires or every sender is dropped
    ///
    /// Returns the final state. A closure that panics is logged and skipped; the loop
    /// keeps running.
    pub async fn run(mut self, mut state: S, shutdown: CancellationToken) -> S {
        debug!("Controlling context started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Controlling context received shutdown");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(continuation) => {
                        let result = std::panic::catch_unwind(AssertUnwindSafe(|| continuation(&mut state)));
                        if result.is_err() {
                            error!("Closure on controlling context panicked");
                        }
                    }
                    None => break,
                },
            }
        }
        self.rx.close();
        debug!("Controlling context stopped");
        state
    }
}

/// Bounded worker pool for task payloads
///
/// Holds no application state; it only needs a way back to the controlling context.
pub struct Scheduler<S> {
    context: ContextSender<S>,
    permits: Arc<Semaphore>,
    worker_threads: usize,
    stage_timeout: Option<Duration>,
}

impl<S> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            permits: Arc::clone(&self.permits),
            worker_threads: self.worker_threads,
            stage_timeout: self.stage_timeout,
        }
    }
}

impl<S: 'static> Scheduler<S> {
    /// Create a scheduler running at most `worker_threads` payloads at once
    ///
    /// `stage_timeout` bounds each payload execution; `None` waits indefinitely.
    pub fn new(
        context: ContextSender<S>,
        worker_threads: usize,
        stage_timeout: Option<Duration>,
    ) -> Self {
        let worker_threads = worker_threads.max(1);
        info!(worker_threads, ?stage_timeout, "Task scheduler initialized");
        Self {
            context,
            permits: Arc::new(Semaphore::new(worker_threads)),
            worker_threads,
            stage_timeout,
        }
    }

    /// Number of payloads that may run concurrently
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Sender for the controlling context this scheduler reports to
    pub fn context(&self) -> &ContextSender<S> {
        &self.context
    }

    /// Run `f` on the controlling context
    pub fn post(&self, f: impl FnOnce(&mut S) + Send + 'static) -> Result<()> {
        self.context.post(f)
    }

    /// Queue a task and return immediately
    ///
    /// The payload runs once a worker slot frees up. If the task's stop flag is set by
    /// then, the task is dropped and neither continuation fires. Otherwise exactly one
    /// continuation runs on the controlling context.
    pub fn submit<T: Send + 'static>(&self, task: Task<S, T>) -> TaskHandle {
        let handle = task.handle();
        let permits = Arc::clone(&self.permits);
        let context = self.context.clone();
        let stage_timeout = self.stage_timeout;

        debug!(task = %task.name(), "Submitting task");

        tokio::spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    debug!(task = %task.name(), "Worker pool closed, dropping task");
                    return;
                }
            };

            if task.is_stopped() {
                debug!(task = %task.name(), "Task stopped before execution, dropping");
                return;
            }

            debug!(task = %task.name(), "Running task payload");
            let outcome = execute(&task, stage_timeout).await;
            drop(permit);

            match &outcome {
                Ok(_) => debug!(task = %task.name(), "Task payload finished"),
                Err(e) => warn!(task = %task.name(), error = %e, "Task payload failed"),
            }

            let name = task.name().to_string();
            if context
                .post(move |state| task.complete(state, outcome))
                .is_err()
            {
                debug!(task = %name, "Controlling context gone, discarding task outcome");
            }
        });

        handle
    }

    /// Stop handing out worker slots; queued tasks are dropped without running
    pub fn close(&self) {
        self.permits.close();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

async fn execute<S, T>(task: &Task<S, T>, stage_timeout: Option<Duration>) -> Result<T> {
    // Building the future runs the payload closure, which can panic before any poll
    let payload = match std::panic::catch_unwind(AssertUnwindSafe(|| task.run_payload())) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind(),
        Err(_) => return Err(panicked(task)),
    };
    let caught = match stage_timeout {
        Some(after) => match tokio::time::timeout(after, payload).await {
            Ok(caught) => caught,
            Err(_) => {
                return Err(Error::Timeout {
                    task: task.name().to_string(),
                    after,
                });
            }
        },
        None => payload.await,
    };

    caught.unwrap_or_else(|_| Err(panicked(task)))
}

fn panicked<S, T>(task: &Task<S, T>) -> Error {
    error!(task = %task.name(), "Task payload panicked");
    Error::TaskPanicked {
        task: task.name().to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
