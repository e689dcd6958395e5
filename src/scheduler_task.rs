//! Scheduler tasks: a unit of deferred work and its continuations
//!
//! A [`Task`] bundles:
//! - a payload, an async closure run on the worker pool
//! - a success continuation and an error continuation, both run on the controlling
//!   context with mutable access to its state
//! - a stop flag, checked immediately before the payload runs
//!
//! The payload is re-runnable (`Fn`, not `FnOnce`) and captures its inputs by value, so
//! a failed task can be handed back to the [`Scheduler`](crate::scheduler::Scheduler)
//! unchanged and will execute the identical operation again.
//!
//! # Example
//!
//! ```no_run
//! use subfetch::scheduler::{Scheduler, control_channel};
//! use subfetch::scheduler_task::Task;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let (sender, context) = control_channel::<Vec<u64>>();
//! let shutdown = CancellationToken::new();
//! tokio::spawn(context.run(Vec::new(), shutdown.clone()));
//!
//! let scheduler = Scheduler::new(sender, 2, None);
//! scheduler.submit(Task::new(
//!     "Answer",
//!     || async { Ok(42u64) },
//!     |results: &mut Vec<u64>, value, _task| {
//!         results.push(value);
//!         Ok(())
//!     },
//!     |_results, error, task| tracing::error!(task = %task.name(), %error, "task failed"),
//! ));
//! # }
//! ```

use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

type Payload<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;
type SuccessFn<S, T> = Arc<dyn Fn(&mut S, T, &Task<S, T>) -> Result<()> + Send + Sync>;
type ErrorFn<S, T> = Arc<dyn Fn(&mut S, Error, &Task<S, T>) + Send + Sync>;

/// A unit of deferred work for the [`Scheduler`](crate::scheduler::Scheduler)
///
/// `S` is the state owned by the controlling context, `T` the payload's output.
/// Cloning a task shares its payload, continuations and stop flag.
pub struct Task<S, T> {
    name: Arc<str>,
    payload: Payload<T>,
    on_success: SuccessFn<S, T>,
    on_error: ErrorFn<S, T>,
    stop: Arc<AtomicBool>,
}

impl<S, T> Task<S, T> {
    /// Create a task
    ///
    /// # Arguments
    ///
    /// * `name` - Stage label used in logs and retry prompts
    /// * `payload` - Operation run on the worker pool
    /// * `on_success` - Runs on the controlling context with the payload's value;
    ///   returning `Err` hands that error to `on_error`
    /// * `on_error` - Runs on the controlling context with the failure and the task,
    ///   so the task can be resubmitted
    pub fn new<F, Fut, OnOk, OnErr>(
        name: impl Into<Arc<str>>,
        payload: F,
        on_success: OnOk,
        on_error: OnErr,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        OnOk: Fn(&mut S, T, &Task<S, T>) -> Result<()> + Send + Sync + 'static,
        OnErr: Fn(&mut S, Error, &Task<S, T>) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            payload: Arc::new(move || payload().boxed()),
            on_success: Arc::new(on_success),
            on_error: Arc::new(on_error),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stage label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request that the task not run; has no effect once the payload started
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether [`stop`](Self::stop) was requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Handle for stopping the task after it was submitted
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            name: Arc::clone(&self.name),
            stop: Arc::clone(&self.stop),
        }
    }

    /// Start one execution of the payload
    pub(crate) fn run_payload(&self) -> BoxFuture<'static, Result<T>> {
        (self.payload)()
    }

    /// Deliver the payload's outcome to exactly one continuation
    ///
    /// A success continuation that returns `Err` or panics counts as a failed task:
    /// the error continuation then receives that secondary error. Panics never
    /// propagate out of this call.
    pub(crate) fn complete(&self, state: &mut S, outcome: Result<T>) {
        let error = match outcome {
            Ok(value) => {
                let result =
                    std::panic::catch_unwind(AssertUnwindSafe(|| (self.on_success)(state, value, self)));
                match result {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => {
                        warn!(task = %self.name, error = %e, "Success continuation failed");
                        e
                    }
                    Err(_) => {
                        error!(task = %self.name, "Success continuation panicked");
                        Error::TaskPanicked {
                            task: self.name.to_string(),
                        }
                    }
                }
            }
            Err(e) => e,
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| (self.on_error)(state, error, self)));
        if result.is_err() {
            error!(task = %self.name, "Error continuation panicked");
        }
    }
}

impl<S, T> Clone for Task<S, T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            payload: Arc::clone(&self.payload),
            on_success: Arc::clone(&self.on_success),
            on_error: Arc::clone(&self.on_error),
            stop: Arc::clone(&self.stop),
        }
    }
}

impl<S, T> fmt::Debug for Task<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("stop", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle to a submitted task's stop flag
#[derive(Clone)]
pub struct TaskHandle {
    name: Arc<str>,
    stop: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Stage label of the task
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request that the task not run
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("stop", &self.is_stopped())
            .finish()
    }
}
