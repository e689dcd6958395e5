//! Error classification and retry decisions for failed stages
//!
//! When a stage payload fails, the pipeline hands the error to the [`RetryCoordinator`].
//! Operational failures (I/O, network, provider, timeouts) are put to a [`RetryPrompt`],
//! which answers [`RetryDecision::Retry`] or [`RetryDecision::Abandon`]. Contract and
//! state errors are never retried.
//!
//! The prompt runs off the controlling context, so a UI can take as long as it likes to
//! answer. Its decision is posted back onto the context, and a `Retry` resubmits the
//! same task object: the identical payload, continuations and stop flag. Earlier stages
//! are never re-run.
//!
//! # Example
//!
//! ```no_run
//! use subfetch::retry::{ChannelPrompt, RetryDecision};
//!
//! # async fn example() {
//! let (prompt, mut requests) = ChannelPrompt::new(16);
//! tokio::spawn(async move {
//!     while let Some(request) = requests.recv().await {
//!         println!("{} failed: {}", request.report.task_name, request.report.error);
//!         request.respond(RetryDecision::Retry);
//!     }
//! });
//! # let _ = prompt;
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::scheduler_task::Task;
use crate::types::{JobId, Stage};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, provider busy, unreadable file) should return `true`.
/// Contract violations (bad configuration, invalid state transition) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Operational failures: the user may fix the cause (reconnect, free the
            // file) and try again
            Error::Io(_)
            | Error::Network(_)
            | Error::Hash(_)
            | Error::Provider(_)
            | Error::Transfer { .. }
            | Error::Decompress(_)
            | Error::FileCollision { .. }
            | Error::Launch(_)
            | Error::Timeout { .. }
            | Error::TaskPanicked { .. } => true,
            // Contract and state errors are surfaced, never retried
            Error::Config { .. }
            | Error::Serialization(_)
            | Error::InvalidReference(_)
            | Error::InvalidTransition { .. }
            | Error::JobNotFound(_)
            | Error::NoFiles
            | Error::MultipleFiles { .. }
            | Error::ShuttingDown => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

/// Answer to a retry prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDecision {
    /// Resubmit the failed stage
    Retry,
    /// Give up on the job
    Abandon,
}

/// Everything a prompt needs to ask the user about a failed stage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureReport {
    /// Job whose stage failed
    pub job_id: JobId,
    /// Video the job is working on
    pub video_path: PathBuf,
    /// Failed stage
    pub stage: Stage,
    /// Task name shown to the user (e.g. "Find Subtitles")
    pub task_name: String,
    /// Human-readable error message
    pub error: String,
    /// Stable error code, see [`Error::error_code`]
    pub error_code: String,
    /// How many times the stage has been submitted so far (1 on the first failure)
    pub attempt: u32,
}

impl FailureReport {
    /// Build a report for `error` raised by `stage`
    pub fn new(
        job_id: JobId,
        video_path: PathBuf,
        stage: Stage,
        error: &Error,
        attempt: u32,
    ) -> Self {
        Self {
            job_id,
            video_path,
            stage,
            task_name: stage.label().to_string(),
            error: error.to_string(),
            error_code: error.error_code().to_string(),
            attempt,
        }
    }
}

/// Asks whether a failed stage should be retried
#[async_trait]
pub trait RetryPrompt: Send + Sync {
    /// Decide what to do about the failure in `report`
    async fn decide(&self, report: &FailureReport) -> RetryDecision;
}

/// Prompt that never retries
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysAbandon;

#[async_trait]
impl RetryPrompt for AlwaysAbandon {
    async fn decide(&self, report: &FailureReport) -> RetryDecision {
        tracing::debug!(job_id = %report.job_id, stage = %report.stage, "Abandoning without prompt");
        RetryDecision::Abandon
    }
}

/// A pending question for a [`ChannelPrompt`] consumer
#[derive(Debug)]
pub struct RetryRequest {
    /// The failure being asked about
    pub report: FailureReport,
    responder: oneshot::Sender<RetryDecision>,
}

impl RetryRequest {
    /// Send the answer back to the pipeline
    pub fn respond(self, decision: RetryDecision) {
        if self.responder.send(decision).is_err() {
            tracing::debug!(job_id = %self.report.job_id, "Retry answer arrived after pipeline stopped");
        }
    }
}

/// Prompt that forwards each failure to a channel, for interactive consumers
///
/// Dropping a [`RetryRequest`] without answering counts as [`RetryDecision::Abandon`].
#[derive(Clone, Debug)]
pub struct ChannelPrompt {
    tx: mpsc::Sender<RetryRequest>,
}

impl ChannelPrompt {
    /// Create the prompt and the receiver the consumer answers from
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<RetryRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RetryPrompt for ChannelPrompt {
    async fn decide(&self, report: &FailureReport) -> RetryDecision {
        let (responder, answer) = oneshot::channel();
        let request = RetryRequest {
            report: report.clone(),
            responder,
        };

        if self.tx.send(request).await.is_err() {
            tracing::warn!(job_id = %report.job_id, "No retry prompt listener, abandoning");
            return RetryDecision::Abandon;
        }

        answer.await.unwrap_or_else(|_| {
            tracing::debug!(job_id = %report.job_id, "Retry request dropped unanswered, abandoning");
            RetryDecision::Abandon
        })
    }
}

/// Headless prompt: retries after exponential backoff until `max_attempts` retries
/// have been spent
#[derive(Clone, Debug, Default)]
pub struct BackoffPrompt {
    config: RetryConfig,
}

impl BackoffPrompt {
    /// Create a prompt using `config` for attempt limits and delays
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RetryPrompt for BackoffPrompt {
    async fn decide(&self, report: &FailureReport) -> RetryDecision {
        if report.attempt > self.config.max_attempts {
            tracing::error!(
                job_id = %report.job_id,
                stage = %report.stage,
                attempts = report.attempt,
                error = %report.error,
                "Stage failed after all retry attempts exhausted"
            );
            return RetryDecision::Abandon;
        }

        let delay = backoff_delay(&self.config, report.attempt);
        let delay = if self.config.jitter {
            add_jitter(delay)
        } else {
            delay
        };

        tracing::warn!(
            job_id = %report.job_id,
            stage = %report.stage,
            error = %report.error,
            attempt = report.attempt,
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis(),
            "Stage failed, retrying"
        );

        tokio::time::sleep(delay).await;
        RetryDecision::Retry
    }
}

/// Delay before retry number `attempt` (1-based), before jitter
///
/// `initial_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}

/// Routes failed tasks to the [`RetryPrompt`] and resubmits them on `Retry`
///
/// Generic over the controlling-context state `S`; it holds no job state itself.
pub struct RetryCoordinator<S> {
    prompt: Arc<dyn RetryPrompt>,
    scheduler: Scheduler<S>,
}

impl<S> Clone for RetryCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            prompt: Arc::clone(&self.prompt),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S: 'static> RetryCoordinator<S> {
    /// Create a coordinator that resubmits through `scheduler`
    pub fn new(prompt: Arc<dyn RetryPrompt>, scheduler: Scheduler<S>) -> Self {
        Self { prompt, scheduler }
    }

    /// Whether `error` should be put to the prompt at all
    pub fn classify(&self, error: &Error) -> bool {
        error.is_retryable()
    }

    /// Ask the prompt about `report` and act on the answer
    ///
    /// Returns immediately; the prompt is awaited on its own tokio task. Once it answers,
    /// `resolve` runs on the controlling context with the decision. If `resolve` returns
    /// `true` and the decision is [`RetryDecision::Retry`], `task` is resubmitted
    /// unchanged. Returning `false` (job cancelled meanwhile, for instance) drops it.
    pub fn request_decision<T, R>(&self, report: FailureReport, task: Task<S, T>, resolve: R)
    where
        T: Send + 'static,
        R: FnOnce(&mut S, RetryDecision) -> bool + Send + 'static,
    {
        let prompt = Arc::clone(&self.prompt);
        let scheduler = self.scheduler.clone();

        tracing::debug!(
            job_id = %report.job_id,
            stage = %report.stage,
            attempt = report.attempt,
            "Requesting retry decision"
        );

        tokio::spawn(async move {
            let decision = prompt.decide(&report).await;
            tracing::info!(
                job_id = %report.job_id,
                stage = %report.stage,
                ?decision,
                "Retry decision received"
            );

            let resubmit = scheduler.clone();
            let posted = scheduler.post(move |state| {
                if resolve(state, decision) && decision == RetryDecision::Retry {
                    resubmit.submit(task);
                }
            });
            if posted.is_err() {
                tracing::debug!(job_id = %report.job_id, "Controlling context gone, dropping retry decision");
            }
        });
    }
}
