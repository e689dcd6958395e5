//! Core downloader implementation split into focused submodules.
//!
//! The `SubtitleDownloader` handle and the pipeline state it drives are organized by domain:
//! - [`state`] - Job status transitions
//! - [`job`] - Per-file job record and consumer snapshots
//! - [`session`] - Cached provider session token
//! - [`stages`] - Stage task construction and continuations
//! - [`control`] - Consumer API (submit, cancel, query, language and encoding, logout)
//! - [`lifecycle`] - Shutdown coordination
//!
//! All job state lives in one [`PipelineState`] owned by the controlling context (see
//! [`crate::scheduler::ControlContext`]). The public handle only posts closures to it.

mod control;
mod job;
mod lifecycle;
mod session;
mod stages;
mod state;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use job::JobSnapshot;
pub use state::Transition;

use crate::config::Config;
use crate::error::Result;
use crate::hash::MovieHasher;
use crate::launcher::{NoOpLauncher, SystemLauncher};
use crate::provider::{Fingerprinter, MediaLauncher, SubtitleProvider, SubtitleTransfer};
use crate::retry::{RetryCoordinator, RetryPrompt};
use crate::scheduler::{ContextSender, Scheduler, control_channel};
use crate::settings::{self, SettingsStore};
use crate::transfer::HttpTransfer;
use crate::types::{Event, JobId};
use job::PipelineJob;
use session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Pluggable services the pipeline stages call
#[derive(Clone)]
pub struct Collaborators {
    /// Computes video fingerprints (Hash stage)
    pub fingerprinter: Arc<dyn Fingerprinter>,
    /// Subtitle search service (Authenticate and Search stages)
    pub provider: Arc<dyn SubtitleProvider>,
    /// Fetches and decompresses subtitle files (Download stage)
    pub transfer: Arc<dyn SubtitleTransfer>,
    /// Opens the video once the subtitle is placed (Finalize stage)
    pub launcher: Arc<dyn MediaLauncher>,
    /// Answers retry questions for failed stages
    pub prompt: Arc<dyn RetryPrompt>,
    /// Preference store for the subtitle language (optional)
    pub settings: Option<Arc<dyn SettingsStore>>,
}

impl Collaborators {
    /// Default collaborators around `provider` and `prompt`
    ///
    /// Uses [`MovieHasher`], an [`HttpTransfer`] announcing the configured user agent,
    /// and [`SystemLauncher`] when a desktop opener is in PATH ([`NoOpLauncher`] otherwise).
    pub fn with_defaults(
        config: &Config,
        provider: Arc<dyn SubtitleProvider>,
        prompt: Arc<dyn RetryPrompt>,
    ) -> Result<Self> {
        let launcher: Arc<dyn MediaLauncher> = SystemLauncher::from_path()
            .map(|l| Arc::new(l) as Arc<dyn MediaLauncher>)
            .unwrap_or_else(|| Arc::new(NoOpLauncher));

        Ok(Self {
            fingerprinter: Arc::new(MovieHasher::new()),
            provider,
            transfer: Arc::new(HttpTransfer::new(&config.provider.user_agent)?),
            launcher,
            prompt,
            settings: None,
        })
    }

    /// Replace the fingerprinter
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Replace the subtitle transfer
    pub fn with_transfer(mut self, transfer: Arc<dyn SubtitleTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Replace the media launcher
    pub fn with_launcher(mut self, launcher: Arc<dyn MediaLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the retry prompt
    pub fn with_prompt(mut self, prompt: Arc<dyn RetryPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Attach a settings store
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Services captured by stage payloads
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) fingerprinter: Arc<dyn Fingerprinter>,
    pub(crate) provider: Arc<dyn SubtitleProvider>,
    pub(crate) transfer: Arc<dyn SubtitleTransfer>,
    pub(crate) launcher: Arc<dyn MediaLauncher>,
    pub(crate) config: Arc<Config>,
}

/// State owned by the controlling context
pub(crate) struct PipelineState {
    pub(crate) jobs: HashMap<JobId, PipelineJob>,
    pub(crate) next_id: u64,
    pub(crate) session: Session,
    /// Set to false during shutdown
    pub(crate) accepting_new: bool,
    /// Language new jobs search for
    pub(crate) language: String,
    pub(crate) services: Services,
    pub(crate) scheduler: Scheduler<PipelineState>,
    pub(crate) retry: RetryCoordinator<PipelineState>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl PipelineState {
    /// Emit an event to all subscribers
    ///
    /// send() returns Err if there are no receivers, which is fine - we just drop the event.
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Main downloader handle (cloneable - all fields are Arc-wrapped or channels)
#[derive(Clone)]
pub struct SubtitleDownloader {
    /// Posts closures onto the controlling context owning [`PipelineState`]
    pub(crate) context: ContextSender<PipelineState>,
    /// Worker pool for stage payloads
    pub(crate) scheduler: Scheduler<PipelineState>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Provider, for calls that bypass the pipeline (language list)
    pub(crate) provider: Arc<dyn SubtitleProvider>,
    /// Preference store
    pub(crate) settings: Option<Arc<dyn SettingsStore>>,
    /// Stops the controlling context
    pub(crate) shutdown_token: CancellationToken,
    /// Controlling context task, taken by the first `shutdown()`
    pub(crate) control_loop:
        Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<PipelineState>>>>,
}

impl SubtitleDownloader {
    /// Create a new SubtitleDownloader instance
    ///
    /// Validates the configuration, resolves the default language (settings key
    /// `core/languages` wins over `Config::language`), sets up the event broadcast
    /// channel and the worker pool, and spawns the controlling context.
    pub async fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = broadcast::channel(1000);

        let (context, control) = control_channel::<PipelineState>();
        let scheduler = Scheduler::new(context.clone(), config.worker_threads, config.stage_timeout);
        let retry = RetryCoordinator::new(Arc::clone(&collaborators.prompt), scheduler.clone());

        let language = collaborators
            .settings
            .as_deref()
            .and_then(settings::preferred_language)
            .unwrap_or_else(|| config.language.clone());

        let config = Arc::new(config);

        tracing::info!(
            language = %language,
            worker_threads = scheduler.worker_threads(),
            launcher = collaborators.launcher.name(),
            "Subtitle downloader initialized"
        );

        let state = PipelineState {
            jobs: HashMap::new(),
            next_id: 0,
            session: Session::default(),
            accepting_new: true,
            language,
            services: Services {
                fingerprinter: collaborators.fingerprinter,
                provider: Arc::clone(&collaborators.provider),
                transfer: collaborators.transfer,
                launcher: collaborators.launcher,
                config: Arc::clone(&config),
            },
            scheduler: scheduler.clone(),
            retry,
            event_tx: event_tx.clone(),
        };

        let shutdown_token = CancellationToken::new();
        let control_loop = tokio::spawn(control.run(state, shutdown_token.clone()));

        Ok(Self {
            context,
            scheduler,
            event_tx,
            config,
            provider: collaborators.provider,
            settings: collaborators.settings,
            shutdown_token,
            control_loop: Arc::new(tokio::sync::Mutex::new(Some(control_loop))),
        })
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use subfetch::{Collaborators, Config, SubtitleDownloader};
    /// use subfetch::retry::AlwaysAbandon;
    /// # use subfetch::provider::SubtitleProvider;
    ///
    /// # async fn example(provider: Arc<dyn SubtitleProvider>) -> subfetch::Result<()> {
    /// let config = Config::default();
    /// let collaborators = Collaborators::with_defaults(&config, provider, Arc::new(AlwaysAbandon))?;
    /// let downloader = SubtitleDownloader::new(config, collaborators).await?;
    ///
    /// let mut events = downloader.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "subtitle event");
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}
