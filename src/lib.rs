//! # subfetch
//!
//! Backend library for downloading subtitles that match a video file.
//!
//! ## Design Philosophy
//!
//! subfetch is designed to be:
//! - **Library-first** - No UI, the file drop and retry dialog live in the consumer
//! - **Pluggable** - Hashing, provider, transfer and launcher are traits
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! Each dropped video becomes a job that moves through five stages: Hash, Login,
//! Find Subtitles, Download Subtitles and Finalize. Stage payloads run on a bounded
//! worker pool; their results are applied on a single controlling context that owns
//! every job. A failed stage asks a [`RetryPrompt`] whether to run it again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use subfetch::{BackoffPrompt, Collaborators, Config, SubtitleDownloader};
//! # use subfetch::provider::SubtitleProvider;
//!
//! # async fn example(provider: Arc<dyn SubtitleProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let prompt = Arc::new(BackoffPrompt::new(config.retry.clone()));
//! let collaborators = Collaborators::with_defaults(&config, provider, prompt)?;
//! let downloader = SubtitleDownloader::new(config, collaborators).await?;
//!
//! // Subscribe to events
//! let mut events = downloader.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! downloader
//!     .submit_files(vec![PathBuf::from("/videos/movie.mkv")])
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// OpenSubtitles-style movie hash
pub mod hash;
/// Opening the video in the system player
pub mod launcher;
/// Collaborator traits for the pipeline stages
pub mod provider;
/// Retry decisions for failed stages
pub mod retry;
/// Worker pool and controlling context
pub mod scheduler;
/// Schedulable task with continuations
pub mod scheduler_task;
/// Persistent user preferences
pub mod settings;
/// HTTP subtitle transfer with gzip decoding
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FileCollisionAction, ProviderConfig, RetryConfig};
pub use downloader::{Collaborators, JobSnapshot, SubtitleDownloader, Transition};
pub use error::{Error, ProviderError, Result};
pub use hash::MovieHasher;
pub use launcher::{NoOpLauncher, SystemLauncher};
pub use provider::{Fingerprinter, MediaLauncher, SubtitleProvider, SubtitleTransfer};
pub use retry::{
    AlwaysAbandon, BackoffPrompt, ChannelPrompt, FailureReport, RetryDecision, RetryPrompt,
    RetryRequest,
};
pub use scheduler::Scheduler;
pub use scheduler_task::{Task, TaskHandle};
pub use settings::{JsonSettings, MemorySettings, SettingsStore};
pub use transfer::HttpTransfer;
pub use types::{
    Credentials, Event, Fingerprint, JobId, Language, SearchOutcome, SessionToken, Stage, Status,
    SubtitleCandidate,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use subfetch::{AlwaysAbandon, Collaborators, Config, SubtitleDownloader, run_with_shutdown};
/// # use subfetch::provider::SubtitleProvider;
///
/// # async fn example(provider: Arc<dyn SubtitleProvider>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let collaborators = Collaborators::with_defaults(&config, provider, Arc::new(AlwaysAbandon))?;
/// let downloader = SubtitleDownloader::new(config, collaborators).await?;
///
/// // Run with automatic signal handling
/// run_with_shutdown(downloader).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(downloader: SubtitleDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
