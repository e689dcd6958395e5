//! Job status transitions.
//!
//! ```text
//! Empty -> Hashing -> [Authenticating ->] Searching -> SubtitlesFound -> Downloading
//!       -> SubtitleDownloaded -> Finalizing -> Finalized
//!                                         \-> SubtitlesNotFound
//! running(stage)   --Failed-->  AwaitingDecision(stage)
//! AwaitingDecision(stage) --Retry-->   running(stage)
//! AwaitingDecision(stage) --Abandon--> Abandoned
//! any non-terminal        --Cancel-->  Abandoned
//! ```

use crate::error::{Error, Result};
use crate::types::Status;
use std::fmt;

/// Event that moves a job from one [`Status`] to the next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Hash task submitted
    Start,
    /// Fingerprint computed; `authenticated` if a session token is cached
    Hashed {
        /// Whether login can be skipped
        authenticated: bool,
    },
    /// Session token obtained
    LoggedIn,
    /// Search finished
    SearchCompleted {
        /// Whether at least one candidate came back
        found: bool,
    },
    /// Download task submitted for the selected candidate
    DownloadStarted,
    /// Subtitle placed next to the video
    Downloaded,
    /// Finalize task submitted
    FinalizeStarted,
    /// Finalize task completed
    Finalized,
    /// The running stage's payload failed
    Failed,
    /// The failed stage is resubmitted
    Retry,
    /// The failed stage will not be retried
    Abandon,
    /// The consumer cancelled the job
    Cancel,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Start => f.write_str("start"),
            Transition::Hashed { .. } => f.write_str("hashed"),
            Transition::LoggedIn => f.write_str("logged_in"),
            Transition::SearchCompleted { .. } => f.write_str("search_completed"),
            Transition::DownloadStarted => f.write_str("download_started"),
            Transition::Downloaded => f.write_str("downloaded"),
            Transition::FinalizeStarted => f.write_str("finalize_started"),
            Transition::Finalized => f.write_str("finalized"),
            Transition::Failed => f.write_str("failed"),
            Transition::Retry => f.write_str("retry"),
            Transition::Abandon => f.write_str("abandon"),
            Transition::Cancel => f.write_str("cancel"),
        }
    }
}

impl Status {
    /// Status after applying `transition`
    ///
    /// # Errors
    ///
    /// `Error::InvalidTransition` if `transition` is not allowed from `self`. The caller
    /// keeps the old status.
    pub fn apply(self, transition: Transition) -> Result<Status> {
        use Transition as T;

        let next = match (self, transition) {
            (Status::Empty, T::Start) => Some(Status::Hashing),
            (Status::Hashing, T::Hashed { authenticated: true }) => Some(Status::Searching),
            (Status::Hashing, T::Hashed { authenticated: false }) => Some(Status::Authenticating),
            (Status::Authenticating, T::LoggedIn) => Some(Status::Searching),
            (Status::Searching, T::SearchCompleted { found: true }) => Some(Status::SubtitlesFound),
            (Status::Searching, T::SearchCompleted { found: false }) => {
                Some(Status::SubtitlesNotFound)
            }
            (Status::SubtitlesFound, T::DownloadStarted) => Some(Status::Downloading),
            (Status::Downloading, T::Downloaded) => Some(Status::SubtitleDownloaded),
            (Status::SubtitleDownloaded, T::FinalizeStarted) => Some(Status::Finalizing),
            (Status::Finalizing, T::Finalized) => Some(Status::Finalized),
            (status, T::Failed) => status.active_stage().map(Status::AwaitingDecision),
            (Status::AwaitingDecision(stage), T::Retry) => Some(Status::running(stage)),
            (Status::AwaitingDecision(_), T::Abandon) => Some(Status::Abandoned),
            (status, T::Cancel) if !status.is_terminal() => Some(Status::Abandoned),
            _ => None,
        };

        next.ok_or_else(|| Error::InvalidTransition {
            from: self.to_string(),
            transition: transition.to_string(),
        })
    }
}
