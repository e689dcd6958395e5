//! Core types for subfetch

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Unique identifier for a pipeline job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Pipeline stage whose payload runs on the worker pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Compute the video fingerprint
    Hash,
    /// Log in to the subtitle provider (skipped when a session token is cached)
    Authenticate,
    /// Search the provider by fingerprint and language
    Search,
    /// Fetch, decompress and place the subtitle file
    Download,
    /// Verify the placed file and optionally launch the video
    Finalize,
}

impl Stage {
    /// Human-readable task name used in logs and retry prompts
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Hash => "Hash",
            Stage::Authenticate => "Login",
            Stage::Search => "Find Subtitles",
            Stage::Download => "Download Subtitles",
            Stage::Finalize => "Finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Job status
///
/// Variants are ordered the way a job moves through the pipeline. Transitions are
/// defined in [`crate::downloader::Transition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created, nothing scheduled yet
    Empty,
    /// Hash task running
    Hashing,
    /// Login task running
    Authenticating,
    /// Search task running
    Searching,
    /// Search returned at least one candidate
    SubtitlesFound,
    /// Search returned no candidates (terminal)
    SubtitlesNotFound,
    /// Download task running
    Downloading,
    /// Subtitle file placed next to the video
    SubtitleDownloaded,
    /// Finalize task running
    Finalizing,
    /// Pipeline completed (terminal)
    Finalized,
    /// A stage failed and the retry decision is pending
    AwaitingDecision(Stage),
    /// User declined a retry or the job was cancelled (terminal)
    Abandoned,
}

impl Status {
    /// Whether the job will never progress from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Finalized | Status::SubtitlesNotFound | Status::Abandoned
        )
    }

    /// Stage whose payload is running in this status, if any
    pub fn active_stage(&self) -> Option<Stage> {
        match self {
            Status::Hashing => Some(Stage::Hash),
            Status::Authenticating => Some(Stage::Authenticate),
            Status::Searching => Some(Stage::Search),
            Status::Downloading => Some(Stage::Download),
            Status::Finalizing => Some(Stage::Finalize),
            _ => None,
        }
    }

    /// Status a job is in while the payload of `stage` runs
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Hash => Status::Hashing,
            Stage::Authenticate => Status::Authenticating,
            Stage::Search => Status::Searching,
            Stage::Download => Status::Downloading,
            Stage::Finalize => Status::Finalizing,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Empty => f.write_str("empty"),
            Status::Hashing => f.write_str("hashing"),
            Status::Authenticating => f.write_str("authenticating"),
            Status::Searching => f.write_str("searching"),
            Status::SubtitlesFound => f.write_str("subtitles_found"),
            Status::SubtitlesNotFound => f.write_str("subtitles_not_found"),
            Status::Downloading => f.write_str("downloading"),
            Status::SubtitleDownloaded => f.write_str("subtitle_downloaded"),
            Status::Finalizing => f.write_str("finalizing"),
            Status::Finalized => f.write_str("finalized"),
            Status::AwaitingDecision(stage) => write!(f, "awaiting_decision({stage})"),
            Status::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Content-derived identifier of a video file
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Create a fingerprint from its textual form
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Textual form sent to the provider
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque provider session token
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token returned by the provider
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens end up in log fields; never print the value
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Provider login credentials (empty username and password log in anonymously)
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name
    #[serde(default)]
    pub username: String,
    /// Account password
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One subtitle file offered by the provider for a fingerprint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCandidate {
    /// Provider relevance score (higher is better)
    pub relevance_score: f64,
    /// Where the gzip-compressed subtitle can be fetched
    pub download_reference: String,
    /// Provider language id (e.g. "eng"), used in the subtitle file name
    pub language_code: String,
    /// ISO 639-1 language code (e.g. "en")
    #[serde(default)]
    pub language_iso: Option<String>,
    /// Subtitle format / file extension (e.g. "srt")
    pub format: String,
    /// Text encoding reported by the provider
    #[serde(default)]
    pub encoding: Option<String>,
    /// Size of the subtitle file in bytes
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// User rating
    #[serde(default)]
    pub rating: Option<f32>,
    /// Number of times the subtitle was downloaded
    #[serde(default)]
    pub download_count: Option<u64>,
    /// Frame rate the subtitle was timed against
    #[serde(default)]
    pub fps: Option<f32>,
    /// Featured by the provider
    #[serde(default)]
    pub featured: bool,
    /// Flagged as bad by users
    #[serde(default)]
    pub bad: bool,
    /// Provider hash of the subtitle file
    #[serde(default)]
    pub file_hash: Option<String>,
}

/// Subtitle language offered by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// ISO 639 code
    pub code: String,
    /// Display name
    pub name: String,
    /// Provider subtitle-language id
    pub id: String,
}

/// Outcome of a search
///
/// An empty result is a normal outcome, not an error, so it can never be routed to
/// the retry coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
    /// One or more candidates, in provider order
    Found(Vec<SubtitleCandidate>),
    /// The provider has nothing for this fingerprint and language
    NotFound,
}

impl From<Vec<SubtitleCandidate>> for SearchOutcome {
    fn from(candidates: Vec<SubtitleCandidate>) -> Self {
        if candidates.is_empty() {
            SearchOutcome::NotFound
        } else {
            SearchOutcome::Found(candidates)
        }
    }
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job created for a file
    JobSubmitted {
        /// Job ID
        id: JobId,
        /// Video file
        video_path: PathBuf,
    },

    /// Job status changed
    StatusChanged {
        /// Job ID
        id: JobId,
        /// New status
        status: Status,
    },

    /// A stage failed; a retry decision follows unless the error is not retryable
    StageFailed {
        /// Job ID
        id: JobId,
        /// Failed stage
        stage: Stage,
        /// Error message
        error: String,
        /// Whether the consumer will be asked to retry
        retryable: bool,
    },

    /// The failed stage was resubmitted
    RetryRequested {
        /// Job ID
        id: JobId,
        /// Resubmitted stage
        stage: Stage,
        /// How many times this stage has now been submitted
        attempt: u32,
    },

    /// Search found nothing (terminal)
    SubtitlesNotFound {
        /// Job ID
        id: JobId,
    },

    /// Subtitle written next to the video
    SubtitleDownloaded {
        /// Job ID
        id: JobId,
        /// Placed subtitle file
        subtitle_path: PathBuf,
    },

    /// Pipeline completed
    Finalized {
        /// Job ID
        id: JobId,
        /// Placed subtitle file
        subtitle_path: PathBuf,
    },

    /// Retry declined or stage failed permanently (terminal)
    Abandoned {
        /// Job ID
        id: JobId,
        /// Stage that failed, if any
        stage: Option<Stage>,
    },

    /// Job cancelled by the consumer
    Cancelled {
        /// Job ID
        id: JobId,
    },
}
