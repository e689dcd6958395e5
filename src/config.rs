//! Configuration types for subfetch

use crate::error::{Error, Result};
use crate::types::Credentials;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for SubtitleDownloader
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Subtitle language id sent to the provider (default: "eng")
    ///
    /// A settings store passed to the downloader can override this with the
    /// `core/languages` key.
    #[serde(default = "default_language")]
    pub language: String,

    /// Maximum number of stage payloads running at once (default: available parallelism)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Upper bound for a single stage payload (None = wait indefinitely)
    #[serde(default, with = "optional_duration_serde")]
    pub stage_timeout: Option<Duration>,

    /// Open the video with the system player once the subtitle is in place (default: true)
    #[serde(default = "default_true")]
    pub launch_after_download: bool,

    /// What to do when the subtitle file name is already taken
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Subtitle provider account settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Backoff settings used by [`crate::retry::BackoffPrompt`]
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: default_language(),
            worker_threads: default_worker_threads(),
            stage_timeout: None,
            launch_after_download: true,
            file_collision: FileCollisionAction::default(),
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file, filling unset fields with defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that cannot be expressed through types alone
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(Error::Config {
                message: "language must not be empty".to_string(),
                key: Some("language".to_string()),
            });
        }
        if self.worker_threads == 0 {
            return Err(Error::Config {
                message: "worker_threads must be at least 1".to_string(),
                key: Some("worker_threads".to_string()),
            });
        }
        if self.stage_timeout == Some(Duration::ZERO) {
            return Err(Error::Config {
                message: "stage_timeout must be greater than zero".to_string(),
                key: Some("stage_timeout".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be at least 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }
}

/// Subtitle provider account configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Login credentials (empty = anonymous)
    #[serde(default)]
    pub credentials: Credentials,

    /// User agent announced to the provider
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for the headless backoff prompt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries per stage (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// File collision handling for the placed subtitle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Replace the existing file (default)
    #[default]
    Overwrite,
    /// Append (1), (2), ... to the file stem
    Rename,
    /// Fail the download stage
    Skip,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn default_user_agent() -> String {
    format!("subfetch v{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
