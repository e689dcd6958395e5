//! Per-file pipeline job.

use crate::scheduler_task::TaskHandle;
use crate::types::{Fingerprint, JobId, Stage, Status, SubtitleCandidate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything the pipeline knows about one video
///
/// Lives only inside the controlling context's state. Stage payloads get copies of the
/// fields they need, never the job itself.
#[derive(Debug)]
pub(crate) struct PipelineJob {
    pub(crate) id: JobId,
    pub(crate) video_path: PathBuf,
    pub(crate) language: String,
    pub(crate) fingerprint: Option<Fingerprint>,
    pub(crate) candidates: Vec<SubtitleCandidate>,
    pub(crate) selected: Option<SubtitleCandidate>,
    pub(crate) subtitle_path: Option<PathBuf>,
    pub(crate) status: Status,
    /// Submissions per stage, including retries
    pub(crate) attempts: BTreeMap<Stage, u32>,
    pub(crate) last_error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    /// Stop handle of the most recently submitted task
    pub(crate) current_task: Option<TaskHandle>,
}

impl PipelineJob {
    pub(crate) fn new(id: JobId, video_path: PathBuf, language: String) -> Self {
        Self {
            id,
            video_path,
            language,
            fingerprint: None,
            candidates: Vec::new(),
            selected: None,
            subtitle_path: None,
            status: Status::Empty,
            attempts: BTreeMap::new(),
            last_error: None,
            created_at: Utc::now(),
            current_task: None,
        }
    }

    /// Count one more submission of `stage` and return the new total
    pub(crate) fn record_attempt(&mut self, stage: Stage) -> u32 {
        let count = self.attempts.entry(stage).or_insert(0);
        *count += 1;
        *count
    }

    pub(crate) fn attempts(&self, stage: Stage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            video_path: self.video_path.clone(),
            language: self.language.clone(),
            fingerprint: self.fingerprint.clone(),
            candidate_count: self.candidates.len(),
            selected: self.selected.clone(),
            subtitle_path: self.subtitle_path.clone(),
            status: self.status,
            attempts: self.attempts.clone(),
            last_error: self.last_error.clone(),
            created_at: self.created_at,
        }
    }
}

/// Read-only copy of a job handed to consumers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job ID
    pub id: JobId,
    /// Video the job works on
    pub video_path: PathBuf,
    /// Subtitle language searched for
    pub language: String,
    /// Video fingerprint, once hashed
    pub fingerprint: Option<Fingerprint>,
    /// Number of candidates the search returned
    pub candidate_count: usize,
    /// Candidate chosen for download
    pub selected: Option<SubtitleCandidate>,
    /// Placed subtitle file
    pub subtitle_path: Option<PathBuf>,
    /// Current status
    pub status: Status,
    /// Submissions per stage, including retries
    pub attempts: BTreeMap<Stage, u32>,
    /// Message of the most recent stage failure
    pub last_error: Option<String>,
    /// When the job was submitted
    pub created_at: DateTime<Utc>,
}

impl JobSnapshot {
    /// Submissions of `stage` so far
    pub fn attempts_for(&self, stage: Stage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }
}
