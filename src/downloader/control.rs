//! Consumer API: submit files, cancel jobs, inspect state, manage preferences and session.

use crate::error::{Error, Result};
use crate::settings;
use crate::types::{Event, JobId, Language, Status};
use std::path::PathBuf;

use super::state::Transition;
use super::{JobSnapshot, PipelineState, SubtitleDownloader};

impl SubtitleDownloader {
    /// Accept the files dropped by the user
    ///
    /// Only single-file processing is supported: an empty list or more than one path is
    /// rejected with a warning, and no job is created.
    ///
    /// # Errors
    ///
    /// - `Error::NoFiles` if `files` is empty
    /// - `Error::MultipleFiles` if it holds more than one path
    /// - `Error::ShuttingDown` after [`shutdown`](Self::shutdown)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use subfetch::*;
    /// # use std::path::PathBuf;
    /// # async fn example(downloader: SubtitleDownloader) -> Result<()> {
    /// let id = downloader
    ///     .submit_files(vec![PathBuf::from("/videos/movie.mkv")])
    ///     .await?;
    /// println!("job {id} started");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_files(&self, files: Vec<PathBuf>) -> Result<JobId> {
        let count = files.len();
        let mut files = files.into_iter();
        match (files.next(), count) {
            (Some(path), 1) => self.submit(path).await,
            (None, _) => {
                tracing::warn!("No file supplied, nothing to do");
                Err(Error::NoFiles)
            }
            (Some(_), count) => {
                tracing::warn!(count, "Multiple files supplied, only one file at a time is supported");
                Err(Error::MultipleFiles { count })
            }
        }
    }

    /// Start the pipeline for a single video
    ///
    /// Returns as soon as the job exists and its Hash task is queued.
    pub async fn submit(&self, video_path: PathBuf) -> Result<JobId> {
        self.context
            .query(move |state: &mut PipelineState| state.start_job(video_path))
            .await?
    }

    /// Cancel a job
    ///
    /// The job's pending task is stopped before it runs; a payload that is already
    /// running completes but its result is discarded. Cancelling an abandoned job is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - `Error::JobNotFound` if the job doesn't exist
    /// - `Error::InvalidTransition` if the job already finished
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        self.context
            .query(move |state: &mut PipelineState| state.cancel_job(id))
            .await?
    }

    /// Snapshot of one job
    pub async fn job(&self, id: JobId) -> Result<Option<JobSnapshot>> {
        self.context
            .query(move |state: &mut PipelineState| state.jobs.get(&id).map(|job| job.snapshot()))
            .await
    }

    /// Snapshots of all jobs, oldest first
    pub async fn jobs(&self) -> Result<Vec<JobSnapshot>> {
        self.context
            .query(|state: &mut PipelineState| {
                let mut jobs: Vec<JobSnapshot> =
                    state.jobs.values().map(|job| job.snapshot()).collect();
                jobs.sort_by_key(|job| job.id);
                jobs
            })
            .await
    }

    /// Forget the cached session token so the next job logs in again
    pub async fn logout(&self) -> Result<()> {
        let had_token = self
            .context
            .query(|state: &mut PipelineState| state.session.clear())
            .await?;
        if had_token {
            tracing::info!("Logged out of subtitle provider");
        }
        Ok(())
    }

    /// Whether a session token is cached
    pub async fn is_authenticated(&self) -> Result<bool> {
        self.context
            .query(|state: &mut PipelineState| state.session.is_authenticated())
            .await
    }

    /// Subtitle languages the provider offers, for language preference UIs
    ///
    /// Calls the provider directly; it does not go through the pipeline.
    pub async fn languages(&self) -> Result<Vec<Language>> {
        self.provider.languages().await
    }

    /// Language new jobs search for
    pub async fn language(&self) -> Result<String> {
        self.context
            .query(|state: &mut PipelineState| state.language.clone())
            .await
    }

    /// Change the language for jobs submitted from now on
    ///
    /// Persisted under `core/languages` when a settings store is attached. Jobs already
    /// running keep the language they started with.
    pub async fn set_language(&self, language: impl Into<String>) -> Result<()> {
        let language = language.into();
        if language.trim().is_empty() {
            return Err(Error::Config {
                message: "language must not be empty".to_string(),
                key: Some(settings::LANGUAGES.to_string()),
            });
        }

        if self.settings.is_some() {
            self.persist_setting(settings::LANGUAGES, serde_json::json!([language.clone()]))
                .await?;
        }

        tracing::info!(language = %language, "Subtitle language changed");
        self.context
            .query(move |state: &mut PipelineState| state.language = language)
            .await
    }

    /// Preferred subtitle text encoding from `core/encoding`
    ///
    /// `None` when no settings store is attached or nothing usable is stored.
    pub fn encoding(&self) -> Option<String> {
        self.settings
            .as_deref()
            .and_then(settings::preferred_encoding)
    }

    /// Persist the preferred subtitle text encoding under `core/encoding`
    ///
    /// # Errors
    ///
    /// - `Error::Config` if `encoding` is blank or no settings store is attached
    /// - `Error::Io` if the store fails to persist the value
    pub async fn set_encoding(&self, encoding: impl Into<String>) -> Result<()> {
        let encoding = encoding.into().trim().to_string();
        if encoding.is_empty() {
            return Err(Error::Config {
                message: "encoding must not be empty".to_string(),
                key: Some(settings::ENCODING.to_string()),
            });
        }
        if self.settings.is_none() {
            return Err(Error::Config {
                message: "no settings store attached".to_string(),
                key: Some(settings::ENCODING.to_string()),
            });
        }

        self.persist_setting(settings::ENCODING, serde_json::Value::String(encoding.clone()))
            .await?;
        tracing::info!(encoding = %encoding, "Subtitle encoding changed");
        Ok(())
    }

    /// Write one preference off the async runtime; stores may hit the disk
    async fn persist_setting(&self, key: &'static str, value: serde_json::Value) -> Result<()> {
        let Some(store) = self.settings.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || store.set(key, value))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("settings write task failed: {e}"))))?
    }
}

impl PipelineState {
    pub(crate) fn cancel_job(&mut self, id: JobId) -> Result<()> {
        let job = self.jobs.get(&id).ok_or(Error::JobNotFound(id))?;
        if job.status == Status::Abandoned {
            return Ok(());
        }
        // Reject before touching the task so a finished job stays untouched
        job.status.apply(Transition::Cancel)?;

        self.abandon(id, None, Transition::Cancel);
        tracing::info!(job_id = %id, "Job cancelled");
        self.emit(Event::Cancelled { id });
        Ok(())
    }
}
