//! Stage tasks and their continuations.
//!
//! Every stage follows the same shape: a `schedule_*` method copies the inputs out of
//! the job, builds a [`Task`] whose payload only touches those copies, and submits it.
//! The success continuation (`on_*`) stores the result, advances the status and
//! schedules the next stage. Failures from any stage go through `on_stage_error`.

use super::PipelineState;
use super::job::PipelineJob;
use super::state::Transition;
use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::provider::{MediaLauncher, SubtitleTransfer};
use crate::retry::{FailureReport, RetryDecision};
use crate::scheduler_task::Task;
use crate::types::{
    Event, Fingerprint, JobId, SearchOutcome, SessionToken, Stage, Status, SubtitleCandidate,
};
use crate::utils::{get_unique_path, subtitle_path_for, write_atomically};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl PipelineState {
    /// Create a job for `video_path` and submit its Hash task
    pub(crate) fn start_job(&mut self, video_path: PathBuf) -> Result<JobId> {
        if !self.accepting_new {
            return Err(Error::ShuttingDown);
        }

        self.next_id += 1;
        let id = JobId(self.next_id);
        let job = PipelineJob::new(id, video_path.clone(), self.language.clone());
        self.jobs.insert(id, job);

        info!(job_id = %id, video = ?video_path, language = %self.language, "Job submitted");
        self.emit(Event::JobSubmitted { id, video_path });

        self.advance(id, Transition::Start)?;
        self.schedule_hash(id);
        Ok(id)
    }

    /// Apply `transition` to the job's status and announce the change
    pub(crate) fn advance(&mut self, id: JobId, transition: Transition) -> Result<Status> {
        let job = self.jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        let next = job.status.apply(transition)?;
        debug!(job_id = %id, from = %job.status, to = %next, %transition, "Status transition");
        job.status = next;
        self.emit(Event::StatusChanged { id, status: next });
        Ok(next)
    }

    /// The job, if it is still waiting on `stage`'s payload
    ///
    /// Completions for cancelled or otherwise moved-on jobs are ignored.
    fn live_job_mut(&mut self, id: JobId, stage: Stage) -> Option<&mut PipelineJob> {
        match self.jobs.get_mut(&id) {
            Some(job) if job.status == Status::running(stage) => Some(job),
            Some(job) => {
                debug!(job_id = %id, stage = %stage, status = %job.status, "Ignoring completion for inactive stage");
                None
            }
            None => {
                debug!(job_id = %id, stage = %stage, "Ignoring completion for unknown job");
                None
            }
        }
    }

    fn submit<T: Send + 'static>(&mut self, id: JobId, stage: Stage, task: Task<PipelineState, T>) {
        let handle = self.scheduler.submit(task);
        if let Some(job) = self.jobs.get_mut(&id) {
            let attempt = job.record_attempt(stage);
            job.current_task = Some(handle);
            debug!(job_id = %id, stage = %stage, attempt, "Stage task submitted");
        }
    }

    fn schedule_hash(&mut self, id: JobId) {
        let Some(job) = self.jobs.get(&id) else {
            return;
        };
        let video_path = job.video_path.clone();
        let fingerprinter = Arc::clone(&self.services.fingerprinter);

        let task = Task::new(
            Stage::Hash.label(),
            move || {
                let fingerprinter = Arc::clone(&fingerprinter);
                let video_path = video_path.clone();
                async move { fingerprinter.fingerprint(&video_path).await }
            },
            move |state: &mut PipelineState, fingerprint, _task| state.on_hashed(id, fingerprint),
            move |state: &mut PipelineState, error, task| {
                state.on_stage_error(id, Stage::Hash, error, task)
            },
        );
        self.submit(id, Stage::Hash, task);
    }

    fn on_hashed(&mut self, id: JobId, fingerprint: Fingerprint) -> Result<()> {
        let Some(job) = self.live_job_mut(id, Stage::Hash) else {
            return Ok(());
        };
        info!(job_id = %id, %fingerprint, "Video hashed");
        job.fingerprint = Some(fingerprint.clone());

        match self.session.token().cloned() {
            Some(token) => {
                debug!(job_id = %id, "Session token cached, skipping login");
                self.advance(id, Transition::Hashed { authenticated: true })?;
                self.schedule_search(id, token, fingerprint);
            }
            None => {
                self.advance(id, Transition::Hashed { authenticated: false })?;
                self.schedule_login(id);
            }
        }
        Ok(())
    }

    fn schedule_login(&mut self, id: JobId) {
        let provider = Arc::clone(&self.services.provider);
        let credentials = self.services.config.provider.credentials.clone();

        let task = Task::new(
            Stage::Authenticate.label(),
            move || {
                let provider = Arc::clone(&provider);
                let credentials = credentials.clone();
                async move { provider.login(&credentials).await }
            },
            move |state: &mut PipelineState, token, _task| state.on_logged_in(id, token),
            move |state: &mut PipelineState, error, task| {
                state.on_stage_error(id, Stage::Authenticate, error, task)
            },
        );
        self.submit(id, Stage::Authenticate, task);
    }

    fn on_logged_in(&mut self, id: JobId, token: SessionToken) -> Result<()> {
        // A valid token is worth keeping even if this job was cancelled meanwhile
        self.session.store(token.clone());
        info!(job_id = %id, logins = self.session.logins(), "Logged in to subtitle provider");

        let Some(job) = self.live_job_mut(id, Stage::Authenticate) else {
            return Ok(());
        };
        let Some(fingerprint) = job.fingerprint.clone() else {
            return Err(Error::Other(format!("job {id} reached login without a fingerprint")));
        };

        self.advance(id, Transition::LoggedIn)?;
        self.schedule_search(id, token, fingerprint);
        Ok(())
    }

    fn schedule_search(&mut self, id: JobId, token: SessionToken, fingerprint: Fingerprint) {
        let Some(job) = self.jobs.get(&id) else {
            return;
        };
        let language = job.language.clone();
        let provider = Arc::clone(&self.services.provider);

        let task = Task::new(
            Stage::Search.label(),
            move || {
                let provider = Arc::clone(&provider);
                let token = token.clone();
                let fingerprint = fingerprint.clone();
                let language = language.clone();
                async move { provider.search(&token, &fingerprint, &language).await }
            },
            move |state: &mut PipelineState, outcome, _task| state.on_search_completed(id, outcome),
            move |state: &mut PipelineState, error, task| {
                state.on_stage_error(id, Stage::Search, error, task)
            },
        );
        self.submit(id, Stage::Search, task);
    }

    fn on_search_completed(&mut self, id: JobId, outcome: SearchOutcome) -> Result<()> {
        let Some(job) = self.live_job_mut(id, Stage::Search) else {
            return Ok(());
        };

        let candidates = match outcome {
            SearchOutcome::Found(candidates) if !candidates.is_empty() => candidates,
            _ => {
                info!(job_id = %id, language = %job.language, "No subtitles found");
                job.current_task = None;
                self.advance(id, Transition::SearchCompleted { found: false })?;
                self.emit(Event::SubtitlesNotFound { id });
                return Ok(());
            }
        };

        let Some(selected) = select_candidate(&candidates).cloned() else {
            return Err(Error::Other(format!("job {id} has candidates but none selectable")));
        };
        info!(
            job_id = %id,
            candidates = candidates.len(),
            score = selected.relevance_score,
            format = %selected.format,
            "Subtitles found"
        );
        job.candidates = candidates;
        job.selected = Some(selected.clone());

        self.advance(id, Transition::SearchCompleted { found: true })?;
        self.advance(id, Transition::DownloadStarted)?;
        self.schedule_download(id, selected);
        Ok(())
    }

    fn schedule_download(&mut self, id: JobId, candidate: SubtitleCandidate) {
        let Some(job) = self.jobs.get(&id) else {
            return;
        };
        let video_path = job.video_path.clone();
        let transfer = Arc::clone(&self.services.transfer);
        let collision = self.services.config.file_collision;

        let task = Task::new(
            Stage::Download.label(),
            move || {
                download_subtitle(
                    Arc::clone(&transfer),
                    candidate.clone(),
                    video_path.clone(),
                    collision,
                )
            },
            move |state: &mut PipelineState, subtitle_path, _task| {
                state.on_downloaded(id, subtitle_path)
            },
            move |state: &mut PipelineState, error, task| {
                state.on_stage_error(id, Stage::Download, error, task)
            },
        );
        self.submit(id, Stage::Download, task);
    }

    fn on_downloaded(&mut self, id: JobId, subtitle_path: PathBuf) -> Result<()> {
        let Some(job) = self.live_job_mut(id, Stage::Download) else {
            return Ok(());
        };
        info!(job_id = %id, subtitle = ?subtitle_path, "Subtitle placed next to video");
        job.subtitle_path = Some(subtitle_path.clone());

        self.advance(id, Transition::Downloaded)?;
        self.emit(Event::SubtitleDownloaded {
            id,
            subtitle_path: subtitle_path.clone(),
        });
        self.advance(id, Transition::FinalizeStarted)?;
        self.schedule_finalize(id, subtitle_path);
        Ok(())
    }

    fn schedule_finalize(&mut self, id: JobId, subtitle_path: PathBuf) {
        let Some(job) = self.jobs.get(&id) else {
            return;
        };
        let video_path = job.video_path.clone();
        let launcher = Arc::clone(&self.services.launcher);
        let launch = self.services.config.launch_after_download;

        let task = Task::new(
            Stage::Finalize.label(),
            move || {
                verify_and_launch(
                    Arc::clone(&launcher),
                    video_path.clone(),
                    subtitle_path.clone(),
                    launch,
                )
            },
            move |state: &mut PipelineState, subtitle_path, _task| {
                state.on_finalized(id, subtitle_path)
            },
            move |state: &mut PipelineState, error, task| {
                state.on_stage_error(id, Stage::Finalize, error, task)
            },
        );
        self.submit(id, Stage::Finalize, task);
    }

    fn on_finalized(&mut self, id: JobId, subtitle_path: PathBuf) -> Result<()> {
        let Some(job) = self.live_job_mut(id, Stage::Finalize) else {
            return Ok(());
        };
        job.current_task = None;
        self.advance(id, Transition::Finalized)?;
        info!(job_id = %id, subtitle = ?subtitle_path, "Job finalized");
        self.emit(Event::Finalized { id, subtitle_path });
        Ok(())
    }

    /// Error continuation shared by every stage
    fn on_stage_error<T: Send + 'static>(
        &mut self,
        id: JobId,
        stage: Stage,
        error: Error,
        task: &Task<PipelineState, T>,
    ) {
        let Some(job) = self.jobs.get_mut(&id).filter(|job| job.status == Status::running(stage))
        else {
            let status = self.jobs.get(&id).map(|job| job.status.to_string());
            warn!(
                job_id = %id,
                stage = %stage,
                status = status.as_deref().unwrap_or("unknown"),
                error = %error,
                "Discarding stage error for inactive job"
            );
            return;
        };
        job.last_error = Some(error.to_string());
        let attempt = job.attempts(stage);
        let video_path = job.video_path.clone();

        let retryable = self.retry.classify(&error);
        warn!(job_id = %id, stage = %stage, attempt, retryable, error = %error, "Stage failed");

        if let Err(e) = self.advance(id, Transition::Failed) {
            error!(job_id = %id, stage = %stage, error = %e, "Could not record stage failure, abandoning job");
            self.abandon(id, Some(stage), Transition::Cancel);
            return;
        }
        self.emit(Event::StageFailed {
            id,
            stage,
            error: error.to_string(),
            retryable,
        });

        if !retryable {
            self.abandon(id, Some(stage), Transition::Abandon);
            return;
        }

        let report = FailureReport::new(id, video_path, stage, &error, attempt);
        self.retry
            .request_decision(report, task.clone(), move |state: &mut PipelineState, decision| {
                state.resolve_decision(id, stage, decision)
            });
    }

    /// Act on a retry decision; returns whether the failed task should be resubmitted
    pub(crate) fn resolve_decision(&mut self, id: JobId, stage: Stage, decision: RetryDecision) -> bool {
        match self.jobs.get(&id) {
            Some(job) if job.status == Status::AwaitingDecision(stage) => {}
            Some(job) => {
                debug!(job_id = %id, stage = %stage, status = %job.status, "Ignoring retry decision for inactive job");
                return false;
            }
            None => return false,
        }

        match decision {
            RetryDecision::Retry => {
                if let Err(e) = self.advance(id, Transition::Retry) {
                    error!(job_id = %id, error = %e, "Could not resume job for retry");
                    return false;
                }
                let Some(job) = self.jobs.get_mut(&id) else {
                    return false;
                };
                let attempt = job.record_attempt(stage);
                info!(job_id = %id, stage = %stage, attempt, "Retrying stage");
                self.emit(Event::RetryRequested { id, stage, attempt });
                true
            }
            RetryDecision::Abandon => {
                self.abandon(id, Some(stage), Transition::Abandon);
                false
            }
        }
    }

    /// Move the job to `Abandoned` via `transition` and announce it
    pub(crate) fn abandon(&mut self, id: JobId, stage: Option<Stage>, transition: Transition) {
        if let Some(job) = self.jobs.get_mut(&id) {
            if let Some(task) = job.current_task.take() {
                task.stop();
            }
        }
        match self.advance(id, transition) {
            Ok(_) => {
                info!(job_id = %id, stage = ?stage, "Job abandoned");
                self.emit(Event::Abandoned { id, stage });
            }
            Err(e) => error!(job_id = %id, error = %e, "Could not abandon job"),
        }
    }
}

/// Download payload: fetch the candidate and place it next to the video
async fn download_subtitle(
    transfer: Arc<dyn SubtitleTransfer>,
    candidate: SubtitleCandidate,
    video_path: PathBuf,
    collision: FileCollisionAction,
) -> Result<PathBuf> {
    let target = subtitle_path_for(&video_path, &candidate.language_code, &candidate.format)?;
    let contents = transfer.fetch(&candidate.download_reference).await?;

    tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let target = get_unique_path(&target, collision)?;
        write_atomically(&target, &contents)?;
        Ok(target)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(format!("subtitle write task failed: {e}"))))?
}

/// Finalize payload: check the placed file, then optionally open the video
async fn verify_and_launch(
    launcher: Arc<dyn MediaLauncher>,
    video_path: PathBuf,
    subtitle_path: PathBuf,
    launch: bool,
) -> Result<PathBuf> {
    let metadata = tokio::fs::metadata(&subtitle_path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Placed subtitle '{}' is missing: {}", subtitle_path.display(), e),
        ))
    })?;
    if !metadata.is_file() {
        return Err(Error::Io(std::io::Error::other(format!(
            "Placed subtitle '{}' is not a file",
            subtitle_path.display()
        ))));
    }
    if launch {
        launcher.launch(&video_path).await?;
    }
    Ok(subtitle_path)
}

/// Candidate with the highest relevance score; ties go to the earliest in provider order
pub(crate) fn select_candidate(candidates: &[SubtitleCandidate]) -> Option<&SubtitleCandidate> {
    fn score(candidate: &SubtitleCandidate) -> f64 {
        if candidate.relevance_score.is_nan() {
            f64::NEG_INFINITY
        } else {
            candidate.relevance_score
        }
    }

    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if score(candidate) <= score(current) => Some(current),
        _ => Some(candidate),
    })
}
