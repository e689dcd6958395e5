//! Shared test helpers: mock collaborators and a downloader wired to them.

use crate::config::Config;
use crate::downloader::{Collaborators, JobSnapshot, SubtitleDownloader};
use crate::error::{Error, ProviderError, Result};
use crate::provider::{Fingerprinter, MediaLauncher, SubtitleProvider, SubtitleTransfer};
use crate::retry::{FailureReport, RetryDecision, RetryPrompt};
use crate::types::{
    Credentials, Event, Fingerprint, JobId, Language, SearchOutcome, SessionToken, Status,
    SubtitleCandidate,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Fingerprint [`MockFingerprinter`] reports for `path`: FNV-1a of the file name
pub(crate) fn fingerprint_for(path: &Path) -> Fingerprint {
    let name = path.file_name().map(|n| n.as_encoded_bytes()).unwrap_or_default();
    let hash = name.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    });
    Fingerprint::new(format!("{hash:016x}"))
}

/// Subtitle body served by [`MockTransfer`]
pub(crate) const SUBTITLE_BODY: &str = "1\n00:00:01,000 --> 00:00:04,000\nHello there\n";

/// Fails the next `n` calls
#[derive(Debug, Default)]
pub(crate) struct FailPlan {
    remaining: AtomicU32,
}

impl FailPlan {
    pub(crate) fn fail_next(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Blocks callers until opened, when armed
#[derive(Debug, Default)]
pub(crate) struct Gate {
    semaphore: Mutex<Option<Arc<Semaphore>>>,
}

impl Gate {
    /// Make subsequent callers wait
    pub(crate) fn close(&self) {
        *self.semaphore.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Release every waiting and future caller
    pub(crate) fn open(&self) {
        if let Some(semaphore) = self.semaphore.lock().unwrap().take() {
            semaphore.close();
        }
    }

    async fn pass(&self) {
        let semaphore = self.semaphore.lock().unwrap().clone();
        if let Some(semaphore) = semaphore {
            // Closing the semaphore is how the gate opens
            drop(semaphore.acquire().await);
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockFingerprinter {
    pub(crate) calls: AtomicU32,
    pub(crate) failures: FailPlan,
    pub(crate) gate: Gate,
}

#[async_trait]
impl Fingerprinter for MockFingerprinter {
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        if self.failures.should_fail() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot read {}", path.display()),
            )));
        }
        Ok(fingerprint_for(path))
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockProvider {
    pub(crate) login_calls: AtomicU32,
    pub(crate) search_calls: AtomicU32,
    pub(crate) login_failures: FailPlan,
    pub(crate) search_failures: FailPlan,
    pub(crate) candidates: Mutex<Vec<SubtitleCandidate>>,
    /// (token, fingerprint, language) of every search
    pub(crate) searches: Mutex<Vec<(String, String, String)>>,
}

impl MockProvider {
    pub(crate) fn set_candidates(&self, candidates: Vec<SubtitleCandidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    pub(crate) fn searched_languages(&self) -> Vec<String> {
        self.searches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, language)| language.clone())
            .collect()
    }
}

#[async_trait]
impl SubtitleProvider for MockProvider {
    async fn login(&self, _credentials: &Credentials) -> Result<SessionToken> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.login_failures.should_fail() {
            return Err(ProviderError::LoginRejected.into());
        }
        Ok(SessionToken::new(format!("token-{n}")))
    }

    async fn search(
        &self,
        token: &SessionToken,
        fingerprint: &Fingerprint,
        language: &str,
    ) -> Result<SearchOutcome> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.searches.lock().unwrap().push((
            token.as_str().to_string(),
            fingerprint.as_str().to_string(),
            language.to_string(),
        ));
        if self.search_failures.should_fail() {
            return Err(ProviderError::Unavailable("503 Service Unavailable".into()).into());
        }
        // References carry the searched fingerprint so results stay traceable to their job
        let candidates = self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| SubtitleCandidate {
                download_reference: reference_for(&c.download_reference, fingerprint),
                ..c.clone()
            })
            .collect::<Vec<_>>();
        Ok(SearchOutcome::from(candidates))
    }

    async fn languages(&self) -> Result<Vec<Language>> {
        Ok(vec![
            Language {
                code: "en".into(),
                name: "English".into(),
                id: "eng".into(),
            },
            Language {
                code: "pb".into(),
                name: "Portuguese (BR)".into(),
                id: "pob".into(),
            },
        ])
    }
}

pub(crate) struct MockTransfer {
    pub(crate) calls: AtomicU32,
    pub(crate) failures: FailPlan,
    /// Error returned by a planned failure; `None` means HTTP 503
    pub(crate) failure_kind: Mutex<Option<fn(&str) -> Error>>,
    pub(crate) references: Mutex<Vec<String>>,
    pub(crate) body: Vec<u8>,
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures: FailPlan::default(),
            failure_kind: Mutex::new(None),
            references: Mutex::new(Vec::new()),
            body: SUBTITLE_BODY.as_bytes().to_vec(),
        }
    }
}

#[async_trait]
impl SubtitleTransfer for MockTransfer {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.references.lock().unwrap().push(reference.to_string());
        if self.failures.should_fail() {
            let make = *self.failure_kind.lock().unwrap();
            return Err(match make {
                Some(make) => make(reference),
                None => Error::Transfer {
                    reference: reference.to_string(),
                    status: 503,
                },
            });
        }
        Ok(self.body.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingLauncher {
    pub(crate) launches: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl MediaLauncher for RecordingLauncher {
    async fn launch(&self, video: &Path) -> Result<()> {
        self.launches.lock().unwrap().push(video.to_path_buf());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Answers from a script, then abandons; records every report
#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompt {
    pub(crate) decisions: Mutex<VecDeque<RetryDecision>>,
    pub(crate) reports: Mutex<Vec<FailureReport>>,
}

impl ScriptedPrompt {
    pub(crate) fn answer(&self, decisions: &[RetryDecision]) {
        self.decisions.lock().unwrap().extend(decisions.iter().copied());
    }

    pub(crate) fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetryPrompt for ScriptedPrompt {
    async fn decide(&self, report: &FailureReport) -> RetryDecision {
        self.reports.lock().unwrap().push(report.clone());
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RetryDecision::Abandon)
    }
}

/// Mock collaborators, kept so tests can inspect calls
#[derive(Clone, Default)]
pub(crate) struct Mocks {
    pub(crate) fingerprinter: Arc<MockFingerprinter>,
    pub(crate) provider: Arc<MockProvider>,
    pub(crate) transfer: Arc<MockTransfer>,
    pub(crate) launcher: Arc<RecordingLauncher>,
    pub(crate) prompt: Arc<ScriptedPrompt>,
}

impl Mocks {
    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            fingerprinter: self.fingerprinter.clone(),
            provider: self.provider.clone(),
            transfer: self.transfer.clone(),
            launcher: self.launcher.clone(),
            prompt: self.prompt.clone(),
            settings: None,
        }
    }
}

/// Candidate served by [`MockProvider`]
pub(crate) fn candidate(score: f64, reference: &str) -> SubtitleCandidate {
    SubtitleCandidate {
        relevance_score: score,
        download_reference: reference.to_string(),
        language_code: "eng".into(),
        language_iso: Some("en".into()),
        format: "srt".into(),
        encoding: Some("UTF-8".into()),
        size_bytes: Some(SUBTITLE_BODY.len() as u64),
        rating: None,
        download_count: Some(10),
        fps: Some(23.976),
        featured: false,
        bad: false,
        file_hash: None,
    }
}

/// Reference [`MockProvider`] serves for `base` when searching `fingerprint`
pub(crate) fn reference_for(base: &str, fingerprint: &Fingerprint) -> String {
    format!("{base}?moviehash={}", fingerprint.as_str())
}

/// Config for tests: small pool, launch enabled
pub(crate) fn test_config() -> Config {
    Config {
        worker_threads: 2,
        ..Config::default()
    }
}

/// Create a video file in `dir`
pub(crate) fn make_video(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"not really a movie").unwrap();
    path
}

/// Helper to create a test SubtitleDownloader with mock collaborators that find one
/// subtitle. Returns the downloader, the mocks and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (SubtitleDownloader, Mocks, TempDir) {
    create_test_downloader_with(test_config(), Mocks::default()).await
}

pub(crate) async fn create_test_downloader_with(
    config: Config,
    mocks: Mocks,
) -> (SubtitleDownloader, Mocks, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    if mocks.provider.candidates.lock().unwrap().is_empty() {
        mocks
            .provider
            .set_candidates(vec![candidate(9.5, "http://subs.test/download/1.gz")]);
    }
    let downloader = SubtitleDownloader::new(config, mocks.collaborators())
        .await
        .unwrap();
    (downloader, mocks, temp_dir)
}

/// Poll until the job's status satisfies `done`, panicking after five seconds
pub(crate) async fn wait_for_status(
    downloader: &SubtitleDownloader,
    id: JobId,
    done: impl Fn(Status) -> bool,
) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = downloader.job(id).await.unwrap().unwrap();
        if done(job.status) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in status {}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until the job reaches a terminal status
pub(crate) async fn wait_for_terminal(downloader: &SubtitleDownloader, id: JobId) -> JobSnapshot {
    wait_for_status(downloader, id, |status| status.is_terminal()).await
}

/// Every event buffered on `events`
pub(crate) fn drain(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
