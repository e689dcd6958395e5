//! Videos, subtitle payloads and a scripted provider

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use subfetch::{
    Credentials, Event, Fingerprint, JobId, JobSnapshot, Language, SearchOutcome, SessionToken,
    SubtitleCandidate, SubtitleDownloader, SubtitleProvider,
};
use tokio::sync::broadcast;

/// SRT body served by the mock HTTP server
pub const SRT_BODY: &str = "1\n00:00:01,000 --> 00:00:04,000\nGeneral Kenobi\n\n2\n00:00:05,000 --> 00:00:07,500\nYou are a bold one\n";

/// Write a 256 KiB video with a repeating byte pattern
pub fn write_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let contents: Vec<u8> = (0..256 * 1024u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, contents).unwrap();
    path
}

/// Gzip `body` the way providers serve subtitle files
pub fn gzip(body: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Candidate pointing at `reference`
pub fn srt_candidate(score: f64, reference: String) -> SubtitleCandidate {
    SubtitleCandidate {
        relevance_score: score,
        download_reference: reference,
        language_code: "eng".into(),
        language_iso: Some("en".into()),
        format: "srt".into(),
        encoding: Some("UTF-8".into()),
        size_bytes: None,
        rating: Some(8.0),
        download_count: Some(1200),
        fps: None,
        featured: false,
        bad: false,
        file_hash: None,
    }
}

/// Provider answering every search with a fixed candidate list
#[derive(Debug, Default)]
pub struct StaticProvider {
    pub candidates: Vec<SubtitleCandidate>,
    pub logins: AtomicU32,
    /// Fingerprints searched for
    pub fingerprints: Mutex<Vec<Fingerprint>>,
}

impl StaticProvider {
    pub fn new(candidates: Vec<SubtitleCandidate>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SubtitleProvider for StaticProvider {
    async fn login(&self, credentials: &Credentials) -> subfetch::Result<SessionToken> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(SessionToken::new(format!("session-{}", credentials.username)))
    }

    async fn search(
        &self,
        _token: &SessionToken,
        fingerprint: &Fingerprint,
        _language: &str,
    ) -> subfetch::Result<SearchOutcome> {
        self.fingerprints.lock().unwrap().push(fingerprint.clone());
        Ok(SearchOutcome::from(self.candidates.clone()))
    }

    async fn languages(&self) -> subfetch::Result<Vec<Language>> {
        Ok(vec![Language {
            code: "en".into(),
            name: "English".into(),
            id: "eng".into(),
        }])
    }
}

/// Wait for the job to reach a terminal status, collecting its events on the way
pub async fn wait_for_job(
    downloader: &SubtitleDownloader,
    events: &mut broadcast::Receiver<Event>,
    id: JobId,
) -> (JobSnapshot, Vec<Event>) {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let job = downloader.job(id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            while let Ok(event) = events.try_recv() {
                seen.push(event);
            }
            return (job, seen);
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
