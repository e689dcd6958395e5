//! Fetch subtitles example
//!
//! This example demonstrates the pipeline end to end:
//! - Plugging in a subtitle provider
//! - Subscribing to job events
//! - Answering retry prompts from the terminal
//! - Shutting down once the job settles
//!
//! The provider here is a stand-in that "finds" one subtitle at a URL given on the
//! command line, so the example runs without an account anywhere:
//!
//! ```bash
//! RUST_LOG=subfetch=debug cargo run --example fetch_subtitles -- movie.mkv https://example.com/movie.srt.gz
//! ```

use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use subfetch::{
    ChannelPrompt, Collaborators, Config, Credentials, Event, Fingerprint, Language,
    RetryDecision, SearchOutcome, SessionToken, SubtitleCandidate, SubtitleDownloader,
    SubtitleProvider,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Provider that offers a single, fixed subtitle file
struct FixedProvider {
    reference: String,
}

#[async_trait]
impl SubtitleProvider for FixedProvider {
    async fn login(&self, credentials: &Credentials) -> subfetch::Result<SessionToken> {
        Ok(SessionToken::new(format!("demo-{}", credentials.username)))
    }

    async fn search(
        &self,
        _token: &SessionToken,
        fingerprint: &Fingerprint,
        language: &str,
    ) -> subfetch::Result<SearchOutcome> {
        println!("Searching {language} subtitles for movie hash {fingerprint}");
        Ok(SearchOutcome::Found(vec![SubtitleCandidate {
            relevance_score: 1.0,
            download_reference: self.reference.clone(),
            language_code: language.to_string(),
            language_iso: None,
            format: "srt".into(),
            encoding: None,
            size_bytes: None,
            rating: None,
            download_count: None,
            fps: None,
            featured: false,
            bad: false,
            file_hash: Some(fingerprint.to_string()),
        }]))
    }

    async fn languages(&self) -> subfetch::Result<Vec<Language>> {
        Ok(vec![Language {
            code: "en".into(),
            name: "English".into(),
            id: "eng".into(),
        }])
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "subfetch=info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(video), Some(reference)) = (args.next(), args.next()) else {
        eprintln!("usage: fetch_subtitles <video> <subtitle-url>");
        std::process::exit(2);
    };

    let config = Config {
        launch_after_download: false,
        ..Default::default()
    };

    // Retry questions arrive on a channel; answer them from stdin
    let (prompt, mut requests) = ChannelPrompt::new(4);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Some(request) = requests.recv().await {
            print!(
                "'{}' failed: {}. Retry? [y/N] ",
                request.report.task_name, request.report.error
            );
            std::io::stdout().flush().ok();
            let answer = stdin.next_line().await.ok().flatten().unwrap_or_default();
            let decision = if answer.trim().eq_ignore_ascii_case("y") {
                RetryDecision::Retry
            } else {
                RetryDecision::Abandon
            };
            request.respond(decision);
        }
    });

    let provider = Arc::new(FixedProvider { reference });
    let collaborators = Collaborators::with_defaults(&config, provider, Arc::new(prompt))?;
    let downloader = SubtitleDownloader::new(config, collaborators).await?;

    let mut events = downloader.subscribe();
    let id = downloader.submit_files(vec![PathBuf::from(video)]).await?;

    while let Ok(event) = events.recv().await {
        match event {
            Event::StatusChanged { id: job, status } if job == id => {
                println!("Job #{}: {}", id, status);
            }
            Event::Finalized { id: job, subtitle_path } if job == id => {
                println!("✓ Subtitle saved to {}", subtitle_path.display());
                break;
            }
            Event::SubtitlesNotFound { id: job } if job == id => {
                println!("No subtitles found");
                break;
            }
            Event::Abandoned { id: job, stage } if job == id => {
                println!("✗ Gave up (stage: {:?})", stage);
                break;
            }
            _ => {}
        }
    }

    downloader.shutdown().await?;
    Ok(())
}
