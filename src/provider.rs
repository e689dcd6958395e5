//! Collaborator traits the pipeline drives
//!
//! The pipeline never talks to the filesystem, the network or the desktop directly.
//! Each stage payload goes through one of these traits, so consumers can plug in their
//! own implementations and tests can substitute mocks.
//!
//! Default implementations ship for everything except [`SubtitleProvider`]: see
//! [`crate::hash::MovieHasher`], [`crate::transfer::HttpTransfer`] and
//! [`crate::launcher::SystemLauncher`].

use crate::error::Result;
use crate::types::{
    Credentials, Fingerprint, Language, SearchOutcome, SessionToken,
};
use async_trait::async_trait;
use std::path::Path;

/// Computes the content fingerprint the provider indexes videos by
#[async_trait]
pub trait Fingerprinter: Send + Sync {
    /// Fingerprint the video at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is too small to fingerprint.
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint>;
}

/// Subtitle search service
///
/// The wire protocol lives entirely behind this trait.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use subfetch::provider::SubtitleProvider;
/// use subfetch::types::{Credentials, Fingerprint, Language, SearchOutcome, SessionToken};
///
/// struct Offline;
///
/// #[async_trait]
/// impl SubtitleProvider for Offline {
///     async fn login(&self, _credentials: &Credentials) -> subfetch::Result<SessionToken> {
///         Ok(SessionToken::new("offline"))
///     }
///
///     async fn search(
///         &self,
///         _token: &SessionToken,
///         _fingerprint: &Fingerprint,
///         _language: &str,
///     ) -> subfetch::Result<SearchOutcome> {
///         Ok(SearchOutcome::NotFound)
///     }
///
///     async fn languages(&self) -> subfetch::Result<Vec<Language>> {
///         Ok(Vec::new())
///     }
/// }
/// ```
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Log in and obtain a session token
    ///
    /// # Errors
    ///
    /// [`ProviderError::LoginRejected`](crate::error::ProviderError::LoginRejected) if the
    /// credentials are refused; other provider or network errors otherwise.
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken>;

    /// Search subtitles for `fingerprint` in `language`
    ///
    /// An empty result is [`SearchOutcome::NotFound`], never an error.
    async fn search(
        &self,
        token: &SessionToken,
        fingerprint: &Fingerprint,
        language: &str,
    ) -> Result<SearchOutcome>;

    /// Subtitle languages the provider offers
    async fn languages(&self) -> Result<Vec<Language>>;
}

/// Fetches a subtitle file and returns its decompressed bytes
#[async_trait]
pub trait SubtitleTransfer: Send + Sync {
    /// Download `reference` (a candidate's download reference) and decompress it
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Opens a video with the user's media player
#[async_trait]
pub trait MediaLauncher: Send + Sync {
    /// Launch `video`; returns once the player process was started
    async fn launch(&self, video: &Path) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
