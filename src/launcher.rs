//! Media launchers used by the finalize stage

use crate::error::{Error, Result};
use crate::provider::MediaLauncher;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Desktop openers tried in order by [`SystemLauncher::from_path`]
const OPENERS: &[&str] = &["xdg-open", "open"];

/// Opens videos with the desktop's default handler
///
/// # Examples
///
/// ```no_run
/// use subfetch::launcher::SystemLauncher;
/// use subfetch::provider::MediaLauncher;
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let launcher = SystemLauncher::from_path().expect("no desktop opener in PATH");
/// launcher.launch(Path::new("/videos/movie.mkv")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SystemLauncher {
    binary_path: PathBuf,
}

impl SystemLauncher {
    /// Create a launcher with an explicit opener binary
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Find `xdg-open` or `open` in PATH
    pub fn from_path() -> Option<Self> {
        OPENERS
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }

    /// Opener binary this launcher runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl MediaLauncher for SystemLauncher {
    async fn launch(&self, video: &Path) -> Result<()> {
        // The player outlives us; the child handle is dropped without waiting
        Command::new(&self.binary_path)
            .arg(video)
            .spawn()
            .map_err(|e| {
                Error::Launch(format!(
                    "Failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;
        tracing::info!(video = ?video, opener = ?self.binary_path, "Launched video");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Launcher that does nothing, for headless use
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLauncher;

#[async_trait]
impl MediaLauncher for NoOpLauncher {
    async fn launch(&self, video: &Path) -> Result<()> {
        tracing::debug!(video = ?video, "Launch skipped, no launcher configured");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
