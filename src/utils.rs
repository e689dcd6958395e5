//! Utility functions for file operations and path manipulation

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Prefix for temporary files written next to the video
const TEMP_PREFIX: &str = ".subfetch-";

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename action, this may have a suffix added.
/// For Skip action, returns an error if the file already exists.
/// For Overwrite action, returns the original path unchanged.
///
/// # Examples
///
/// ```
/// use subfetch::utils::get_unique_path;
/// use subfetch::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/movie.eng.srt");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If /tmp/movie.eng.srt exists, returns /tmp/movie.eng (1).srt
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::FileCollision {
                    path: path.to_path_buf(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("cannot extract file stem from '{}'", path.display()),
                ))
            })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new(""));

            // Try adding (1), (2), (3), ... until we find a unique name
            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Subtitle path a media player picks up automatically for `video`
///
/// `/videos/movie.mp4` with language `eng` and format `srt` becomes
/// `/videos/movie.eng.srt`.
pub fn subtitle_path_for(video: &Path, language: &str, format: &str) -> Result<PathBuf> {
    let stem = video.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("video path '{}' has no file name", video.display()),
        ))
    })?;
    let language = sanitize_component(language);
    let format = sanitize_component(format);
    let name = if language.is_empty() {
        format!("{stem}.{format}")
    } else {
        format!("{stem}.{language}.{format}")
    };
    Ok(video.with_file_name(name))
}

// Provider-supplied strings end up in a file name
fn sanitize_component(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Write `contents` to `target` through a temporary file in the same directory
///
/// The temporary file gets a unique random name, so concurrent writers to one target
/// never share it. The final rename is atomic on the same filesystem, so a player never
/// sees a half-written subtitle. The temporary file is removed if anything fails.
pub fn write_atomically(target: &Path, contents: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io_error = |e: std::io::Error| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write subtitle '{}': {}", target.display(), e),
        ))
    };

    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent)
        .map_err(io_error)?;
    file.write_all(contents).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(target).map_err(|e| io_error(e.error))?;
    Ok(())
}
