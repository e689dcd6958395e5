//! Default video fingerprint
//!
//! The checksum subtitle databases index movies by: the file size plus the wrapping
//! sum of the little-endian 64-bit words in the first and the last 64 KiB of the
//! file, printed as 16 lowercase hex digits.

use crate::error::{Error, Result};
use crate::provider::Fingerprinter;
use crate::types::Fingerprint;
use async_trait::async_trait;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Bytes hashed at each end of the file
const CHUNK_SIZE: u64 = 64 * 1024;

/// Fingerprinter computing the movie hash on the blocking pool
#[derive(Clone, Copy, Debug, Default)]
pub struct MovieHasher;

impl MovieHasher {
    /// Create a hasher
    pub fn new() -> Self {
        Self
    }

    /// Compute the hash synchronously
    ///
    /// # Errors
    ///
    /// `Error::Io` if the file cannot be read, `Error::Hash` if it is smaller than
    /// two chunks (128 KiB).
    pub fn hash_file(path: &Path) -> Result<Fingerprint> {
        let mut file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open '{}': {}", path.display(), e),
            ))
        })?;
        let size = file.metadata()?.len();
        if size < CHUNK_SIZE * 2 {
            return Err(Error::Hash(format!(
                "'{}' is too small to fingerprint ({} bytes)",
                path.display(),
                size
            )));
        }

        let mut hash = size;
        hash = hash.wrapping_add(sum_chunk(&mut file)?);
        file.seek(SeekFrom::Start(size - CHUNK_SIZE))?;
        hash = hash.wrapping_add(sum_chunk(&mut file)?);

        Ok(Fingerprint::new(format!("{hash:016x}")))
    }
}

fn sum_chunk(file: &mut File) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE as usize];
    file.read_exact(&mut buf)?;
    Ok(buf
        .chunks_exact(8)
        .map(|word| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(word);
            u64::from_le_bytes(bytes)
        })
        .fold(0u64, u64::wrapping_add))
}

#[async_trait]
impl Fingerprinter for MovieHasher {
    async fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let path: PathBuf = path.to_path_buf();
        let fingerprint = tokio::task::spawn_blocking(move || Self::hash_file(&path))
            .await
            .map_err(|e| Error::Hash(format!("hash task failed: {e}")))??;
        tracing::debug!(%fingerprint, "Computed video fingerprint");
        Ok(fingerprint)
    }
}
