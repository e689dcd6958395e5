//! HTTP subtitle transfer
//!
//! Providers serve subtitle files gzip-compressed. [`HttpTransfer`] fetches the
//! download reference over HTTP(S) and inflates the body on the blocking pool.

use crate::error::{Error, Result};
use crate::provider::SubtitleTransfer;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::io::Read;
use std::time::Duration;

/// Timeout for a single subtitle fetch in seconds
const FETCH_TIMEOUT_SECS: u64 = 60;

/// Fetches gzip-compressed subtitle files with `reqwest`
#[derive(Clone, Debug)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    /// Create a transfer announcing `user_agent`
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "Failed to create HTTP client: {}",
                    e
                )))
            })?;
        Ok(Self { client })
    }

    /// Create a transfer using an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubtitleTransfer for HttpTransfer {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let url = url::Url::parse(reference)
            .map_err(|e| Error::InvalidReference(format!("'{}': {}", reference, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidReference(format!(
                "'{}': unsupported scheme '{}'",
                reference,
                url.scheme()
            )));
        }

        tracing::debug!(%url, "Fetching subtitle");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transfer {
                reference: reference.to_string(),
                status: status.as_u16(),
            });
        }

        let compressed = response.bytes().await?;
        tracing::debug!(bytes = compressed.len(), "Subtitle fetched, decompressing");

        tokio::task::spawn_blocking(move || gunzip(&compressed))
            .await
            .map_err(|e| Error::Decompress(format!("decompression task failed: {e}")))?
    }
}

/// Inflate a gzip stream
pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompress(e.to_string()))?;
    Ok(out)
}
