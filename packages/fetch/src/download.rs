//! Streaming downloads with an incremental SHA-256.
//!
//! The response body is written to disk chunk by chunk while the digest and
//! byte count are updated, so the whole file is never held in memory. A
//! failed download leaves the partial file in place.

use std::path::{Path, PathBuf};

use futures::StreamExt as _;
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncWriteExt as _;

use crate::{FetchError, Fetcher};

/// Write buffer size for downloads.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Outcome of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Where the file was written.
    pub local_path: PathBuf,
    /// Bytes written.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the bytes written.
    pub sha256: String,
}

impl Fetcher {
    /// Streams `url` to `dest`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails after retries, the
    /// response is not successful, or the file cannot be written.
    pub async fn stream_download(&self, url: &str, dest: &Path) -> Result<DownloadResult, FetchError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let response = self.policy.send(url, || self.client.get(url)).await?;

        if let Some(size) = response.content_length() {
            #[allow(clippy::cast_precision_loss)]
            let mb = size as f64 / 1_048_576.0;
            log::debug!("  {url}: {mb:.1} MB");
        }

        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_error(dest, e))?;
        let mut writer = tokio::io::BufWriter::with_capacity(CHUNK_SIZE, file);

        let mut hasher = Sha256::new();
        let mut size_bytes: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| io_error(dest, e))?;
            hasher.update(&chunk);
            size_bytes += chunk.len() as u64;
        }

        writer.flush().await.map_err(|e| io_error(dest, e))?;

        Ok(DownloadResult {
            local_path: dest.to_path_buf(),
            size_bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.display().to_string(),
        source,
    }
}
