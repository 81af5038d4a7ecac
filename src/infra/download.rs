//! HTTP download functionality
//!
//! Fetches source tarballs with checksum verification and retry with
//! exponential backoff. Archives already present with the right checksum are
//! not downloaded again.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::defaults;
use crate::error::DownloadError;

/// Progress callback type (`bytes_downloaded`, `total_bytes`)
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// A downloaded file
#[derive(Debug)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size: u64,
    /// SHA256 of the content, lowercase hex
    pub checksum: String,
}

/// Download manager with retry
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    max_retries: u32,
    base_delay_ms: u64,
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::with_config(
            defaults::MAX_DOWNLOAD_RETRIES,
            defaults::DOWNLOAD_RETRY_BASE_DELAY_MS,
        )
    }

    /// Create a download manager with custom retry settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(defaults::DOWNLOAD_TIMEOUT_SECS))
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            max_retries: max_retries.max(1),
            base_delay_ms,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Download `url` to `dest`, retrying failed attempts
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let mut delay_ms = self.base_delay_ms;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.download_once(url, dest, progress).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("Download attempt {attempt} of {url} failed: {e}");
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(defaults::DOWNLOAD_RETRY_MAX_DELAY_MS);
                    }
                }
            }
        }

        let _ = tokio::fs::remove_file(dest).await;
        Err(last_error.unwrap_or_else(|| DownloadError::MaxRetriesExceeded {
            url: url.to_string(),
            retries: self.max_retries,
        }))
    }

    async fn download_once(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let network_err = |e: String| DownloadError::NetworkError {
            url: url.to_string(),
            error: e,
        };
        let io_err = |path: &Path, e: std::io::Error| DownloadError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(network_err(format!("HTTP {}", response.status())));
        }
        let total_size = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        let mut file = File::create(dest).await.map_err(|e| io_err(dest, e))?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network_err(e.to_string()))?;
            file.write_all(&chunk).await.map_err(|e| io_err(dest, e))?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            if let Some(cb) = progress {
                cb(downloaded, total_size);
            }
        }
        file.flush().await.map_err(|e| io_err(dest, e))?;

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            size: downloaded,
            checksum: hex::encode(hasher.finalize()),
        })
    }

    /// Download and verify; a mismatching file is deleted
    pub async fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_checksum: &str,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let result = self.download(url, dest, progress).await?;
        if !result.checksum.eq_ignore_ascii_case(expected_checksum) {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(DownloadError::ChecksumFailed {
                file: dest.display().to_string(),
            });
        }
        Ok(result)
    }

    /// Reuse `dest` if it already has the expected checksum, else download it
    pub async fn fetch_cached(
        &self,
        url: &str,
        dest: &Path,
        expected_checksum: &str,
        progress: Option<&ProgressCallback>,
    ) -> Result<PathBuf, DownloadError> {
        if dest.exists() && verify_checksum(dest, expected_checksum)? {
            debug!("Using cached {}", dest.display());
            return Ok(dest.to_path_buf());
        }
        Ok(self
            .download_verified(url, dest, expected_checksum, progress)
            .await?
            .path)
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify SHA256 checksum of a file
pub fn verify_checksum(path: &Path, expected: &str) -> Result<bool, DownloadError> {
    let content = std::fs::read(path).map_err(|e| DownloadError::IoError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    Ok(compute_checksum(&content).eq_ignore_ascii_case(expected))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// File name for a tarball URL
pub fn archive_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|n| !n.is_empty())
        .unwrap_or("download")
        .to_string()
}
