#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Outbound HTTP for dataset jobs.
//!
//! A single [`Fetcher`] owns the HTTP client and the [`RetryPolicy`] applied
//! to every request it sends: listing pages ([`Fetcher::fetch_text`]),
//! streamed downloads ([`Fetcher::stream_download`]) and header-only size
//! probes ([`Fetcher::probe_size`]).

pub mod download;
pub mod retry;

#[cfg(any(test, feature = "test-server"))]
pub mod test_server;

use std::time::Duration;

pub use download::DownloadResult;
pub use retry::RetryPolicy;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("forest-pipelines/", env!("CARGO_PKG_VERSION"));

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle timeout between body reads on downloads.
const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Total timeout for listing pages.
const LISTING_TIMEOUT: Duration = Duration::from_secs(60);

/// Total timeout for `HEAD` probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from outbound HTTP.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Local file I/O failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File path involved.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Every attempt allowed by the retry policy failed transiently.
    #[error("{url} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Request URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        last: Box<Self>,
    },
}

impl FetchError {
    /// HTTP status carried by the error, looking through retry exhaustion.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Io { .. } => None,
        }
    }
}

/// HTTP client plus the retry policy wrapped around every call.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Creates a fetcher using `policy` for every request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built.
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;

        Ok(Self { client, policy })
    }

    /// The retry policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a page and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails after retries or returns
    /// a non-success status.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .policy
            .send(url, || self.client.get(url).timeout(LISTING_TIMEOUT))
            .await?;

        Ok(response.text().await?)
    }

    /// Reads the size of a remote file from a `HEAD` request without
    /// downloading it. Redirects are followed.
    ///
    /// Returns `None` when the server does not report a `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the request fails after retries or returns
    /// a non-success status.
    pub async fn probe_size(&self, url: &str) -> Result<Option<u64>, FetchError> {
        let response = self
            .policy
            .send(url, || self.client.head(url).timeout(PROBE_TIMEOUT))
            .await?;

        // Read the header directly: the body of a HEAD response is always
        // empty, so the body size hint would report 0.
        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok()))
    }
}
