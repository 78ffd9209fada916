//! Retry with exponential backoff for transient HTTP failures.
//!
//! Connection errors, timeouts, HTTP 429 and HTTP 5xx are retried. Any other
//! 4xx is permanent and returned immediately as [`FetchError::Status`].

use std::time::Duration;

use crate::FetchError;

/// How many times to attempt a request and how long to wait in between.
///
/// The wait before attempt `n + 1` is `base_delay * factor^(n - 1)`, so the
/// default policy waits 2s, then 4s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the wait after each further failure.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without waiting.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            factor: 1,
        }
    }

    /// Wait before retrying after `failed_attempts` failures.
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1);
        self.base_delay
            .saturating_mul(self.factor.saturating_pow(exp))
    }

    /// Sends the request produced by `build_request`, retrying transient
    /// failures.
    ///
    /// `build_request` is called once per attempt since a
    /// [`reqwest::RequestBuilder`] is consumed by `send()`.
    ///
    /// # Errors
    ///
    /// * [`FetchError::Status`] for a permanent (non-429) 4xx response.
    /// * [`FetchError::Http`] for a non-transient transport error.
    /// * [`FetchError::RetriesExhausted`] when every attempt failed
    ///   transiently.
    #[allow(clippy::future_not_send)]
    pub async fn send<F>(&self, url: &str, build_request: F) -> Result<reqwest::Response, FetchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let last = match build_request().send().await {
                Err(e) if is_transient(&e) => {
                    log::warn!("  transient error on {url}: {e}");
                    FetchError::Http(e)
                }
                Err(e) => return Err(FetchError::Http(e)),
                Ok(response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error()
                    {
                        log::warn!("  HTTP {status} from {url}");
                        FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        }
                    } else if !status.is_success() {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    } else {
                        return Ok(response);
                    }
                }
            };

            if attempt >= max_attempts {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(last),
                });
            }

            let delay = self.delay_after(attempt);
            log::warn!("  retry {attempt}/{} in {delay:?}...", max_attempts - 1);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
