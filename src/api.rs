//! Page fetching with linear-backoff retry.
//!
//! # Architecture
//!
//! - [`Fetch`]: core trait, one GET returning the body as text
//! - [`HttpFetcher`]: `reqwest` implementation with a per-request timeout
//! - [`RetryFetch`]: decorator adding retry with linear backoff to any [`Fetch`]
//!
//! # Retry Strategy
//!
//! Attempt `k` (1-based) that fails sleeps `base_delay * k` before attempt
//! `k + 1`. After the last attempt the error is returned as
//! [`FetchError::Exhausted`] without sleeping.

use crate::errors::FetchError;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Something that can GET a page and return its body.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

impl<T: Fetch + ?Sized> Fetch for &T {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}

/// `reqwest`-backed fetcher. Non-success statuses are errors.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        info!(%url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

/// Wrapper that adds linear-backoff retry to any [`Fetch`] implementation.
pub struct RetryFetch<T> {
    inner: T,
    max_attempts: usize,
    base_delay: Duration,
}

impl<T: Fetch> RetryFetch<T> {
    /// `max_attempts` is clamped to at least one.
    pub fn new(inner: T, max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

/// Delay after the `attempt`-th failure (1-based).
pub fn backoff_delay(base: Duration, attempt: usize) -> Duration {
    base.saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }

                    let delay = backoff_delay(self.base_delay, attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Fetch for Flaky {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 502,
                })
            } else {
                Ok(format!("body of {url}"))
            }
        }
    }

    #[test]
    fn test_backoff_is_linear() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_retry_recovers_before_limit() {
        let flaky = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(&flaky, 3, Duration::ZERO);
        let body = retry.fetch("https://example.com").await.unwrap();
        assert_eq!(body, "body of https://example.com");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let flaky = Flaky {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(&flaky, 3, Duration::ZERO);
        let err = retry.fetch("https://example.com").await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_linearly() {
        let flaky = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(&flaky, 3, Duration::from_secs(2));
        let t0 = tokio::time::Instant::now();
        retry.fetch("https://example.com").await.unwrap();
        let elapsed = t0.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(7));
    }
}
