//! In-fetch retry with exponential backoff.
//!
//! Wraps any [`Fetcher`] so that a transient failure (see
//! [`AppError::is_retryable`]) is retried after `initial_delay`, then twice
//! that, and so on up to `max_delay`. Permanent errors such as a 404 are
//! returned at once. When every attempt fails the last error is returned.
//!
//! This is the inner of two retry layers. The fetch worker acknowledges a
//! URL whose retries are exhausted as failed in the work queue, which gives
//! it another `max_failures` leases before it becomes terminally `failed`.
//!
//! # Example
//!
//! ```rust,no_run
//! use harvester_core::config::RetryConfig;
//! use harvester_core::retry::RetryingFetcher;
//! # use harvester_core::error::AppError;
//! # use harvester_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, AppError> { todo!() }
//! # }
//! let fetcher = RetryingFetcher::new(MyFetcher, RetryConfig::default());
//! ```

use crate::config::RetryConfig;
use crate::error::AppError;
use crate::traits::Fetcher;

/// A [`Fetcher`] wrapper that retries failed requests with backoff.
#[derive(Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    config: RetryConfig,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt >= max_attempts || !e.is_retryable() => return Err(e),
                Err(e) => {
                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::debug!(
                        %url,
                        attempt,
                        error = %e,
                        delay_ms = %delay.as_millis(),
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
