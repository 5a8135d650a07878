use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::queue::{QueueRecord, QueueStats};

/// Persistent, lease-based queue of URLs to harvest.
///
/// Implementations must make `lease` atomic: selecting eligible rows and
/// marking them leased happens in one step, so concurrent leasers always
/// receive disjoint batches. Storage errors are returned as
/// [`AppError::DatabaseError`] and are never retried internally.
pub trait WorkQueue: Send + Sync + Clone {
    /// Insert new URLs as `pending` and resurrect known, non-processed ones.
    ///
    /// Returns the number of newly inserted rows.
    fn admit(&self, urls: &[String]) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Claim up to `limit` URLs that are pending, or leased for at least
    /// `lease_duration`. Oldest `updated_at` first.
    fn lease(
        &self,
        limit: usize,
        lease_duration: Duration,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    fn ack_success(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Record a failure. The URL becomes `failed` once its attempt count
    /// reaches `max_attempts`, otherwise it goes back to `pending`.
    fn ack_fail(
        &self,
        url: &str,
        error: &str,
        max_attempts: u32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn is_processed(&self, url: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn stats(&self) -> impl Future<Output = Result<QueueStats, AppError>> + Send;

    fn get(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<QueueRecord>, AppError>> + Send;
}

/// Deduplicate while preserving first-occurrence order.
pub fn dedupe_urls(urls: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(urls.len());
    urls.iter()
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}
