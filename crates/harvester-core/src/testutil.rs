//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::links::CARD_SELECTORS;
use crate::models::RecipeRecord;
use crate::queue::{QueueRecord, QueueStats, UrlStatus};
use crate::traits::{BrowserPage, Extractor, Fetcher, Locator, PageLauncher, RecordSink};
use crate::work_queue::{WorkQueue, dedupe_urls};
use crate::worker::{WorkerEvent, WorkerReporter};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone, Default)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    /// URLs that always fail with a network error.
    failing: Arc<Mutex<HashSet<String>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Default::default()
        }
    }

    pub fn failing_for(self, url: &str) -> Self {
        self.failing.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().contains(url) {
            return Err(AppError::NetworkError(format!("connection reset for {url}")));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Marker that makes [`MockExtractor`] reject a page.
pub const NOT_A_RECIPE: &str = "<!-- not a recipe -->";

/// Mock extractor that builds a record from the URL unless the page
/// contains [`NOT_A_RECIPE`].
#[derive(Clone, Default)]
pub struct MockExtractor {
    calls: Arc<Mutex<usize>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Extractor for MockExtractor {
    fn extract(&self, html: &str, url: &str) -> Option<RecipeRecord> {
        *self.calls.lock().unwrap() += 1;
        if html.contains(NOT_A_RECIPE) {
            return None;
        }
        Some(RecipeRecord::new(
            format!("Recipe at {url}"),
            "Mix. Bake.",
            "flour; water",
            url,
        ))
    }
}

// ---------------------------------------------------------------------------
// MockWorkQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    /// Insertion order breaks `updated_at` ties.
    rows: Vec<QueueRecord>,
    admit_error: Option<AppError>,
    lease_error: Option<AppError>,
    lease_calls: usize,
}

/// In-memory work queue with the same state machine as the SQLite one.
#[derive(Clone, Default)]
pub struct MockWorkQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MockWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue pre-populated with pending URLs.
    pub fn with_pending(urls: &[&str]) -> Self {
        let queue = Self::new();
        {
            let mut state = queue.state.lock().unwrap();
            for url in urls {
                state.rows.push(Self::pending_row(url));
            }
        }
        queue
    }

    /// The next `admit` fails with `error`.
    pub fn with_admit_error(self, error: AppError) -> Self {
        self.state.lock().unwrap().admit_error = Some(error);
        self
    }

    /// The next `lease` fails with `error`.
    pub fn with_lease_error(self, error: AppError) -> Self {
        self.state.lock().unwrap().lease_error = Some(error);
        self
    }

    pub fn urls(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.rows.iter().map(|r| r.url.clone()).collect()
    }

    pub fn status_of(&self, url: &str) -> Option<UrlStatus> {
        let state = self.state.lock().unwrap();
        state.rows.iter().find(|r| r.url == url).map(|r| r.status)
    }

    pub fn lease_calls(&self) -> usize {
        self.state.lock().unwrap().lease_calls
    }

    fn pending_row(url: &str) -> QueueRecord {
        let now = Utc::now();
        QueueRecord {
            url: url.to_string(),
            status: UrlStatus::Pending,
            attempts: 0,
            last_error: None,
            leased_at: None,
            first_seen: now,
            updated_at: now,
        }
    }
}

impl WorkQueue for MockWorkQueue {
    async fn admit(&self, urls: &[String]) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.admit_error.take() {
            return Err(e);
        }
        let mut inserted = 0;
        for url in dedupe_urls(urls) {
            match state.rows.iter().position(|r| r.url == url) {
                Some(i) if state.rows[i].status == UrlStatus::Processed => {}
                Some(i) => {
                    let row = &mut state.rows[i];
                    row.status = UrlStatus::Pending;
                    row.attempts = 0;
                    row.last_error = None;
                    row.leased_at = None;
                    row.updated_at = Utc::now();
                }
                None => {
                    state.rows.push(Self::pending_row(&url));
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn lease(&self, limit: usize, lease_duration: Duration) -> Result<Vec<String>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.lease_calls += 1;
        if let Some(e) = state.lease_error.take() {
            return Err(e);
        }
        let now = Utc::now();
        let expiry = chrono::Duration::from_std(lease_duration).unwrap_or(chrono::Duration::MAX);

        let mut eligible: Vec<usize> = state
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| match r.status {
                UrlStatus::Pending => true,
                UrlStatus::Leased => r.leased_at.is_none_or(|at| now - at >= expiry),
                _ => false,
            })
            .map(|(i, _)| i)
            .collect();
        eligible.sort_by_key(|&i| (state.rows[i].updated_at, i));
        eligible.truncate(limit);

        let mut leased = Vec::with_capacity(eligible.len());
        for i in eligible {
            let row = &mut state.rows[i];
            row.status = UrlStatus::Leased;
            row.leased_at = Some(now);
            row.updated_at = now;
            leased.push(row.url.clone());
        }
        Ok(leased)
    }

    async fn ack_success(&self, url: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.rows.iter_mut().find(|r| r.url == url) {
            row.status = UrlStatus::Processed;
            row.leased_at = None;
            row.last_error = None;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ack_fail(&self, url: &str, error: &str, max_attempts: u32) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.rows.iter_mut().find(|r| r.url == url) {
            row.attempts += 1;
            row.status = if row.attempts >= max_attempts {
                UrlStatus::Failed
            } else {
                UrlStatus::Pending
            };
            row.last_error = Some(error.to_string());
            row.leased_at = None;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn is_processed(&self, url: &str) -> Result<bool, AppError> {
        Ok(self.status_of(url) == Some(UrlStatus::Processed))
    }

    async fn stats(&self) -> Result<QueueStats, AppError> {
        let state = self.state.lock().unwrap();
        let mut stats = QueueStats::default();
        for row in &state.rows {
            stats.add(row.status, 1);
        }
        Ok(stats)
    }

    async fn get(&self, url: &str) -> Result<Option<QueueRecord>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.iter().find(|r| r.url == url).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Mock sink that records every appended record.
#[derive(Clone, Default)]
pub struct MockSink {
    pub records: Arc<Mutex<Vec<RecipeRecord>>>,
    flushes: Arc<Mutex<usize>>,
    finalized: Arc<Mutex<usize>>,
    append_error: Arc<Mutex<Option<AppError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `append` fails with `error`.
    pub fn with_append_error(self, error: AppError) -> Self {
        *self.append_error.lock().unwrap() = Some(error);
        self
    }

    pub fn urls(&self) -> Vec<String> {
        let records = self.records.lock().unwrap();
        records.iter().map(|r| r.url.clone()).collect()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock().unwrap()
    }

    pub fn finalized(&self) -> usize {
        *self.finalized.lock().unwrap()
    }
}

impl RecordSink for MockSink {
    async fn append(&self, record: RecipeRecord) -> Result<(), AppError> {
        if let Some(e) = self.append_error.lock().unwrap().take() {
            return Err(e);
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AppError> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }

    async fn finalize(&self) -> Result<(), AppError> {
        *self.finalized.lock().unwrap() += 1;
        self.flush().await
    }
}

// ---------------------------------------------------------------------------
// MockPage / MockLauncher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PageState {
    /// Result cards revealed by the initial load and by each click.
    chunks: Vec<Vec<String>>,
    visible: usize,
    clicks: u32,
    /// Clicks from this number on are accepted but reveal nothing.
    stall_from: Option<u32>,
    click_error: bool,
    navigate_error: bool,
    navigations: Vec<String>,
}

impl PageState {
    fn has_more(&self) -> bool {
        self.visible < self.chunks.len()
    }

    fn visible_hrefs(&self) -> Vec<String> {
        self.chunks[..self.visible].iter().flatten().cloned().collect()
    }
}

/// Scripted search page. The result cards grow by one chunk per click of
/// the "load more" control, which disappears once every chunk is shown.
///
/// A locator whose CSS equals [`CARD_SELECTORS`] addresses the cards;
/// any other locator addresses the control.
#[derive(Clone, Default)]
pub struct MockPage {
    state: Arc<Mutex<PageState>>,
}

impl MockPage {
    /// `chunks[0]` is visible after navigation.
    pub fn new(chunks: Vec<Vec<String>>) -> Self {
        let page = Self::default();
        page.state.lock().unwrap().chunks = chunks;
        page
    }

    /// A page of `pages` chunks with `per_page` links each.
    pub fn paged(pages: usize, per_page: usize) -> Self {
        let chunks = (0..pages)
            .map(|p| {
                (0..per_page)
                    .map(|i| format!("/cooking/{}-dish", p * per_page + i))
                    .collect()
            })
            .collect();
        Self::new(chunks)
    }

    pub fn stalling_from(self, click: u32) -> Self {
        self.state.lock().unwrap().stall_from = Some(click);
        self
    }

    pub fn with_click_error(self) -> Self {
        self.state.lock().unwrap().click_error = true;
        self
    }

    pub fn with_navigate_error(self) -> Self {
        self.state.lock().unwrap().navigate_error = true;
        self
    }

    pub fn clicks(&self) -> u32 {
        self.state.lock().unwrap().clicks
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }
}

impl BrowserPage for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if state.navigate_error {
            return Err(AppError::BrowserError(format!("navigation to {url} failed")));
        }
        state.navigations.push(url.to_string());
        state.visible = state.chunks.len().min(1);
        state.clicks = 0;
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> Result<usize, AppError> {
        let state = self.state.lock().unwrap();
        if locator.css == CARD_SELECTORS {
            Ok(state.visible_hrefs().len())
        } else {
            Ok(usize::from(state.has_more()))
        }
    }

    async fn attribute_values(
        &self,
        _locator: &Locator,
        _attribute: &str,
    ) -> Result<Vec<String>, AppError> {
        Ok(self.state.lock().unwrap().visible_hrefs())
    }

    async fn click(&self, _locator: &Locator) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.click_error {
            return Err(AppError::BrowserError("element is not clickable".into()));
        }
        if !state.has_more() {
            return Ok(false);
        }
        let stalled = state.stall_from.is_some_and(|from| state.clicks >= from);
        state.clicks += 1;
        if !stalled {
            state.visible += 1;
        }
        Ok(true)
    }
}

/// Launcher handing out one shared [`MockPage`], or failing.
#[derive(Clone)]
pub struct MockLauncher {
    page: Option<MockPage>,
    launches: Arc<Mutex<usize>>,
}

impl MockLauncher {
    pub fn new(page: MockPage) -> Self {
        Self {
            page: Some(page),
            launches: Arc::new(Mutex::new(0)),
        }
    }

    /// Every launch fails, as if no browser were installed.
    pub fn unavailable() -> Self {
        Self {
            page: None,
            launches: Arc::new(Mutex::new(0)),
        }
    }

    pub fn launches(&self) -> usize {
        *self.launches.lock().unwrap()
    }
}

impl PageLauncher for MockLauncher {
    type Page = MockPage;

    async fn launch(&self) -> Result<MockPage, AppError> {
        *self.launches.lock().unwrap() += 1;
        self.page
            .clone()
            .ok_or_else(|| AppError::BrowserError("chrome binary not found".into()))
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records event names and milestones. Optionally cancels a
/// token the first time the worker goes idle, which ends a test run once the
/// queue is drained.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
    milestones: Arc<Mutex<Vec<u64>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    cancel_on_idle: Option<CancellationToken>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_on_idle(token: CancellationToken) -> Self {
        Self {
            cancel_on_idle: Some(token),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn milestones(&self) -> Vec<u64> {
        self.milestones.lock().unwrap().clone()
    }

    pub fn failure_for(&self, url: &str) -> Option<String> {
        self.failures.lock().unwrap().get(url).cloned()
    }
}

impl WorkerReporter for MockReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        let name = match &event {
            WorkerEvent::Started { .. } => "started",
            WorkerEvent::Idle => "idle",
            WorkerEvent::BatchLeased { .. } => "batch_leased",
            WorkerEvent::UrlCompleted { .. } => "url_completed",
            WorkerEvent::UrlFailed { .. } => "url_failed",
            WorkerEvent::Milestone { .. } => "milestone",
            WorkerEvent::Stopped { .. } => "stopped",
        };
        self.events.lock().unwrap().push(name.to_string());

        match event {
            WorkerEvent::Milestone { processed } => {
                self.milestones.lock().unwrap().push(processed);
            }
            WorkerEvent::UrlFailed { url, error } => {
                self.failures
                    .lock()
                    .unwrap()
                    .insert(url.to_string(), error.to_string());
            }
            WorkerEvent::Idle => {
                if let Some(token) = &self.cancel_on_idle {
                    token.cancel();
                }
            }
            _ => {}
        }
    }
}
