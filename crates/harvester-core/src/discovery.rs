//! Link discovery.
//!
//! Walks the site's paginated search results and admits every recipe link it
//! finds into the work queue. Two strategies exist:
//!
//! - **browser**: drive a real page, clicking the "load more" control until
//!   it disappears or stops producing results. The number of clicks is
//!   checkpointed so an interrupted run can replay its way back to where it
//!   stopped.
//! - **http**: fetch the first search page, find the AJAX pagination
//!   template in it, and request later pages directly.
//!
//! In [`DiscoveryMode::Auto`] the browser is tried first and HTTP takes over
//! if the browser cannot be used. Storage failures are never treated as a
//! reason to switch strategy.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{DiscoveryConfig, DiscoveryMode, SiteConfig};
use crate::error::AppError;
use crate::links::{self, CARD_SELECTORS, LinkFilter};
use crate::traits::{BrowserPage, Fetcher, Locator, PageLauncher};
use crate::work_queue::WorkQueue;

/// Label of the control that appends the next page of results.
pub const LOAD_MORE_TEXT: &str = "Показать еще результаты";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why a strategy stopped early.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The strategy cannot run here (no browser, page automation broke).
    #[error("strategy unavailable: {0}")]
    Unavailable(AppError),

    /// Storage or checkpoint failure. Never triggers a fallback.
    #[error(transparent)]
    Fatal(AppError),
}

impl StrategyError {
    fn classify(error: AppError) -> Self {
        if error.is_fatal() {
            StrategyError::Fatal(error)
        } else {
            StrategyError::Unavailable(error)
        }
    }
}

impl From<StrategyError> for AppError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::Unavailable(e) | StrategyError::Fatal(e) => e,
        }
    }
}

/// Outcome of one discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Strategy that produced the links (`Browser` or `Http`).
    pub strategy: DiscoveryMode,
    /// Newly admitted URLs.
    pub admitted: u64,
    /// Clicks replayed from the checkpoint.
    pub replayed: u64,
    /// New clicks (browser) or additional pages (HTTP) performed.
    pub pages: u32,
    /// True when `auto` mode abandoned the browser.
    pub fell_back: bool,
}

impl DiscoverySummary {
    fn new(strategy: DiscoveryMode) -> Self {
        Self {
            strategy,
            admitted: 0,
            replayed: 0,
            pages: 0,
            fell_back: false,
        }
    }
}

/// Counts admitted links and logs each crossed milestone once.
struct Progress {
    admitted: u64,
    interval: Option<u64>,
}

impl Progress {
    fn new(interval: Option<u64>) -> Self {
        Self {
            admitted: 0,
            interval: interval.filter(|&n| n > 0),
        }
    }

    fn record(&mut self, added: u64) {
        let before = self.admitted;
        self.admitted += added;
        if let Some(interval) = self.interval {
            let bucket = self.admitted / interval;
            if bucket > before / interval {
                tracing::info!(links = bucket * interval, "Discovery milestone reached");
            }
        }
    }
}

/// Discovers links and admits them into a [`WorkQueue`].
pub struct DiscoveryEngine<Q, F, L>
where
    Q: WorkQueue,
    F: Fetcher,
    L: PageLauncher,
{
    queue: Q,
    fetcher: F,
    launcher: L,
    site: SiteConfig,
    config: DiscoveryConfig,
    filter: LinkFilter,
    checkpoints: CheckpointStore,
}

impl<Q, F, L> DiscoveryEngine<Q, F, L>
where
    Q: WorkQueue,
    F: Fetcher,
    L: PageLauncher,
{
    pub fn new(
        queue: Q,
        fetcher: F,
        launcher: L,
        site: SiteConfig,
        config: DiscoveryConfig,
    ) -> Self {
        let filter = LinkFilter::new(&site);
        let checkpoints = CheckpointStore::new(&config.checkpoint_path);
        Self {
            queue,
            fetcher,
            launcher,
            site,
            config,
            filter,
            checkpoints,
        }
    }

    /// Run discovery with the configured mode.
    pub async fn run(&self) -> Result<DiscoverySummary, AppError> {
        tracing::info!(mode = %self.config.mode, "Starting link discovery");
        let summary = match self.config.mode {
            DiscoveryMode::Browser => self.run_browser().await?,
            DiscoveryMode::Http => self.run_http().await?,
            DiscoveryMode::Auto => match self.run_browser().await {
                Ok(summary) => summary,
                Err(StrategyError::Unavailable(e)) => {
                    tracing::warn!(
                        error = %e,
                        "Browser discovery unavailable, falling back to HTTP"
                    );
                    let mut summary = self.run_http().await?;
                    summary.fell_back = true;
                    summary
                }
                Err(StrategyError::Fatal(e)) => return Err(e),
            },
        };
        tracing::info!(
            strategy = %summary.strategy,
            admitted = summary.admitted,
            pages = summary.pages,
            "Link discovery finished"
        );
        Ok(summary)
    }

    async fn run_browser(&self) -> Result<DiscoverySummary, StrategyError> {
        let mut summary = DiscoverySummary::new(DiscoveryMode::Browser);
        let mut progress = Progress::new(self.config.progress_interval);
        let search_url = self.site.search_url().map_err(StrategyError::Fatal)?;

        let page = self
            .launcher
            .launch()
            .await
            .map_err(StrategyError::Unavailable)?;
        page.navigate(search_url.as_str())
            .await
            .map_err(StrategyError::classify)?;
        self.harvest_page(&page, &mut progress).await?;

        let mut checkpoint = self.checkpoints.load().await;
        if checkpoint.clicks_completed > 0 {
            tracing::info!(
                clicks = checkpoint.clicks_completed,
                "Replaying previous clicks to resume"
            );
            summary.replayed = self.replay(&page, &checkpoint, &mut progress).await?;
        }

        loop {
            if let Some(limit) = self.config.click_limit
                && summary.pages >= limit
            {
                tracing::info!(limit, "Reached configured click limit");
                break;
            }
            if !self.load_more(&page).await? {
                tracing::info!("No further pages available");
                break;
            }
            summary.pages += 1;
            checkpoint.clicks_completed += 1;
            self.checkpoints
                .save(&checkpoint)
                .await
                .map_err(StrategyError::Fatal)?;
            self.harvest_page(&page, &mut progress).await?;
        }

        summary.admitted = progress.admitted;
        Ok(summary)
    }

    async fn replay<P: BrowserPage>(
        &self,
        page: &P,
        checkpoint: &Checkpoint,
        progress: &mut Progress,
    ) -> Result<u64, StrategyError> {
        let mut replayed = 0;
        while replayed < checkpoint.clicks_completed {
            if !self.load_more(page).await? {
                tracing::warn!(
                    replayed,
                    expected = checkpoint.clicks_completed,
                    "Unable to replay historical clicks; button missing"
                );
                break;
            }
            replayed += 1;
            self.harvest_page(page, progress).await?;
        }
        Ok(replayed)
    }

    /// Click "load more" once and wait for the result list to grow.
    ///
    /// `Ok(false)` means there is nothing more to load: the control is gone,
    /// the click failed, or no new results appeared in time.
    async fn load_more<P: BrowserPage>(&self, page: &P) -> Result<bool, StrategyError> {
        let button = load_more_locator();
        let cards = Locator::css(CARD_SELECTORS);

        if page.count(&button).await.map_err(StrategyError::classify)? == 0 {
            return Ok(false);
        }
        let before = page.count(&cards).await.unwrap_or(0);

        if !self.config.click_delay.is_zero() {
            tokio::time::sleep(self.config.click_delay).await;
        }
        match page.click(&button).await {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to click next page button");
                return Ok(false);
            }
        }
        if !self.config.settle_pause.is_zero() {
            tokio::time::sleep(self.config.settle_pause).await;
        }

        if !self.wait_for_growth(page, &cards, before).await {
            tracing::warn!(before, "Timeout waiting for additional search results");
            return Ok(false);
        }
        Ok(true)
    }

    async fn wait_for_growth<P: BrowserPage>(
        &self,
        page: &P,
        cards: &Locator,
        before: usize,
    ) -> bool {
        let deadline = Instant::now() + self.config.results_wait_timeout;
        let poll = self.config.results_poll_interval.max(MIN_POLL_INTERVAL);
        loop {
            let current = page.count(cards).await.unwrap_or(0);
            if current > before {
                tracing::debug!(before, current, "Detected growth in search results");
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    async fn harvest_page<P: BrowserPage>(
        &self,
        page: &P,
        progress: &mut Progress,
    ) -> Result<u64, StrategyError> {
        let hrefs = page
            .attribute_values(&Locator::css(CARD_SELECTORS), "href")
            .await
            .map_err(StrategyError::classify)?;
        self.admit(hrefs, progress)
            .await
            .map_err(StrategyError::Fatal)
    }

    async fn run_http(&self) -> Result<DiscoverySummary, AppError> {
        tracing::info!("Using HTTP discovery");
        let mut summary = DiscoverySummary::new(DiscoveryMode::Http);
        let mut progress = Progress::new(self.config.progress_interval);
        let search_url = self.site.search_url()?;

        let mut template: Option<String> = None;
        let mut page_num: u32 = 1;
        loop {
            let target = if page_num == 1 {
                search_url.clone()
            } else {
                let Some(template) = template.as_deref() else {
                    tracing::info!("No AJAX template available; stopping HTTP pagination");
                    break;
                };
                links::build_ajax_url(template, &self.site.base_url, page_num)?
            };

            tracing::debug!(url = %target, page = page_num, "Fetching search page");
            let html = match self.fetcher.fetch(target.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(url = %target, error = %e, "HTTP discovery failed");
                    break;
                }
            };

            let added = self.admit(links::card_hrefs(&html), &mut progress).await?;
            if page_num == 1 {
                template = links::find_ajax_template(&html);
            }
            if added == 0 {
                tracing::info!(page = page_num, "No new recipe links on page; stopping");
                break;
            }

            summary.pages += 1;
            if let Some(limit) = self.config.click_limit
                && summary.pages >= limit
            {
                tracing::info!(limit, "Reached HTTP pagination limit");
                break;
            }
            page_num += 1;
        }

        summary.admitted = progress.admitted;
        Ok(summary)
    }

    async fn admit(&self, hrefs: Vec<String>, progress: &mut Progress) -> Result<u64, AppError> {
        let batch = self.filter.admit_batch(hrefs);
        if batch.is_empty() {
            return Ok(0);
        }
        let added = self.queue.admit(&batch).await?;
        if added > 0 {
            tracing::info!(added, "Queued new recipe URLs");
            progress.record(added);
        }
        Ok(added)
    }
}

fn load_more_locator() -> Locator {
    Locator::css("button").with_text(LOAD_MORE_TEXT)
}
