//! Runtime configuration.
//!
//! Everything is built once at startup into an [`AppContext`] and handed to
//! components by reference; nothing here is global.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_BASE_URL: &str = "https://1000.menu";
pub const DEFAULT_SEARCH_PATH: &str =
    "/cooking/search?ms=1&str=&es_tf=0&es_tt=14&es_cf=0&es_ct=2000";
pub const DEFAULT_CONTENT_PREFIX: &str = "/cooking/";

/// The single site being harvested.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: Url,
    pub search_path: String,
    /// Only links whose path starts with this prefix are admitted.
    pub content_prefix: String,
}

impl SiteConfig {
    pub fn new(base_url: &str, search_path: impl Into<String>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
        if base_url.host_str().is_none() {
            return Err(AppError::ConfigError(format!(
                "Base URL '{base_url}' has no host"
            )));
        }
        Ok(Self {
            base_url,
            search_path: search_path.into(),
            content_prefix: DEFAULT_CONTENT_PREFIX.to_string(),
        })
    }

    /// Absolute URL of the search entry point.
    pub fn search_url(&self) -> Result<Url, AppError> {
        self.base_url.join(&self.search_path).map_err(|e| {
            AppError::ConfigError(format!("Invalid search path '{}': {e}", self.search_path))
        })
    }

    /// The configured host and its `www.` variant.
    pub fn allowed_hosts(&self) -> Vec<String> {
        let host = self.base_url.host_str().unwrap_or_default();
        let bare = host.strip_prefix("www.").unwrap_or(host);
        vec![bare.to_string(), format!("www.{bare}")]
    }
}

/// On-disk locations of durable state and output.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub state_dir: PathBuf,
    pub output_file: PathBuf,
    pub jsonl_file: Option<PathBuf>,
}

impl StoragePaths {
    pub fn new(state_dir: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            output_file: output_file.into(),
            jsonl_file: None,
        }
    }

    pub fn with_jsonl_file(mut self, path: Option<PathBuf>) -> Self {
        self.jsonl_file = path;
        self
    }

    pub fn queue_db(&self) -> PathBuf {
        self.state_dir.join("workqueue.db")
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.state_dir.join("collector_state.json")
    }

    pub fn data_dir(&self) -> &Path {
        self.output_file.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new("state", "data/output/recipes.tsv")
    }
}

/// Link discovery strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Try the browser, fall back to HTTP if the browser is unusable.
    #[default]
    Auto,
    Browser,
    Http,
}

impl DiscoveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Auto => "auto",
            DiscoveryMode::Browser => "browser",
            DiscoveryMode::Http => "http",
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DiscoveryMode::Auto),
            "browser" => Ok(DiscoveryMode::Browser),
            "http" => Ok(DiscoveryMode::Http),
            _ => Err(format!("Unknown discovery mode: {s} (expected auto, browser or http)")),
        }
    }
}

/// Settings for the link discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    /// Pause before each "load more" click.
    pub click_delay: Duration,
    /// Pause after each click to let the DOM settle.
    pub settle_pause: Duration,
    /// Maximum number of new clicks (browser) or pages (HTTP) per run.
    pub click_limit: Option<u32>,
    pub results_wait_timeout: Duration,
    pub results_poll_interval: Duration,
    /// Log a milestone every N newly discovered links. `None` disables it.
    pub progress_interval: Option<u64>,
    pub checkpoint_path: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Auto,
            click_delay: Duration::from_millis(300),
            settle_pause: Duration::from_millis(100),
            click_limit: None,
            results_wait_timeout: Duration::from_secs(8),
            results_poll_interval: Duration::from_millis(250),
            progress_interval: Some(200),
            checkpoint_path: StoragePaths::default().checkpoint_file(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_mode(mut self, mode: DiscoveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_click_limit(mut self, limit: Option<u32>) -> Self {
        self.click_limit = limit;
        self
    }

    pub fn with_delays(mut self, click_delay: Duration, settle_pause: Duration) -> Self {
        self.click_delay = click_delay;
        self.settle_pause = settle_pause;
        self
    }

    pub fn with_results_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.results_wait_timeout = timeout;
        self.results_poll_interval = poll_interval;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = (interval > 0).then_some(interval);
        self
    }

    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = path.into();
        self
    }
}

/// In-fetch retry schedule: `initial_delay`, doubling, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed attempt `attempt` (1-indexed).
    ///
    /// - Attempt 1: `initial_delay`
    /// - Attempt n: `initial_delay * 2^(n-1)`, capped by `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.initial_delay.saturating_mul(1u32 << exponent);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Configuration for the fetch worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub batch_size: usize,
    pub concurrency: usize,
    /// Queue-level failure budget, and the in-fetch attempt budget.
    pub max_failures: u32,
    pub lease_duration: Duration,
    /// Sleep between polls when nothing is leasable.
    pub idle_interval: Duration,
    /// Emit a milestone every N successes.
    pub progress_interval: u64,
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            batch_size: 200,
            concurrency: 16,
            max_failures: 5,
            lease_duration: Duration::from_secs(900),
            idle_interval: Duration::from_secs(2),
            progress_interval: 200,
            retry: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_batch(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets both retry budgets: queue-level failures and in-fetch attempts.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self.retry.max_attempts = self.max_failures;
        self
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Everything a run needs, constructed once by the entry point.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub site: SiteConfig,
    pub paths: StoragePaths,
    pub discovery: DiscoveryConfig,
    pub worker: WorkerConfig,
    pub flush_threshold: usize,
}

impl AppContext {
    pub fn new(site: SiteConfig, paths: StoragePaths) -> Self {
        let discovery = DiscoveryConfig::default().with_checkpoint_path(paths.checkpoint_file());
        Self {
            site,
            paths,
            discovery,
            worker: WorkerConfig::default(),
            flush_threshold: 500,
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery.with_checkpoint_path(self.paths.checkpoint_file());
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    /// Create the state and output directories.
    pub async fn ensure_dirs(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.paths.state_dir).await?;
        tokio::fs::create_dir_all(self.paths.data_dir()).await?;
        Ok(())
    }
}
