pub mod checkpoint;
pub mod config;
pub mod discovery;
pub mod error;
pub mod links;
pub mod models;
pub mod queue;
pub mod retry;
pub mod traits;
pub mod work_queue;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use config::{
    AppContext, DiscoveryConfig, DiscoveryMode, SiteConfig, StoragePaths, WorkerConfig,
};
pub use discovery::{DiscoveryEngine, DiscoverySummary, StrategyError};
pub use error::AppError;
pub use models::{RecipeRecord, TSV_HEADERS, collapse_ws};
pub use queue::{QueueRecord, QueueStats, UrlStatus};
pub use traits::{BrowserPage, Extractor, Fetcher, Locator, NoBrowser, PageLauncher, RecordSink};
pub use work_queue::WorkQueue;
pub use worker::{TracingWorkerReporter, WorkerReporter, WorkerService, WorkerSummary};
