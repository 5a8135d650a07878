use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::AppError;
use crate::models::RecipeRecord;
use crate::retry::RetryingFetcher;
use crate::traits::{Extractor, Fetcher, RecordSink};
use crate::work_queue::WorkQueue;

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    /// Nothing was leasable; the worker sleeps before polling again.
    Idle,
    BatchLeased {
        count: usize,
    },
    UrlCompleted {
        url: &'a str,
    },
    UrlFailed {
        url: &'a str,
        error: &'a str,
    },
    Milestone {
        processed: u64,
    },
    Stopped {
        worker_id: &'a str,
        succeeded: u64,
        failed: u64,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Idle => {
                tracing::debug!("No leasable URLs, waiting");
            }
            WorkerEvent::BatchLeased { count } => {
                tracing::info!(count, "Leased batch");
            }
            WorkerEvent::UrlCompleted { url } => {
                tracing::debug!(%url, "Recipe stored");
            }
            WorkerEvent::UrlFailed { url, error } => {
                tracing::warn!(%url, %error, "Recipe fetch failed");
            }
            WorkerEvent::Milestone { processed } => {
                tracing::info!(processed, "Processed recipes milestone");
            }
            WorkerEvent::Stopped {
                worker_id,
                succeeded,
                failed,
            } => {
                tracing::info!(%worker_id, succeeded, failed, "Worker stopped");
            }
        }
    }
}

/// Totals for one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub succeeded: u64,
    pub failed: u64,
}

/// Worker that leases URLs in batches, fetches and extracts them
/// concurrently, and hands the records to a sink.
///
/// A batch is fully settled before the next lease. Per-URL failures are
/// recorded in the queue; queue and sink errors stop the worker.
pub struct WorkerService<Q, F, E, S>
where
    Q: WorkQueue,
    F: Fetcher,
    E: Extractor,
    S: RecordSink,
{
    queue: Q,
    fetcher: RetryingFetcher<F>,
    extractor: E,
    sink: S,
    config: WorkerConfig,
    limiter: Semaphore,
    succeeded: Mutex<u64>,
}

impl<Q, F, E, S> WorkerService<Q, F, E, S>
where
    Q: WorkQueue,
    F: Fetcher,
    E: Extractor,
    S: RecordSink,
{
    pub fn new(queue: Q, fetcher: F, extractor: E, sink: S, config: WorkerConfig) -> Self {
        let fetcher = RetryingFetcher::new(fetcher, config.retry.clone());
        let limiter = Semaphore::new(config.concurrency.max(1));
        Self {
            queue,
            fetcher,
            extractor,
            sink,
            config,
            limiter,
            succeeded: Mutex::new(0),
        }
    }

    /// Run the worker loop until cancellation or a fatal error. The sink is
    /// finalized on the way out in both cases.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<WorkerSummary, AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        let mut summary = WorkerSummary::default();
        let result = self.run_batches(&cancel_token, reporter, &mut summary).await;

        let finalized = self.sink.finalize().await;
        if let Err(e) = &finalized {
            tracing::error!(error = %e, "Failed to flush remaining records");
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });

        result?;
        finalized?;
        Ok(summary)
    }

    async fn run_batches<WR: WorkerReporter>(
        &self,
        cancel_token: &CancellationToken,
        reporter: &WR,
        summary: &mut WorkerSummary,
    ) -> Result<(), AppError> {
        loop {
            if cancel_token.is_cancelled() {
                return Ok(());
            }

            let urls = self
                .queue
                .lease(self.config.batch_size, self.config.lease_duration)
                .await?;

            if urls.is_empty() {
                reporter.report(WorkerEvent::Idle);
                tokio::select! {
                    () = tokio::time::sleep(self.config.idle_interval) => {}
                    () = cancel_token.cancelled() => return Ok(()),
                }
                continue;
            }

            reporter.report(WorkerEvent::BatchLeased { count: urls.len() });

            let outcomes = join_all(urls.iter().map(|url| self.process_url(url, reporter))).await;
            for outcome in outcomes {
                if outcome? {
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }
    }

    /// `Ok(true)` when the record was stored, `Ok(false)` when the failure
    /// was recorded against the URL.
    async fn process_url<WR: WorkerReporter>(
        &self,
        url: &str,
        reporter: &WR,
    ) -> Result<bool, AppError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| AppError::Generic(format!("Concurrency limiter closed: {e}")))?;

        match self.harvest(url).await {
            Ok(record) => {
                self.sink.append(record).await?;
                self.queue.ack_success(url).await?;
                reporter.report(WorkerEvent::UrlCompleted { url });
                self.record_success(reporter).await;
                Ok(true)
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(WorkerEvent::UrlFailed { url, error: &error });
                self.queue
                    .ack_fail(url, &error, self.config.max_failures)
                    .await?;
                Ok(false)
            }
        }
    }

    async fn harvest(&self, url: &str) -> Result<RecipeRecord, AppError> {
        let html = self.fetcher.fetch(url).await?;
        self.extractor
            .extract(&html, url)
            .ok_or_else(|| AppError::ExtractionRejected(format!("No recipe found at {url}")))
    }

    async fn record_success<WR: WorkerReporter>(&self, reporter: &WR) {
        let mut succeeded = self.succeeded.lock().await;
        *succeeded += 1;
        if *succeeded % self.config.progress_interval.max(1) == 0 {
            reporter.report(WorkerEvent::Milestone {
                processed: *succeeded,
            });
        }
    }
}
