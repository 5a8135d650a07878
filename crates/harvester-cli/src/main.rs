use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use harvester_client::{RecipeParser, ReqwestFetcher};
use harvester_core::config::{DEFAULT_BASE_URL, DEFAULT_SEARCH_PATH};
use harvester_core::{
    AppContext, DiscoveryConfig, DiscoveryEngine, DiscoveryMode, SiteConfig, StoragePaths,
    TracingWorkerReporter, WorkQueue, WorkerConfig, WorkerService,
};
use harvester_db::{Database, QueueDbConfig, ResultWriter, SqliteWorkQueue};

const DEFAULT_OUTPUT_FILE: &str = "data/output/recipes.tsv";

#[derive(Parser)]
#[command(name = "harvester", version, about = "Resumable recipe site harvester")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Site root
    #[arg(long, global = true, env = "HARVESTER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Search entry point, relative to the site root
    #[arg(long, global = true, env = "HARVESTER_SEARCH_PATH", default_value = DEFAULT_SEARCH_PATH)]
    search_path: String,

    /// Directory for the work queue database and the discovery checkpoint
    #[arg(long, global = true, env = "HARVESTER_STATE_DIR", default_value = "state")]
    state_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover recipe links and admit them into the work queue
    CollectLinks {
        /// Discovery strategy: auto, browser or http
        #[arg(long, default_value = "auto")]
        mode: DiscoveryMode,

        /// Stop after this many "load more" clicks (browser) or extra pages (http)
        #[arg(long)]
        max_clicks: Option<u32>,

        /// Show the browser window
        #[arg(long, default_value_t = false)]
        headed: bool,

        /// Pause before every browser interaction, in milliseconds
        #[arg(long, default_value_t = 0)]
        slow_mo: u64,

        /// Seconds to wait before each "load more" click
        #[arg(long, env = "HARVESTER_CLICK_DELAY", default_value_t = 0.3)]
        click_delay: f64,

        /// Seconds to let the page settle after a click
        #[arg(
            long,
            visible_alias = "scroll-pause",
            env = "HARVESTER_SETTLE_PAUSE",
            default_value_t = 0.1
        )]
        settle_pause: f64,

        /// Per-request timeout for HTTP discovery, in seconds
        #[arg(long, env = "HARVESTER_COLLECTOR_HTTP_TIMEOUT", default_value_t = 30.0)]
        http_timeout: f64,

        /// Seconds to wait for new results after a click
        #[arg(long, env = "HARVESTER_RESULTS_WAIT_TIMEOUT", default_value_t = 8.0)]
        results_wait_timeout: f64,

        /// Log a milestone every N discovered links (0 disables)
        #[arg(long, env = "HARVESTER_PROGRESS_INTERVAL", default_value_t = 200)]
        progress_interval: u64,
    },

    /// Fetch queued recipe pages and append parsed records to the output
    FetchRecipes {
        /// TSV output file
        #[arg(long, env = "HARVESTER_OUTPUT_FILE", default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,

        /// Optional JSONL mirror of the output
        #[arg(long, env = "HARVESTER_JSONL_FILE")]
        jsonl: Option<PathBuf>,

        /// URLs leased per batch
        #[arg(long, env = "HARVESTER_BATCH_SIZE", default_value_t = 200)]
        batch_size: usize,

        /// Simultaneous in-flight fetches
        #[arg(long, env = "HARVESTER_HTTP_CONCURRENCY", default_value_t = 16)]
        concurrency: usize,

        /// Per-request timeout in seconds
        #[arg(long, env = "HARVESTER_HTTP_TIMEOUT", default_value_t = 25.0)]
        timeout: f64,

        /// Records buffered before a flush
        #[arg(long, env = "HARVESTER_FLUSH_SIZE", default_value_t = 500)]
        flush_size: usize,

        /// Log a milestone every N processed recipes
        #[arg(long, env = "HARVESTER_PROGRESS_INTERVAL", default_value_t = 200)]
        progress_interval: u64,

        /// Failed attempts before a URL is abandoned
        #[arg(long, env = "HARVESTER_MAX_FAILURES", default_value_t = 5)]
        max_failures: u32,

        /// Seconds before an unacknowledged lease can be handed out again
        #[arg(long, env = "HARVESTER_LEASE_SECONDS", default_value_t = 900)]
        lease_seconds: u64,
    },

    /// Print work queue counts by status
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("harvester=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let site = SiteConfig::new(&cli.global.base_url, cli.global.search_path.clone())
        .context("Invalid site configuration")?;

    match cli.command {
        Commands::CollectLinks {
            mode,
            max_clicks,
            headed,
            slow_mo,
            click_delay,
            settle_pause,
            http_timeout,
            results_wait_timeout,
            progress_interval,
        } => {
            let paths = StoragePaths::new(&cli.global.state_dir, DEFAULT_OUTPUT_FILE);
            let discovery = DiscoveryConfig::default()
                .with_mode(mode)
                .with_click_limit(max_clicks)
                .with_delays(
                    seconds(click_delay, "click delay")?,
                    seconds(settle_pause, "settle pause")?,
                )
                .with_results_wait(
                    seconds(results_wait_timeout, "results wait timeout")?,
                    Duration::from_millis(250),
                )
                .with_progress_interval(progress_interval);
            let ctx = AppContext::new(site, paths).with_discovery(discovery);
            let queue = open_queue(&ctx).await?;
            let browser = BrowserOptions {
                headed,
                slow_mo: Duration::from_millis(slow_mo),
            };
            let http_timeout = seconds(http_timeout, "discovery HTTP timeout")?;
            cmd_collect_links(&ctx, queue, browser, http_timeout).await?;
        }
        Commands::FetchRecipes {
            output,
            jsonl,
            batch_size,
            concurrency,
            timeout,
            flush_size,
            progress_interval,
            max_failures,
            lease_seconds,
        } => {
            let paths =
                StoragePaths::new(&cli.global.state_dir, output).with_jsonl_file(jsonl);
            let worker = WorkerConfig::default()
                .with_batch(batch_size, concurrency)
                .with_max_failures(max_failures)
                .with_lease_duration(Duration::from_secs(lease_seconds))
                .with_progress_interval(progress_interval);
            let ctx = AppContext::new(site, paths)
                .with_worker(worker)
                .with_flush_threshold(flush_size);
            ctx.ensure_dirs()
                .await
                .context("Failed to create state and output directories")?;
            let queue = open_queue(&ctx).await?;
            let timeout = seconds(timeout, "HTTP timeout")?;
            cmd_fetch_recipes(&ctx, queue, timeout).await?;
        }
        Commands::Stats => {
            let paths = StoragePaths::new(&cli.global.state_dir, DEFAULT_OUTPUT_FILE);
            let ctx = AppContext::new(site, paths);
            let queue = open_queue(&ctx).await?;
            cmd_stats(&queue).await?;
        }
    }

    Ok(())
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {what}: {value}"))
}

/// Open (and migrate) the queue database under the state directory. Only
/// the state directory is created.
async fn open_queue(ctx: &AppContext) -> Result<SqliteWorkQueue> {
    let config = QueueDbConfig::from_env(ctx.paths.queue_db());
    let db = Database::connect(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.path.display()))?;
    db.migrate().await.context("Failed to migrate work queue")?;

    Ok(db.queue())
}

struct BrowserOptions {
    headed: bool,
    slow_mo: Duration,
}

#[cfg(feature = "browser")]
fn launcher(options: &BrowserOptions) -> harvester_client::ChromiumLauncher {
    harvester_client::ChromiumLauncher::new()
        .with_headless(!options.headed)
        .with_slow_mo(options.slow_mo)
}

#[cfg(not(feature = "browser"))]
fn launcher(options: &BrowserOptions) -> harvester_core::NoBrowser {
    if options.headed || !options.slow_mo.is_zero() {
        tracing::warn!("Built without the `browser` feature; --headed and --slow-mo are ignored");
    }
    harvester_core::NoBrowser
}

async fn cmd_collect_links(
    ctx: &AppContext,
    queue: SqliteWorkQueue,
    browser: BrowserOptions,
    http_timeout: Duration,
) -> Result<()> {
    let fetcher =
        ReqwestFetcher::with_timeout(http_timeout).context("Failed to create HTTP client")?;
    let engine = DiscoveryEngine::new(
        queue.clone(),
        fetcher,
        launcher(&browser),
        ctx.site.clone(),
        ctx.discovery.clone(),
    );

    tracing::info!(mode = %ctx.discovery.mode, "Collecting links");
    let summary = engine.run().await.context("Link discovery failed")?;

    tracing::info!(
        strategy = %summary.strategy,
        admitted = summary.admitted,
        replayed = summary.replayed,
        pages = summary.pages,
        fell_back = summary.fell_back,
        "Link discovery finished"
    );

    let stats = queue.stats().await.map_err(|e| anyhow::anyhow!(e))?;
    println!("Admitted {} new links ({stats})", summary.admitted);
    Ok(())
}

async fn cmd_fetch_recipes(
    ctx: &AppContext,
    queue: SqliteWorkQueue,
    timeout: Duration,
) -> Result<()> {
    let fetcher = ReqwestFetcher::with_timeout(timeout).context("Failed to create HTTP client")?;
    let writer = ResultWriter::new(&ctx.paths.output_file, ctx.flush_threshold)
        .with_jsonl(ctx.paths.jsonl_file.clone());
    tracing::info!(
        worker_id = %ctx.worker.worker_id,
        output = %writer.output_path().display(),
        "Fetching recipes"
    );
    let worker = WorkerService::new(
        queue,
        fetcher,
        RecipeParser::new(),
        writer,
        ctx.worker.clone(),
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received; finishing current batch");
            signal_token.cancel();
        }
    });

    let summary = worker
        .run(cancel, &TracingWorkerReporter)
        .await
        .context("Fetch worker stopped with an error")?;

    println!(
        "Stored {} recipes, {} failed attempts",
        summary.succeeded, summary.failed
    );
    Ok(())
}

async fn cmd_stats(queue: &SqliteWorkQueue) -> Result<()> {
    let stats = queue.stats().await.map_err(|e| anyhow::anyhow!(e))?;

    println!("Work queue:");
    println!("  pending:   {}", stats.pending);
    println!("  leased:    {}", stats.leased);
    println!("  processed: {}", stats.processed);
    println!("  failed:    {}", stats.failed);
    println!("  total:     {}", stats.total());

    Ok(())
}
