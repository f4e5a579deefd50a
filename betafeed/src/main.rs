/*
betafeed - single-binary main.rs
This binary starts the keepalive HTTP server and runs the feed worker inside the same process.
*/

use anyhow::{Context, Result};
use clap::Parser;
use common::{ensure_schema, init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use betafeed::caption::CaptionFormatter;
use betafeed::ingestion::HttpFeedSource;
use betafeed::llm::remote::{RemoteSummarizer, DEFAULT_SUMMARIZER_URL};
use betafeed::llm::{SummaryOptions, SummaryProvider};
use betafeed::media::{ImageFetcher, DEFAULT_FALLBACK_IMAGE};
use betafeed::processing::{Pipeline, PipelineSettings, RateLimit};
use betafeed::publisher::{TelegramPublisher, DEFAULT_API_BASE};
use betafeed::scraping::{ContentExtractor, ImagePolicy, BROWSER_USER_AGENT};
use betafeed::server::launch_keepalive;
use betafeed::storage::SqliteStore;
use betafeed::worker::Worker;

const DEFAULT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(name = "betafeed", about = "Betafeed news bot: feed worker + keepalive server")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Do not bind the keepalive HTTP server
    #[arg(long)]
    no_server: bool,

    /// Run a single pipeline tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    // The bot token is the one credential we cannot run without
    let token_env = config.telegram.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
    let token = std::env::var(token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .with_context(|| format!("bot token env var '{}' is not set", token_env))?;

    let db_pool = init_db_pool(&config.database.path).await?;
    ensure_schema(&db_pool).await?;
    info!(db_path = %config.database.path, "database ready");
    let store = SqliteStore::new(db_pool);

    let publisher = Arc::new(TelegramPublisher::new(
        config.telegram.api_base.as_deref().unwrap_or(DEFAULT_API_BASE),
        token,
        config.telegram.timeout_seconds.unwrap_or(30),
    )?);

    let worker = build_worker(&config, store.clone(), publisher)?;

    if args.once {
        let report = worker.run_once().await;
        info!(
            "single run finished: {} published, {} skipped, {} failed",
            report.published(),
            report.skipped(),
            report.failed()
        );
        return Ok(());
    }

    let shutdown_notify = Arc::new(Notify::new());
    let worker = Arc::new(worker);
    let worker_handle = {
        let worker = worker.clone();
        let shutdown = shutdown_notify.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    let server = config.server();
    if args.no_server || server.enabled == Some(false) {
        info!("Keepalive server disabled");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(%e, "failed to listen for ctrl-c");
        }
        info!("ctrl-c received, notifying worker to shutdown");
    } else if let Err(e) = launch_keepalive(store, server.port.unwrap_or(DEFAULT_PORT)).await {
        // Rocket handles ctrl-c itself and returns once it has shut down
        error!(%e, "keepalive server failed");
    }

    // Stores a permit if the worker is mid-tick, so it stops right after
    shutdown_notify.notify_one();
    match tokio::time::timeout(Duration::from_secs(20), worker_handle).await {
        Ok(Ok(())) => info!("worker exited cleanly"),
        Ok(Err(join_err)) => error!(%join_err, "worker task panicked"),
        Err(_) => warn!("Timed out waiting for worker to exit; continuing shutdown"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wire the pipeline and its collaborators from configuration.
fn build_worker(config: &Config, store: SqliteStore, publisher: Arc<TelegramPublisher>) -> Result<Worker> {
    let feed = &config.feed;
    let scraping = config.scraping();
    let summarizer_cfg = config.summarizer();
    let user_agent = scraping.user_agent.as_deref().unwrap_or(BROWSER_USER_AGENT);

    let source = HttpFeedSource::new(
        feed.url.clone(),
        feed.max_entries.unwrap_or(5),
        feed.fetch_timeout_seconds.unwrap_or(15),
        user_agent,
    )?;

    let defaults = ImagePolicy::default();
    let extractor = ContentExtractor::new(
        scraping.timeout_seconds.unwrap_or(30),
        user_agent,
        ImagePolicy {
            host: scraping.image_host.clone().unwrap_or(defaults.host),
            path_marker: scraping.image_path_marker.clone().unwrap_or(defaults.path_marker),
        },
    )?;

    let images = ImageFetcher::new(
        scraping.image_timeout_seconds.unwrap_or(20),
        user_agent,
        scraping
            .fallback_image_url
            .clone()
            .unwrap_or_else(|| DEFAULT_FALLBACK_IMAGE.to_string()),
        scraping.image_referer.clone(),
    )?;

    let summarizer: Option<Arc<dyn SummaryProvider>> = if summarizer_cfg.enabled.unwrap_or(true) {
        let api_token = summarizer_cfg
            .api_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        if api_token.is_none() {
            info!("Summarizer API token not set; calling the endpoint anonymously");
        }
        let provider = RemoteSummarizer::new(
            summarizer_cfg.api_url.as_deref().unwrap_or(DEFAULT_SUMMARIZER_URL),
            api_token,
        )
        .with_timeout(summarizer_cfg.timeout_seconds.unwrap_or(120));
        Some(Arc::new(provider))
    } else {
        info!("Remote summarizer disabled; using extractive summaries only");
        None
    };

    let defaults = SummaryOptions::default();
    let mut settings = PipelineSettings::new(config.telegram.channel_id.clone());
    settings.summary = SummaryOptions {
        input_chars: summarizer_cfg.input_chars.unwrap_or(defaults.input_chars),
        min_length: summarizer_cfg.min_length.unwrap_or(defaults.min_length),
        max_length: summarizer_cfg.max_length.unwrap_or(defaults.max_length),
    };
    settings.rate_limit = RateLimit {
        entry_delay: Duration::from_secs(feed.entry_delay_seconds.unwrap_or(2)),
    };

    let channel = config
        .telegram
        .channel_username
        .clone()
        .unwrap_or_else(|| config.telegram.channel_id.clone());

    let store = Arc::new(store);
    let pipeline = Pipeline::new(
        Arc::new(source),
        extractor,
        summarizer,
        images,
        CaptionFormatter::new(channel),
        store.clone(),
        settings,
    );

    Ok(Worker::new(
        pipeline,
        publisher,
        store,
        Duration::from_secs(feed.initial_delay_seconds.unwrap_or(10)),
        Duration::from_secs(feed.poll_interval_seconds.unwrap_or(300)),
    ))
}
