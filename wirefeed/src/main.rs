/*
wirefeed - single-binary main.rs
This binary starts the Rocket HTTP server and runs the cache warmer inside the same process.
*/

use anyhow::Result;
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use wirefeed::clock::SystemClock;
use wirefeed::fetcher::HttpFetcher;
use wirefeed::server::launch_rocket;
use wirefeed::service::NewsService;
use wirefeed::warmer::run_warmer;
use wirefeed::weather::provider_from_config;

#[derive(Parser, Debug)]
#[command(name = "wirefeed", about = "Wirefeed news aggregation server")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable the background cache warmer even if enabled in config
    #[arg(long)]
    no_warmer: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

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

    let config = match Config::load_with_defaults(Some(default_path.as_path()), override_path.as_deref()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    let config = Arc::new(config);

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let weather = provider_from_config(&config.weather)?;
    info!(provider = %config.weather.provider, "weather provider initialized");

    let service = Arc::new(NewsService::new(
        config.clone(),
        fetcher,
        weather,
        Arc::new(SystemClock),
    ));

    let shutdown_notify = Arc::new(Notify::new());

    let mut warmer_handle = None;
    if config.warmer.enabled && !args.no_warmer {
        info!("Spawning cache warmer task");
        warmer_handle = Some(tokio::spawn(run_warmer(
            service.clone(),
            Duration::from_secs(config.warmer.interval_seconds),
            shutdown_notify.clone(),
        )));
    } else {
        info!("Cache warmer disabled");
    }

    info!("Launching Rocket HTTP server");
    if let Err(e) = launch_rocket(service, &config.server).await {
        error!(%e, "Rocket server failed");
    }

    info!("HTTP server stopped; notifying warmer to shutdown");
    shutdown_notify.notify_waiters();

    if let Some(handle) = warmer_handle {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(Ok(())) => info!("warmer exited cleanly"),
            Ok(Err(join_err)) => error!(%join_err, "warmer task panicked"),
            Err(_) => info!("Timed out waiting for warmer to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
