//! ppsr-server: HTTP service for PPSR plate lookups.
//!
//! Configuration is layered: built-in defaults, an optional TOML file, the
//! environment (including a `.env` file), then command-line flags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ppsr_browser::ChromeLauncher;
use ppsr_runner::{HumanDelay, Runner, SiteProfile};
use ppsr_server::{logging, serve, AppState};
use ppsr_types::{ConfigLoader, EffectiveConfig};

#[derive(Debug, Parser)]
#[command(name = "ppsr-server", version, about = "PPSR plate lookup service")]
struct Cli {
    /// TOML config file
    #[arg(long, env = "PPSR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8000
    #[arg(long)]
    listen: Option<String>,

    /// Directory for logs and per-request artifacts
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,

    /// Login page of the register
    #[arg(long)]
    target_url: Option<String>,
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_cli(cli: &Cli, effective: &mut EffectiveConfig) {
    if let Some(listen) = &cli.listen {
        effective.config.listen = listen.clone();
        effective.record_cli("listen", "--listen");
    }
    if let Some(dir) = &cli.log_dir {
        effective.config.log_dir = dir.clone();
        effective.record_cli("log_dir", "--log-dir");
    }
    if cli.headless {
        effective.config.browser.headless = true;
        effective.record_cli("browser.headless", "--headless");
    }
    if cli.headed {
        effective.config.browser.headless = false;
        effective.record_cli("browser.headless", "--headed");
    }
    if let Some(url) = &cli.target_url {
        effective.config.target_url = url.clone();
        effective.record_cli("target_url", "--target-url");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("failed to read .env file"),
    }
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let mut effective = loader.load().context("failed to load configuration")?;
    apply_cli(&cli, &mut effective);

    let config = Arc::new(effective.config.clone());
    let _guard = logging::init(&config.log_dir, config.log_retention_days)?;

    for path in ["listen", "log_dir", "target_url", "browser.headless"] {
        info!(field = path, source = %effective.source_of(path), "config");
    }

    let runner = Runner::new(
        Arc::new(ChromeLauncher),
        Arc::new(HumanDelay),
        SiteProfile::with_target_url(&config.target_url),
    );
    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    let state = Arc::new(AppState::new(Arc::clone(&config), runner));

    serve(listener, state, shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("server stopped");
    Ok(())
}
