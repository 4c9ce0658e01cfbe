mod api_util;
mod state_actor;

use anyhow::Context;
use api_util::{CronError, CronReport, StatusError};
use audioflux_status::config::{
    DEFAULT_API_URL, DEFAULT_LANDING_URL, DEFAULT_TELEGRAM_API_URL,
};
use audioflux_status::{ProbeConfig, StatusAggregator, StatusSnapshot, StatusStore};
use axum::{extract::State, routing::get, Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use state_actor::StateActorHandle;
use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn StatusStore>,
    aggregator: StatusAggregator,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let cli = Cli::parse();
    let config = cli.probe_config();
    if config.bot_token().is_none() {
        info!("No Telegram bot token configured, the bot check will report degraded");
    }

    let state = AppState {
        store: Arc::new(StateActorHandle::new()),
        aggregator: StatusAggregator::from_config(&config)
            .context("Couldn't build HTTP client")?,
    };

    if let Some(secs) = cli.refresh_interval_secs {
        info!("Refreshing status every {secs}s");
        spawn_refresher(state.clone(), Duration::from_secs(secs));
    }

    info!("Binding to {}", cli.address);
    let listener = tokio::net::TcpListener::bind(&cli.address)
        .await
        .with_context(|| format!("Couldn't create TCP listener on {}", cli.address))?;
    info!("Starting API server");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Couldn't start API server")?;

    Ok(())
}

/// `RUST_LOG`, falling back to `info` when it is unset or empty.
fn env_filter() -> EnvFilter {
    env_filter_from(std::env::var("RUST_LOG").ok().as_deref())
}

fn env_filter_from(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/cron/health-check", get(run_health_check))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the cached snapshot, computing one first if nothing is cached yet.
async fn get_status(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, StatusError> {
    if let Some(snapshot) = state.store.get().await? {
        return Ok(Json(snapshot));
    }
    info!("Status cache is empty, checking services now");
    let snapshot = state.aggregator.refresh(state.store.as_ref()).await?;
    Ok(Json(snapshot))
}

/// Called by an external scheduler. Always re-checks, ignoring the cache.
async fn run_health_check(State(state): State<AppState>) -> Result<Json<CronReport>, CronError> {
    let snapshot = state.aggregator.refresh(state.store.as_ref()).await?;
    Ok(Json(CronReport::new(snapshot)))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn spawn_refresher(state: AppState, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = state.aggregator.refresh(state.store.as_ref()).await {
                error!(error = %e, "Periodic health check failed");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Couldn't listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Listening address for the status API
    #[arg(short, long, env = "STATUS_ADDRESS", default_value = "0.0.0.0:8080")]
    address: String,

    /// Landing page checked with a HEAD request
    #[arg(long, env = "LANDING_URL", default_value = DEFAULT_LANDING_URL)]
    landing_url: String,

    /// Base URL of the music API
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Telegram bot token. The bot check reports degraded without it
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,

    /// Base URL of the Telegram Bot API
    #[arg(long, env = "TELEGRAM_API_URL", default_value = DEFAULT_TELEGRAM_API_URL)]
    telegram_api_url: String,

    /// Per-probe timeout in milliseconds
    #[arg(
        long,
        env = "PROBE_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    probe_timeout_ms: u64,

    /// Re-check all services on this period, in seconds, without waiting
    /// for the cron endpoint
    #[arg(
        long,
        env = "REFRESH_INTERVAL_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    refresh_interval_secs: Option<u64>,
}

impl Cli {
    fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            landing_url: self.landing_url.clone(),
            api_url: self.api_url.clone(),
            bot_token: self.telegram_bot_token.clone(),
            telegram_api_url: self.telegram_api_url.clone(),
            timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }
}
