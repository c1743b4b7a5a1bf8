//! EDR API Server
//!
//! OGC API - Environmental Data Retrieval for gridded wave forecasts.
//!
//! ```text
//! edr-api serve            # HTTP server (default), optional periodic reloads
//! edr-api reload           # fetch the newest forecast once and exit
//! edr-api prune --keep 2   # drop old versions and exit
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::broadcast;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use edr_api::config::ServiceConfig;
use edr_api::scheduler::ReloadScheduler;
use edr_api::state::AppState;

/// EDR API Server
#[derive(Parser, Debug)]
#[command(name = "edr-api")]
#[command(about = "OGC API - Environmental Data Retrieval server for wave forecasts")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "EDR_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long, env = "EDR_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Number of worker threads
    #[arg(long, env = "EDR_WORKER_THREADS")]
    worker_threads: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Run one reload and exit
    Reload,
    /// Prune old versions of the configured dataset and exit
    Prune {
        /// Versions to keep (defaults to ingestion.keep_versions)
        #[arg(long)]
        keep: Option<usize>,
    },
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }
    let runtime = runtime_builder
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Reload => reload_once(config).await,
        Command::Prune { keep } => prune_once(config, keep),
    };
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Exited with error");
    }
    result
}

async fn serve(config: ServiceConfig) -> Result<()> {
    info!("Starting EDR API server");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    let state = Arc::new(AppState::new(&config)?.with_metrics(metrics));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_task = match (config.reload_interval(), state.pipeline.clone()) {
        (Some(interval), Some(pipeline)) => {
            let scheduler = ReloadScheduler::new(pipeline, interval);
            let shutdown = shutdown_tx.subscribe();
            Some(tokio::spawn(async move {
                scheduler.run_forever(shutdown).await
            }))
        }
        _ => None,
    };

    let app = edr_api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("EDR API listening on {}", addr);

    let shutdown_signal = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server failed")?;

    if let Some(task) = scheduler_task {
        let _ = shutdown_tx.send(());
        task.await.ok();
    }
    Ok(())
}

async fn reload_once(config: ServiceConfig) -> Result<()> {
    let state = AppState::new(&config)?;
    let pipeline = state
        .pipeline
        .as_ref()
        .ok_or_else(|| anyhow!("no forecast source configured"))?;
    let outcome = pipeline.reload_latest().await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn prune_once(config: ServiceConfig, keep: Option<usize>) -> Result<()> {
    let state = AppState::new(&config)?;
    let keep = keep.unwrap_or(state.keep_versions);
    let report = state.registry.prune(&state.default_dataset, keep)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
