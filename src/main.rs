//! campaign-sync - A resilient synchronization engine for a paginated campaign API
//!
//! This is the bootstrap entry point: it loads configuration, installs
//! logging, wires the sync components together, and runs one sync.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use campaign_sync::auth::TokenProvider;
use campaign_sync::config::Config;
use campaign_sync::database::SqliteRepository;
use campaign_sync::otel::{init_tracing, OtelProvider, SyncMetrics};
use campaign_sync::sync::{
    build_http_client, CampaignApiClient, ResilientTransport, SyncOrchestrator,
};

const EXIT_HEALTHY: u8 = 0;
const EXIT_DEGRADED: u8 = 1;
const EXIT_FATAL: u8 = 2;

/// campaign-sync - Mirror remote campaigns into a local database
#[derive(Parser, Debug)]
#[command(name = "campaign-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CAMPAIGN_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Continue with the records fetched so far when pagination fails
    #[arg(long)]
    allow_partial: bool,

    /// Override the number of concurrent per-record operations
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "campaign-sync failed to start");
            eprintln!("campaign-sync: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = load_config(&args)?;
    if args.allow_partial {
        config.sync.allow_partial = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.sync.concurrency = concurrency;
    }
    config.validate().context("Invalid configuration")?;

    // Initialize OpenTelemetry provider
    let otel_provider = OtelProvider::new(&config.otel)?;

    // Initialize tracing/logging
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.api.base_url,
        concurrency = config.sync.concurrency,
        allow_partial = config.sync.allow_partial,
        "Starting campaign-sync"
    );

    // Initialize database
    let repository = Arc::new(SqliteRepository::open(&config.database)?);
    info!(
        path = %config.database.path,
        pool_size = config.database.pool_size,
        "Database initialized"
    );

    let metrics = Arc::new(SyncMetrics::new(&otel_provider.meter()));
    let client = build_http_client(&config.timeouts)?;

    // Credential exchange goes over its own transport without a bearer token
    let auth_transport =
        ResilientTransport::from_config(client.clone(), &config).with_metrics(Arc::clone(&metrics));
    let tokens = Arc::new(TokenProvider::new(auth_transport, &config));

    let transport = ResilientTransport::from_config(client, &config)
        .with_token_provider(Arc::clone(&tokens))
        .with_metrics(Arc::clone(&metrics));
    let source = Arc::new(CampaignApiClient::new(transport, &config)?);

    let orchestrator = SyncOrchestrator::new(tokens, source, Arc::clone(&repository) as _, &config)
        .with_metrics(metrics);

    let cancel = orchestrator.cancellation_token();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    let code = match orchestrator.run().await {
        Ok(summary) => {
            println!("{}", summary);
            if summary.is_healthy() {
                EXIT_HEALTHY
            } else {
                EXIT_DEGRADED
            }
        }
        Err(e) => {
            error!(error = %e, "Sync run aborted");
            eprintln!("Sync failed: {}", e);
            EXIT_FATAL
        }
    };
    signal_task.abort();

    drop(orchestrator);
    let pool = repository.pool_state();
    drop(repository);
    info!(connections = pool.connections, "Database pool released");

    // Shutdown OpenTelemetry
    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!(exit_code = code, "campaign-sync finished");
    Ok(ExitCode::from(code))
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path.display());
            Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().context("Failed to load config from environment")
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling sync");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling sync");
        }
    }
}
