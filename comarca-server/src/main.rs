use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use comarca_core::{
    CronScheduler, LogAggregator, MemoryJobStore, Orchestrator,
    TribunalRegistry, store::JobStore,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comarca_server::{
    config::Config, routes::create_router, sim::simulated_registry,
    state::AppState,
};

const SCHEDULER_TICK: Duration = Duration::from_secs(10);

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "comarca-server")]
#[command(about = "Scrape orchestration server for Brazilian judicial e-filing platforms")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "COMARCA_CONFIG", default_value = "comarca.toml")]
    config: PathBuf,

    /// Server port (overrides config)
    #[arg(short, long, env = "COMARCA_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "COMARCA_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| "comarca_server=info,comarca_core=info,tower_http=warn".into(),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    let config = Arc::new(config);

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::default());
    let aggregator = Arc::new(LogAggregator::new(
        config.logs.buffer_capacity,
        Duration::from_secs(config.logs.retention_grace_secs),
    ));
    let registry = Arc::new(TribunalRegistry::builtin());

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        registry,
        simulated_registry(),
        aggregator,
        config.orchestrator.to_core(),
    ));
    orchestrator
        .start()
        .await
        .context("starting orchestrator")?;

    let scheduler = if config.schedules.is_empty() {
        None
    } else {
        let definitions = config
            .schedules
            .iter()
            .map(|s| s.to_recurring())
            .collect();
        let scheduler = Arc::new(
            CronScheduler::new(
                Arc::clone(&orchestrator),
                definitions,
                SCHEDULER_TICK,
            )
            .context("building cron scheduler")?,
        );
        scheduler.start();
        Some(scheduler)
    };

    let state = AppState::new(
        Arc::clone(&orchestrator),
        scheduler.clone(),
        Arc::clone(&config),
    );
    let router = create_router(state);

    let addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("parsing listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "comarca server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    // Scheduler first so no new jobs arrive while executions drain.
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    orchestrator.stop().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => warn!("failed to listen for shutdown signal: {err}"),
    }
}
