//! # ETL Orchestrator
//!
//! Runs the scan loop against the PostgreSQL catalog until interrupted.
//! With `--once` it performs a single scan, waits for the launched workflows
//! and exits.

use anyhow::Context;
use clap::Parser;
use etl_orchestrator::catalog::{PgCatalogStore, SqlCatalog};
use etl_orchestrator::config::ConfigManager;
use etl_orchestrator::execution::DryRunDataMover;
use etl_orchestrator::logging::init_structured_logging;
use etl_orchestrator::orchestration::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "etl-orchestrator")]
#[command(about = "Schedule and run catalog ETL workflows")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long, env = "ETL_ORCHESTRATOR_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to load (development, test, production, ...)
    #[arg(short, long, env = "ETL_ORCHESTRATOR_ENV", default_value = "development")]
    environment: String,

    /// Scan once, wait for the started workflows, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir, &cli.environment)
        .context("loading configuration")?;
    let config = manager.config();
    init_structured_logging(&config.logging);

    let store = PgCatalogStore::connect(&config.database)
        .await
        .context("connecting to the catalog database")?;
    if !store.health_check().await.unwrap_or(false) {
        anyhow::bail!("catalog database failed its health check");
    }

    let catalog = Arc::new(SqlCatalog::new(store.clone()));
    let orchestrator = Arc::new(Orchestrator::from_config(
        config,
        catalog,
        Arc::new(DryRunDataMover::default()),
    ));

    info!(
        environment = %manager.environment(),
        max_threads = config.scheduler.max_threads,
        "🚀 ETL orchestrator starting"
    );

    if cli.once {
        let summary = orchestrator.scan_once().await?;
        info!(?summary, "🔍 Single scan completed");
        for workflow_id in orchestrator.running_workflows() {
            if let Some(outcome) = orchestrator.wait_for_workflow(workflow_id).await {
                info!(workflow_id, outcome = %outcome, "workflow run ended");
            }
        }
    } else {
        let runner = orchestrator.clone();
        let scan_loop = tokio::spawn(async move { runner.run().await });

        tokio::signal::ctrl_c()
            .await
            .context("listening for shutdown signal")?;
        info!("🛑 Shutdown requested");
        orchestrator.shutdown().await;

        match scan_loop.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "scan loop ended with an error"),
            Err(e) => error!(error = %e, "scan loop panicked"),
        }
    }

    store.close().await;
    Ok(())
}
