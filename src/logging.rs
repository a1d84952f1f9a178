//! # Structured Logging Module
//!
//! Console plus optional JSON-file structured logging for following concurrent
//! hierarchy execution, and small helpers that give every node lifecycle
//! operation the same field layout.

use crate::config::LoggingConfig;
use crate::constants::Level;
use crate::error::RunContext;
use chrono::Utc;
use std::fs;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging from configuration
///
/// Safe to call more than once; only the first call installs layers. An already
/// installed global subscriber is left in place.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_GUARD.get_or_init(|| {
        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(config.ansi)
            .with_filter(build_filter(&config.level));

        let mut guard = None;
        let file_layer = config.directory.as_ref().and_then(|dir| {
            if let Err(e) = fs::create_dir_all(dir) {
                eprintln!("failed to create log directory {}: {e}", dir.display());
                return None;
            }
            let file_name = format!(
                "etl-orchestrator.{}.{}.log",
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&config.level)),
            )
        });

        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = process::id(),
            level = %config.level,
            file_output = config.directory.is_some(),
            "🔧 Structured logging initialized"
        );

        guard
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Log one node lifecycle operation with the standard field layout
pub fn log_node_operation(
    operation: &str,
    level: Level,
    node_id: i64,
    context: &RunContext,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        level = %level,
        node_id = node_id,
        workflow_run_id = context.workflow_run_id,
        package_run_id = context.package_run_id,
        realization_run_id = context.realization_run_id,
        step_run_id = context.step_run_id,
        status = %status,
        details = details,
        "📋 NODE_OPERATION"
    );
}

/// Log an error swallowed on a best-effort path with full context
pub fn log_suppressed_error(component: &str, operation: &str, error: &str, context: &RunContext) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = %context,
        "❌ SUPPRESSED_ERROR"
    );
}
