//! # Orchestrator Configuration
//!
//! Typed configuration for the scheduler, the catalog database, logging and
//! operator notification. Values are loaded through [`ConfigManager`] from
//! layered YAML files plus `ETL_ORCHESTRATOR__SECTION__KEY` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use etl_orchestrator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let poll = manager.config().scheduler.poll_interval();
//! let cap = manager.config().scheduler.max_threads;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Polling, scanning and capacity settings
    pub scheduler: SchedulerConfig,

    /// Catalog database connection
    pub database: DatabaseConfig,

    /// Structured logging output
    pub logging: LoggingConfig,

    /// Operator failure notification
    pub notification: NotificationConfig,
}

/// Scheduler tunables shared by every level
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between re-checks of every poll-based wait
    pub poll_interval_ms: u64,
    /// Interval between catalog scans for due workflows
    pub scan_interval_ms: u64,
    /// Global cap on concurrently executing steps
    pub max_threads: usize,
    /// Consecutive construction failures before a workflow is deactivated
    pub max_construct_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            scan_interval_ms: defaults::SCAN_INTERVAL_MS,
            max_threads: defaults::MAX_THREADS,
            max_construct_failures: defaults::MAX_CONSTRUCT_FAILURES,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/etl_catalog_development".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    /// Directory for the JSON log file; no file output when unset
    pub directory: Option<PathBuf>,
    /// Emit ANSI colours on the console layer
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
}

impl OrchestratorConfig {
    /// Configuration tuned for tests: fast polling and scanning
    pub fn for_testing() -> Self {
        Self {
            scheduler: SchedulerConfig {
                poll_interval_ms: 5,
                scan_interval_ms: 20,
                ..SchedulerConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.poll_interval_ms",
                "0",
                "poll interval must be greater than 0",
            ));
        }

        if self.scheduler.scan_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.scan_interval_ms",
                "0",
                "scan interval must be greater than 0",
            ));
        }

        if self.scheduler.max_threads == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_threads",
                "0",
                "thread cap must be greater than 0",
            ));
        }

        if self.scheduler.max_construct_failures == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_construct_failures",
                "0",
                "failure threshold must be greater than 0",
            ));
        }

        if self.database.url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "database configuration",
            ));
        }

        if self.notification.enabled && self.notification.recipients.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "notification.recipients",
                "notification configuration",
            ));
        }

        Ok(())
    }
}
