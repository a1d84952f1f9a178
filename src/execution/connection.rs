//! Connection Factory
//!
//! Turns catalog connection attributes into handles the data mover can use.
//! Opening the actual database session belongs to the data mover; the factory
//! validates that a backend is supported and that its required attributes are
//! present, so a broken connection definition fails a step before it takes
//! any resources.

use crate::error::{OrchestratorError, Result};
use crate::models::{BackendKind, ConnectionInfo};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Validated connection description handed to the data mover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub connection_id: i64,
    pub name: String,
    pub backend: BackendKind,
    pub attributes: BTreeMap<String, String>,
}

impl ConnectionHandle {
    /// Printable description without credentials
    pub fn describe(&self) -> String {
        let target = self
            .attributes
            .get("host")
            .or_else(|| self.attributes.get("dsn"))
            .or_else(|| self.attributes.get("path"))
            .map(String::as_str)
            .unwrap_or("?");
        format!("{}://{} ({})", self.backend, target, self.name)
    }
}

pub trait ConnectionFactory: Send + Sync + Debug {
    fn connect(&self, info: &ConnectionInfo) -> Result<ConnectionHandle>;
}

/// Factory for the backends the engine ships connectors for
#[derive(Debug, Clone, Default)]
pub struct StandardConnectionFactory;

impl StandardConnectionFactory {
    pub fn new() -> Self {
        Self
    }

    fn required_attributes(backend: &BackendKind) -> Result<&'static [&'static str]> {
        match backend {
            BackendKind::Postgres
            | BackendKind::MySql
            | BackendKind::SqlServer
            | BackendKind::Oracle
            | BackendKind::Db2 => Ok(&["host", "database"]),
            BackendKind::Odbc => Ok(&["dsn"]),
            BackendKind::File => Ok(&["path"]),
            BackendKind::Other(tag) => Err(OrchestratorError::NotImplemented(format!(
                "connector for backend '{tag}'"
            ))),
        }
    }
}

impl ConnectionFactory for StandardConnectionFactory {
    fn connect(&self, info: &ConnectionInfo) -> Result<ConnectionHandle> {
        let required = Self::required_attributes(&info.backend)?;
        if let Some(missing) = required.iter().find(|attr| info.attribute(attr).is_none()) {
            return Err(OrchestratorError::Configuration(format!(
                "connection {} ({}) is missing attribute '{missing}'",
                info.id, info.name
            )));
        }
        Ok(ConnectionHandle {
            connection_id: info.id,
            name: info.name.clone(),
            backend: info.backend.clone(),
            attributes: info.attributes.clone(),
        })
    }
}
