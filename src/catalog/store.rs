use super::rows::CatalogRow;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Raw SQL access to the relational catalog
#[async_trait]
pub trait CatalogStore: Send + Sync + Debug {
    /// Run a statement returning rows
    async fn query(&self, sql: &str) -> Result<Vec<CatalogRow>>;

    /// Run a statement returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;
}

/// Quote a string as a SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render an optional integer as a SQL literal
pub fn int_or_null(value: Option<i64>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}
