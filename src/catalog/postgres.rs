//! PostgreSQL catalog store.

use super::rows::{CatalogRow, CatalogValue};
use super::store::CatalogStore;
use crate::config::DatabaseConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        info!(
            max_connections = config.max_connections,
            "🗄️ Catalog database pool ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;
        let health: i32 = row.try_get("health")?;
        Ok(health == 1)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode_row(row: &PgRow) -> Result<CatalogRow> {
        let mut decoded = CatalogRow::new();
        for (index, column) in row.columns().iter().enumerate() {
            let value: CatalogValue = match column.type_info().name() {
                "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
                "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
                "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
                "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
                "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
                "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
                "JSON" | "JSONB" => row
                    .try_get::<Option<serde_json::Value>, _>(index)?
                    .map(|json| json.to_string())
                    .into(),
                "TIMESTAMPTZ" => row
                    .try_get::<Option<DateTime<Utc>>, _>(index)?
                    .map(|ts| ts.to_rfc3339())
                    .into(),
                "TIMESTAMP" => row
                    .try_get::<Option<NaiveDateTime>, _>(index)?
                    .map(|ts| ts.to_string())
                    .into(),
                type_name => Self::text_or_null(
                    column.name(),
                    type_name,
                    row.try_get::<Option<String>, _>(index),
                ),
            };
            decoded.insert(column.name(), value);
        }
        Ok(decoded)
    }

    /// Columns of other types are read as text; ones that cannot be are NULL
    fn text_or_null(
        column: &str,
        type_name: &str,
        text: std::result::Result<Option<String>, sqlx::Error>,
    ) -> CatalogValue {
        match text {
            Ok(text) => text.into(),
            Err(e) => {
                warn!(
                    column,
                    column_type = type_name,
                    error = %e,
                    "catalog column type not decodable, value left NULL"
                );
                CatalogValue::Null
            }
        }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn query(&self, sql: &str) -> Result<Vec<CatalogRow>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
