//! Untyped catalog rows.
//!
//! [`CatalogStore`](super::CatalogStore) returns rows as column-name → value
//! maps so that any SQL backend can feed the typed catalog.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CatalogValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CatalogValue::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CatalogValue::Null => "null",
            CatalogValue::Bool(_) => "bool",
            CatalogValue::Int(_) => "int",
            CatalogValue::Float(_) => "float",
            CatalogValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for CatalogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogValue::Null => write!(f, "NULL"),
            CatalogValue::Bool(v) => write!(f, "{v}"),
            CatalogValue::Int(v) => write!(f, "{v}"),
            CatalogValue::Float(v) => write!(f, "{v}"),
            CatalogValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for CatalogValue {
    fn from(value: i64) -> Self {
        CatalogValue::Int(value)
    }
}

impl From<i32> for CatalogValue {
    fn from(value: i32) -> Self {
        CatalogValue::Int(value.into())
    }
}

impl From<bool> for CatalogValue {
    fn from(value: bool) -> Self {
        CatalogValue::Bool(value)
    }
}

impl From<f64> for CatalogValue {
    fn from(value: f64) -> Self {
        CatalogValue::Float(value)
    }
}

impl From<&str> for CatalogValue {
    fn from(value: &str) -> Self {
        CatalogValue::Text(value.to_string())
    }
}

impl From<String> for CatalogValue {
    fn from(value: String) -> Self {
        CatalogValue::Text(value)
    }
}

impl<T: Into<CatalogValue>> From<Option<T>> for CatalogValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CatalogValue::Null, Into::into)
    }
}

/// One result row keyed by lower-case column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    columns: BTreeMap<String, CatalogValue>,
}

impl CatalogRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter
    pub fn with(mut self, column: &str, value: impl Into<CatalogValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<CatalogValue>) {
        self.columns.insert(column.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&CatalogValue> {
        self.columns.get(&column.to_ascii_lowercase())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    fn present(&self, column: &str) -> Option<&CatalogValue> {
        self.get(column).filter(|value| !value.is_null())
    }

    fn required(&self, column: &str) -> Result<&CatalogValue> {
        self.present(column)
            .ok_or_else(|| OrchestratorError::Catalog(format!("missing column {column}")))
    }

    fn mismatch(column: &str, expected: &str, value: &CatalogValue) -> OrchestratorError {
        OrchestratorError::Catalog(format!(
            "column {column}: expected {expected}, found {} ({value})",
            value.type_name()
        ))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        match self.required(column)? {
            CatalogValue::Int(v) => Ok(*v),
            CatalogValue::Text(v) => v
                .trim()
                .parse()
                .map_err(|_| Self::mismatch(column, "integer", &CatalogValue::Text(v.clone()))),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.present(column) {
            Some(_) => self.get_i64(column).map(Some),
            None => Ok(None),
        }
    }

    /// Booleans may arrive as native bools, 0/1 integers or flag strings
    pub fn get_bool(&self, column: &str) -> Result<bool> {
        match self.present(column) {
            None => Ok(false),
            Some(CatalogValue::Bool(v)) => Ok(*v),
            Some(CatalogValue::Int(v)) => Ok(*v != 0),
            Some(CatalogValue::Text(v)) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(true),
                "false" | "f" | "no" | "n" | "0" | "" => Ok(false),
                _ => Err(Self::mismatch(column, "boolean", &CatalogValue::Text(v.clone()))),
            },
            Some(other) => Err(Self::mismatch(column, "boolean", other)),
        }
    }

    pub fn get_string(&self, column: &str) -> Result<String> {
        match self.required(column)? {
            CatalogValue::Text(v) => Ok(v.clone()),
            other => Ok(other.to_string()),
        }
    }

    pub fn get_opt_string(&self, column: &str) -> Option<String> {
        self.present(column).map(|value| match value {
            CatalogValue::Text(v) => v.clone(),
            other => other.to_string(),
        })
    }
}

impl<K: AsRef<str>, V: Into<CatalogValue>> FromIterator<(K, V)> for CatalogRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = CatalogRow::new();
        for (column, value) in iter {
            row.insert(column.as_ref(), value);
        }
        row
    }
}
