//! Catalog - table metadata and statistics
//!
//! The catalog stores table schemas, row counts and per-column statistics
//! (NDV, min/max, histograms, null counts). It is the only shared resource
//! in the crate: many concurrent readers, one writer at a time. Readers get
//! an independent snapshot and never operate under the lock.

pub mod stats;

pub use stats::{DefaultSelectivityOracle, SelectivityOracle};

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::plan::{BinaryOp, Value};

/// Column data types supported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    String,
    Boolean,
    Date,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }
}

/// Histogram bucket: a value range with its row count and the fraction of
/// table rows it holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub lower_bound: String,
    pub upper_bound: String,
    pub count: i64,
    pub frequency: f64,
}

/// Column definition with optional statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Number of distinct values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndv: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub histogram: Vec<Bucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_count: Option<i64>,
}

impl Column {
    /// Create a new nullable column with no statistics
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            ndv: None,
            min_value: None,
            max_value: None,
            histogram: Vec::new(),
            null_count: None,
        }
    }

    /// Set nullable
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the distinct value count
    #[must_use]
    pub fn ndv(mut self, ndv: i64) -> Self {
        self.ndv = Some(ndv);
        self
    }

    /// Set the observed value range
    #[must_use]
    pub fn range(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.min_value = Some(min.into());
        self.max_value = Some(max.into());
        self
    }
}

/// Per-column statistics payload for [`Catalog::update_stats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndv: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub histogram: Vec<Bucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_count: Option<i64>,
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// btree, hash, etc.
    #[serde(rename = "type")]
    pub index_type: String,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
            index_type: "btree".to_string(),
        }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn index_type(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = index_type.into();
        self
    }
}

/// Table schema with statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl TableSchema {
    /// Create an empty table schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            row_count: 0,
            indexes: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Add a column
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the row count
    #[must_use]
    pub fn row_count(mut self, row_count: i64) -> Self {
        self.row_count = row_count;
        self
    }

    /// Add an index
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Get a column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Catalog error
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// In-memory catalog store
///
/// Readers take the lock briefly to clone a snapshot; writers replace
/// records atomically with respect to readers. Every operation acquires at
/// most one lock and releases it before returning.
pub struct Catalog {
    tables: RwLock<HashMap<String, TableSchema>>,
    oracle: Box<dyn SelectivityOracle>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog with the default selectivity oracle
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            oracle: Box::new(DefaultSelectivityOracle),
        }
    }

    /// Create a catalog with a custom selectivity oracle
    pub fn with_oracle(oracle: Box<dyn SelectivityOracle>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            oracle,
        }
    }

    /// Register a table schema
    pub fn add_table(&self, schema: TableSchema) -> CatalogResult<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(&schema.name) {
            return Err(CatalogError::TableExists(schema.name));
        }
        info!(table = %schema.name, row_count = schema.row_count, "table registered");
        tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Get an independent snapshot of a table schema
    pub fn get_table(&self, name: &str) -> CatalogResult<TableSchema> {
        let tables = self.tables.read();
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// List all table names, sorted
    pub fn list_tables(&self) -> Vec<String> {
        let tables = self.tables.read();
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Update a table's row count and overwrite statistics for the columns
    /// named in `column_stats`; other columns are left untouched
    pub fn update_stats(
        &self,
        name: &str,
        row_count: i64,
        column_stats: &HashMap<String, ColumnStatistics>,
    ) -> CatalogResult<()> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;

        table.row_count = row_count;
        for column in &mut table.columns {
            if let Some(stats) = column_stats.get(&column.name) {
                column.ndv = stats.ndv;
                column.min_value = stats.min_value.clone();
                column.max_value = stats.max_value.clone();
                column.histogram = stats.histogram.clone();
                column.null_count = stats.null_count;
            }
        }

        debug!(
            table = name,
            row_count,
            columns = column_stats.len(),
            "statistics updated"
        );
        Ok(())
    }

    /// Get a snapshot of one column's definition and statistics
    pub fn column_stats(&self, table: &str, column: &str) -> CatalogResult<Column> {
        let schema = self.get_table(table)?;
        schema
            .get_column(column)
            .cloned()
            .ok_or_else(|| CatalogError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    /// Estimate the selectivity of `column op value` against a table,
    /// always in (0, 1]
    pub fn selectivity(
        &self,
        table: &str,
        column: &str,
        op: BinaryOp,
        value: &Value,
    ) -> CatalogResult<f64> {
        let stats = self.column_stats(table, column)?;
        Ok(self.oracle.column_selectivity(&stats, op, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> TableSchema {
        TableSchema::new("customers")
            .column(Column::new("id", DataType::Int).nullable(false).ndv(5000))
            .column(Column::new("name", DataType::String))
            .column(Column::new("age", DataType::Int).ndv(70).range("18", "95"))
            .row_count(5000)
            .index(Index::new("customers_pkey", vec!["id".to_string()]).unique())
    }

    #[test]
    fn test_add_and_get_table() {
        let catalog = Catalog::new();
        catalog.add_table(customers()).unwrap();

        let schema = catalog.get_table("customers").unwrap();
        assert_eq!(schema.row_count, 5000);
        assert_eq!(schema.columns.len(), 3);
    }

    #[test]
    fn test_add_duplicate_fails() {
        let catalog = Catalog::new();
        catalog.add_table(customers()).unwrap();
        assert!(matches!(
            catalog.add_table(customers()),
            Err(CatalogError::TableExists(_))
        ));
    }

    #[test]
    fn test_get_missing_fails() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.get_table("nope"),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let catalog = Catalog::new();
        catalog.add_table(customers()).unwrap();

        let mut snapshot = catalog.get_table("customers").unwrap();
        snapshot.row_count = 1;

        assert_eq!(catalog.get_table("customers").unwrap().row_count, 5000);
    }

    #[test]
    fn test_update_stats_overwrites_named_columns_only() {
        let catalog = Catalog::new();
        catalog.add_table(customers()).unwrap();

        let mut stats = HashMap::new();
        stats.insert(
            "age".to_string(),
            ColumnStatistics {
                ndv: Some(80),
                null_count: Some(12),
                ..Default::default()
            },
        );
        catalog.update_stats("customers", 9999, &stats).unwrap();

        let schema = catalog.get_table("customers").unwrap();
        assert_eq!(schema.row_count, 9999);
        let age = schema.get_column("age").unwrap();
        assert_eq!(age.ndv, Some(80));
        assert_eq!(age.null_count, Some(12));
        // Untouched column keeps its stats
        assert_eq!(schema.get_column("id").unwrap().ndv, Some(5000));
    }

    #[test]
    fn test_update_stats_missing_table() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.update_stats("nope", 1, &HashMap::new()),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_selectivity_uses_ndv_for_equality() {
        let catalog = Catalog::new();
        catalog.add_table(customers()).unwrap();

        let sel = catalog
            .selectivity("customers", "age", BinaryOp::Eq, &Value::Integer(30))
            .unwrap();
        assert!((sel - 1.0 / 70.0).abs() < 1e-12);

        // No NDV recorded: falls back to the default
        let sel = catalog
            .selectivity(
                "customers",
                "name",
                BinaryOp::Eq,
                &Value::String("x".into()),
            )
            .unwrap();
        assert!((sel - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_selectivity_in_unit_interval_for_all_operators() {
        let catalog = Catalog::new();
        catalog.add_table(customers()).unwrap();

        for op in [
            BinaryOp::Eq,
            BinaryOp::NotEq,
            BinaryOp::Lt,
            BinaryOp::LtEq,
            BinaryOp::Gt,
            BinaryOp::GtEq,
            BinaryOp::Like,
            BinaryOp::And,
            BinaryOp::Or,
            BinaryOp::Add,
        ] {
            let sel = catalog
                .selectivity("customers", "age", op, &Value::Integer(1))
                .unwrap();
            assert!(sel > 0.0 && sel <= 1.0, "{:?} gave {}", op, sel);
        }
    }
}
