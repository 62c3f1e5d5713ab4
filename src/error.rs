//! Crate-wide error taxonomy
//!
//! Every public operation returns one of these kinds. Subsystem errors
//! (catalog, config) convert into the taxonomy via `From`.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;

/// Optimizer error
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed plan, unknown strategy/connector/dialect, empty required field
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Catalog lookup missed
    #[error("not found: {0}")]
    NotFound(String),

    /// Catalog insert collision
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Recognized but not implemented (mongo/athena dialects, union, subquery)
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Cost estimation divergence, failed rule, empty enumeration
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::TableExists(name) => Error::AlreadyExists(format!("table '{}'", name)),
            CatalogError::TableNotFound(name) => Error::NotFound(format!("table '{}'", name)),
            CatalogError::ColumnNotFound { table, column } => {
                Error::NotFound(format!("column '{}' in table '{}'", column, table))
            }
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, Error>;
