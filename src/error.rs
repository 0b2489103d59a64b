//! Error types for synphys-core
//!
//! Per-record errors (`DataQuality`) abort a single record's import and are
//! collected by the batch; per-query errors (`Ambiguity`) abort the caller.
//! Fit non-convergence is never an error: it is recorded on the `FitResult`.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// synphys-core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or ambiguous annotation on a single record
    #[error("Data quality error for {record} in column {field}: {message}")]
    DataQuality {
        /// Record identifier (e.g. specimen or cell id)
        record: String,
        /// Source column / field name
        field: String,
        /// What was wrong with the value
        message: String,
    },

    /// External source driver missing or unreachable
    #[error("External source unavailable: {0}")]
    LookupUnavailable(String),

    /// More than one record matched a lookup that must be unique
    #[error("Ambiguous lookup: {0}\nRefusing to pick one; fix the duplicate records.")]
    Ambiguity(String),

    /// No record matched a lookup
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pipeline module name not registered
    #[error("Unknown pipeline module: {0}")]
    UnknownModule(String),

    /// Module dependency graph contains a cycle
    #[error("Dependency cycle detected involving module {0}")]
    DependencyCycle(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a data-quality error for one record/column.
    pub fn data_quality(
        record: impl ToString,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DataQuality {
            record: record.to_string(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors that only invalidate a single record and must not
    /// abort the surrounding batch.
    #[must_use]
    pub const fn is_record_scoped(&self) -> bool {
        matches!(self, Self::DataQuality { .. })
    }
}
