//! Error kinds surfaced by the resampling tasks.
//!
//! Object stores distinguish [`StoreError::NotFound`], which the single-file
//! task skips over, from every other failure, which aborts the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object '{key}' not found in '{container}'")]
    NotFound { container: String, key: String },

    #[error("store operation on '{container}/{key}' failed: {source}")]
    Backend {
        container: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl StoreError {
    pub fn not_found(container: &str, key: &str) -> Self {
        StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        }
    }

    pub fn backend(container: &str, key: &str, source: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend {
            container: container.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown task type '{0}'")]
    UnknownTask(String),

    #[error("failed to read task registry '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse task registry '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration for '{task_type}': {reason}")]
    Invalid { task_type: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("column '{0}' is missing from the input")]
    MissingColumn(String),

    #[error("row {row}: cannot parse '{value}' in column '{column}' as {expected}")]
    Parse {
        row: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("cannot apply {operation} to non-numeric column '{column}'")]
    NonNumeric {
        operation: &'static str,
        column: String,
    },

    #[error("integer sum of column '{column}' overflows")]
    Overflow { column: String },

    #[error("invalid work unit '{0}'")]
    WorkUnit(String),

    #[error("polars: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Any failure that aborts a task run.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("partition worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
