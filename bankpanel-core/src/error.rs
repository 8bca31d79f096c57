//! Error types for the panel pipeline.

use crate::normalize::NormalizeError;
use crate::schema::SchemaError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Result alias used by every pipeline stage.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Failures that stop a pipeline stage.
///
/// Data-quality problems (unparseable numbers, dates or quarter codes,
/// non-finite ratios) never show up here; they become nulls in the output.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("malformed record in column '{column}' at row {row}: {source}")]
    MalformedRecord {
        column: String,
        row: usize,
        #[source]
        source: NormalizeError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("polars: {0}")]
    Polars(#[from] PolarsError),
}

impl PanelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        PanelError::InvalidConfig(msg.into())
    }
}
