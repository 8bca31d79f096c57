//! Run manifest written next to every output table (JSON).

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to serialize run manifest: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write manifest to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Shape of one written table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

impl TableSummary {
    pub fn of(path: &Path, df: &DataFrame) -> Self {
        Self {
            path: path.to_path_buf(),
            rows: df.height(),
            columns: df
                .get_column_names()
                .into_iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Pipeline command that produced the output (`build-x`, `build-y`, ...).
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub config_fingerprint: String,
    /// Input role → path actually read.
    pub inputs: BTreeMap<String, PathBuf>,
    pub output: TableSummary,
}

impl RunManifest {
    pub fn new(command: &str, config_fingerprint: String, output: TableSummary) -> Self {
        Self {
            command: command.to_string(),
            created_at: Utc::now(),
            config_fingerprint,
            inputs: BTreeMap::new(),
            output,
        }
    }

    pub fn with_input(mut self, role: &str, path: &Path) -> Self {
        self.inputs.insert(role.to_string(), path.to_path_buf());
        self
    }

    /// `out.parquet` → `out.parquet.manifest.json`
    pub fn path_for(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_os_string();
        name.push(".manifest.json");
        PathBuf::from(name)
    }

    /// Write next to the output table; returns the manifest path.
    pub fn write(&self) -> Result<PathBuf, ManifestError> {
        let path = Self::path_for(&self.output.path);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| ManifestError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
