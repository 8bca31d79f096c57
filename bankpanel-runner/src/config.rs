//! Serializable pipeline configuration.

use bankpanel_core::{BankruptcyConfig, FeatureConfig, LabelConfig, PanelConfig, PanelError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] PanelError),
}

/// Locations of the raw input tables. Relative paths in a config file are
/// resolved against the file's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    pub accounting: PathBuf,
    pub monthly: PathBuf,
    pub daily: PathBuf,
    pub index: PathBuf,
    /// Per-entity delisting records. When absent, delisting fields are taken
    /// from the monthly file.
    pub delisting: Option<PathBuf>,
    /// Raw vendor bankruptcy filings.
    pub bankruptcy: Option<PathBuf>,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            accounting: PathBuf::from("accounting.parquet"),
            monthly: PathBuf::from("monthly.parquet"),
            daily: PathBuf::from("daily.parquet"),
            index: PathBuf::from("index.parquet"),
            delisting: None,
            bankruptcy: None,
        }
    }
}

impl InputPaths {
    fn resolve_against(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.accounting);
        resolve(&mut self.monthly);
        resolve(&mut self.daily);
        resolve(&mut self.index);
        if let Some(path) = self.delisting.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.bankruptcy.as_mut() {
            resolve(path);
        }
    }
}

/// Everything needed to reproduce an X/Y build.
///
/// Each section falls back to its defaults, so a TOML file only needs the keys
/// it changes:
///
/// ```toml
/// [inputs]
/// accounting = "raw/compustat.csv"
///
/// [labels]
/// horizons = [12, 24]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    pub panel: PanelConfig,
    pub features: FeatureConfig,
    pub labels: LabelConfig,
    pub bankruptcy: BankruptcyConfig,
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.inputs.resolve_against(base);
        }
        Ok(config)
    }

    /// Parse and validate a TOML string. Input paths are left as written.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.panel.validate()?;
        self.features.validate()?;
        self.labels.validate()?;
        Ok(())
    }

    /// Deterministic hash of the transformation settings.
    ///
    /// Input paths are excluded: moving the data does not change what the
    /// pipeline computes.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Settings<'a> {
            panel: &'a PanelConfig,
            features: &'a FeatureConfig,
            labels: &'a LabelConfig,
            bankruptcy: &'a BankruptcyConfig,
        }
        let settings = Settings {
            panel: &self.panel,
            features: &self.features,
            labels: &self.labels,
            bankruptcy: &self.bankruptcy,
        };
        // serializing these structs cannot fail
        let json = serde_json::to_vec(&settings).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
