//! Pipeline orchestration — loads raw tables, runs the core stages, writes
//! outputs with a manifest.
//!
//! Entry points:
//! - `create_x()` / `create_y()`: in-memory X and Y from raw tables.
//! - `run_build_x()` / `run_build_y()` / `run_bankruptcy()`: file in, file out.
//!   Used by the CLI.

use std::path::Path;
use std::time::Instant;

use bankpanel_core::prepare::{prepare_accounting, prepare_daily, prepare_index, prepare_monthly};
use bankpanel_core::schema::{delisting, monthly, require_columns};
use bankpanel_core::{
    attach_delisting, build_panel, derive_features, derive_labels, format_bankruptcy_table,
    LabelConfig, PanelConfig, PanelError, PreparedSources,
};
use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, InputPaths, PipelineConfig};
use crate::io::{read_table, write_table, IoError};
use crate::manifest::{ManifestError, RunManifest, TableSummary};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] IoError),
    #[error("pipeline error: {0}")]
    Panel(#[from] PanelError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("no bankruptcy input: pass one or set inputs.bankruptcy")]
    NoBankruptcyInput,
}

/// The four raw tables feeding the panel, as read from disk.
#[derive(Debug, Clone)]
pub struct RawSources {
    pub accounting: DataFrame,
    pub monthly: DataFrame,
    pub daily: DataFrame,
    pub index: DataFrame,
}

impl RawSources {
    /// Read all four inputs in parallel.
    pub fn load(inputs: &InputPaths) -> Result<Self, RunError> {
        let ((accounting, monthly), (daily, index)) = rayon::join(
            || {
                rayon::join(
                    || read_table(&inputs.accounting),
                    || read_table(&inputs.monthly),
                )
            },
            || rayon::join(|| read_table(&inputs.daily), || read_table(&inputs.index)),
        );
        Ok(Self {
            accounting: accounting?,
            monthly: monthly?,
            daily: daily?,
            index: index?,
        })
    }
}

/// Run the four source preparers. They share nothing, so they run in parallel.
pub fn prepare_sources(raw: &RawSources, config: &PanelConfig) -> Result<PreparedSources, PanelError> {
    let ((accounting, monthly), (daily, index)) = rayon::join(
        || {
            rayon::join(
                || prepare_accounting(&raw.accounting, config.months_to_lag),
                || prepare_monthly(&raw.monthly),
            )
        },
        || rayon::join(|| prepare_daily(&raw.daily), || prepare_index(&raw.index)),
    );
    let prepared = PreparedSources {
        accounting: accounting?,
        monthly: monthly?,
        daily: daily?,
        index: index?,
    };
    debug!(
        accounting = prepared.accounting.height(),
        monthly = prepared.monthly.height(),
        daily = prepared.daily.height(),
        index = prepared.index.height(),
        "prepared sources"
    );
    Ok(prepared)
}

/// Build the feature table X: prepare, join, derive ratios.
pub fn create_x(raw: &RawSources, config: &PipelineConfig) -> Result<DataFrame, PanelError> {
    let prepared = prepare_sources(raw, &config.panel)?;
    let panel = build_panel(&prepared, &config.panel)?;
    derive_features(&panel, &config.features)
}

/// Delisting records carried on the raw monthly file, one row per
/// (entity, delisting) with a reason code.
pub fn delisting_from_monthly(raw_monthly: &DataFrame) -> Result<DataFrame, PanelError> {
    require_columns(
        raw_monthly,
        "monthly",
        [monthly::KEY, delisting::DATE, delisting::REASON],
    )?;
    let records = raw_monthly
        .clone()
        .lazy()
        .select([col(monthly::KEY), col(delisting::DATE), col(delisting::REASON)])
        .filter(col(delisting::REASON).is_not_null())
        .collect()?;
    Ok(records)
}

/// Build the label table Y from X and per-entity delisting records.
pub fn create_y(
    x: &DataFrame,
    delisting_data: &DataFrame,
    config: &LabelConfig,
) -> Result<DataFrame, PanelError> {
    let with_delisting = attach_delisting(x, delisting_data)?;
    derive_labels(&with_delisting, config)
}

/// Read the inputs named in `config`, build X and write it to `out`.
pub fn run_build_x(config: &PipelineConfig, out: &Path) -> Result<RunManifest, RunError> {
    let started = Instant::now();
    let raw = RawSources::load(&config.inputs)?;
    let mut x = create_x(&raw, config)?;
    write_table(out, &mut x)?;

    let manifest = with_panel_inputs(
        RunManifest::new("build-x", config.fingerprint(), TableSummary::of(out, &x)),
        &config.inputs,
    );
    let manifest_path = manifest.write()?;
    info!(
        rows = x.height(),
        columns = x.width(),
        out = %out.display(),
        manifest = %manifest_path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "built feature table"
    );
    Ok(manifest)
}

/// Build X in memory, then Y from it, and write Y to `out`.
///
/// Delisting records come from `delisting_path`, else `inputs.delisting`,
/// else the `dldte`/`dlrsn` columns of the monthly file.
pub fn run_build_y(
    config: &PipelineConfig,
    out: &Path,
    delisting_path: Option<&Path>,
) -> Result<RunManifest, RunError> {
    let started = Instant::now();
    let raw = RawSources::load(&config.inputs)?;
    let x = create_x(&raw, config)?;

    let source = delisting_path.or(config.inputs.delisting.as_deref());
    let delisting_data = match source {
        Some(path) => read_table(path)?,
        None => delisting_from_monthly(&raw.monthly)?,
    };
    let mut y = create_y(&x, &delisting_data, &config.labels)?;
    write_table(out, &mut y)?;

    let mut manifest = with_panel_inputs(
        RunManifest::new("build-y", config.fingerprint(), TableSummary::of(out, &y)),
        &config.inputs,
    );
    if let Some(path) = source {
        manifest = manifest.with_input("delisting", path);
    }
    let manifest_path = manifest.write()?;
    info!(
        x_rows = x.height(),
        rows = y.height(),
        horizons = ?config.labels.horizons,
        out = %out.display(),
        manifest = %manifest_path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "built label table"
    );
    Ok(manifest)
}

/// Format a raw vendor bankruptcy file and write it to `out`.
pub fn run_bankruptcy(
    config: &PipelineConfig,
    input: Option<&Path>,
    out: &Path,
) -> Result<RunManifest, RunError> {
    let input = input
        .or(config.inputs.bankruptcy.as_deref())
        .ok_or(RunError::NoBankruptcyInput)?;
    let raw = read_table(input)?;
    let mut formatted = format_bankruptcy_table(&raw, &config.bankruptcy)?;
    write_table(out, &mut formatted)?;

    let manifest = RunManifest::new(
        "bankruptcy",
        config.fingerprint(),
        TableSummary::of(out, &formatted),
    )
    .with_input("bankruptcy", input);
    manifest.write()?;
    info!(
        rows_in = raw.height(),
        rows = formatted.height(),
        public_only = config.bankruptcy.public_only,
        out = %out.display(),
        "formatted bankruptcy filings"
    );
    Ok(manifest)
}

fn with_panel_inputs(manifest: RunManifest, inputs: &InputPaths) -> RunManifest {
    manifest
        .with_input("accounting", &inputs.accounting)
        .with_input("monthly", &inputs.monthly)
        .with_input("daily", &inputs.daily)
        .with_input("index", &inputs.index)
}
