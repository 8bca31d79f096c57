//! Bankpanel CLI — build the feature and label tables, format bankruptcy filings.
//!
//! Commands:
//! - `build-x` — prepare and join the four sources, derive ratios, write X
//! - `build-y` — build X, attach delisting records, derive labels, write Y
//! - `bankruptcy` — normalize a raw vendor bankruptcy export
//! - `config` — print the default config or validate a config file
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use bankpanel_runner::{run_bankruptcy, run_build_x, run_build_y, PipelineConfig, RunManifest};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bankpanel",
    about = "Bankpanel — company-month panels for bankruptcy prediction"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the feature table (X).
    BuildX {
        /// Pipeline TOML config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output table (.parquet or .csv).
        #[arg(long)]
        out: PathBuf,
    },
    /// Build the label table (Y), aligned with X by (entity, month).
    BuildY {
        /// Pipeline TOML config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output table (.parquet or .csv).
        #[arg(long)]
        out: PathBuf,

        /// Per-entity delisting table (PERMNO, dldte, dlrsn). Overrides
        /// `inputs.delisting`; without either, the monthly file's delisting
        /// columns are used.
        #[arg(long)]
        delisting: Option<PathBuf>,
    },
    /// Normalize a raw bankruptcy filing export.
    Bankruptcy {
        /// Pipeline TOML config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Raw export. Overrides `inputs.bankruptcy`.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output table (.parquet or .csv).
        #[arg(long)]
        out: PathBuf,

        /// Keep only public entities.
        #[arg(long, default_value_t = false)]
        public_only: bool,
    },
    /// Inspect configuration.
    Config {
        /// Print the full default config as TOML.
        #[arg(long, default_value_t = false)]
        print_default: bool,

        /// Validate a config file and print its fingerprint.
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::BuildX { config, out } => {
            let config = load_config(config.as_deref())?;
            let manifest = run_build_x(&config, &out)
                .with_context(|| format!("failed to build X into {}", out.display()))?;
            report(&manifest);
        }
        Commands::BuildY {
            config,
            out,
            delisting,
        } => {
            let config = load_config(config.as_deref())?;
            let manifest = run_build_y(&config, &out, delisting.as_deref())
                .with_context(|| format!("failed to build Y into {}", out.display()))?;
            report(&manifest);
        }
        Commands::Bankruptcy {
            config,
            input,
            out,
            public_only,
        } => {
            let mut config = load_config(config.as_deref())?;
            config.bankruptcy.public_only |= public_only;
            let manifest = run_bankruptcy(&config, input.as_deref(), &out)
                .with_context(|| format!("failed to format bankruptcies into {}", out.display()))?;
            report(&manifest);
        }
        Commands::Config {
            print_default,
            check,
        } => run_config(print_default, check.as_deref())?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_config(print_default: bool, check: Option<&Path>) -> Result<()> {
    if !print_default && check.is_none() {
        bail!("nothing to do: pass --print-default or --check <path>");
    }
    if print_default {
        print!("{}", PipelineConfig::default().to_toml()?);
    }
    if let Some(path) = check {
        let config = load_config(Some(path))?;
        println!("{}: ok (fingerprint {})", path.display(), config.fingerprint());
    }
    Ok(())
}

fn report(manifest: &RunManifest) {
    println!(
        "{} rows x {} columns -> {}",
        manifest.output.rows,
        manifest.output.columns.len(),
        manifest.output.path.display()
    );
    println!(
        "manifest: {}",
        RunManifest::path_for(&manifest.output.path).display()
    );
}
