//! Bankpanel Runner — pipeline orchestration on top of `bankpanel-core`.
//!
//! This crate provides:
//! - TOML pipeline configuration with defaults and a settings fingerprint
//! - Parquet/CSV table I/O
//! - Parallel source preparation and the X/Y build entry points
//! - JSON run manifests next to every output

pub mod config;
pub mod io;
pub mod manifest;
pub mod pipeline;

pub use config::{ConfigError, InputPaths, PipelineConfig};
pub use io::{read_table, write_table, IoError, TableFormat};
pub use manifest::{ManifestError, RunManifest, TableSummary};
pub use pipeline::{
    create_x, create_y, delisting_from_monthly, prepare_sources, run_bankruptcy, run_build_x,
    run_build_y, RawSources, RunError,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
        assert_send::<InputPaths>();
        assert_sync::<InputPaths>();
    }

    #[test]
    fn raw_sources_are_send_sync() {
        assert_send::<RawSources>();
        assert_sync::<RawSources>();
    }

    #[test]
    fn manifest_is_send_sync() {
        assert_send::<RunManifest>();
        assert_sync::<RunManifest>();
    }

    #[test]
    fn run_error_is_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
