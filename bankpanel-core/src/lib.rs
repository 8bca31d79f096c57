//! Bankpanel Core — company-month panel construction for bankruptcy prediction.
//!
//! This crate holds the in-memory transformations of the pipeline:
//! - Record normalizer for vendor bankruptcy filings
//! - Source preparers for accounting, monthly, daily and index data
//! - Temporal join engine with point-in-time lag fallback
//! - Ratio deriver producing the feature table (X)
//! - Label deriver producing forward-looking bankruptcy indicators (Y)
//!
//! Every stage takes a `&DataFrame` and returns a new one; nothing is mutated
//! in place. Reading and writing files is left to the runner crate.

pub mod config;
pub mod error;
pub mod join;
pub mod labels;
pub mod month;
pub mod normalize;
pub mod prepare;
pub mod ratios;
pub mod schema;

pub use config::{BankruptcyConfig, FeatureConfig, LabelConfig, LagStep, PanelConfig};
pub use error::{PanelError, Result};
pub use join::{build_panel, PreparedSources};
pub use labels::{attach_delisting, derive_labels, horizon_column};
pub use month::YearMonth;
pub use normalize::format_bankruptcy_table;
pub use ratios::{derive_features, Ratio};
