//! Pipeline knobs.
//!
//! Every struct builds its defaults fresh through `Default`; nothing is shared
//! or extended across calls. All fields carry `#[serde(default)]` so a partial
//! TOML table overrides only the keys it names.

use crate::error::{PanelError, Result};
use crate::ratios::Ratio;
use crate::schema::{self, accounting, monthly, MONTH};
use serde::{Deserialize, Serialize};

/// One step of the lag fallback chain: the accounting reference-month column
/// matched against the panel month at this offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagStep {
    pub offset: u32,
    pub column: String,
}

/// Number of consecutive lag offsets tried per panel month.
pub const LAG_WINDOW: u32 = 3;

/// Configuration of the accounting preparer and the temporal join engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// First lag offset (months after quarter end) at which a quarter's
    /// accounting data is considered known.
    pub months_to_lag: u32,
    /// Accounting values carried into the panel.
    pub accounting_features: Vec<String>,
    /// Company identifiers carried from the accounting file.
    pub identifying_features: Vec<String>,
    /// Monthly trading columns forming the panel backbone. Must contain the
    /// entity key and the month column.
    pub trading_features: Vec<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            months_to_lag: 2,
            accounting_features: to_strings(&[
                accounting::TOTAL_ASSETS,
                accounting::COMMON_EQUITY,
                accounting::CASH,
                accounting::TOTAL_LIABILITIES,
                accounting::NET_INCOME,
            ]),
            identifying_features: to_strings(&[
                accounting::GVKEY,
                accounting::COMPANY_NAME,
                accounting::CIK,
            ]),
            trading_features: to_strings(&[
                monthly::KEY,
                MONTH,
                monthly::PRICE,
                monthly::SHARES,
                monthly::SPLIT_FACTOR,
                monthly::RETURN,
            ]),
        }
    }
}

impl PanelConfig {
    /// Lag offsets in priority order, freshest first.
    pub fn lag_offsets(&self) -> Vec<u32> {
        (0..LAG_WINDOW).map(|i| self.months_to_lag + i).collect()
    }

    pub fn lag_steps(&self) -> Vec<LagStep> {
        self.lag_offsets()
            .into_iter()
            .map(|offset| LagStep {
                offset,
                column: schema::lag_column(offset),
            })
            .collect()
    }

    /// Accounting-side columns resolved through the fallback chain.
    pub fn carried_features(&self) -> Vec<&str> {
        schema::unique_names(
            self.accounting_features
                .iter()
                .chain(&self.identifying_features)
                .map(String::as_str),
        )
    }

    /// Columns of the merged panel, in output order.
    pub fn features_to_keep(&self) -> Vec<&str> {
        schema::unique_names(
            self.trading_features
                .iter()
                .chain(&self.accounting_features)
                .chain(&self.identifying_features)
                .map(String::as_str),
        )
    }

    pub fn validate(&self) -> Result<()> {
        for required in [monthly::KEY, MONTH] {
            if !self.trading_features.iter().any(|f| f == required) {
                return Err(PanelError::invalid_config(format!(
                    "trading_features must include '{required}'"
                )));
            }
        }
        if self.accounting_features.is_empty() {
            return Err(PanelError::invalid_config(
                "accounting_features must not be empty",
            ));
        }
        let carried = self.carried_features();
        if let Some(clash) = self
            .trading_features
            .iter()
            .find(|f| carried.contains(&f.as_str()))
        {
            return Err(PanelError::invalid_config(format!(
                "'{clash}' is listed both as a trading and an accounting feature"
            )));
        }
        Ok(())
    }
}

/// Configuration of the feature deriver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Ratios to compute, in output order.
    pub ratios: Vec<Ratio>,
    /// Columns identifying a row, kept ahead of the month in trimmed output.
    pub identifying_columns: Vec<String>,
    /// Keep every panel column instead of trimming to identifiers and ratios.
    pub keep_all_features: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ratios: Ratio::ALL.to_vec(),
            identifying_columns: to_strings(&[
                monthly::KEY,
                accounting::GVKEY,
                accounting::COMPANY_NAME,
                accounting::CIK,
            ]),
            keep_all_features: false,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ratios.is_empty() {
            return Err(PanelError::invalid_config("ratios must not be empty"));
        }
        Ok(())
    }
}

/// Configuration of the label deriver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Forward horizons in months, one indicator column each.
    pub horizons: Vec<u32>,
    /// Drop rows with any missing value (null, or NaN in a float column)
    /// before labelling. The delisting date and reason are exempt: a missing
    /// delisting means the entity never delisted, and such rows are kept.
    pub drop_na: bool,
    /// Columns identifying a row, kept ahead of the month.
    pub identifying_columns: Vec<String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            horizons: vec![3, 6, 12, 24, 60],
            drop_na: true,
            identifying_columns: to_strings(&[
                monthly::KEY,
                accounting::GVKEY,
                accounting::COMPANY_NAME,
            ]),
        }
    }
}

impl LabelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizons.is_empty() {
            return Err(PanelError::invalid_config("horizons must not be empty"));
        }
        if i32::try_from(self.horizons.iter().copied().max().unwrap_or(0)).is_err() {
            return Err(PanelError::invalid_config("horizon does not fit in a month index"));
        }
        Ok(())
    }
}

/// Configuration of the bankruptcy record formatter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankruptcyConfig {
    /// Keep only entities classified as public.
    pub public_only: bool,
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
