//! Feature deriver: bankruptcy-prediction ratios over the joined panel.
//!
//! Each [`Ratio`] maps to a pure polars expression over fixed panel columns.
//! Only the ratios named in the configuration are built. A division that
//! produces a non-finite value yields null, the panel's missing marker.

use crate::config::FeatureConfig;
use crate::error::Result;
use crate::schema::{accounting, daily, index, monthly, require_columns, unique_names, MONTH};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Weight of the market-to-book gap in adjusted total assets.
const BOOK_TO_MARKET_ADJUSTMENT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ratio {
    /// Net income over adjusted total assets.
    #[serde(rename = "NITA")]
    Nita,
    /// Net income over market-valued total assets.
    #[serde(rename = "NIMTA")]
    Nimta,
    /// Total liabilities over adjusted total assets.
    #[serde(rename = "TLTA")]
    Tlta,
    /// Total liabilities over market-valued total assets.
    #[serde(rename = "TLMTA")]
    Tlmta,
    /// Log excess return over the market index.
    #[serde(rename = "EXRET")]
    Exret,
    /// Market equity relative to total index market value.
    #[serde(rename = "RSIZE")]
    Rsize,
    /// Cash and equivalents over market-valued total assets.
    #[serde(rename = "CASHMTA")]
    Cashmta,
    /// Volatility estimate, passed through from the daily source.
    #[serde(rename = "SIGMA")]
    Sigma,
}

impl Ratio {
    pub const ALL: [Ratio; 8] = [
        Ratio::Nita,
        Ratio::Nimta,
        Ratio::Tlta,
        Ratio::Tlmta,
        Ratio::Exret,
        Ratio::Rsize,
        Ratio::Cashmta,
        Ratio::Sigma,
    ];

    /// Output column name.
    pub fn name(self) -> &'static str {
        match self {
            Ratio::Nita => "NITA",
            Ratio::Nimta => "NIMTA",
            Ratio::Tlta => "TLTA",
            Ratio::Tlmta => "TLMTA",
            Ratio::Exret => "EXRET",
            Ratio::Rsize => "RSIZE",
            Ratio::Cashmta => "CASHMTA",
            Ratio::Sigma => "SIGMA",
        }
    }

    /// Panel columns the ratio reads.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Ratio::Nita => &[
                monthly::PRICE,
                monthly::SHARES,
                accounting::COMMON_EQUITY,
                accounting::TOTAL_ASSETS,
                accounting::NET_INCOME,
            ],
            Ratio::Nimta => &[
                monthly::PRICE,
                monthly::SHARES,
                accounting::NET_INCOME,
                accounting::TOTAL_LIABILITIES,
            ],
            Ratio::Tlta => &[
                monthly::PRICE,
                monthly::SHARES,
                accounting::COMMON_EQUITY,
                accounting::TOTAL_ASSETS,
                accounting::TOTAL_LIABILITIES,
            ],
            Ratio::Tlmta => &[
                monthly::PRICE,
                monthly::SHARES,
                accounting::TOTAL_LIABILITIES,
            ],
            Ratio::Exret => &[
                monthly::KEY,
                monthly::PRICE,
                monthly::SPLIT_FACTOR,
                index::PANEL_RETURN,
            ],
            Ratio::Rsize => &[monthly::PRICE, monthly::SHARES, index::PANEL_TOTAL_VALUE],
            Ratio::Cashmta => &[
                monthly::PRICE,
                monthly::SHARES,
                accounting::CASH,
                accounting::TOTAL_LIABILITIES,
            ],
            Ratio::Sigma => &[daily::SIGMA],
        }
    }

    /// Unaliased expression computing the ratio. `Exret` assumes rows are in
    /// chronological order within each entity.
    pub fn expr(self) -> Expr {
        match self {
            Ratio::Nita => col(accounting::NET_INCOME) / adjusted_total_assets(),
            Ratio::Nimta => col(accounting::NET_INCOME) / market_total_assets(),
            Ratio::Tlta => col(accounting::TOTAL_LIABILITIES) / adjusted_total_assets(),
            Ratio::Tlmta => col(accounting::TOTAL_LIABILITIES) / market_total_assets(),
            Ratio::Exret => excess_return(),
            Ratio::Rsize => market_equity() / col(index::PANEL_TOTAL_VALUE),
            Ratio::Cashmta => col(accounting::CASH) / market_total_assets(),
            Ratio::Sigma => col(daily::SIGMA),
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ratio: {0}")]
pub struct UnknownRatio(pub String);

impl FromStr for Ratio {
    type Err = UnknownRatio;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ratio::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRatio(s.to_string()))
    }
}

// ME = PRC * SHROUT
fn market_equity() -> Expr {
    col(monthly::PRICE) * col(monthly::SHARES)
}

// TA + 0.1 * (ME - BE)
fn adjusted_total_assets() -> Expr {
    col(accounting::TOTAL_ASSETS)
        + lit(BOOK_TO_MARKET_ADJUSTMENT) * (market_equity() - col(accounting::COMMON_EQUITY))
}

// ME + TL
fn market_total_assets() -> Expr {
    market_equity() + col(accounting::TOTAL_LIABILITIES)
}

// ln(1 + adj[t-1] / adj[t]) - ln(1 + index return), adj = PRC * CFACPR
fn excess_return() -> Expr {
    let adjusted = col(monthly::PRICE) * col(monthly::SPLIT_FACTOR);
    let price_ratio = adjusted.clone().shift(lit(1)).over([col(monthly::KEY)]) / adjusted;
    (lit(1.0) + price_ratio).log(std::f64::consts::E)
        - (lit(1.0) + col(index::PANEL_RETURN)).log(std::f64::consts::E)
}

fn finite_or_null(value: Expr) -> Expr {
    when(value.clone().is_finite())
        .then(value)
        .otherwise(lit(NULL))
}

/// Compute the configured ratios over the panel.
///
/// The panel is put in (entity, month) order first. With `keep_all_features`
/// every panel column is kept; otherwise the output is the identifying
/// columns, `date_month` and the ratios, in that order.
pub fn derive_features(panel: &DataFrame, config: &FeatureConfig) -> Result<DataFrame> {
    config.validate()?;
    let inputs = unique_names(
        [monthly::KEY, MONTH]
            .into_iter()
            .chain(config.ratios.iter().flat_map(|r| r.required_columns().iter().copied())),
    );
    require_columns(panel, "panel", inputs)?;

    let ratio_exprs: Vec<Expr> = config
        .ratios
        .iter()
        .map(|ratio| finite_or_null(ratio.expr().cast(DataType::Float64)).alias(ratio.name()))
        .collect();

    let derived = panel
        .clone()
        .lazy()
        .sort(
            [monthly::KEY, MONTH],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .with_columns(ratio_exprs);

    let derived = if config.keep_all_features {
        derived
    } else {
        require_columns(
            panel,
            "panel",
            config.identifying_columns.iter().map(String::as_str),
        )?;
        let selected = unique_names(
            config
                .identifying_columns
                .iter()
                .map(String::as_str)
                .chain([MONTH])
                .chain(config.ratios.iter().map(|r| r.name())),
        );
        derived.select(selected.into_iter().map(|name| col(name)).collect::<Vec<_>>())
    };

    let out = derived.collect()?;
    debug!(
        rows = out.height(),
        ratios = ?config.ratios,
        keep_all = config.keep_all_features,
        "derived ratio features"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn panel() -> DataFrame {
        df!(
            "PERMNO" => &[1i64, 1, 2],
            "GVKEY" => &["001", "001", "002"],
            "conm" => &["ACME", "ACME", "BETA"],
            "cik" => &["11", "11", "22"],
            "date_month" => &[24241i32, 24240, 24240],
            "PRC" => &[12.0, 10.0, 5.0],
            "SHROUT" => &[100.0, 100.0, 0.0],
            "CFACPR" => &[1.0, 1.0, 1.0],
            "RET" => &[0.2, 0.0, 0.0],
            "atq" => &[Some(1000.0), Some(1000.0), None],
            "ceqq" => &[500.0, 500.0, 300.0],
            "cheq" => &[100.0, 100.0, 0.0],
            "ltq" => &[400.0, 400.0, 0.0],
            "niq" => &[50.0, 50.0, 10.0],
            "SIGMA" => &[0.3, 0.25, f64::NAN],
            "vwretdSP500" => &[0.01, 0.02, 0.02],
            "totvalSP500" => &[1e6, 1e6, 1e6],
        )
        .unwrap()
    }

    fn value(df: &DataFrame, column: &str, row: usize) -> Option<f64> {
        df.column(column).unwrap().f64().unwrap().get(row)
    }

    #[test]
    fn nita_matches_worked_example() {
        // PRC=10, SHROUT=100, CEQQ=500, ATQ=1000, NIQ=50
        // ME=1000, TA_adj = 1000 + 0.1 * (1000 - 500) = 1050
        let out = derive_features(&panel(), &FeatureConfig::default()).unwrap();
        // sorted by (PERMNO, date_month): row 0 is PERMNO 1 at month 24240
        assert_relative_eq!(value(&out, "NITA", 0).unwrap(), 50.0 / 1050.0, epsilon = 1e-12);
        assert_relative_eq!(value(&out, "NIMTA", 0).unwrap(), 50.0 / 1400.0, epsilon = 1e-12);
        assert_relative_eq!(value(&out, "TLTA", 0).unwrap(), 400.0 / 1050.0, epsilon = 1e-12);
        assert_relative_eq!(value(&out, "TLMTA", 0).unwrap(), 400.0 / 1400.0, epsilon = 1e-12);
        assert_relative_eq!(value(&out, "CASHMTA", 0).unwrap(), 100.0 / 1400.0, epsilon = 1e-12);
        assert_relative_eq!(value(&out, "RSIZE", 0).unwrap(), 1000.0 / 1e6, epsilon = 1e-12);
    }

    #[test]
    fn exret_lags_within_entity_only() {
        let out = derive_features(&panel(), &FeatureConfig::default()).unwrap();

        // first month of each entity has no prior price
        assert_eq!(value(&out, "EXRET", 0), None);
        assert_eq!(value(&out, "EXRET", 2), None);

        let expected = (1.0_f64 + 10.0 / 12.0).ln() - (1.0_f64 + 0.01).ln();
        assert_relative_eq!(value(&out, "EXRET", 1).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_and_missing_inputs_become_null() {
        let out = derive_features(&panel(), &FeatureConfig::default()).unwrap();
        // PERMNO 2: atq missing, ME + TL = 0, SIGMA NaN
        assert_eq!(value(&out, "NITA", 2), None);
        assert_eq!(value(&out, "NIMTA", 2), None);
        assert_eq!(value(&out, "SIGMA", 2), None);
        assert_eq!(value(&out, "SIGMA", 0), Some(0.25));
    }

    #[test]
    fn trimmed_output_is_ids_month_then_ratios() {
        let config = FeatureConfig {
            ratios: vec![Ratio::Tlmta, Ratio::Nita],
            ..FeatureConfig::default()
        };
        let out = derive_features(&panel(), &config).unwrap();
        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["PERMNO", "GVKEY", "conm", "cik", "date_month", "TLMTA", "NITA"]
        );
    }

    #[test]
    fn keep_all_features_appends_ratios_to_panel() {
        let config = FeatureConfig {
            ratios: vec![Ratio::Rsize],
            keep_all_features: true,
            ..FeatureConfig::default()
        };
        let out = derive_features(&panel(), &config).unwrap();
        assert_eq!(out.width(), panel().width() + 1);
        assert!(out.column("RSIZE").is_ok());
        assert!(out.column("NITA").is_err());
    }

    #[test]
    fn unselected_ratio_inputs_are_not_required() {
        let trimmed = panel().drop("SIGMA").unwrap();
        let config = FeatureConfig {
            ratios: vec![Ratio::Nita],
            ..FeatureConfig::default()
        };
        assert!(derive_features(&trimmed, &config).is_ok());

        let config = FeatureConfig {
            ratios: vec![Ratio::Sigma],
            ..FeatureConfig::default()
        };
        assert!(derive_features(&trimmed, &config).is_err());
    }

    #[test]
    fn ratio_names_parse_case_insensitively() {
        assert_eq!("cashmta".parse::<Ratio>().unwrap(), Ratio::Cashmta);
        assert_eq!(" EXRET ".parse::<Ratio>().unwrap(), Ratio::Exret);
        assert!("ZSCORE".parse::<Ratio>().is_err());
    }

    #[test]
    fn ratios_serialize_as_their_names() {
        let json = serde_json::to_string(&vec![Ratio::Nita, Ratio::Sigma]).unwrap();
        assert_eq!(json, r#"["NITA","SIGMA"]"#);
    }
}
