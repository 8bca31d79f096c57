//! Market-index preparer.

use crate::error::Result;
use crate::month::{date_column, month_index, warn_unreadable_dates};
use crate::schema::{index, require_columns, require_date_like, MONTH};
use polars::prelude::*;

/// The index file quotes total market value in thousands.
const TOTAL_VALUE_SCALE: f64 = 1000.0;

/// Month-index the market index file, rescale total value to units and rename
/// the return and total value to their panel names (`vwretdSP500`,
/// `totvalSP500`). The original date column is dropped.
pub fn prepare_index(raw: &DataFrame) -> Result<DataFrame> {
    require_columns(raw, "index", [index::RETURN, index::TOTAL_VALUE])?;
    require_date_like(raw, "index", index::DATE)?;
    warn_unreadable_dates(raw, "index", index::DATE)?;

    let replaced = [index::DATE, index::RETURN, index::TOTAL_VALUE];
    let mut columns: Vec<Expr> = raw
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| !replaced.contains(name))
        .map(|name| col(name))
        .collect();
    columns.extend([
        month_index(date_column(raw, index::DATE)).alias(MONTH),
        col(index::RETURN)
            .cast(DataType::Float64)
            .alias(index::PANEL_RETURN),
        (col(index::TOTAL_VALUE).cast(DataType::Float64) * lit(TOTAL_VALUE_SCALE))
            .alias(index::PANEL_TOTAL_VALUE),
    ]);

    let prepared = raw.clone().lazy().select(columns).collect()?;
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::month::YearMonth;
    use approx::assert_relative_eq;

    #[test]
    fn renames_rescales_and_drops_date() {
        let raw = df!(
            "caldt" => &["2020-01-31", "2020-02-28"],
            "vwretd" => &[0.01, -0.02],
            "totval" => &[25_000_000.0, 24_500_000.0],
        )
        .unwrap();

        let out = prepare_index(&raw).unwrap();

        assert!(out.column("caldt").is_err());
        assert!(out.column("vwretd").is_err());
        assert!(out.column("totval").is_err());

        let total = out.column("totvalSP500").unwrap().f64().unwrap();
        assert_relative_eq!(total.get(0).unwrap(), 25_000_000_000.0);
        let months = out.column("date_month").unwrap().i32().unwrap();
        assert_eq!(months.get(1), Some(YearMonth::new(2020, 2).unwrap().index()));
        let ret = out.column("vwretdSP500").unwrap().f64().unwrap();
        assert_relative_eq!(ret.get(1).unwrap(), -0.02);
    }
}
