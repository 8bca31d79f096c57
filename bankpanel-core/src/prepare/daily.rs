//! Trading-daily preparer.

use crate::error::Result;
use crate::month::{date_column, month_index, warn_unreadable_dates};
use crate::schema::{daily, require_columns, require_date_like, MONTH};
use polars::prelude::*;

/// Add `date_month` to the daily file. Rows pass through unfiltered; the
/// volatility estimate is computed upstream.
pub fn prepare_daily(raw: &DataFrame) -> Result<DataFrame> {
    require_columns(raw, "daily", [daily::KEY, daily::SIGMA])?;
    require_date_like(raw, "daily", daily::DATE)?;
    warn_unreadable_dates(raw, "daily", daily::DATE)?;

    let prepared = raw
        .clone()
        .lazy()
        .with_columns([
            col(daily::KEY).cast(DataType::Int64),
            month_index(date_column(raw, daily::DATE)).alias(MONTH),
        ])
        .collect()?;
    Ok(prepared)
}
