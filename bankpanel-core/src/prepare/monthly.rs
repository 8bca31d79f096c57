//! Trading-monthly preparer.

use super::{is_one_of, outside_financial_range};
use crate::error::Result;
use crate::month::{date_column, month_index, warn_unreadable_dates};
use crate::schema::{monthly, require_columns, require_date_like, MONTH};
use polars::prelude::*;
use tracing::debug;

const COMMON_SHARE_CODES: [i64; 2] = [10, 11];

/// Returns at or below this value are delisting sentinel codes.
const RETURN_FLOOR: f64 = -50.0;

/// Filter the monthly security file and add `date_month`.
///
/// Filters, in order: industry outside [6000, 7000), share code 10 or 11,
/// share class blank or `"A"`, return numeric and above -50. Industry, share
/// code and return are coerced to numbers first; anything unparseable becomes
/// null and fails its filter. Applying the preparer to its own output returns
/// the same table.
pub fn prepare_monthly(raw: &DataFrame) -> Result<DataFrame> {
    require_columns(
        raw,
        "monthly",
        [
            monthly::KEY,
            monthly::INDUSTRY,
            monthly::SHARE_CODE,
            monthly::SHARE_CLASS,
            monthly::RETURN,
        ],
    )?;
    require_date_like(raw, "monthly", monthly::DATE)?;
    warn_unreadable_dates(raw, "monthly", monthly::DATE)?;

    let prepared = raw
        .clone()
        .lazy()
        .with_columns([
            col(monthly::KEY).cast(DataType::Int64),
            month_index(date_column(raw, monthly::DATE)).alias(MONTH),
            col(monthly::INDUSTRY).cast(DataType::Float64),
        ])
        .filter(outside_financial_range(col(monthly::INDUSTRY)))
        .with_column(col(monthly::SHARE_CODE).cast(DataType::Float64))
        .filter(is_one_of(col(monthly::SHARE_CODE), &COMMON_SHARE_CODES))
        .with_column(col(monthly::SHARE_CLASS).cast(DataType::String))
        .filter(
            col(monthly::SHARE_CLASS)
                .is_null()
                .or(col(monthly::SHARE_CLASS).eq(lit("")))
                .or(col(monthly::SHARE_CLASS).eq(lit("A"))),
        )
        .with_column(col(monthly::RETURN).cast(DataType::Float64))
        .filter(col(monthly::RETURN).gt(lit(RETURN_FLOOR)))
        .collect()?;

    debug!(
        input_rows = raw.height(),
        output_rows = prepared.height(),
        "prepared monthly trading data"
    );
    Ok(prepared)
}
