//! Accounting preparer.
//!
//! Turns each fiscal-quarter row into the set of panel months at which that
//! quarter is the most recent known filing: `QuarterEnd_Month + offset` for
//! each offset in the lag window.

use super::{is_one_of, outside_financial_range};
use crate::config::LAG_WINDOW;
use crate::error::Result;
use crate::month::YearMonth;
use crate::schema::{accounting, lag_column, require_columns};
use polars::prelude::*;
use tracing::{debug, warn};

/// A calendar quarter parsed from a compact code such as `"2020Q1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalQuarter {
    pub year: i32,
    pub quarter: u32,
}

impl FiscalQuarter {
    /// Parse `YYYYQn`, `YYYY-Qn` or `YYYYn`. Returns `None` for anything else.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        let year = code.get(..4)?;
        if !year.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let quarter = code
            .get(4..)?
            .trim_start_matches(['-', 'Q', 'q'])
            .parse::<u32>()
            .ok()
            .filter(|q| (1..=4).contains(q))?;
        Some(Self {
            year: year.parse().ok()?,
            quarter,
        })
    }

    pub fn start_month(self) -> YearMonth {
        YearMonth::from_index(self.year * 12 + (self.quarter as i32 - 1) * 3)
    }

    pub fn end_month(self) -> YearMonth {
        self.start_month().plus_months(2)
    }
}

/// Filter the accounting file and derive quarter and lagged reference months.
///
/// Keeps non-financial industries on the valid U.S. exchanges, parses
/// `datacqtr` into `CalendarYear`/`Quarter`, derives `QuarterStart_Month` and
/// `QuarterEnd_Month`, and adds `Date_Lag{k}` for the three offsets starting
/// at `months_to_lag`. Rows with an unreadable quarter code get null months and
/// can never match a panel month.
pub fn prepare_accounting(raw: &DataFrame, months_to_lag: u32) -> Result<DataFrame> {
    require_columns(
        raw,
        "accounting",
        [
            accounting::KEY,
            accounting::QUARTER,
            accounting::INDUSTRY,
            accounting::EXCHANGE,
        ],
    )?;

    let mut prepared = raw
        .clone()
        .lazy()
        .with_columns([
            col(accounting::KEY).cast(DataType::Int64),
            col(accounting::INDUSTRY).cast(DataType::Float64),
            col(accounting::EXCHANGE).cast(DataType::Float64),
        ])
        .filter(
            outside_financial_range(col(accounting::INDUSTRY))
                .and(is_one_of(col(accounting::EXCHANGE), &accounting::VALID_EXCHANGES)),
        )
        .collect()?;

    let quarters = parse_quarters(&prepared)?;
    let unparsed = quarters.iter().filter(|q| q.is_none()).count();
    if unparsed > 0 {
        warn!(rows = unparsed, "accounting rows with unreadable quarter codes");
    }

    let starts: Vec<Option<YearMonth>> =
        quarters.iter().map(|q| q.map(FiscalQuarter::start_month)).collect();
    let ends: Vec<Option<YearMonth>> =
        quarters.iter().map(|q| q.map(FiscalQuarter::end_month)).collect();

    prepared.with_column(Column::new(
        accounting::CALENDAR_YEAR.into(),
        quarters.iter().map(|q| q.map(|q| q.year)).collect::<Vec<_>>(),
    ))?;
    prepared.with_column(Column::new(
        accounting::QUARTER_NUMBER.into(),
        quarters
            .iter()
            .map(|q| q.map(|q| q.quarter as i32))
            .collect::<Vec<_>>(),
    ))?;
    prepared.with_column(month_column(accounting::QUARTER_START.to_string(), &starts, 0))?;
    prepared.with_column(month_column(accounting::QUARTER_END.to_string(), &ends, 0))?;
    for offset in (0..LAG_WINDOW).map(|i| months_to_lag + i) {
        prepared.with_column(month_column(lag_column(offset), &ends, offset as i32))?;
    }

    debug!(
        input_rows = raw.height(),
        output_rows = prepared.height(),
        months_to_lag,
        "prepared accounting data"
    );
    Ok(prepared)
}

fn parse_quarters(df: &DataFrame) -> Result<Vec<Option<FiscalQuarter>>> {
    let codes = df.column(accounting::QUARTER)?.cast(&DataType::String)?;
    let parsed = codes
        .str()?
        .into_iter()
        .map(|code| code.and_then(FiscalQuarter::parse))
        .collect();
    Ok(parsed)
}

fn month_column(name: String, months: &[Option<YearMonth>], shift: i32) -> Column {
    let values: Vec<Option<i32>> = months
        .iter()
        .map(|m| m.map(|m| m.plus_months(shift).index()))
        .collect();
    Column::new(name.into(), values)
}
