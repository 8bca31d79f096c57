//! Calendar-month time axis.
//!
//! Inside the panel a month is stored as a single `Int32` month index,
//! `year * 12 + (month - 1)`. Adding N months is plain integer addition, which
//! keeps lag and horizon arithmetic trivially correct across year boundaries.

use crate::error::Result;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Layouts tried, in order, when dates arrive as text.
pub const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth(i32);

impl YearMonth {
    /// Returns `None` when `month` is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self(year * 12 + month as i32 - 1))
        } else {
            None
        }
    }

    pub fn from_index(index: i32) -> Self {
        Self(index)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.year() * 12 + date.month0() as i32)
    }

    /// The raw month index as stored in `date_month` columns.
    pub fn index(self) -> i32 {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.div_euclid(12)
    }

    pub fn month(self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }

    pub fn plus_months(self, months: i32) -> Self {
        Self(self.0 + months)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// Map a date expression to its month index. Nulls stay null.
pub fn month_index(date: Expr) -> Expr {
    let date = date.cast(DataType::Date);
    (date.clone().dt().year().cast(DataType::Int32) * lit(12)
        + date.dt().month().cast(DataType::Int32)
        - lit(1))
    .cast(DataType::Int32)
}

/// Read `column` of `df` as a `Date` expression.
///
/// Text is matched against [`DATE_FORMATS`], first hit wins; integers are read
/// as `YYYYMMDD`. Anything no layout accepts becomes null.
pub fn date_column(df: &DataFrame, column: &str) -> Expr {
    let date = match df.schema().get(column) {
        Some(DataType::String) => parse_text_date(col(column)),
        Some(dtype) if dtype.is_integer() => parse_text_date(col(column).cast(DataType::String)),
        _ => col(column).cast(DataType::Date),
    };
    date.alias(column)
}

fn parse_text_date(text: Expr) -> Expr {
    let mut candidates: Vec<Expr> = DATE_FORMATS
        .iter()
        .map(|format| {
            text.clone().str().to_date(StrptimeOptions {
                format: Some((*format).into()),
                strict: false,
                exact: true,
                cache: true,
            })
        })
        .collect();
    candidates.push(text.cast(DataType::Date));
    coalesce(&candidates)
}

/// Warn with the number of present values in `column` that are not readable
/// as dates. Those rows end up with a null month and match nothing.
pub(crate) fn warn_unreadable_dates(df: &DataFrame, table: &str, column: &str) -> Result<usize> {
    let flagged = df
        .clone()
        .lazy()
        .select([date_column(df, column)
            .is_null()
            .and(col(column).is_not_null())
            .alias("unreadable")])
        .collect()?;
    let unreadable = flagged.column("unreadable")?.bool()?.num_trues();
    if unreadable > 0 {
        warn!(table, column, rows = unreadable, "unreadable dates left without a month");
    }
    Ok(unreadable)
}
