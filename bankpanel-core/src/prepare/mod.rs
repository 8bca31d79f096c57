//! Source preparers: clean, filter and month-index each raw source
//! independently. None of them depends on another, so a host can run them in
//! parallel.

pub mod accounting;
pub mod daily;
pub mod index;
pub mod monthly;

pub use accounting::{prepare_accounting, FiscalQuarter};
pub use daily::prepare_daily;
pub use index::prepare_index;
pub use monthly::prepare_monthly;

use polars::prelude::*;

/// Industry codes in [6000, 7000) are financial and regulated firms, which are
/// excluded from the panel. Null codes fail the predicate.
pub(crate) fn outside_financial_range(industry: Expr) -> Expr {
    industry
        .clone()
        .lt(lit(6000.0))
        .or(industry.gt_eq(lit(7000.0)))
}

/// Membership test against a small fixed set of numeric codes.
pub(crate) fn is_one_of(value: Expr, codes: &[i64]) -> Expr {
    codes
        .iter()
        .fold(lit(false), |acc, code| acc.or(value.clone().eq(lit(*code as f64))))
}
