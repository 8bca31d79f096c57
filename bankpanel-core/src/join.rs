//! Temporal join engine.
//!
//! Builds the company-month panel on top of the prepared monthly trading
//! table. Accounting data is attached point-in-time: for panel month `m` a
//! quarter is visible only at `QuarterEnd_Month + offset == m`, with offsets
//! tried freshest first. Each later offset only fills fields the earlier ones
//! left missing.
//!
//! Every stage left-joins onto its driving table, so the panel keeps exactly
//! one row per prepared monthly row. Unmatched accounting, volatility and index
//! fields stay null.

use crate::config::{LagStep, PanelConfig};
use crate::error::{PanelError, Result};
use crate::month::date_column;
use crate::schema::{accounting, daily, index, monthly, require_columns, MONTH};
use polars::prelude::*;
use tracing::debug;

/// Suffix of accounting columns arriving from a fallback lag before they are
/// coalesced into the accumulated ones.
const INCOMING_SUFFIX: &str = "__incoming";

/// The four prepared sources feeding the panel.
#[derive(Debug, Clone)]
pub struct PreparedSources {
    pub accounting: DataFrame,
    pub monthly: DataFrame,
    pub daily: DataFrame,
    pub index: DataFrame,
}

/// Attach the most recent known accounting data to every monthly trading row.
///
/// The lag window is folded left to right. The first step joins the monthly
/// backbone (projected to `trading_features`) with accounting rows whose
/// `Date_Lag{start}` equals the row month. Each later step joins the
/// accumulated panel with the next lag column and keeps the accumulated value
/// of every carried field unless it is missing. The result holds exactly
/// `config.features_to_keep()`.
pub fn merge_accounting_with_monthly(
    accounting_data: &DataFrame,
    monthly_data: &DataFrame,
    config: &PanelConfig,
) -> Result<DataFrame> {
    config.validate()?;
    let steps = config.lag_steps();
    let carried = config.carried_features();
    let keep = config.features_to_keep();

    require_columns(
        monthly_data,
        "monthly",
        config.trading_features.iter().map(String::as_str),
    )?;
    require_columns(accounting_data, "accounting", [accounting::KEY])?;
    require_columns(
        accounting_data,
        "accounting",
        steps.iter().map(|s| s.column.as_str()),
    )?;
    require_columns(accounting_data, "accounting", carried.iter().copied())?;

    let (first, fallbacks) = steps
        .split_first()
        .ok_or_else(|| PanelError::invalid_config("lag window is empty"))?;

    let backbone = monthly_data
        .clone()
        .lazy()
        .select(exprs(&config.trading_features))
        .with_column(col(monthly::KEY).cast(DataType::Int64));

    let seeded = join_lag(backbone, lag_matches(accounting_data, first, &carried, None), first)
        .select(exprs(&keep));

    let merged = fallbacks.iter().fold(seeded, |acc, step| {
        join_lag(
            acc,
            lag_matches(accounting_data, step, &carried, Some(INCOMING_SUFFIX)),
            step,
        )
        .with_columns(coalesce_carried(&carried))
        .select(exprs(&keep))
    });

    let out = merged.collect()?;
    debug!(
        backbone_rows = monthly_data.height(),
        panel_rows = out.height(),
        lags = ?config.lag_offsets(),
        "merged accounting with monthly trading"
    );
    Ok(out)
}

/// Left-join the daily volatility estimate on (entity, month).
///
/// When a month has several daily rows, the last one by date is used.
pub fn attach_daily_volatility(panel: &DataFrame, daily_data: &DataFrame) -> Result<DataFrame> {
    require_columns(panel, "panel", [monthly::KEY, MONTH])?;
    require_columns(daily_data, "daily", [daily::KEY, daily::DATE, daily::SIGMA, MONTH])?;

    let volatility = daily_data
        .clone()
        .lazy()
        .select([
            col(daily::KEY).cast(DataType::Int64),
            col(MONTH),
            date_column(daily_data, daily::DATE),
            col(daily::SIGMA),
        ])
        .sort_by_exprs(
            [col(daily::KEY), col(MONTH), col(daily::DATE)],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .unique_stable(
            Some(vec![daily::KEY.into(), MONTH.into()]),
            UniqueKeepStrategy::Last,
        )
        .select([col(daily::KEY), col(MONTH), col(daily::SIGMA)]);

    let out = ordered_left_join(
        panel.clone().lazy(),
        volatility,
        vec![col(monthly::KEY), col(MONTH)],
        vec![col(daily::KEY), col(MONTH)],
    )
    .select(exprs(&with_added(panel, &[daily::SIGMA])))
    .collect()?;
    debug!(
        rows = out.height(),
        missing_sigma = out.column(daily::SIGMA)?.null_count(),
        "attached daily volatility"
    );
    Ok(out)
}

/// Left-join the market index fields on the month alone; index values are
/// broadcast to every entity in that month.
pub fn attach_index(panel: &DataFrame, index_data: &DataFrame) -> Result<DataFrame> {
    require_columns(panel, "panel", [MONTH])?;
    require_columns(
        index_data,
        "index",
        [MONTH, index::PANEL_RETURN, index::PANEL_TOTAL_VALUE],
    )?;

    let market = index_data
        .clone()
        .lazy()
        .select([
            col(MONTH),
            col(index::PANEL_RETURN),
            col(index::PANEL_TOTAL_VALUE),
        ])
        .unique_stable(Some(vec![MONTH.into()]), UniqueKeepStrategy::Last);

    let out = ordered_left_join(
        panel.clone().lazy(),
        market,
        vec![col(MONTH)],
        vec![col(MONTH)],
    )
    .select(exprs(&with_added(
        panel,
        &[index::PANEL_RETURN, index::PANEL_TOTAL_VALUE],
    )))
    .collect()?;
    debug!(
        rows = out.height(),
        missing_index = out.column(index::PANEL_RETURN)?.null_count(),
        "attached market index"
    );
    Ok(out)
}

/// Run the full join: accounting fallback chain, daily volatility, market
/// index. The panel comes back sorted by (entity, month).
pub fn build_panel(sources: &PreparedSources, config: &PanelConfig) -> Result<DataFrame> {
    let panel = merge_accounting_with_monthly(&sources.accounting, &sources.monthly, config)?;
    let panel = attach_daily_volatility(&panel, &sources.daily)?;
    let panel = attach_index(&panel, &sources.index)?;

    let sorted = panel
        .lazy()
        .sort(
            [monthly::KEY, MONTH],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;
    Ok(sorted)
}

/// Accounting rows visible at one lag offset, keyed by (entity, reference
/// month). One row per key: the first filing wins, so a join never duplicates
/// panel rows.
fn lag_matches(
    accounting_data: &DataFrame,
    step: &LagStep,
    carried: &[&str],
    suffix: Option<&str>,
) -> LazyFrame {
    let mut columns = vec![
        col(accounting::KEY).cast(DataType::Int64),
        col(step.column.as_str()),
    ];
    columns.extend(carried.iter().map(|name| match suffix {
        Some(suffix) => col(*name).alias(format!("{name}{suffix}")),
        None => col(*name),
    }));

    accounting_data
        .clone()
        .lazy()
        .select(columns)
        .filter(
            col(accounting::KEY)
                .is_not_null()
                .and(col(step.column.as_str()).is_not_null()),
        )
        .unique_stable(
            Some(vec![accounting::KEY.into(), step.column.as_str().into()]),
            UniqueKeepStrategy::First,
        )
}

fn join_lag(panel: LazyFrame, matches: LazyFrame, step: &LagStep) -> LazyFrame {
    ordered_left_join(
        panel,
        matches,
        vec![col(monthly::KEY), col(MONTH)],
        vec![col(accounting::KEY), col(step.column.as_str())],
    )
}

/// Left join that keeps every driving row, in the driving table's order.
pub(crate) fn ordered_left_join(
    driving: LazyFrame,
    other: LazyFrame,
    left_on: Vec<Expr>,
    right_on: Vec<Expr>,
) -> LazyFrame {
    let mut args = JoinArgs::new(JoinType::Left);
    args.maintain_order = MaintainOrderJoin::Left;
    driving.join(other, left_on, right_on, args)
}

/// Column names of `panel` followed by the joined-in columns.
fn with_added<'a>(panel: &'a DataFrame, added: &[&'a str]) -> Vec<&'a str> {
    let mut names: Vec<&str> = panel
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| !added.contains(name))
        .collect();
    names.extend_from_slice(added);
    names
}

/// Keep the accumulated value of each carried field; fill only its missing
/// values from the incoming fallback match.
fn coalesce_carried(carried: &[&str]) -> Vec<Expr> {
    carried
        .iter()
        .map(|name| {
            col(*name)
                .fill_null(col(format!("{name}{INCOMING_SUFFIX}")))
                .alias(*name)
        })
        .collect()
}

fn exprs<S: AsRef<str>>(names: &[S]) -> Vec<Expr> {
    names.iter().map(|name| col(name.as_ref())).collect()
}
