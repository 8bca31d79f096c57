//! Label deriver: forward-looking bankruptcy indicators per horizon.

use crate::config::LabelConfig;
use crate::error::Result;
use crate::join::ordered_left_join;
use crate::month::{date_column, month_index};
use crate::schema::{delisting, monthly, require_columns, require_date_like, unique_names, MONTH};
use polars::prelude::*;
use tracing::debug;

/// Indicator column for a horizon of `months`.
pub fn horizon_column(months: u32) -> String {
    format!("bankruptcyWithin{months}Months")
}

/// Derive one 0/1 indicator per configured horizon.
///
/// `x` must carry the delisting date and reason next to the panel columns.
/// A row is labelled 1 for horizon `N` when its delisting reason is the
/// bankruptcy code and `date_month + N` reaches the delisting month.
///
/// With `drop_na`, rows missing any value outside the delisting fields are
/// dropped first; a missing delisting only means no event.
pub fn derive_labels(x: &DataFrame, config: &LabelConfig) -> Result<DataFrame> {
    config.validate()?;
    require_columns(
        x,
        "panel",
        config
            .identifying_columns
            .iter()
            .map(String::as_str)
            .chain([MONTH, delisting::REASON]),
    )?;
    require_date_like(x, "panel", delisting::DATE)?;

    let mut lf = x.clone().lazy();
    if config.drop_na {
        if let Some(complete) = complete_rows(x) {
            lf = lf.filter(complete);
        }
    }

    let bankrupt = col(delisting::REASON)
        .cast(DataType::Float64)
        .eq(lit(delisting::BANKRUPTCY_REASON as f64));

    let mut indicators = Vec::with_capacity(config.horizons.len());
    for &months in &config.horizons {
        // validated to fit in i32
        let reach = col(MONTH) + lit(months as i32);
        indicators.push(
            when(bankrupt.clone().and(reach.gt_eq(col(delisting::MONTH))))
                .then(lit(1i32))
                .otherwise(lit(0i32))
                .alias(horizon_column(months)),
        );
    }

    let indicator_names: Vec<String> = config.horizons.iter().map(|&n| horizon_column(n)).collect();
    let selected = unique_names(
        config
            .identifying_columns
            .iter()
            .map(String::as_str)
            .chain([MONTH])
            .chain(indicator_names.iter().map(String::as_str)),
    );

    let out = lf
        .with_column(month_index(date_column(x, delisting::DATE)).alias(delisting::MONTH))
        .with_columns(indicators)
        .select(selected.into_iter().map(|name| col(name)).collect::<Vec<_>>())
        .collect()?;

    debug!(
        rows_in = x.height(),
        rows_out = out.height(),
        horizons = ?config.horizons,
        "derived bankruptcy labels"
    );
    Ok(out)
}

/// Attach a per-entity delisting record (`PERMNO`, `dldte`, `dlrsn`) to the
/// panel. Delisting fields already on the panel are replaced. When an entity
/// has several records the last one wins.
pub fn attach_delisting(x: &DataFrame, delisting_data: &DataFrame) -> Result<DataFrame> {
    require_columns(x, "panel", [monthly::KEY])?;
    require_columns(delisting_data, "delisting", [monthly::KEY, delisting::REASON])?;
    require_date_like(delisting_data, "delisting", delisting::DATE)?;

    let records = delisting_data
        .clone()
        .lazy()
        .select([
            col(monthly::KEY).cast(DataType::Int64),
            col(delisting::DATE),
            col(delisting::REASON),
        ])
        .unique_stable(Some(vec![monthly::KEY.into()]), UniqueKeepStrategy::Last);

    let panel_columns: Vec<&str> = x
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| *name != delisting::DATE && *name != delisting::REASON)
        .collect();
    let panel = x
        .clone()
        .lazy()
        .select(panel_columns.iter().map(|name| col(*name)).collect::<Vec<_>>())
        .with_column(col(monthly::KEY).cast(DataType::Int64));

    let out = ordered_left_join(panel, records, vec![col(monthly::KEY)], vec![col(monthly::KEY)])
        .select(
            panel_columns
                .iter()
                .copied()
                .chain([delisting::DATE, delisting::REASON])
                .map(|name| col(name))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    debug!(
        rows = out.height(),
        delisted = out.height() - out.column(delisting::REASON)?.null_count(),
        "attached delisting records"
    );
    Ok(out)
}

/// Row predicate: every non-delisting column is present and, for floats, not NaN.
fn complete_rows(x: &DataFrame) -> Option<Expr> {
    x.schema()
        .iter()
        .filter(|(name, _)| name.as_str() != delisting::DATE && name.as_str() != delisting::REASON)
        .map(|(name, dtype)| {
            let present = col(name.as_str()).is_not_null();
            if dtype.is_float() {
                present.and(col(name.as_str()).is_not_nan())
            } else {
                present
            }
        })
        .reduce(|acc, next| acc.and(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::month::YearMonth;
    use crate::PanelError;
    use chrono::NaiveDate;

    fn ym(year: i32, month: u32) -> i32 {
        YearMonth::new(year, month).unwrap().index()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn config(horizons: Vec<u32>) -> LabelConfig {
        LabelConfig {
            horizons,
            ..LabelConfig::default()
        }
    }

    fn indicator(df: &DataFrame, months: u32) -> Vec<Option<i32>> {
        df.column(&horizon_column(months))
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn horizon_names_follow_month_count() {
        assert_eq!(horizon_column(12), "bankruptcyWithin12Months");
    }

    #[test]
    fn bankruptcy_six_months_out_sets_only_longer_horizons() {
        let x = df!(
            "PERMNO" => &[1i64],
            "GVKEY" => &["001"],
            "conm" => &["ACME"],
            "date_month" => &[ym(2020, 1)],
            "dldte" => &[date(2020, 7, 15)],
            "dlrsn" => &[2i64],
        )
        .unwrap();

        let out = derive_labels(&x, &config(vec![3, 6, 12])).unwrap();

        assert_eq!(indicator(&out, 3), vec![Some(0)]);
        assert_eq!(indicator(&out, 6), vec![Some(1)]);
        assert_eq!(indicator(&out, 12), vec![Some(1)]);
    }

    #[test]
    fn other_delisting_reasons_never_label() {
        let x = df!(
            "PERMNO" => &[1i64, 2],
            "GVKEY" => &["001", "002"],
            "conm" => &["ACME", "BETA"],
            "date_month" => &[ym(2020, 1), ym(2020, 1)],
            "dldte" => &[date(2020, 2, 1), date(2020, 2, 1)],
            "dlrsn" => &[3i64, 1],
        )
        .unwrap();

        let out = derive_labels(&x, &LabelConfig::default()).unwrap();
        for months in LabelConfig::default().horizons {
            assert_eq!(indicator(&out, months), vec![Some(0), Some(0)]);
        }
    }

    #[test]
    fn output_columns_are_ids_month_then_horizons_in_order() {
        let x = df!(
            "PERMNO" => &[1i64],
            "GVKEY" => &["001"],
            "conm" => &["ACME"],
            "date_month" => &[ym(2020, 1)],
            "NITA" => &[0.1],
            "dldte" => &[date(2021, 1, 1)],
            "dlrsn" => &[2i64],
        )
        .unwrap();

        let out = derive_labels(&x, &config(vec![24, 3])).unwrap();
        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "PERMNO",
                "GVKEY",
                "conm",
                "date_month",
                "bankruptcyWithin24Months",
                "bankruptcyWithin3Months",
            ]
        );
    }

    #[test]
    fn drop_na_removes_incomplete_feature_rows_but_not_undelisted_ones() {
        let x = df!(
            "PERMNO" => &[1i64, 2, 3],
            "GVKEY" => &["001", "002", "003"],
            "conm" => &["ACME", "BETA", "GAMMA"],
            "date_month" => &[ym(2020, 1), ym(2020, 1), ym(2020, 1)],
            "NITA" => &[Some(0.1), None, Some(f64::NAN)],
            "dldte" => &[None::<NaiveDate>, None, None],
            "dlrsn" => &[None::<i64>, None, None],
        )
        .unwrap();

        let out = derive_labels(&x, &LabelConfig::default()).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(indicator(&out, 60), vec![Some(0)]);

        let keep = LabelConfig {
            drop_na: false,
            ..LabelConfig::default()
        };
        assert_eq!(derive_labels(&x, &keep).unwrap().height(), 3);
    }

    #[test]
    fn string_delisting_dates_are_read() {
        let x = df!(
            "PERMNO" => &[1i64],
            "GVKEY" => &["001"],
            "conm" => &["ACME"],
            "date_month" => &[ym(2020, 1)],
            "dldte" => &["2020-04-30"],
            "dlrsn" => &["2"],
        )
        .unwrap();

        let out = derive_labels(&x, &config(vec![3])).unwrap();
        assert_eq!(indicator(&out, 3), vec![Some(1)]);
    }

    #[test]
    fn missing_delisting_reason_is_a_schema_error() {
        let x = df!(
            "PERMNO" => &[1i64],
            "GVKEY" => &["001"],
            "conm" => &["ACME"],
            "date_month" => &[ym(2020, 1)],
            "dldte" => &[date(2020, 2, 1)],
        )
        .unwrap();

        assert!(matches!(
            derive_labels(&x, &LabelConfig::default()),
            Err(PanelError::Schema(_))
        ));
    }

    #[test]
    fn attach_delisting_keeps_panel_rows_and_order() {
        let x = df!(
            "PERMNO" => &[2i64, 1, 2, 3],
            "date_month" => &[ym(2020, 1), ym(2020, 1), ym(2020, 2), ym(2020, 1)],
            "dlrsn" => &[9i64, 9, 9, 9],
        )
        .unwrap();
        let records = df!(
            "PERMNO" => &[2i64, 1, 1],
            "dldte" => &[date(2020, 6, 30), date(2019, 1, 31), date(2020, 3, 31)],
            "dlrsn" => &[2i64, 1, 2],
        )
        .unwrap();

        let out = attach_delisting(&x, &records).unwrap();

        assert_eq!(out.height(), 4);
        let keys: Vec<Option<i64>> = out.column("PERMNO").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(keys, vec![Some(2), Some(1), Some(2), Some(3)]);
        let reasons: Vec<Option<i64>> = out.column("dlrsn").unwrap().i64().unwrap().into_iter().collect();
        // existing reasons replaced; entity 1 keeps its last record; entity 3 has none
        assert_eq!(reasons, vec![Some(2), Some(2), Some(2), None]);
    }
}
