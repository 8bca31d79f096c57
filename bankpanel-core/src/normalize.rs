//! Record normalizer for vendor bankruptcy filings.
//!
//! Security identifiers arrive as `"<company id> US Equity"` and the free-text
//! fields carry fixed labels (`"Filing Type: ..."`, `"Name: ..."`). A missing
//! marker means the upstream record is malformed, and that is reported with
//! the offending row instead of passing the raw text through.

use crate::config::BankruptcyConfig;
use crate::error::{PanelError, Result};
use crate::month::{date_column, warn_unreadable_dates};
use crate::schema::{bankruptcy, require_columns};
use polars::prelude::*;
use thiserror::Error;
use tracing::debug;

pub const SECURITY_SUFFIX: &str = " US Equity";
pub const FILING_TYPE_PREFIX: &str = "Filing Type: ";
pub const NAME_PREFIX: &str = "Name: ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("marker {marker:?} not found in {value:?}")]
    MissingMarker { marker: &'static str, value: String },

    #[error("label {prefix:?} not found in {value:?}")]
    MissingPrefix { prefix: &'static str, value: String },

    #[error("identifier is empty in {value:?}")]
    EmptyIdentifier { value: String },

    #[error("value is missing")]
    MissingValue,
}

/// Company identifier of a composite security identifier:
/// `"ABC123 US Equity"` → `"ABC123"`.
pub fn extract_entity_id(security_id: &str) -> std::result::Result<&str, NormalizeError> {
    let (id, _) = security_id
        .split_once(SECURITY_SUFFIX)
        .ok_or_else(|| NormalizeError::MissingMarker {
            marker: SECURITY_SUFFIX,
            value: security_id.to_string(),
        })?;
    if id.is_empty() {
        return Err(NormalizeError::EmptyIdentifier {
            value: security_id.to_string(),
        });
    }
    Ok(id)
}

/// An entity is public iff its identifier starts with a letter.
pub fn is_public_entity(entity_id: &str) -> bool {
    entity_id
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
}

pub fn extract_filing_type(field: &str) -> std::result::Result<&str, NormalizeError> {
    after_label(field, FILING_TYPE_PREFIX)
}

pub fn extract_entity_name(field: &str) -> std::result::Result<&str, NormalizeError> {
    after_label(field, NAME_PREFIX)
}

// Text between the first occurrence of the label and the next one (or the end).
fn after_label<'a>(
    field: &'a str,
    prefix: &'static str,
) -> std::result::Result<&'a str, NormalizeError> {
    field
        .split(prefix)
        .nth(1)
        .ok_or_else(|| NormalizeError::MissingPrefix {
            prefix,
            value: field.to_string(),
        })
}

/// Format a raw bankruptcy export into
/// `companyID, companyName, Announce/Declared Date, Effective Date, filingType, isPublic`.
///
/// Dates are normalized to `Date` (unreadable dates become null). With
/// `public_only`, private entities are dropped.
pub fn format_bankruptcy_table(raw: &DataFrame, config: &BankruptcyConfig) -> Result<DataFrame> {
    require_columns(
        raw,
        "bankruptcy",
        [
            bankruptcy::SECURITY_ID,
            bankruptcy::FILING_TYPE,
            bankruptcy::COMPANY_NAME,
            bankruptcy::ANNOUNCE_DATE,
            bankruptcy::EFFECTIVE_DATE,
        ],
    )?;

    let company_ids = map_text_column(raw, bankruptcy::SECURITY_ID, extract_entity_id)?;
    let is_public: Vec<i32> = company_ids
        .iter()
        .map(|id| i32::from(is_public_entity(id)))
        .collect();
    let filing_types = map_text_column(raw, bankruptcy::FILING_TYPE, extract_filing_type)?;
    let names = map_text_column(raw, bankruptcy::COMPANY_NAME, extract_entity_name)?;

    let formatted = DataFrame::new(vec![
        Column::new(bankruptcy::COMPANY_ID.into(), company_ids),
        Column::new(bankruptcy::COMPANY_NAME.into(), names),
        raw.column(bankruptcy::ANNOUNCE_DATE)?.clone(),
        raw.column(bankruptcy::EFFECTIVE_DATE)?.clone(),
        Column::new(bankruptcy::FILING_TYPE.into(), filing_types),
        Column::new(bankruptcy::IS_PUBLIC.into(), is_public),
    ])?;

    for column in [bankruptcy::ANNOUNCE_DATE, bankruptcy::EFFECTIVE_DATE] {
        warn_unreadable_dates(&formatted, "bankruptcy", column)?;
    }
    let mut lf = formatted.clone().lazy().with_columns([
        date_column(&formatted, bankruptcy::ANNOUNCE_DATE),
        date_column(&formatted, bankruptcy::EFFECTIVE_DATE),
    ]);
    if config.public_only {
        lf = lf.filter(col(bankruptcy::IS_PUBLIC).eq(lit(1)));
    }
    let out = lf.collect()?;

    debug!(
        input_rows = raw.height(),
        output_rows = out.height(),
        public_only = config.public_only,
        "formatted bankruptcy records"
    );
    Ok(out)
}

fn map_text_column<F>(raw: &DataFrame, column: &str, extract: F) -> Result<Vec<String>>
where
    F: for<'a> Fn(&'a str) -> std::result::Result<&'a str, NormalizeError>,
{
    let values = raw.column(column)?.cast(&DataType::String)?;
    values
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .ok_or(NormalizeError::MissingValue)
                .and_then(&extract)
                .map(str::to_string)
                .map_err(|source| PanelError::MalformedRecord {
                    column: column.to_string(),
                    row,
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn entity_id_strips_equity_suffix() {
        assert_eq!(extract_entity_id("ABC123 US Equity").unwrap(), "ABC123");
    }

    #[test]
    fn entity_id_without_suffix_is_malformed() {
        let err = extract_entity_id("ABC123 LN Equity").unwrap_err();
        assert!(matches!(err, NormalizeError::MissingMarker { .. }));
    }

    #[test]
    fn entity_id_that_is_only_the_suffix_is_malformed() {
        let err = extract_entity_id(" US Equity").unwrap_err();
        assert!(matches!(err, NormalizeError::EmptyIdentifier { .. }));
    }

    #[test]
    fn public_classification_uses_first_character() {
        assert!(is_public_entity("ABC123"));
        assert!(is_public_entity("z9"));
        assert!(!is_public_entity("1234567D"));
        assert!(!is_public_entity(""));
    }

    #[test]
    fn labels_are_stripped() {
        assert_eq!(
            extract_filing_type("Filing Type: Chapter 11").unwrap(),
            "Chapter 11"
        );
        assert_eq!(extract_entity_name("Name: Acme Corp").unwrap(), "Acme Corp");
    }

    #[test]
    fn missing_label_is_malformed() {
        assert!(matches!(
            extract_entity_name("Acme Corp"),
            Err(NormalizeError::MissingPrefix { prefix: NAME_PREFIX, .. })
        ));
    }

    fn raw_filings() -> DataFrame {
        df!(
            "Security ID" => &["ABC US Equity", "1234567D US Equity", "XYZ US Equity"],
            "filingType" => &["Filing Type: Chapter 11", "Filing Type: Chapter 7", "Filing Type: Chapter 11"],
            "companyName" => &["Name: Abc Inc", "Name: Private Holdings", "Name: Xyz Corp"],
            "Announce/Declared Date" => &["2019-05-01", "2019-06-15", "2020-01-02"],
            "Effective Date" => &["2019-05-02", "2019-06-16", "not a date"],
        )
        .unwrap()
    }

    #[test]
    fn format_produces_normalized_columns_in_order() {
        let out = format_bankruptcy_table(&raw_filings(), &BankruptcyConfig::default()).unwrap();

        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "companyID",
                "companyName",
                "Announce/Declared Date",
                "Effective Date",
                "filingType",
                "isPublic"
            ]
        );
        assert_eq!(out.height(), 3);

        let ids = out.column("companyID").unwrap().str().unwrap();
        assert_eq!(ids.get(1), Some("1234567D"));
        let public = out.column("isPublic").unwrap().i32().unwrap();
        assert_eq!(public.get(0), Some(1));
        assert_eq!(public.get(1), Some(0));
        assert_eq!(out.column("Effective Date").unwrap().dtype(), &DataType::Date);
        assert_eq!(out.column("Effective Date").unwrap().null_count(), 1);
    }

    #[test]
    fn format_reads_us_style_announce_dates() {
        let mut raw = raw_filings();
        raw.with_column(Column::new(
            "Announce/Declared Date".into(),
            &["05/01/2019", "2019/06/15", "20200102"],
        ))
        .unwrap();

        let out = format_bankruptcy_table(&raw, &BankruptcyConfig::default()).unwrap();
        let announced = out.column("Announce/Declared Date").unwrap();
        assert_eq!(announced.dtype(), &DataType::Date);
        assert_eq!(announced.null_count(), 0);
        assert_eq!(
            announced.date().unwrap().as_date_iter().collect::<Vec<_>>(),
            vec![
                NaiveDate::from_ymd_opt(2019, 5, 1),
                NaiveDate::from_ymd_opt(2019, 6, 15),
                NaiveDate::from_ymd_opt(2020, 1, 2),
            ]
        );
    }

    #[test]
    fn format_can_keep_public_entities_only() {
        let config = BankruptcyConfig { public_only: true };
        let out = format_bankruptcy_table(&raw_filings(), &config).unwrap();

        assert_eq!(out.height(), 2);
        let ids = out.column("companyID").unwrap().str().unwrap();
        assert_eq!(ids.get(0), Some("ABC"));
        assert_eq!(ids.get(1), Some("XYZ"));
    }

    #[test]
    fn format_reports_the_malformed_row() {
        let raw = df!(
            "Security ID" => &["ABC US Equity", "DEF"],
            "filingType" => &["Filing Type: Chapter 11", "Filing Type: Chapter 7"],
            "companyName" => &["Name: Abc Inc", "Name: Def Inc"],
            "Announce/Declared Date" => &["2019-05-01", "2019-06-15"],
            "Effective Date" => &["2019-05-02", "2019-06-16"],
        )
        .unwrap();

        let err = format_bankruptcy_table(&raw, &BankruptcyConfig::default()).unwrap_err();
        match err {
            PanelError::MalformedRecord { column, row, .. } => {
                assert_eq!(column, "Security ID");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
