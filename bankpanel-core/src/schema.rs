//! Column contract for vendor sources and derived tables.
//!
//! Raw column names follow the vendor files (CRSP monthly/daily, the
//! CRSP/Compustat merged quarterly file, the S&P 500 index file and the
//! Bloomberg bankruptcy export). They are fixed by design; only the feature
//! lists in [`crate::config`] select among them.

use polars::prelude::*;

/// Month index column shared by every prepared table and the panel.
pub const MONTH: &str = "date_month";

/// CRSP/Compustat merged quarterly accounting file.
pub mod accounting {
    pub const KEY: &str = "LPERMNO";
    pub const QUARTER: &str = "datacqtr";
    pub const INDUSTRY: &str = "sic";
    pub const EXCHANGE: &str = "exchg";

    pub const TOTAL_ASSETS: &str = "atq";
    pub const COMMON_EQUITY: &str = "ceqq";
    pub const CASH: &str = "cheq";
    pub const TOTAL_LIABILITIES: &str = "ltq";
    pub const NET_INCOME: &str = "niq";

    pub const GVKEY: &str = "GVKEY";
    pub const COMPANY_NAME: &str = "conm";
    pub const CIK: &str = "cik";

    pub const CALENDAR_YEAR: &str = "CalendarYear";
    pub const QUARTER_NUMBER: &str = "Quarter";
    pub const QUARTER_START: &str = "QuarterStart_Month";
    pub const QUARTER_END: &str = "QuarterEnd_Month";

    /// Exchange codes of the U.S. exchanges kept by the accounting filter.
    pub const VALID_EXCHANGES: [i64; 10] = [11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
}

/// CRSP monthly security file.
pub mod monthly {
    pub const KEY: &str = "PERMNO";
    pub const DATE: &str = "date";
    pub const PRICE: &str = "PRC";
    pub const SHARES: &str = "SHROUT";
    pub const SPLIT_FACTOR: &str = "CFACPR";
    pub const RETURN: &str = "RET";
    pub const INDUSTRY: &str = "SICCD";
    pub const SHARE_CODE: &str = "SHRCD";
    pub const SHARE_CLASS: &str = "SHRCLS";
}

/// CRSP daily file, carrying the upstream volatility estimate.
pub mod daily {
    pub const KEY: &str = "PERMNO";
    pub const DATE: &str = "date";
    pub const SIGMA: &str = "SIGMA";
}

/// Monthly market index file.
pub mod index {
    pub const DATE: &str = "caldt";
    pub const RETURN: &str = "vwretd";
    pub const TOTAL_VALUE: &str = "totval";

    pub const PANEL_RETURN: &str = "vwretdSP500";
    pub const PANEL_TOTAL_VALUE: &str = "totvalSP500";
}

/// Delisting fields consumed by the label deriver.
pub mod delisting {
    pub const DATE: &str = "dldte";
    pub const REASON: &str = "dlrsn";
    pub const MONTH: &str = "dldte_month";

    /// Delisting reason code marking a bankruptcy.
    pub const BANKRUPTCY_REASON: i64 = 2;
}

/// Bloomberg bankruptcy filing export.
pub mod bankruptcy {
    pub const SECURITY_ID: &str = "Security ID";
    pub const FILING_TYPE: &str = "filingType";
    pub const COMPANY_NAME: &str = "companyName";
    pub const ANNOUNCE_DATE: &str = "Announce/Declared Date";
    pub const EFFECTIVE_DATE: &str = "Effective Date";

    pub const COMPANY_ID: &str = "companyID";
    pub const IS_PUBLIC: &str = "isPublic";
}

/// Name of the accounting reference-month column for a lag offset.
pub fn lag_column(offset: u32) -> String {
    format!("Date_Lag{offset}")
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{table} table is missing required column: {column}")]
    MissingColumn { table: &'static str, column: String },

    #[error("{table} table column {column}: expected {expected}, got {actual:?}")]
    TypeMismatch {
        table: &'static str,
        column: String,
        expected: &'static str,
        actual: DataType,
    },
}

/// Check that every named column exists in `df`.
pub fn require_columns<'a>(
    df: &DataFrame,
    table: &'static str,
    columns: impl IntoIterator<Item = &'a str>,
) -> Result<(), SchemaError> {
    let schema = df.schema();
    for column in columns {
        if !schema.contains(column) {
            return Err(SchemaError::MissingColumn {
                table,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Check that a column holds text, numbers or dates that can be read as a
/// date. Nested and binary columns are rejected up front.
pub fn require_date_like(
    df: &DataFrame,
    table: &'static str,
    column: &str,
) -> Result<(), SchemaError> {
    require_columns(df, table, [column])?;
    let dtype = df.schema().get(column).cloned().unwrap_or(DataType::Null);
    match dtype {
        DataType::Date | DataType::Datetime(_, _) | DataType::String | DataType::Null => Ok(()),
        ref dtype if dtype.is_integer() => Ok(()),
        actual => Err(SchemaError::TypeMismatch {
            table,
            column: column.to_string(),
            expected: "date, datetime, date string or YYYYMMDD integer",
            actual,
        }),
    }
}

/// Deduplicate column names, keeping the first occurrence.
pub(crate) fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for name in names {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}
