//! Table I/O at the pipeline boundary: Parquet or CSV, chosen by extension.

use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported table format for {0} (expected .parquet or .csv)")]
    UnsupportedFormat(PathBuf),
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Polars {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("parquet" | "pq") => Ok(TableFormat::Parquet),
            Some("csv") => Ok(TableFormat::Csv),
            _ => Err(IoError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Read a whole table into memory.
///
/// CSV column types are inferred from every row, so a code such as `C` in an
/// otherwise numeric return column turns the column into text instead of
/// failing the read. The preparers coerce those columns afterwards.
pub fn read_table(path: &Path) -> Result<DataFrame, IoError> {
    let format = TableFormat::from_path(path)?;
    let polars_err = |source: PolarsError| IoError::Polars {
        path: path.to_path_buf(),
        source,
    };

    let df = match format {
        TableFormat::Parquet => {
            let file = fs::File::open(path).map_err(|source| IoError::File {
                path: path.to_path_buf(),
                source,
            })?;
            ParquetReader::new(file).finish().map_err(polars_err)?
        }
        TableFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(polars_err)?,
    };

    debug!(path = %path.display(), rows = df.height(), columns = df.width(), "read table");
    Ok(df)
}

/// Write a table, creating parent directories as needed.
pub fn write_table(path: &Path, df: &mut DataFrame) -> Result<(), IoError> {
    let format = TableFormat::from_path(path)?;
    let file_err = |source: std::io::Error| IoError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(file_err)?;
    }
    let file = fs::File::create(path).map_err(file_err)?;
    let polars_err = |source: PolarsError| IoError::Polars {
        path: path.to_path_buf(),
        source,
    };

    match format {
        TableFormat::Parquet => {
            ParquetWriter::new(file).finish(df).map_err(polars_err)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(file)
                .include_header(true)
                .finish(df)
                .map_err(polars_err)?;
        }
    }

    debug!(path = %path.display(), rows = df.height(), "wrote table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!(
            "PERMNO" => &[1i64, 2],
            "date" => &["2020-01-31", "2020-02-29"],
            "PRC" => &[10.5, -3.25],
        )
        .unwrap()
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            TableFormat::from_path(Path::new("x.PARQUET")).unwrap(),
            TableFormat::Parquet
        );
        assert_eq!(TableFormat::from_path(Path::new("a/b.csv")).unwrap(), TableFormat::Csv);
        assert!(matches!(
            TableFormat::from_path(Path::new("x.xlsx")),
            Err(IoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn parquet_preserves_dtypes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.parquet");
        let mut df = sample();
        write_table(&path, &mut df).unwrap();
        let back = read_table(&path).unwrap();
        assert!(back.equals(&df));
    }

    #[test]
    fn csv_reads_back_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut df = sample();
        write_table(&path, &mut df).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back.height(), 2);
        assert_eq!(back.column("PRC").unwrap().f64().unwrap().get(1), Some(-3.25));
    }

    #[test]
    fn csv_codes_after_many_numeric_rows_keep_the_read_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monthly.csv");
        let mut body = String::from("PERMNO,date,RET,SICCD\n");
        for row in 0..12_000 {
            let ret = if row == 11_990 { "C" } else { "0.01" };
            let sic = if row == 11_995 { "Z" } else { "3571" };
            body.push_str(&format!("{row},2020-01-31,{ret},{sic}\n"));
        }
        std::fs::write(&path, body).unwrap();

        let df = read_table(&path).unwrap();
        assert_eq!(df.height(), 12_000);
        let ret = df.column("RET").unwrap().str().unwrap();
        assert_eq!(ret.get(0), Some("0.01"));
        assert_eq!(ret.get(11_990), Some("C"));
        assert_eq!(df.column("SICCD").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_table(Path::new("/nonexistent/table.parquet")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/table.parquet"));
    }
}
