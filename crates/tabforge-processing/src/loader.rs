//! Dataset loading from uploaded files.
//!
//! The loader picks a parser from the file extension: delimited text goes
//! through the polars CSV reader, spreadsheets through calamine. Both produce
//! a [`DataFrame`] whose column order matches the file header.

use crate::error::{ProcessingError, Result, ResultExt};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Number of rows polars samples when inferring CSV column types.
const INFER_SCHEMA_ROWS: usize = 10_000;

static EMPTY_CELL: Data = Data::Empty;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma separated values.
    Csv,
    /// Excel workbook (`.xls` or `.xlsx`).
    Spreadsheet,
}

impl FileFormat {
    /// Detect the format from a file name, ignoring extension case.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "xls" | "xlsx" => Ok(Self::Spreadsheet),
            _ => Err(ProcessingError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Reads uploaded tabular files into data frames.
pub struct TabularLoader;

impl TabularLoader {
    /// Parse `bytes` according to the extension of `name`.
    pub fn load(name: &str, bytes: &[u8]) -> Result<DataFrame> {
        let format = FileFormat::from_file_name(name)?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ProcessingError::ParseError(format!("'{name}' is empty")));
        }

        let df = match format {
            FileFormat::Csv => Self::read_csv(bytes),
            FileFormat::Spreadsheet => Self::read_spreadsheet(bytes),
        }
        .context(format!("While loading '{name}'"))?;

        if df.width() == 0 {
            return Err(ProcessingError::ParseError(format!(
                "'{name}' has no header row"
            )));
        }
        if df.height() == 0 {
            return Err(ProcessingError::ParseError(format!(
                "'{name}' has no data rows"
            )));
        }

        debug!(
            file = name,
            rows = df.height(),
            columns = df.width(),
            "Loaded dataset"
        );
        Ok(df)
    }

    /// Read a file from disk and parse it.
    pub fn load_path(path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Self::load(name, &bytes)
    }

    fn read_csv(bytes: &[u8]) -> Result<DataFrame> {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()
            .map_err(|e| ProcessingError::ParseError(e.to_string()))
    }

    fn read_spreadsheet(bytes: &[u8]) -> Result<DataFrame> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ProcessingError::ParseError("workbook has no worksheets".into()))??;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            return Ok(DataFrame::empty());
        };

        let names: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(idx, cell)| match cell {
                Data::Empty => format!("column_{}", idx + 1),
                other => other.to_string(),
            })
            .collect();

        let mut cells: Vec<Vec<&Data>> = vec![Vec::new(); names.len()];
        for row in rows {
            for (idx, column) in cells.iter_mut().enumerate() {
                column.push(row.get(idx).unwrap_or(&EMPTY_CELL));
            }
        }

        let columns = names
            .iter()
            .zip(&cells)
            .map(|(name, column)| Column::from(spreadsheet_series(name, column)))
            .collect();

        DataFrame::new(columns).map_err(|e| ProcessingError::ParseError(e.to_string()))
    }
}

/// Build a typed series from one spreadsheet column.
///
/// A column whose non-empty cells are all numbers becomes `Int64` when every
/// value is integral and `Float64` otherwise. Anything else is `String`.
fn spreadsheet_series(name: &str, cells: &[&Data]) -> Series {
    let numbers: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            Data::Empty | Data::Error(_) => Some(None),
            Data::Int(v) => Some(Some(*v as f64)),
            Data::Float(v) if v.is_finite() => Some(Some(*v)),
            _ => None,
        })
        .collect();

    match numbers {
        Some(values) if values.iter().flatten().all(|v| v.fract() == 0.0) => {
            let ints: Vec<Option<i64>> = values.iter().map(|v| v.map(|x| x as i64)).collect();
            Series::new(name.into(), ints)
        }
        Some(values) => Series::new(name.into(), values),
        None => {
            let text: Vec<Option<String>> = cells
                .iter()
                .map(|cell| match cell {
                    Data::Empty | Data::Error(_) => None,
                    other => Some(other.to_string()),
                })
                .collect();
            Series::new(name.into(), text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_file_name("data.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_file_name("DATA.CSV").unwrap(), FileFormat::Csv);
        assert_eq!(
            FileFormat::from_file_name("book.xlsx").unwrap(),
            FileFormat::Spreadsheet
        );
        assert_eq!(
            FileFormat::from_file_name("old.xls").unwrap(),
            FileFormat::Spreadsheet
        );
        assert!(matches!(
            FileFormat::from_file_name("notes.txt"),
            Err(ProcessingError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileFormat::from_file_name("noextension"),
            Err(ProcessingError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_csv() {
        let csv = b"age,city,bought\n25,Lyon,yes\n40,Nice,no\n31,,yes\n";
        let df = TabularLoader::load("people.csv", csv).unwrap();

        assert_eq!(df.shape(), (3, 3));
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            vec!["age", "city", "bought"]
        );
        assert_eq!(df.column("age").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("city").unwrap().null_count(), 1);
    }

    #[test]
    fn test_empty_file_is_parse_error() {
        let err = TabularLoader::load("empty.csv", b"").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");

        let err = TabularLoader::load("blank.csv", b"  \n").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_header_only_is_parse_error() {
        let err = TabularLoader::load("header.csv", b"a,b,c\n").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_garbage_spreadsheet_is_parse_error() {
        let err = TabularLoader::load("broken.xlsx", b"definitely not a zip").unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = TabularLoader::load("data.json", b"{}").unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_spreadsheet_series_typing() {
        let ints = [&Data::Int(1), &Data::Float(2.0), &Data::Empty];
        let series = spreadsheet_series("n", &ints);
        assert_eq!(series.dtype(), &DataType::Int64);
        assert_eq!(series.null_count(), 1);

        let floats = [&Data::Float(1.5), &Data::Int(2)];
        assert_eq!(spreadsheet_series("f", &floats).dtype(), &DataType::Float64);

        let text = Data::String("Paris".to_string());
        let mixed = [&Data::Int(1), &text];
        let series = spreadsheet_series("s", &mixed);
        assert_eq!(series.dtype(), &DataType::String);
        assert_eq!(series.str().unwrap().get(1), Some("Paris"));
    }
}
