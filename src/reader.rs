//! Lazy row readers for every supported format
//!
//! Readers parse sheet content incrementally: rows are decoded as the iterator
//! is advanced, never materialized up front. Iteration is single-pass; to read
//! a sheet again, open the source again.

use crate::config::CsvOptions;
use crate::csv_reader::CsvReader;
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::ods::OdsReader;
use crate::types::{Row, SheetHandle};
use crate::xlsx::XlsxReader;
use std::path::Path;

/// Rows of one sheet, in physical order
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// Source of sheets and their rows
///
/// # Examples
///
/// ```no_run
/// use miniexcel::{open_reader, CsvOptions, SheetReader};
///
/// let mut reader = open_reader("data.xlsx", &CsvOptions::default()).unwrap();
/// for sheet in reader.sheets().unwrap() {
///     for row in reader.rows(&sheet).unwrap() {
///         println!("{}: {:?}", sheet.name, row.unwrap().to_strings());
///     }
/// }
/// reader.close();
/// ```
pub trait SheetReader {
    fn format(&self) -> Format;

    /// Sheets in workbook order
    fn sheets(&mut self) -> Result<Vec<SheetHandle>>;

    /// Stream the rows of `sheet`
    fn rows(&mut self, sheet: &SheetHandle) -> Result<RowIter<'_>>;

    /// Release the underlying source. Closing twice is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Find a sheet by exact name
    fn sheet_by_name(&mut self, name: &str) -> Result<SheetHandle> {
        let sheets = self.sheets()?;
        sheets
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| ExcelError::SheetNotFound {
                sheet: name.to_string(),
                available: sheets
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Open `path` with the reader its extension selects
pub fn open_reader<P: AsRef<Path>>(path: P, csv: &CsvOptions) -> Result<Box<dyn SheetReader>> {
    let path = path.as_ref();
    let format = Format::from_path(path);
    log::debug!("reading {} as {:?}", path.display(), format);
    Ok(match format {
        Format::Csv => Box::new(CsvReader::open(path, csv)?),
        Format::Xlsx => Box::new(XlsxReader::open(path)?),
        Format::Ods => Box::new(OdsReader::open(path)?),
    })
}

pub(crate) fn sheet_not_found<'a>(
    wanted: &SheetHandle,
    names: impl Iterator<Item = &'a str>,
) -> ExcelError {
    ExcelError::SheetNotFound {
        sheet: wanted.name.clone(),
        available: names.collect::<Vec<_>>().join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_open_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = open_reader(dir.path().join("absent.xlsx"), &CsvOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ExcelError::Io(_)));
    }

    #[test]
    fn test_sheet_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"a\n1\n")
            .unwrap();

        let mut reader = open_reader(&path, &CsvOptions::default()).unwrap();
        assert_eq!(reader.format(), Format::Csv);
        assert_eq!(reader.sheet_by_name("people").unwrap().index, 0);
        let err = reader.sheet_by_name("other").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sheet 'other' not found. Available sheets: people"
        );
    }
}
