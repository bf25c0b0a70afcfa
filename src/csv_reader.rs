//! Streaming CSV reader
//!
//! A CSV file is a workbook with exactly one sheet, named after the file.
//! Records are decoded line by line; a quoted field may span several lines.

use crate::config::CsvOptions;
use crate::csv::{decode_text, field_value, trim_line_ending, CsvParser};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::reader::{sheet_not_found, RowIter, SheetReader};
use crate::types::{Row, SheetHandle};
use encoding_rs::{Encoding, UTF_8};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// CSV reader over any byte source
///
/// # Examples
///
/// ```no_run
/// use miniexcel::csv_reader::CsvReader;
/// use miniexcel::{CsvOptions, SheetReader};
///
/// let options = CsvOptions::new().with_delimiter(b';');
/// let mut reader = CsvReader::open("export.csv", &options).unwrap();
/// let sheet = reader.sheets().unwrap().remove(0);
/// for row in reader.rows(&sheet).unwrap() {
///     println!("{:?}", row.unwrap().to_strings());
/// }
/// ```
pub struct CsvReader<R: Read = File> {
    source: Option<BufReader<R>>,
    name: String,
    parser: CsvParser,
    encoding: &'static Encoding,
    open: bool,
}

impl CsvReader<File> {
    /// Open a CSV file; its sheet takes the file stem as name
    pub fn open<P: AsRef<Path>>(path: P, csv: &CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SHEET_NAME)
            .to_string();
        Self::from_reader(File::open(path)?, &name, csv)
    }
}

impl<R: Read> CsvReader<R> {
    pub fn from_reader(source: R, sheet_name: &str, csv: &CsvOptions) -> Result<Self> {
        let encoding = csv.resolve()?;
        Ok(CsvReader {
            source: Some(BufReader::with_capacity(64 * 1024, source)),
            name: if sheet_name.is_empty() {
                DEFAULT_SHEET_NAME.to_string()
            } else {
                sheet_name.to_string()
            },
            parser: CsvParser::new(csv.delimiter, csv.enclosure),
            encoding,
            open: true,
        })
    }
}

impl<R: Read> SheetReader for CsvReader<R> {
    fn format(&self) -> Format {
        Format::Csv
    }

    fn sheets(&mut self) -> Result<Vec<SheetHandle>> {
        if !self.open {
            return Err(ExcelError::ReaderNotOpen);
        }
        Ok(vec![SheetHandle {
            index: 0,
            name: self.name.clone(),
        }])
    }

    /// The single sheet can be streamed once
    fn rows(&mut self, sheet: &SheetHandle) -> Result<RowIter<'_>> {
        if !self.open {
            return Err(ExcelError::ReaderNotOpen);
        }
        if sheet.index != 0 && sheet.name != self.name {
            return Err(sheet_not_found(sheet, std::iter::once(self.name.as_str())));
        }
        let source = self.source.take().ok_or(ExcelError::ReaderNotOpen)?;
        Ok(Box::new(CsvRows {
            source,
            parser: self.parser,
            encoding: self.encoding,
            line: Vec::with_capacity(1024),
            record: String::with_capacity(1024),
            first_line: true,
            done: false,
            row_count: 0,
        }))
    }

    fn close(&mut self) {
        self.source = None;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

struct CsvRows<R: Read> {
    source: BufReader<R>,
    parser: CsvParser,
    encoding: &'static Encoding,
    line: Vec<u8>,
    record: String,
    first_line: bool,
    done: bool,
    row_count: u64,
}

impl<R: Read> CsvRows<R> {
    /// Next logical record, joining physical lines while a quote is open
    fn read_record(&mut self) -> Result<Option<Vec<String>>> {
        self.record.clear();
        loop {
            self.line.clear();
            if self.source.read_until(b'\n', &mut self.line)? == 0 {
                if self.record.is_empty() {
                    return Ok(None);
                }
                return Err(ExcelError::Format(
                    "CSV input ended inside a quoted field".to_string(),
                ));
            }

            let mut bytes: &[u8] = &self.line;
            if self.first_line {
                self.first_line = false;
                if let Some((bom_encoding, bom_len)) = Encoding::for_bom(bytes) {
                    if bom_encoding != UTF_8 {
                        return Err(ExcelError::Format(format!(
                            "{} CSV input is not supported",
                            bom_encoding.name()
                        )));
                    }
                    self.encoding = UTF_8;
                    bytes = &bytes[bom_len..];
                }
            }

            self.record.push_str(&decode_text(self.encoding, bytes));
            if !self.parser.is_incomplete(&self.record) {
                break;
            }
        }
        self.parser
            .parse_record(trim_line_ending(&self.record))
            .map(Some)
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(fields)) => {
                self.row_count += 1;
                Some(Ok(Row::new(fields.into_iter().map(field_value).collect())))
            }
            Ok(None) => {
                self.done = true;
                debug!("csv: read {} row(s)", self.row_count);
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;
    use pretty_assertions::assert_eq;

    fn read_all(data: &[u8], csv: &CsvOptions) -> Result<Vec<Vec<CellValue>>> {
        let mut reader = CsvReader::from_reader(data, "data", csv)?;
        let sheet = reader.sheets()?.remove(0);
        let rows = reader.rows(&sheet)?;
        rows.map(|row| row.map(Row::into_cells)).collect()
    }

    fn s(text: &str) -> CellValue {
        CellValue::from(text)
    }

    #[test]
    fn test_basic_rows_and_blank_lines() {
        let rows = read_all(b"a,b\r\n1,\n\n3,4", &CsvOptions::default()).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![s("a"), s("b")],
                vec![s("1"), CellValue::Empty],
                vec![CellValue::Empty],
                vec![s("3"), s("4")],
            ]
        );
    }

    #[test]
    fn test_quoted_field_spanning_lines() {
        let rows = read_all(
            b"id,note\n1,\"line one\nline \"\"two\"\"\"\n",
            &CsvOptions::default(),
        )
        .unwrap();
        assert_eq!(rows[1], vec![s("1"), s("line one\nline \"two\"")]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_unterminated_quote_is_format_error() {
        let err = read_all(b"a,\"open\n", &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, ExcelError::Format(_)));
    }

    #[test]
    fn test_bom_and_encoding() {
        let rows = read_all(b"\xEF\xBB\xBFname\ncaf\xC3\xA9\n", &CsvOptions::default()).unwrap();
        assert_eq!(rows, vec![vec![s("name")], vec![s("café")]]);

        let latin = CsvOptions::new().with_encoding("windows-1252");
        let rows = read_all(b"caf\xE9;x\n", &latin.with_delimiter(b';')).unwrap();
        assert_eq!(rows, vec![vec![s("café"), s("x")]]);

        assert!(read_all(b"\xFF\xFEa\x00", &CsvOptions::default()).is_err());
    }

    #[test]
    fn test_single_pass_and_close() {
        let mut reader = CsvReader::from_reader(&b"a\n"[..], "", &CsvOptions::default()).unwrap();
        let sheet = reader.sheets().unwrap().remove(0);
        assert_eq!(sheet.name, "Sheet1");
        assert_eq!(reader.rows(&sheet).unwrap().count(), 1);
        assert!(matches!(reader.rows(&sheet), Err(ExcelError::ReaderNotOpen)));

        let other = SheetHandle {
            index: 1,
            name: "x".to_string(),
        };
        assert!(matches!(
            reader.rows(&other),
            Err(ExcelError::SheetNotFound { .. })
        ));

        reader.close();
        reader.close();
        assert!(!reader.is_open());
        assert!(matches!(reader.sheets(), Err(ExcelError::ReaderNotOpen)));
    }
}
