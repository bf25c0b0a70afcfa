//! One row at a time to and from a format's wire representation
//!
//! [`RowCodec`] is the piece the streaming writers and readers are built
//! from, usable on its own when rows travel outside a file: a CSV line, an
//! XLSX `<row>` element or an ODS `<table:table-row>` element.

use crate::config::CsvOptions;
use crate::container::{SharedStrings, XmlWriter};
use crate::csv::{decode_text, encode_text, field_text, field_value, trim_line_ending};
use crate::csv::{CsvEncoder, CsvParser};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::ods::{self, CellStyles};
use crate::types::{CellValue, Row, Style};
use crate::xlsx::cells::{self as xlsx_cells, CellContext};
use crate::xlsx::StyleTable;
use encoding_rs::Encoding;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;

/// Row encoder/decoder for one format.
///
/// Container formats keep their lookup tables (shared strings, cell styles)
/// inside the codec, so rows it encodes decode again with the same codec.
///
/// # Examples
///
/// ```
/// use miniexcel::{CellValue, CsvOptions, Format, Row, RowCodec};
///
/// let mut codec = RowCodec::new(Format::Csv, &CsvOptions::default()).unwrap();
/// let bytes = codec
///     .encode(&Row::new(vec!["a,b".into(), CellValue::Int(3)]), None)
///     .unwrap();
/// assert_eq!(bytes, b"\"a,b\",3\n");
/// ```
pub struct RowCodec {
    format: Format,
    encoder: CsvEncoder,
    parser: CsvParser,
    enclosure: char,
    encoding: &'static Encoding,
    shared_strings: SharedStrings,
    xlsx_styles: StyleTable,
    ods_styles: CellStyles,
    row_number: u32,
}

impl RowCodec {
    pub fn new(format: Format, csv: &CsvOptions) -> Result<Self> {
        let encoding = csv.resolve()?;
        Ok(RowCodec {
            format,
            encoder: CsvEncoder::new(csv.delimiter, csv.enclosure),
            parser: CsvParser::new(csv.delimiter, csv.enclosure),
            enclosure: csv.enclosure as char,
            encoding,
            shared_strings: SharedStrings::new(),
            xlsx_styles: StyleTable::new(),
            ods_styles: CellStyles::new(),
            row_number: 0,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Encode a row; `style` is ignored for CSV
    pub fn encode(&mut self, row: &Row, style: Option<&Style>) -> Result<Vec<u8>> {
        match self.format {
            Format::Csv => {
                let fields: Vec<Cow<'_, str>> = row.cells.iter().map(field_text).collect();
                let mut line = Vec::new();
                self.encoder.encode_row(&fields, &mut line);
                line.push(b'\n');
                Ok(encode_text(self.encoding, &String::from_utf8_lossy(&line)).into_owned())
            }
            Format::Xlsx => {
                let mut out = Vec::new();
                let mut xml = XmlWriter::new(&mut out);
                xlsx_cells::write_row(
                    &mut xml,
                    self.row_number + 1,
                    &row.cells,
                    style,
                    &mut self.shared_strings,
                    &mut self.xlsx_styles,
                )?;
                xml.flush()?;
                drop(xml);
                self.row_number += 1;
                Ok(out)
            }
            Format::Ods => {
                let mut out = Vec::new();
                let mut xml = XmlWriter::new(&mut out);
                ods::cells::write_row(&mut xml, &row.cells, style, &mut self.ods_styles)?;
                xml.flush()?;
                drop(xml);
                Ok(out)
            }
        }
    }

    /// Decode exactly one row
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Row> {
        match self.format {
            Format::Csv => self.decode_csv(bytes),
            Format::Xlsx => {
                let date_styles = self.xlsx_styles.date_flags();
                let ctx = CellContext {
                    shared_strings: &self.shared_strings,
                    date_styles: &date_styles,
                    date1904: false,
                };
                let mut reader = Reader::from_reader(bytes);
                let mut buf = Vec::new();
                let has_cells = seek_row(&mut reader, &mut buf, b"row")?;
                let cells = if has_cells {
                    xlsx_cells::read_row(&mut reader, &mut buf, &ctx)?
                } else {
                    Vec::new()
                };
                Ok(Row::new(cells))
            }
            Format::Ods => {
                let mut reader = Reader::from_reader(bytes);
                let mut buf = Vec::new();
                let has_cells = seek_row(&mut reader, &mut buf, b"table-row")?;
                let cells = if has_cells {
                    ods::cells::read_row(&mut reader, &mut buf)?
                } else {
                    Vec::new()
                };
                Ok(Row::new(cells))
            }
        }
    }

    fn decode_csv(&self, bytes: &[u8]) -> Result<Row> {
        let text = decode_text(self.encoding, bytes);
        let record = trim_line_ending(&text);

        let mut in_quotes = false;
        for c in record.chars() {
            if c == self.enclosure {
                in_quotes = !in_quotes;
            } else if (c == '\n' || c == '\r') && !in_quotes {
                return Err(ExcelError::Format(
                    "input holds more than one CSV record".to_string(),
                ));
            }
        }

        let fields = self.parser.parse_record(record)?;
        Ok(Row::new(fields.into_iter().map(field_value).collect()))
    }
}

/// Position the reader after the row start tag; false for a self-closing row
fn seek_row(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, local: &[u8]) -> Result<bool> {
    loop {
        let found = match reader.read_event_into(buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == local => Some(true),
            Event::Empty(ref e) if e.local_name().as_ref() == local => Some(false),
            Event::Eof => {
                return Err(ExcelError::Format(format!(
                    "no <{}> element in input",
                    String::from_utf8_lossy(local)
                )))
            }
            _ => None,
        };
        buf.clear();
        if let Some(has_cells) = found {
            return Ok(has_cells);
        }
    }
}

/// Round trip `cells` through a fresh codec; handy for checking a value
/// survives a format before writing a whole file
pub fn round_trip(format: Format, cells: Vec<CellValue>) -> Result<Row> {
    let mut codec = RowCodec::new(format, &CsvOptions::default())?;
    let bytes = codec.encode(&Row::new(cells), None)?;
    codec.decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample() -> Vec<CellValue> {
        vec![
            CellValue::from("text & <tags>"),
            CellValue::Int(-12),
            CellValue::Float(3.25),
            CellValue::Float(2.0),
            CellValue::Bool(true),
            CellValue::DateTime(
                NaiveDate::from_ymd_opt(2023, 12, 31)
                    .unwrap()
                    .and_hms_milli_opt(23, 59, 58, 500)
                    .unwrap(),
            ),
            CellValue::Empty,
            CellValue::formula("=B1*2", CellValue::Int(-24)),
        ]
    }

    #[test]
    fn test_container_round_trips() {
        for format in [Format::Xlsx, Format::Ods] {
            let row = round_trip(format, sample()).unwrap();
            assert_eq!(row.cells, sample(), "{:?}", format);
        }
    }

    #[test]
    fn test_csv_round_trip_is_textual() {
        let row = round_trip(Format::Csv, sample()).unwrap();
        assert_eq!(
            row.to_strings(),
            vec![
                "text & <tags>",
                "-12",
                "3.25",
                "2.0",
                "TRUE",
                "2023-12-31 23:59:58",
                "",
                "-24"
            ]
        );
        assert_eq!(row.cells[6], CellValue::Empty);
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        let mut csv = RowCodec::new(Format::Csv, &CsvOptions::default()).unwrap();
        assert!(matches!(csv.decode(b"a,b\nc,d\n"), Err(ExcelError::Format(_))));
        assert!(matches!(csv.decode(b"\"open"), Err(ExcelError::Format(_))));

        let mut xlsx = RowCodec::new(Format::Xlsx, &CsvOptions::default()).unwrap();
        assert!(matches!(xlsx.decode(b"<c/>"), Err(ExcelError::Format(_))));
    }

    #[test]
    fn test_unsupported_values() {
        for format in [Format::Xlsx, Format::Ods] {
            let mut codec = RowCodec::new(format, &CsvOptions::default()).unwrap();
            let err = codec
                .encode(&Row::new(vec![CellValue::Float(f64::INFINITY)]), None)
                .unwrap_err();
            assert!(matches!(err, ExcelError::UnsupportedValue(_)));
        }
    }

    proptest! {
        #[test]
        fn prop_csv_fields_survive_escaping(
            fields in prop::collection::vec("[a-z;,\"\n ]{1,6}", 1..6),
            delimiter in prop::sample::select(vec![b',', b';', b'\t']),
        ) {
            let options = CsvOptions::new().with_delimiter(delimiter);
            let mut codec = RowCodec::new(Format::Csv, &options).unwrap();
            let row = Row::new(fields.iter().map(|f| CellValue::from(f.as_str())).collect());
            let bytes = codec.encode(&row, None).unwrap();
            let decoded = codec.decode(&bytes).unwrap();
            prop_assert_eq!(decoded.to_strings(), fields);
        }
    }
}
