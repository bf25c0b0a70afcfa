//! Streaming CSV writer
//!
//! Each row is encoded and handed to the sink immediately. CSV has a single
//! sheet and no styling; style arguments are accepted and ignored.

use crate::config::CsvOptions;
use crate::csv::{encode_text, field_text, CsvEncoder};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::types::{Row, Style};
use crate::writer::SheetWriter;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV writer over any byte sink
///
/// # Examples
///
/// ```no_run
/// use miniexcel::csv_writer::CsvWriter;
/// use miniexcel::{CsvOptions, Row, SheetWriter};
///
/// let mut writer = CsvWriter::create("out.csv", &CsvOptions::default()).unwrap();
/// writer.add_row(&Row::new(vec!["Name".into(), "Age".into()]), None).unwrap();
/// writer.add_row(&Row::new(vec!["Alice".into(), 30.into()]), None).unwrap();
/// writer.close().unwrap();
/// ```
pub struct CsvWriter<W: Write> {
    output: Option<W>,
    encoder: CsvEncoder,
    encoding: &'static Encoding,
    byte_order_mark: bool,
    started: bool,
    sheet_named: bool,
    row_count: u64,
    buffer: Vec<u8>,
}

impl CsvWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, csv: &CsvOptions) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::with_capacity(64 * 1024, file), csv)
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn new(output: W, csv: &CsvOptions) -> Result<Self> {
        let encoding = csv.resolve()?;
        if csv.byte_order_mark && encoding != UTF_8 {
            warn!(
                "byte order mark requested for {}; only UTF-8 output carries one",
                encoding.name()
            );
        }
        Ok(CsvWriter {
            output: Some(output),
            encoder: CsvEncoder::new(csv.delimiter, csv.enclosure),
            encoding,
            byte_order_mark: csv.byte_order_mark && encoding == UTF_8,
            started: false,
            sheet_named: false,
            row_count: 0,
            buffer: Vec::with_capacity(4096),
        })
    }

    /// Rows written so far
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    fn output(&mut self) -> Result<&mut W> {
        self.output.as_mut().ok_or(ExcelError::WriterClosed)
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.started = true;
            if self.byte_order_mark {
                self.output()?.write_all(UTF8_BOM)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> SheetWriter for CsvWriter<W> {
    fn format(&self) -> Format {
        Format::Csv
    }

    /// Names the one sheet a CSV file holds; only allowed before any row
    fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.output()?;
        if self.sheet_named || self.row_count > 0 {
            return Err(ExcelError::Argument(format!(
                "CSV holds a single sheet; cannot start sheet '{}'",
                name
            )));
        }
        self.sheet_named = true;
        Ok(())
    }

    fn add_row(&mut self, row: &Row, _style: Option<&Style>) -> Result<()> {
        self.output()?;
        self.start()?;

        let fields: Vec<Cow<'_, str>> = row.cells.iter().map(field_text).collect();
        self.buffer.clear();
        self.encoder.encode_row(&fields, &mut self.buffer);
        self.buffer.push(b'\n');

        let encoding = self.encoding;
        let line = String::from_utf8_lossy(&self.buffer);
        let bytes = encode_text(encoding, &line);
        self.output
            .as_mut()
            .ok_or(ExcelError::WriterClosed)?
            .write_all(&bytes)?;

        self.row_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.output.is_none() {
            return Ok(());
        }
        self.start()?;
        if let Some(mut output) = self.output.take() {
            output.flush()?;
        }
        debug!("csv: closed after {} row(s)", self.row_count);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.output.is_none()
    }
}

impl<W: Write> Drop for CsvWriter<W> {
    fn drop(&mut self) {
        if self.output.is_some() {
            warn!(
                "CSV writer dropped without close() after {} row(s)",
                self.row_count
            );
        }
    }
}
