//! Streaming ODS reader
//!
//! Sheet names are collected by one pass over `content.xml` when the file is
//! opened. Rows are then parsed from a fresh stream of `content.xml` for each
//! sheet requested.

use super::cells;
use crate::container::{attr_value, StreamingZipReader};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::reader::{sheet_not_found, RowIter, SheetReader};
use crate::types::{Row, SheetHandle};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;

const CONTENT_PART: &str = "content.xml";

/// ODS reader over any seekable source
pub struct OdsReader<R: Read + Seek = BufReader<File>> {
    zip: Option<StreamingZipReader<R>>,
    sheets: Vec<String>,
}

impl OdsReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> OdsReader<R> {
    pub fn new(source: R) -> Result<Self> {
        let mut zip = StreamingZipReader::new(source)?;
        if !zip.contains(CONTENT_PART) {
            return Err(ExcelError::Format(
                "not an OpenDocument spreadsheet: content.xml is missing".to_string(),
            ));
        }
        let sheets = {
            let stream = zip.read_entry_streaming_by_name(CONTENT_PART)?;
            table_names(BufReader::new(stream))?
        };
        debug!("ods: {} sheet(s)", sheets.len());
        Ok(OdsReader {
            zip: Some(zip),
            sheets,
        })
    }

    fn table_position(&self, sheet: &SheetHandle) -> Result<usize> {
        if self.sheets.get(sheet.index) == Some(&sheet.name) {
            return Ok(sheet.index);
        }
        self.sheets
            .iter()
            .position(|name| *name == sheet.name)
            .ok_or_else(|| sheet_not_found(sheet, self.sheets.iter().map(String::as_str)))
    }
}

fn table_names<B: BufRead>(source: B) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut names = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"table" => {
                names.push(attr_value(e, b"name")?.unwrap_or_default());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

impl<R: Read + Seek> SheetReader for OdsReader<R> {
    fn format(&self) -> Format {
        Format::Ods
    }

    fn sheets(&mut self) -> Result<Vec<SheetHandle>> {
        if self.zip.is_none() {
            return Err(ExcelError::ReaderNotOpen);
        }
        Ok(self
            .sheets
            .iter()
            .enumerate()
            .map(|(index, name)| SheetHandle {
                index,
                name: name.clone(),
            })
            .collect())
    }

    fn rows(&mut self, sheet: &SheetHandle) -> Result<RowIter<'_>> {
        let position = self.table_position(sheet)?;
        let zip = self.zip.as_mut().ok_or(ExcelError::ReaderNotOpen)?;
        let stream = zip.read_entry_streaming_by_name(CONTENT_PART)?;
        debug!("ods: streaming rows of '{}'", sheet.name);

        let mut reader = Reader::from_reader(BufReader::new(stream));
        reader.config_mut().trim_text(false);
        Ok(Box::new(OdsRows {
            reader,
            buf: Vec::with_capacity(4096),
            table: position,
            in_table: false,
            blank_run: 0,
            queued_blank: 0,
            queued: None,
            done: false,
        }))
    }

    fn close(&mut self) {
        if self.zip.take().is_some() {
            debug!("ods: reader closed");
        }
    }

    fn is_open(&self) -> bool {
        self.zip.is_some()
    }
}

/// Rows of one table with repeats expanded.
///
/// Empty rows are held back until a row with content follows, so the
/// padding rows spreadsheet applications append at the end of a table are
/// never yielded.
struct OdsRows<'a> {
    reader: Reader<BufReader<Box<dyn Read + 'a>>>,
    buf: Vec<u8>,
    /// Position of the wanted `<table:table>` in the document
    table: usize,
    in_table: bool,
    blank_run: u64,
    queued_blank: u64,
    /// Row with content and how many more times it repeats
    queued: Option<(Row, u32)>,
    done: bool,
}

enum TableEvent {
    Table,
    EmptyTable,
    Row { repeated: u32, has_cells: bool },
    TableEnd,
    Eof,
    Other,
}

impl OdsRows<'_> {
    /// Move past the start tag of the wanted table
    fn enter_table(&mut self) -> Result<bool> {
        let mut seen = 0;
        loop {
            let event = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"table" => TableEvent::Table,
                Event::Empty(ref e) if e.local_name().as_ref() == b"table" => TableEvent::EmptyTable,
                Event::Eof => TableEvent::Eof,
                _ => TableEvent::Other,
            };
            self.buf.clear();
            match event {
                TableEvent::Table if seen == self.table => return Ok(true),
                TableEvent::EmptyTable if seen == self.table => return Ok(false),
                TableEvent::Table | TableEvent::EmptyTable => seen += 1,
                TableEvent::Eof => return Ok(false),
                _ => {}
            }
        }
    }

    /// Queue the next row with content; false at the end of the table
    fn advance(&mut self) -> Result<bool> {
        if !self.in_table {
            if !self.enter_table()? {
                return Ok(false);
            }
            self.in_table = true;
        }

        loop {
            let event = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"table-row" => TableEvent::Row {
                    repeated: cells::rows_repeated(e)?,
                    has_cells: true,
                },
                Event::Empty(ref e) if e.local_name().as_ref() == b"table-row" => TableEvent::Row {
                    repeated: cells::rows_repeated(e)?,
                    has_cells: false,
                },
                Event::End(ref e) if e.local_name().as_ref() == b"table" => TableEvent::TableEnd,
                Event::Eof => TableEvent::Eof,
                _ => TableEvent::Other,
            };
            self.buf.clear();

            match event {
                TableEvent::Row {
                    repeated,
                    has_cells,
                } => {
                    let values = if has_cells {
                        cells::read_row(&mut self.reader, &mut self.buf)?
                    } else {
                        Vec::new()
                    };
                    self.buf.clear();
                    let repeated = repeated.max(1);
                    if values.is_empty() {
                        self.blank_run += u64::from(repeated);
                        continue;
                    }
                    self.queued_blank = std::mem::take(&mut self.blank_run);
                    self.queued = Some((Row::new(values), repeated));
                    return Ok(true);
                }
                TableEvent::TableEnd => return Ok(false),
                TableEvent::Eof => {
                    return Err(ExcelError::Format(
                        "content ended inside a table".to_string(),
                    ))
                }
                TableEvent::Table | TableEvent::EmptyTable | TableEvent::Other => {}
            }
        }
    }
}

impl Iterator for OdsRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.queued_blank > 0 {
                self.queued_blank -= 1;
                return Some(Ok(Row::default()));
            }
            if let Some((row, remaining)) = self.queued.take() {
                if remaining > 1 {
                    self.queued = Some((row.clone(), remaining - 1));
                }
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
