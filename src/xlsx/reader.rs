//! Streaming XLSX reader
//!
//! Opening a workbook reads its small parts (relationships, workbook, shared
//! strings, styles). Worksheets are inflated and parsed row by row while the
//! caller iterates.

use super::cells::{self, CellContext};
use super::styles::parse_date_styles;
use crate::container::{attr_value, SharedStrings, StreamingZipReader};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::reader::{sheet_not_found, RowIter, SheetReader};
use crate::types::{Row, SheetHandle};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

struct Relationship {
    id: String,
    kind: String,
    target: String,
}

impl Relationship {
    fn is(&self, kind: &str) -> bool {
        self.kind.rsplit('/').next() == Some(kind)
    }
}

/// XLSX reader over any seekable source
pub struct XlsxReader<R: Read + Seek = BufReader<File>> {
    zip: Option<StreamingZipReader<R>>,
    /// (name, worksheet part) in workbook order
    sheets: Vec<(String, String)>,
    shared_strings: SharedStrings,
    date_styles: Vec<bool>,
    date1904: bool,
}

impl XlsxReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> XlsxReader<R> {
    pub fn new(source: R) -> Result<Self> {
        let mut zip = StreamingZipReader::new(source)?;

        let workbook_part = if zip.contains("_rels/.rels") {
            parse_relationships(&zip.read_entry_by_name("_rels/.rels")?)?
                .into_iter()
                .find(|rel| rel.is("officeDocument"))
                .map(|rel| resolve_part("", &rel.target))
                .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string())
        } else {
            DEFAULT_WORKBOOK_PART.to_string()
        };
        let (dir, file) = match workbook_part.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), workbook_part.clone()),
        };

        let workbook = parse_workbook(&zip.read_entry_by_name(&workbook_part)?)?;
        let rels_part = resolve_part(&dir, &format!("_rels/{}.rels", file));
        let rels = if zip.contains(&rels_part) {
            parse_relationships(&zip.read_entry_by_name(&rels_part)?)?
        } else {
            Vec::new()
        };

        let mut sheets = Vec::with_capacity(workbook.sheets.len());
        for (name, rel_id) in workbook.sheets {
            let part = rels
                .iter()
                .find(|rel| rel.id == rel_id)
                .map(|rel| resolve_part(&dir, &rel.target))
                .ok_or_else(|| {
                    ExcelError::Format(format!(
                        "sheet '{}' refers to missing relationship '{}'",
                        name, rel_id
                    ))
                })?;
            sheets.push((name, part));
        }

        let part_of = |kind: &str, fallback: &str| {
            rels.iter()
                .find(|rel| rel.is(kind))
                .map(|rel| resolve_part(&dir, &rel.target))
                .unwrap_or_else(|| resolve_part(&dir, fallback))
        };

        let sst_part = part_of("sharedStrings", "sharedStrings.xml");
        let shared_strings = if zip.contains(&sst_part) {
            let stream = zip.read_entry_streaming_by_name(&sst_part)?;
            SharedStrings::from_loaded(parse_shared_strings(BufReader::new(stream))?)
        } else {
            SharedStrings::new()
        };

        let styles_part = part_of("styles", "styles.xml");
        let date_styles = if zip.contains(&styles_part) {
            parse_date_styles(&zip.read_entry_by_name(&styles_part)?)?
        } else {
            Vec::new()
        };

        debug!(
            "xlsx: {} sheet(s), {} shared string(s), date1904={}",
            sheets.len(),
            shared_strings.count(),
            workbook.date1904
        );

        Ok(XlsxReader {
            zip: Some(zip),
            sheets,
            shared_strings,
            date_styles,
            date1904: workbook.date1904,
        })
    }

    /// Whether serial dates count from 1904-01-01
    pub fn is_date1904(&self) -> bool {
        self.date1904
    }

    fn sheet_part(&self, sheet: &SheetHandle) -> Result<String> {
        let by_index = self
            .sheets
            .get(sheet.index)
            .filter(|(name, _)| *name == sheet.name);
        by_index
            .or_else(|| self.sheets.iter().find(|(name, _)| *name == sheet.name))
            .map(|(_, part)| part.clone())
            .ok_or_else(|| sheet_not_found(sheet, self.sheets.iter().map(|(n, _)| n.as_str())))
    }
}

impl<R: Read + Seek> SheetReader for XlsxReader<R> {
    fn format(&self) -> Format {
        Format::Xlsx
    }

    fn sheets(&mut self) -> Result<Vec<SheetHandle>> {
        if self.zip.is_none() {
            return Err(ExcelError::ReaderNotOpen);
        }
        Ok(self
            .sheets
            .iter()
            .enumerate()
            .map(|(index, (name, _))| SheetHandle {
                index,
                name: name.clone(),
            })
            .collect())
    }

    fn rows(&mut self, sheet: &SheetHandle) -> Result<RowIter<'_>> {
        let part = self.sheet_part(sheet)?;
        let zip = self.zip.as_mut().ok_or(ExcelError::ReaderNotOpen)?;
        let stream = zip.read_entry_streaming_by_name(&part)?;
        debug!("xlsx: streaming rows of '{}' from {}", sheet.name, part);

        let mut reader = Reader::from_reader(BufReader::new(stream));
        reader.config_mut().trim_text(false);

        Ok(Box::new(XlsxRows {
            reader,
            buf: Vec::with_capacity(4096),
            ctx: CellContext {
                shared_strings: &self.shared_strings,
                date_styles: &self.date_styles,
                date1904: self.date1904,
            },
            next_row: 1,
            blank_rows: 0,
            pending: None,
            done: false,
        }))
    }

    fn close(&mut self) {
        if self.zip.take().is_some() {
            debug!("xlsx: reader closed");
        }
    }

    fn is_open(&self) -> bool {
        self.zip.is_some()
    }
}

/// Rows of one worksheet; rows absent from the file come back empty
struct XlsxRows<'a> {
    reader: Reader<BufReader<Box<dyn Read + 'a>>>,
    buf: Vec<u8>,
    ctx: CellContext<'a>,
    /// Row number the next yielded row will have
    next_row: u32,
    blank_rows: u32,
    pending: Option<Row>,
    done: bool,
}

enum RowEvent {
    Row { number: Option<u32>, has_cells: bool },
    End,
    Other,
}

impl XlsxRows<'_> {
    fn read_next(&mut self) -> Result<Option<Row>> {
        loop {
            let event = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == b"row" => RowEvent::Row {
                    number: cells::row_number(e)?,
                    has_cells: true,
                },
                Event::Empty(ref e) if e.local_name().as_ref() == b"row" => RowEvent::Row {
                    number: cells::row_number(e)?,
                    has_cells: false,
                },
                Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => RowEvent::End,
                Event::Eof => RowEvent::End,
                _ => RowEvent::Other,
            };
            self.buf.clear();

            match event {
                RowEvent::Other => continue,
                RowEvent::End => return Ok(None),
                RowEvent::Row { number, has_cells } => {
                    let cells = if has_cells {
                        cells::read_row(&mut self.reader, &mut self.buf, &self.ctx)?
                    } else {
                        Vec::new()
                    };
                    self.buf.clear();

                    let number = number.unwrap_or(self.next_row);
                    if number < self.next_row {
                        return Err(ExcelError::Format(format!(
                            "row {} appears out of order",
                            number
                        )));
                    }
                    let gap = number - self.next_row;
                    self.next_row += 1;
                    if gap == 0 {
                        return Ok(Some(Row::new(cells)));
                    }
                    self.blank_rows = gap - 1;
                    self.pending = Some(Row::new(cells));
                    return Ok(Some(Row::default()));
                }
            }
        }
    }
}

impl Iterator for XlsxRows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.blank_rows > 0 {
            self.blank_rows -= 1;
            self.next_row += 1;
            return Some(Ok(Row::default()));
        }
        if let Some(row) = self.pending.take() {
            self.next_row += 1;
            return Some(Ok(row));
        }
        match self.read_next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

struct Workbook {
    /// (name, relationship id)
    sheets: Vec<(String, String)>,
    date1904: bool,
}

fn parse_workbook(xml: &[u8]) -> Result<Workbook> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut workbook = Workbook {
        sheets: Vec::new(),
        date1904: false,
    };

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr_value(e, b"name")?
                        .ok_or_else(|| ExcelError::Format("sheet without a name".to_string()))?;
                    // r:id; its local name is "id"
                    let rel_id = attr_value(e, b"id")?.unwrap_or_default();
                    workbook.sheets.push((name, rel_id));
                }
                b"workbookPr" => {
                    workbook.date1904 = matches!(
                        attr_value(e, b"date1904")?.as_deref(),
                        Some("1") | Some("true")
                    );
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(workbook)
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                rels.push(Relationship {
                    id: attr_value(e, b"Id")?.unwrap_or_default(),
                    kind: attr_value(e, b"Type")?.unwrap_or_default(),
                    target: attr_value(e, b"Target")?.unwrap_or_default(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Shared string table; rich text runs are concatenated, phonetic hints skipped
fn parse_shared_strings<B: std::io::BufRead>(source: B) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(ref t) if in_text => current.push_str(&t.unescape()?),
            Event::CData(ref t) if in_text => current.push_str(&String::from_utf8_lossy(t)),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Resolve a relationship target against the directory of its source part
fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::StreamingZipWriter;
    use crate::types::{CellValue, Style};
    use crate::writer::SheetWriter;
    use crate::xlsx::XlsxWriter;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};

    fn collect(reader: &mut XlsxReader<Cursor<Vec<u8>>>, index: usize) -> Vec<Vec<CellValue>> {
        let sheet = reader.sheets().unwrap().remove(index);
        reader
            .rows(&sheet)
            .unwrap()
            .map(|row| row.unwrap().into_cells())
            .collect()
    }

    #[test]
    fn test_round_trip_from_writer() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let mut out = Vec::new();
        {
            let mut writer = XlsxWriter::new(&mut out);
            writer.add_sheet("Data").unwrap();
            writer
                .add_row(
                    &Row::new(vec!["name".into(), "when".into()]),
                    Some(&Style::new().bold()),
                )
                .unwrap();
            writer
                .add_row(
                    &Row::new(vec![" padded ".into(), CellValue::DateTime(date)]),
                    None,
                )
                .unwrap();
            writer.add_sheet("Other").unwrap();
            writer
                .add_row(&Row::new(vec![CellValue::Float(1.5), CellValue::Bool(true)]), None)
                .unwrap();
            writer.close().unwrap();
        }

        let mut reader = XlsxReader::new(Cursor::new(out)).unwrap();
        let names: Vec<String> = reader.sheets().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Data", "Other"]);
        assert_eq!(
            collect(&mut reader, 0),
            vec![
                vec![CellValue::from("name"), CellValue::from("when")],
                vec![CellValue::from(" padded "), CellValue::DateTime(date)],
            ]
        );
        assert_eq!(
            collect(&mut reader, 1),
            vec![vec![CellValue::Float(1.5), CellValue::Bool(true)]]
        );

        reader.close();
        assert!(!reader.is_open());
        assert!(matches!(reader.sheets(), Err(ExcelError::ReaderNotOpen)));
    }

    fn handmade_workbook() -> Vec<u8> {
        let mut zip = StreamingZipWriter::new(Vec::new(), 6);
        let mut part = |name: &str, body: &str| {
            zip.start_entry(name).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        };
        part(
            "_rels/.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="/book/main.xml"/></Relationships>"#,
        );
        part(
            "book/main.xml",
            r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr date1904="1"/><sheets><sheet name="Gaps" sheetId="1" r:id="rId7"/></sheets></workbook>"#,
        );
        part(
            "book/_rels/main.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="../sheets/s.xml"/><Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="strings.xml"/><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#,
        );
        part(
            "book/strings.xml",
            r#"<sst><si><r><t>Hel</t></r><r><t>lo</t></r><rPh><t>ignored</t></rPh></si><si/></sst>"#,
        );
        part(
            "book/styles.xml",
            r#"<styleSheet><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#,
        );
        part(
            "sheets/s.xml",
            r#"<worksheet><sheetData><row r="2"><c r="B2" t="s"><v>0</v></c></row><row r="4"><c r="A4" s="1"><v>1</v></c><c r="B4" t="s"><v>1</v></c></row></sheetData></worksheet>"#,
        );
        zip.finish().unwrap()
    }

    #[test]
    fn test_relationships_gaps_and_date1904() {
        let mut reader = XlsxReader::new(Cursor::new(handmade_workbook())).unwrap();
        assert!(reader.is_date1904());
        let rows = collect(&mut reader, 0);
        assert_eq!(
            rows,
            vec![
                vec![],
                vec![CellValue::Empty, CellValue::from("Hello")],
                vec![],
                vec![
                    CellValue::DateTime(
                        NaiveDate::from_ymd_opt(1904, 1, 2)
                            .unwrap()
                            .and_hms_opt(0, 0, 0)
                            .unwrap()
                    ),
                    CellValue::from(""),
                ],
            ]
        );
    }

    #[test]
    fn test_unknown_sheet() {
        let mut reader = XlsxReader::new(Cursor::new(handmade_workbook())).unwrap();
        let missing = SheetHandle {
            index: 3,
            name: "Nope".to_string(),
        };
        let err = reader.rows(&missing).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Sheet 'Nope' not found. Available sheets: Gaps"
        );
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            XlsxReader::new(Cursor::new(b"name,age\n".to_vec())),
            Err(ExcelError::Format(_))
        ));
    }

    #[test]
    fn test_resolve_part() {
        assert_eq!(resolve_part("xl", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_part("xl", "/xl/styles.xml"), "xl/styles.xml");
        assert_eq!(resolve_part("a/b", "../c.xml"), "a/c.xml");
        assert_eq!(resolve_part("", "xl/workbook.xml"), "xl/workbook.xml");
    }
}
