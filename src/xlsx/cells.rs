//! SpreadsheetML `<row>`/`<c>` encoding and decoding

use super::styles::StyleTable;
use crate::container::{attr_value, check_text, SharedStrings, XmlWriter};
use crate::error::{ExcelError, Result};
use crate::types::{
    column_letter, float_text, parse_cell_reference, parse_iso_datetime, parse_number,
    CellValue, Style,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufRead, Write};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Lookup tables needed to turn `<c>` elements into values
pub struct CellContext<'a> {
    pub shared_strings: &'a SharedStrings,
    /// Indexed by the cell's `s` attribute
    pub date_styles: &'a [bool],
    pub date1904: bool,
}

impl CellContext<'_> {
    fn is_date_style(&self, xf: usize) -> bool {
        self.date_styles.get(xf).copied().unwrap_or(false)
    }
}

/// Fail before anything is written if a value has no XLSX representation
pub fn check_encodable(cell: &CellValue) -> Result<()> {
    match cell {
        CellValue::Float(f) if !f.is_finite() => Err(ExcelError::UnsupportedValue(format!(
            "{} cannot be stored in a numeric cell",
            f
        ))),
        CellValue::DateTime(d) => datetime_to_serial(*d).map(|_| ()),
        CellValue::String(text) => check_text(text),
        CellValue::Formula { expression, cached } => {
            check_text(expression)?;
            if matches!(**cached, CellValue::Formula { .. }) {
                return Err(ExcelError::UnsupportedValue(format!(
                    "formula '{}' has a formula as its cached result",
                    expression
                )));
            }
            check_encodable(cached)
        }
        _ => Ok(()),
    }
}

/// Write one `<row>`; `style` applies to every cell of the row
pub fn write_row<W: Write>(
    xml: &mut XmlWriter<W>,
    row_number: u32,
    cells: &[CellValue],
    style: Option<&Style>,
    shared_strings: &mut SharedStrings,
    styles: &mut StyleTable,
) -> Result<()> {
    for cell in cells {
        check_encodable(cell)?;
    }

    xml.start_element("row")?;
    xml.attribute_int("r", i64::from(row_number))?;
    xml.close_start_tag()?;

    for (col, cell) in cells.iter().enumerate() {
        if cell.is_empty() && style.is_none() {
            continue;
        }
        let xf = styles.xf_index(style, shows_date(cell))?;

        xml.start_element("c")?;
        let reference = format!("{}{}", column_letter(col as u32), row_number);
        xml.attribute("r", &reference)?;
        if xf != 0 {
            xml.attribute_int("s", i64::from(xf))?;
        }

        match cell {
            CellValue::Empty => xml.close_empty()?,
            CellValue::String(s) => {
                let index = shared_strings.add_string(s);
                xml.attribute("t", "s")?;
                xml.close_start_tag()?;
                write_value(xml, &itoa::Buffer::new().format(index).to_string())?;
                xml.end_element("c")?;
            }
            CellValue::Formula { expression, cached } => {
                match **cached {
                    CellValue::String(_) => xml.attribute("t", "str")?,
                    CellValue::Bool(_) => xml.attribute("t", "b")?,
                    _ => {}
                }
                xml.close_start_tag()?;
                xml.text_element("f", expression.strip_prefix('=').unwrap_or(expression))?;
                if let Some(text) = scalar_text(cached)? {
                    write_value(xml, &text)?;
                }
                xml.end_element("c")?;
            }
            other => {
                if matches!(other, CellValue::Bool(_)) {
                    xml.attribute("t", "b")?;
                }
                xml.close_start_tag()?;
                if let Some(text) = scalar_text(other)? {
                    write_value(xml, &text)?;
                }
                xml.end_element("c")?;
            }
        }
    }

    xml.end_element("row")
}

fn shows_date(cell: &CellValue) -> bool {
    match cell {
        CellValue::DateTime(_) => true,
        CellValue::Formula { cached, .. } => matches!(**cached, CellValue::DateTime(_)),
        _ => false,
    }
}

fn write_value<W: Write>(xml: &mut XmlWriter<W>, text: &str) -> Result<()> {
    xml.text_element("v", text)
}

/// `<v>` text of a non-formula value; `None` for empty cells
fn scalar_text(cell: &CellValue) -> Result<Option<String>> {
    Ok(match cell {
        CellValue::Empty => None,
        CellValue::String(s) => Some(s.clone()),
        CellValue::Int(i) => Some(itoa::Buffer::new().format(*i).to_string()),
        CellValue::Float(f) => Some(float_text(*f)),
        CellValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        CellValue::DateTime(d) => {
            if d.and_utc().timestamp_subsec_nanos() % 1_000_000 != 0 {
                debug!("{} truncated to whole milliseconds in serial date", d);
            }
            Some(float_text(datetime_to_serial(*d)?))
        }
        CellValue::Formula { cached, .. } => scalar_text(cached)?,
    })
}

/// Row number from a `<row r="..">` start tag
pub fn row_number(e: &BytesStart<'_>) -> Result<Option<u32>> {
    match attr_value(e, b"r")? {
        Some(r) => r
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ExcelError::Format(format!("invalid row number '{}'", r))),
        None => Ok(None),
    }
}

struct CellStart {
    column: Option<usize>,
    cell_type: Option<String>,
    style: usize,
}

impl CellStart {
    fn parse(e: &BytesStart<'_>) -> Result<Self> {
        let column = match attr_value(e, b"r")? {
            Some(r) => Some(
                parse_cell_reference(&r)
                    .ok_or_else(|| ExcelError::Format(format!("invalid cell reference '{}'", r)))?
                    .0 as usize,
            ),
            None => None,
        };
        Ok(CellStart {
            column,
            cell_type: attr_value(e, b"t")?,
            style: attr_value(e, b"s")?
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }
}

/// Read cells until `</row>`; the `<row>` start tag has already been consumed.
///
/// Cells skipped by their `r` reference come back as `Empty`.
pub fn read_row<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    ctx: &CellContext<'_>,
) -> Result<Vec<CellValue>> {
    let mut cells = Vec::new();
    loop {
        let event = reader.read_event_into(buf)?;
        match event {
            Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                let start = CellStart::parse(e)?;
                buf.clear();
                let value = read_cell(reader, buf, &start, ctx)?;
                place(&mut cells, start.column, value)?;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                let start = CellStart::parse(e)?;
                place(&mut cells, start.column, CellValue::Empty)?;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"row" => break,
            Event::Eof => {
                return Err(ExcelError::Format(
                    "worksheet ended inside a row".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

fn place(cells: &mut Vec<CellValue>, column: Option<usize>, value: CellValue) -> Result<()> {
    if let Some(column) = column {
        if column < cells.len() {
            return Err(ExcelError::Format(format!(
                "cell {} appears out of order",
                column_letter(column as u32)
            )));
        }
        cells.resize(column, CellValue::Empty);
    }
    cells.push(value);
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Target {
    None,
    Value,
    Formula,
    InlineText,
}

fn read_cell<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    start: &CellStart,
    ctx: &CellContext<'_>,
) -> Result<CellValue> {
    let mut value: Option<String> = None;
    let mut formula: Option<String> = None;
    let mut inline = String::new();
    let mut target = Target::None;
    let mut in_phonetic = false;

    loop {
        let event = reader.read_event_into(buf)?;
        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"v" => {
                    target = Target::Value;
                    value.get_or_insert_with(String::new);
                }
                b"f" => {
                    target = Target::Formula;
                    formula.get_or_insert_with(String::new);
                }
                b"t" if !in_phonetic => target = Target::InlineText,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"v" => {
                value.get_or_insert_with(String::new);
            }
            Event::Text(ref t) => {
                let text = t.unescape()?;
                match target {
                    Target::Value => value.get_or_insert_with(String::new).push_str(&text),
                    Target::Formula => formula.get_or_insert_with(String::new).push_str(&text),
                    Target::InlineText => inline.push_str(&text),
                    Target::None => {}
                }
            }
            Event::CData(ref t) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                match target {
                    Target::Value => value.get_or_insert_with(String::new).push_str(&text),
                    Target::InlineText => inline.push_str(&text),
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"c" => break,
                b"rPh" => in_phonetic = false,
                b"v" | b"f" | b"t" => target = Target::None,
                _ => {}
            },
            Event::Eof => {
                return Err(ExcelError::Format(
                    "worksheet ended inside a cell".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    let computed = decode_value(start, value, inline, ctx)?;
    Ok(match formula {
        Some(f) if !f.trim().is_empty() => CellValue::formula(f, computed),
        _ => computed,
    })
}

fn decode_value(
    start: &CellStart,
    value: Option<String>,
    inline: String,
    ctx: &CellContext<'_>,
) -> Result<CellValue> {
    let cell_type = start.cell_type.as_deref().unwrap_or("n");
    if cell_type == "inlineStr" {
        return Ok(CellValue::String(inline));
    }
    let Some(text) = value else {
        return Ok(CellValue::Empty);
    };

    Ok(match cell_type {
        "s" => {
            let index: usize = text.trim().parse().map_err(|_| {
                ExcelError::Format(format!("invalid shared string index '{}'", text))
            })?;
            let s = ctx.shared_strings.get(index).ok_or_else(|| {
                ExcelError::Format(format!("shared string {} does not exist", index))
            })?;
            CellValue::String(s.to_string())
        }
        "str" | "e" => CellValue::String(text),
        "b" => CellValue::Bool(matches!(text.trim(), "1" | "true")),
        "d" => parse_iso_datetime(&text)
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::String(text)),
        _ if text.trim().is_empty() => CellValue::Empty,
        _ => {
            let number = parse_number(&text)
                .ok_or_else(|| ExcelError::Format(format!("invalid number '{}'", text)))?;
            if ctx.is_date_style(start.style) {
                let serial = number.as_f64().unwrap_or(0.0);
                serial_to_datetime(serial, ctx.date1904)
                    .map(CellValue::DateTime)
                    .unwrap_or(number)
            } else {
                number
            }
        }
    })
}

fn midnight(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

/// Convert a serial day number to a date/time, rounded to the millisecond.
///
/// In the 1900 system serials below 60 count from 1899-12-31 because of the
/// phantom 1900-02-29; from 61 on they count from 1899-12-30.
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let base = if date1904 {
        midnight(1904, 1, 1)?
    } else if serial < 60.0 {
        midnight(1899, 12, 31)?
    } else {
        midnight(1899, 12, 30)?
    };
    let ms = (serial * MS_PER_DAY).round() as i64;
    base.checked_add_signed(Duration::try_milliseconds(ms)?)
}

/// Serial day number in the 1900 system, to whole milliseconds
pub fn datetime_to_serial(value: NaiveDateTime) -> Result<f64> {
    let unsupported = || {
        ExcelError::UnsupportedValue(format!(
            "{} is before 1900-01-01 and has no serial date",
            value
        ))
    };
    let first = midnight(1900, 1, 1).ok_or_else(unsupported)?;
    if value < first {
        return Err(unsupported());
    }
    let base = if value < midnight(1900, 3, 1).ok_or_else(unsupported)? {
        midnight(1899, 12, 31)
    } else {
        midnight(1899, 12, 30)
    }
    .ok_or_else(unsupported)?;
    Ok((value - base).num_milliseconds() as f64 / MS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn decode(xml: &str, ctx: &CellContext<'_>) -> Vec<CellValue> {
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        loop {
            if let Event::Start(e) = reader.read_event_into(&mut buf).unwrap() {
                if e.local_name().as_ref() == b"row" {
                    break;
                }
            }
            buf.clear();
        }
        buf.clear();
        read_row(&mut reader, &mut buf, ctx).unwrap()
    }

    #[test]
    fn test_serial_dates() {
        assert_eq!(datetime_to_serial(at(1900, 1, 1, 0, 0, 0)).unwrap(), 1.0);
        assert_eq!(datetime_to_serial(at(1900, 3, 1, 0, 0, 0)).unwrap(), 61.0);
        assert_eq!(datetime_to_serial(at(2024, 1, 1, 12, 0, 0)).unwrap(), 45292.5);
        assert_eq!(serial_to_datetime(45292.5, false), Some(at(2024, 1, 1, 12, 0, 0)));
        assert_eq!(serial_to_datetime(59.0, false), Some(at(1900, 2, 28, 0, 0, 0)));
        assert_eq!(serial_to_datetime(0.0, true), Some(at(1904, 1, 1, 0, 0, 0)));
        assert!(matches!(
            datetime_to_serial(at(1899, 12, 31, 0, 0, 0)),
            Err(ExcelError::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_serial_keeps_milliseconds_only() {
        let precise = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_nano_opt(6, 0, 0, 123_456_789)
            .unwrap();
        let serial = datetime_to_serial(precise).unwrap();
        assert_eq!(
            serial_to_datetime(serial, false).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_milli_opt(6, 0, 0, 123)
                .unwrap()
        );
    }

    #[test]
    fn test_write_row_encodings() {
        let mut out = Vec::new();
        let mut sst = SharedStrings::new();
        let mut styles = StyleTable::new();
        {
            let mut xml = XmlWriter::new(&mut out);
            write_row(
                &mut xml,
                3,
                &[
                    CellValue::from("a<b"),
                    CellValue::Int(7),
                    CellValue::Empty,
                    CellValue::Float(2.0),
                    CellValue::Bool(true),
                    CellValue::formula("=SUM(B3:D3)", CellValue::Float(9.0)),
                    CellValue::formula("=\"x\"&\"y\"", CellValue::from("xy")),
                ],
                None,
                &mut sst,
                &mut styles,
            )
            .unwrap();
            xml.flush().unwrap();
        }
        let xml = String::from_utf8(out).unwrap();
        assert_eq!(
            xml,
            "<row r=\"3\"><c r=\"A3\" t=\"s\"><v>0</v></c><c r=\"B3\"><v>7</v></c>\
             <c r=\"D3\"><v>2.0</v></c><c r=\"E3\" t=\"b\"><v>1</v></c>\
             <c r=\"F3\"><f>SUM(B3:D3)</f><v>9.0</v></c>\
             <c r=\"G3\" t=\"str\"><f>&quot;x&quot;&amp;&quot;y&quot;</f><v>xy</v></c></row>"
        );
        assert_eq!(sst.get(0), Some("a<b"));
    }

    #[test]
    fn test_write_rejects_unencodable_before_writing() {
        let mut out = Vec::new();
        let mut xml = XmlWriter::new(&mut out);
        let err = write_row(
            &mut xml,
            1,
            &[CellValue::Int(1), CellValue::Float(f64::NAN)],
            None,
            &mut SharedStrings::new(),
            &mut StyleTable::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExcelError::UnsupportedValue(_)));
        xml.flush().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_read_row_types() {
        let sst = SharedStrings::from_loaded(vec!["hello".to_string()]);
        let ctx = CellContext {
            shared_strings: &sst,
            date_styles: &[false, true],
            date1904: false,
        };
        let cells = decode(
            "<sheetData><row r=\"1\">\
             <c r=\"A1\" t=\"s\"><v>0</v></c>\
             <c r=\"C1\"><v>42</v></c>\
             <c r=\"D1\" s=\"1\"><v>45292.5</v></c>\
             <c r=\"E1\" t=\"inlineStr\"><is><r><t>rich</t></r><r><t xml:space=\"preserve\"> text</t></r></is></c>\
             <c r=\"F1\" t=\"e\"><v>#DIV/0!</v></c>\
             <c r=\"G1\"><f>A1*2</f><v>3.5</v></c>\
             <c r=\"H1\" t=\"b\"><v>0</v></c>\
             <c r=\"I1\" t=\"d\"><v>2024-01-01T12:00:00</v></c>\
             <c r=\"J1\" s=\"0\"/>\
             </row></sheetData>",
            &ctx,
        );
        assert_eq!(
            cells,
            vec![
                CellValue::from("hello"),
                CellValue::Empty,
                CellValue::Int(42),
                CellValue::DateTime(at(2024, 1, 1, 12, 0, 0)),
                CellValue::from("rich text"),
                CellValue::from("#DIV/0!"),
                CellValue::formula("=A1*2", CellValue::Float(3.5)),
                CellValue::Bool(false),
                CellValue::DateTime(at(2024, 1, 1, 12, 0, 0)),
                CellValue::Empty,
            ]
        );
    }

    #[test]
    fn test_out_of_order_cells_rejected() {
        let sst = SharedStrings::new();
        let ctx = CellContext {
            shared_strings: &sst,
            date_styles: &[],
            date1904: false,
        };
        let mut reader = Reader::from_reader(
            "<c r=\"B1\"><v>1</v></c><c r=\"A1\"><v>2</v></c></row>".as_bytes(),
        );
        let mut buf = Vec::new();
        assert!(matches!(
            read_row(&mut reader, &mut buf, &ctx),
            Err(ExcelError::Format(_))
        ));
    }
}
