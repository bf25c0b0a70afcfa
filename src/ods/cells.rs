//! OpenDocument `<table:table-row>`/`<table:table-cell>` encoding and decoding

use crate::container::{check_text, XmlWriter};
use crate::error::{ExcelError, Result};
use crate::types::{
    float_text, iso_datetime, parse_iso_datetime, parse_number, BorderStyle, CellValue, Style,
    DATETIME_FORMAT,
};
use indexmap::IndexSet;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{BufRead, Write};

/// Data style giving date cells a `YYYY-MM-DD HH:MM:SS` display
pub const DATE_DATA_STYLE: &str = "N1";

/// Formula namespace prefix OpenFormula expressions carry
const FORMULA_PREFIX: &str = "of:";

/// Fail before anything is written if a value has no ODS representation
pub fn check_encodable(cell: &CellValue) -> Result<()> {
    match cell {
        CellValue::Float(f) if !f.is_finite() => Err(ExcelError::UnsupportedValue(format!(
            "{} cannot be stored in a float cell",
            f
        ))),
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

/// Common cell styles referenced by name (`ce1`, `ce2`, ...)
#[derive(Debug, Default)]
pub struct CellStyles {
    entries: IndexSet<(Option<Style>, bool)>,
}

impl CellStyles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Style name for a cell, `None` for unstyled non-date cells
    pub fn name_for(&mut self, style: Option<&Style>, date: bool) -> Result<Option<String>> {
        if style.is_none() && !date {
            return Ok(None);
        }
        if let Some(style) = style {
            style.validate()?;
        }
        let (index, _) = self.entries.insert_full((style.cloned(), date));
        Ok(Some(format!("ce{}", index + 1)))
    }

    /// Contents of `<office:styles>`: the date data style and every cell style
    pub fn write_xml<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        xml.write_str(
            "<number:date-style style:name=\"N1\">\
             <number:year number:style=\"long\"/><number:text>-</number:text>\
             <number:month number:style=\"long\"/><number:text>-</number:text>\
             <number:day number:style=\"long\"/><number:text> </number:text>\
             <number:hours number:style=\"long\"/><number:text>:</number:text>\
             <number:minutes number:style=\"long\"/><number:text>:</number:text>\
             <number:seconds number:style=\"long\"/></number:date-style>",
        )?;

        for (i, (style, date)) in self.entries.iter().enumerate() {
            xml.start_element("style:style")?;
            xml.attribute("style:name", &format!("ce{}", i + 1))?;
            xml.attribute("style:family", "table-cell")?;
            if *date {
                xml.attribute("style:data-style-name", DATE_DATA_STYLE)?;
            }
            match style {
                Some(style) => {
                    xml.close_start_tag()?;
                    write_cell_properties(xml, style)?;
                    write_text_properties(xml, style)?;
                    xml.end_element("style:style")?;
                }
                None => xml.close_empty()?,
            }
        }
        Ok(())
    }
}

fn border_width(border: BorderStyle) -> &'static str {
    match border {
        BorderStyle::Thin => "0.74pt",
        BorderStyle::Medium => "1.76pt",
        BorderStyle::Thick => "2.49pt",
    }
}

fn write_cell_properties<W: Write>(xml: &mut XmlWriter<W>, style: &Style) -> Result<()> {
    if style.background_color.is_none() && style.border.is_none() && !style.wrap_text {
        return Ok(());
    }
    xml.start_element("style:table-cell-properties")?;
    if let Some(color) = &style.background_color {
        xml.attribute("fo:background-color", &format!("#{}", color))?;
    }
    if let Some(border) = style.border {
        xml.attribute("fo:border", &format!("{} solid #000000", border_width(border)))?;
    }
    if style.wrap_text {
        xml.attribute("fo:wrap-option", "wrap")?;
    }
    xml.close_empty()
}

fn write_text_properties<W: Write>(xml: &mut XmlWriter<W>, style: &Style) -> Result<()> {
    xml.start_element("style:text-properties")?;
    if style.bold {
        xml.attribute("fo:font-weight", "bold")?;
    }
    if style.italic {
        xml.attribute("fo:font-style", "italic")?;
    }
    if style.underline {
        xml.attribute("style:text-underline-style", "solid")?;
        xml.attribute("style:text-underline-width", "auto")?;
        xml.attribute("style:text-underline-color", "font-color")?;
    }
    if let Some(size) = style.font_size {
        xml.attribute("fo:font-size", &format!("{}pt", size))?;
    }
    if let Some(color) = &style.font_color {
        xml.attribute("fo:color", &format!("#{}", color))?;
    }
    if let Some(name) = &style.font_name {
        xml.attribute("fo:font-family", name)?;
    }
    xml.close_empty()
}

fn shows_date(cell: &CellValue) -> bool {
    match cell {
        CellValue::DateTime(_) => true,
        CellValue::Formula { cached, .. } => matches!(**cached, CellValue::DateTime(_)),
        _ => false,
    }
}

/// Write one `<table:table-row>`; `style` applies to every cell of the row
pub fn write_row<W: Write>(
    xml: &mut XmlWriter<W>,
    cells: &[CellValue],
    style: Option<&Style>,
    styles: &mut CellStyles,
) -> Result<()> {
    for cell in cells {
        check_encodable(cell)?;
    }

    xml.open_element("table:table-row")?;
    if cells.is_empty() {
        xml.write_str("<table:table-cell/>")?;
    }
    for cell in cells {
        xml.start_element("table:table-cell")?;
        if let Some(name) = styles.name_for(style, shows_date(cell))? {
            xml.attribute("table:style-name", &name)?;
        }
        let value = match cell {
            CellValue::Formula { expression, cached } => {
                xml.attribute("table:formula", &format!("{}{}", FORMULA_PREFIX, expression))?;
                cached.as_ref()
            }
            other => other,
        };
        match value_attributes(xml, value)? {
            Some(text) => {
                xml.close_start_tag()?;
                write_paragraphs(xml, &text)?;
                xml.end_element("table:table-cell")?;
            }
            None => xml.close_empty()?,
        }
    }
    xml.end_element("table:table-row")
}

/// Write the `office:*` value attributes; returns the display text
fn value_attributes<W: Write>(xml: &mut XmlWriter<W>, value: &CellValue) -> Result<Option<String>> {
    Ok(match value {
        CellValue::Empty | CellValue::Formula { .. } => None,
        CellValue::String(s) => {
            xml.attribute("office:value-type", "string")?;
            Some(s.clone())
        }
        CellValue::Int(i) => {
            let text = itoa::Buffer::new().format(*i).to_string();
            xml.attribute("office:value-type", "float")?;
            xml.attribute("office:value", &text)?;
            Some(text)
        }
        CellValue::Float(f) => {
            let text = float_text(*f);
            xml.attribute("office:value-type", "float")?;
            xml.attribute("office:value", &text)?;
            Some(text)
        }
        CellValue::Bool(b) => {
            xml.attribute("office:value-type", "boolean")?;
            xml.attribute("office:boolean-value", if *b { "true" } else { "false" })?;
            Some(if *b { "TRUE" } else { "FALSE" }.to_string())
        }
        CellValue::DateTime(d) => {
            xml.attribute("office:value-type", "date")?;
            xml.attribute("office:date-value", &iso_datetime(d))?;
            Some(d.format(DATETIME_FORMAT).to_string())
        }
    })
}

/// Text as `<text:p>` paragraphs, preserving runs of spaces and tabs
fn write_paragraphs<W: Write>(xml: &mut XmlWriter<W>, text: &str) -> Result<()> {
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            xml.write_str("<text:p/>")?;
            continue;
        }
        xml.open_element("text:p")?;
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        let mut literal = String::new();
        while i < chars.len() {
            match chars[i] {
                ' ' => {
                    let run = chars[i..].iter().take_while(|&&c| c == ' ').count();
                    let at_edge = i == 0 || i + run == chars.len();
                    if run == 1 && !at_edge {
                        literal.push(' ');
                    } else {
                        xml.write_escaped(&literal)?;
                        literal.clear();
                        xml.start_element("text:s")?;
                        if run > 1 {
                            xml.attribute_int("text:c", run as i64)?;
                        }
                        xml.close_empty()?;
                    }
                    i += run;
                }
                '\t' => {
                    xml.write_escaped(&literal)?;
                    literal.clear();
                    xml.write_str("<text:tab/>")?;
                    i += 1;
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        xml.write_escaped(&literal)?;
        xml.end_element("text:p")?;
    }
    Ok(())
}

/// Attributes of a `<table:table-cell>` start tag
#[derive(Debug, Default)]
pub struct CellAttrs {
    pub value_type: Option<String>,
    pub value: Option<String>,
    pub date_value: Option<String>,
    pub boolean_value: Option<String>,
    pub string_value: Option<String>,
    pub formula: Option<String>,
    pub repeated: u32,
}

impl CellAttrs {
    pub fn parse(e: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = CellAttrs {
            repeated: 1,
            ..Default::default()
        };
        for attr in e.attributes() {
            let attr = attr?;
            // LibreOffice mirrors some attributes in its own extension namespaces
            if matches!(
                attr.key.prefix().map(|p| p.into_inner()),
                Some(b"calcext") | Some(b"loext")
            ) {
                continue;
            }
            let slot = match attr.key.local_name().as_ref() {
                b"value-type" => &mut attrs.value_type,
                b"value" => &mut attrs.value,
                b"date-value" => &mut attrs.date_value,
                b"boolean-value" => &mut attrs.boolean_value,
                b"string-value" => &mut attrs.string_value,
                b"formula" => &mut attrs.formula,
                b"number-columns-repeated" => {
                    attrs.repeated = attr
                        .unescape_value()?
                        .trim()
                        .parse()
                        .map_err(|_| ExcelError::Format("invalid number-columns-repeated".to_string()))?;
                    continue;
                }
                _ => continue,
            };
            *slot = Some(attr.unescape_value()?.into_owned());
        }
        Ok(attrs)
    }
}

/// Repeat count from a `number-rows-repeated` attribute
pub fn rows_repeated(e: &BytesStart<'_>) -> Result<u32> {
    match crate::container::attr_value(e, b"number-rows-repeated")? {
        Some(n) => n
            .trim()
            .parse()
            .map_err(|_| ExcelError::Format(format!("invalid number-rows-repeated '{}'", n))),
        None => Ok(1),
    }
}

/// Turn decoded attributes and paragraph text into a value
pub fn decode_cell(attrs: &CellAttrs, text: Option<String>) -> CellValue {
    let text_value = |text: Option<String>| text.map(CellValue::String).unwrap_or(CellValue::Empty);

    let computed = match attrs.value_type.as_deref() {
        Some("float") | Some("percentage") | Some("currency") => attrs
            .value
            .as_deref()
            .and_then(parse_number)
            .unwrap_or_else(|| text_value(text)),
        Some("boolean") => CellValue::Bool(matches!(
            attrs.boolean_value.as_deref().map(str::trim),
            Some("true") | Some("1")
        )),
        Some("date") => attrs
            .date_value
            .as_deref()
            .and_then(parse_iso_datetime)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| text_value(text)),
        Some("string") => CellValue::String(
            attrs
                .string_value
                .clone()
                .or(text)
                .unwrap_or_default(),
        ),
        _ => text_value(text),
    };

    match attrs.formula.as_deref() {
        Some(f) => {
            let expression = f.strip_prefix(FORMULA_PREFIX).unwrap_or(f);
            if expression.trim().is_empty() {
                computed
            } else {
                CellValue::formula(expression, computed)
            }
        }
        None => computed,
    }
}

/// Read cells until `</table:table-row>`; the start tag has been consumed.
///
/// Trailing empty cells are not returned.
pub fn read_row<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Vec<CellValue>> {
    let mut cells = Vec::new();
    let mut pending_empty: usize = 0;

    loop {
        let item = match reader.read_event_into(buf)? {
            Event::Start(ref e) if is_cell(e) => RowItem::Cell(CellAttrs::parse(e)?, true),
            Event::Empty(ref e) if is_cell(e) => RowItem::Cell(CellAttrs::parse(e)?, false),
            Event::End(ref e) if e.local_name().as_ref() == b"table-row" => RowItem::End,
            Event::Eof => {
                return Err(ExcelError::Format(
                    "content ended inside a table row".to_string(),
                ))
            }
            _ => RowItem::Other,
        };
        buf.clear();

        let (attrs, has_content) = match item {
            RowItem::Cell(attrs, has_content) => (attrs, has_content),
            RowItem::End => break,
            RowItem::Other => continue,
        };
        let text = if has_content {
            read_cell_text(reader, buf)?
        } else {
            None
        };
        let value = decode_cell(&attrs, text);
        let repeated = attrs.repeated.max(1) as usize;

        if value.is_empty() {
            pending_empty += repeated;
        } else {
            cells.extend(std::iter::repeat(CellValue::Empty).take(pending_empty));
            pending_empty = 0;
            cells.extend(std::iter::repeat(value).take(repeated));
        }
    }
    Ok(cells)
}

enum RowItem {
    Cell(CellAttrs, bool),
    End,
    Other,
}

fn is_cell(e: &BytesStart<'_>) -> bool {
    matches!(
        e.local_name().as_ref(),
        b"table-cell" | b"covered-table-cell"
    )
}

/// Paragraph text of a cell; `None` if the cell has no `<text:p>`
fn read_cell_text<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Option<String>> {
    let mut text: Option<String> = None;
    let mut in_paragraph = false;
    let mut paragraphs = 0usize;
    let mut annotation_depth = 0usize;

    loop {
        match reader.read_event_into(buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"annotation" => annotation_depth += 1,
            Event::End(ref e) if e.local_name().as_ref() == b"annotation" => {
                annotation_depth = annotation_depth.saturating_sub(1)
            }
            _ if annotation_depth > 0 => {}
            Event::Start(ref e) if e.local_name().as_ref() == b"p" => {
                let t = text.get_or_insert_with(String::new);
                if paragraphs > 0 {
                    t.push('\n');
                }
                paragraphs += 1;
                in_paragraph = true;
            }
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"p" => {
                    let t = text.get_or_insert_with(String::new);
                    if paragraphs > 0 {
                        t.push('\n');
                    }
                    paragraphs += 1;
                }
                b"s" if in_paragraph => {
                    let count: usize = crate::container::attr_value(e, b"c")?
                        .and_then(|c| c.trim().parse().ok())
                        .unwrap_or(1);
                    text.get_or_insert_with(String::new)
                        .extend(std::iter::repeat(' ').take(count));
                }
                b"tab" if in_paragraph => text.get_or_insert_with(String::new).push('\t'),
                b"line-break" if in_paragraph => text.get_or_insert_with(String::new).push('\n'),
                _ => {}
            },
            Event::Text(ref t) if in_paragraph => {
                text.get_or_insert_with(String::new).push_str(&t.unescape()?)
            }
            Event::CData(ref t) if in_paragraph => text
                .get_or_insert_with(String::new)
                .push_str(&String::from_utf8_lossy(t)),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"p" => in_paragraph = false,
                b"table-cell" | b"covered-table-cell" => break,
                _ => {}
            },
            Event::Eof => {
                return Err(ExcelError::Format(
                    "content ended inside a table cell".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    buf.clear();
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn written(cells: &[CellValue], style: Option<&Style>) -> String {
        let mut out = Vec::new();
        let mut styles = CellStyles::new();
        {
            let mut xml = XmlWriter::new(&mut out);
            write_row(&mut xml, cells, style, &mut styles).unwrap();
            xml.flush().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    fn read(xml: &str) -> Vec<CellValue> {
        let mut reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        loop {
            if let Event::Start(e) = reader.read_event_into(&mut buf).unwrap() {
                if e.local_name().as_ref() == b"table-row" {
                    break;
                }
            }
            buf.clear();
        }
        buf.clear();
        read_row(&mut reader, &mut buf).unwrap()
    }

    #[test]
    fn test_write_cells() {
        let xml = written(
            &[
                CellValue::from("a  b"),
                CellValue::Int(3),
                CellValue::Empty,
                CellValue::Bool(true),
                CellValue::formula("=A1*2", CellValue::Float(6.0)),
            ],
            None,
        );
        assert_eq!(
            xml,
            "<table:table-row>\
             <table:table-cell office:value-type=\"string\"><text:p>a<text:s text:c=\"2\"/>b</text:p></table:table-cell>\
             <table:table-cell office:value-type=\"float\" office:value=\"3\"><text:p>3</text:p></table:table-cell>\
             <table:table-cell/>\
             <table:table-cell office:value-type=\"boolean\" office:boolean-value=\"true\"><text:p>TRUE</text:p></table:table-cell>\
             <table:table-cell table:formula=\"of:=A1*2\" office:value-type=\"float\" office:value=\"6.0\"><text:p>6.0</text:p></table:table-cell>\
             </table:table-row>"
        );
    }

    #[test]
    fn test_styles_named_per_combination() {
        let mut styles = CellStyles::new();
        let bold = Style::new().bold();
        assert_eq!(styles.name_for(None, false).unwrap(), None);
        assert_eq!(styles.name_for(Some(&bold), false).unwrap().as_deref(), Some("ce1"));
        assert_eq!(styles.name_for(None, true).unwrap().as_deref(), Some("ce2"));
        assert_eq!(styles.name_for(Some(&bold), false).unwrap().as_deref(), Some("ce1"));
        assert!(styles
            .name_for(Some(&Style::new().font_color("red")), false)
            .is_err());
    }

    #[test]
    fn test_read_cells() {
        let cells = read(
            "<table:table-row>\
             <table:table-cell office:value-type=\"float\" office:value=\"42\" calcext:value-type=\"float\"><text:p>42</text:p></table:table-cell>\
             <table:table-cell table:number-columns-repeated=\"2\"/>\
             <table:table-cell office:value-type=\"string\"><text:p><text:s/>x<text:tab/>y</text:p><text:p>z<text:s text:c=\"2\"/></text:p></table:table-cell>\
             <table:table-cell office:value-type=\"date\" office:date-value=\"2024-01-31T10:00:00\"><text:p>31/01/2024</text:p></table:table-cell>\
             <table:table-cell office:value-type=\"float\" office:value=\"2.5\" table:number-columns-repeated=\"2\"><office:annotation><text:p>note</text:p></office:annotation><text:p>2.5</text:p></table:table-cell>\
             <table:table-cell table:formula=\"of:=[.A1]+1\" office:value-type=\"float\" office:value=\"43\"><text:p>43</text:p></table:table-cell>\
             <table:table-cell table:number-columns-repeated=\"1000\"/>\
             </table:table-row>",
        );
        let date = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::Int(42),
                CellValue::Empty,
                CellValue::Empty,
                CellValue::from(" x\ty\nz  "),
                CellValue::DateTime(date),
                CellValue::Float(2.5),
                CellValue::Float(2.5),
                CellValue::formula("=[.A1]+1", CellValue::Int(43)),
            ]
        );
    }

    #[test]
    fn test_unencodable_rejected_before_writing() {
        let mut out = Vec::new();
        let mut xml = XmlWriter::new(&mut out);
        let nested = CellValue::Formula {
            expression: "=A1".to_string(),
            cached: Box::new(CellValue::formula("=B1", CellValue::Int(1))),
        };
        let err = write_row(&mut xml, &[CellValue::Int(1), nested], None, &mut CellStyles::new())
            .unwrap_err();
        assert!(matches!(err, ExcelError::UnsupportedValue(_)));
        xml.flush().unwrap();
        assert!(out.is_empty());
    }
}
