//! `xl/styles.xml`: building the cell format table on write, finding date
//! formats on read

use crate::container::{attr_value, XmlWriter};
use crate::error::Result;
use crate::types::{BorderStyle, Style};
use indexmap::IndexSet;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::Write;

/// Custom number format used for date/time cells
pub const DATE_NUM_FMT_ID: u32 = 164;
pub const DATE_NUM_FMT: &str = "yyyy-mm-dd hh:mm:ss";

const DEFAULT_FONT_NAME: &str = "Calibri";
const DEFAULT_FONT_SIZE: u16 = 11;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct XfKey {
    style: Option<Style>,
    date: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    bold: bool,
    italic: bool,
    underline: bool,
    size: u16,
    name: String,
    color: Option<String>,
}

impl FontKey {
    fn of(style: Option<&Style>) -> Self {
        match style {
            Some(s) => FontKey {
                bold: s.bold,
                italic: s.italic,
                underline: s.underline,
                size: s.font_size.unwrap_or(DEFAULT_FONT_SIZE),
                name: s
                    .font_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FONT_NAME.to_string()),
                color: s.font_color.clone(),
            },
            None => FontKey {
                bold: false,
                italic: false,
                underline: false,
                size: DEFAULT_FONT_SIZE,
                name: DEFAULT_FONT_NAME.to_string(),
                color: None,
            },
        }
    }
}

/// Cell formats registered while rows are written; index 0 is the default
#[derive(Debug)]
pub struct StyleTable {
    xfs: IndexSet<XfKey>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleTable {
    pub fn new() -> Self {
        let mut xfs = IndexSet::new();
        xfs.insert(XfKey {
            style: None,
            date: false,
        });
        StyleTable { xfs }
    }

    /// `s` attribute value for a cell with this style and value kind
    pub fn xf_index(&mut self, style: Option<&Style>, date: bool) -> Result<u32> {
        if let Some(style) = style {
            style.validate()?;
        }
        let (index, _) = self.xfs.insert_full(XfKey {
            style: style.cloned(),
            date,
        });
        Ok(index as u32)
    }

    /// Per xf index: does it format a date?
    pub fn date_flags(&self) -> Vec<bool> {
        self.xfs.iter().map(|k| k.date).collect()
    }

    pub fn write_xml<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        let mut fonts: IndexSet<FontKey> = IndexSet::new();
        fonts.insert(FontKey::of(None));
        let mut fills: IndexSet<String> = IndexSet::new();
        let mut borders: IndexSet<BorderStyle> = IndexSet::new();

        // (numFmtId, fontId, fillId, borderId, wrap)
        let mut cell_xfs = Vec::with_capacity(self.xfs.len());
        for key in &self.xfs {
            let style = key.style.as_ref();
            let font = fonts.insert_full(FontKey::of(style)).0;
            let fill = match style.and_then(|s| s.background_color.clone()) {
                Some(rgb) => fills.insert_full(rgb).0 + 2,
                None => 0,
            };
            let border = match style.and_then(|s| s.border) {
                Some(b) => borders.insert_full(b).0 + 1,
                None => 0,
            };
            let num_fmt = if key.date { DATE_NUM_FMT_ID } else { 0 };
            let wrap = style.map(|s| s.wrap_text).unwrap_or(false);
            cell_xfs.push((num_fmt, font, fill, border, wrap));
        }

        xml.declaration()?;
        xml.start_element("styleSheet")?;
        xml.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        xml.close_start_tag()?;

        xml.start_element("numFmts")?;
        xml.attribute_int("count", 1)?;
        xml.close_start_tag()?;
        xml.start_element("numFmt")?;
        xml.attribute_int("numFmtId", i64::from(DATE_NUM_FMT_ID))?;
        xml.attribute("formatCode", DATE_NUM_FMT)?;
        xml.close_empty()?;
        xml.end_element("numFmts")?;

        xml.start_element("fonts")?;
        xml.attribute_int("count", fonts.len() as i64)?;
        xml.close_start_tag()?;
        for font in &fonts {
            xml.open_element("font")?;
            if font.bold {
                xml.write_str("<b/>")?;
            }
            if font.italic {
                xml.write_str("<i/>")?;
            }
            if font.underline {
                xml.write_str("<u/>")?;
            }
            xml.start_element("sz")?;
            xml.attribute_int("val", i64::from(font.size))?;
            xml.close_empty()?;
            if let Some(rgb) = &font.color {
                xml.start_element("color")?;
                xml.attribute("rgb", &format!("FF{}", rgb))?;
                xml.close_empty()?;
            }
            xml.start_element("name")?;
            xml.attribute("val", &font.name)?;
            xml.close_empty()?;
            xml.write_str("<family val=\"2\"/>")?;
            xml.end_element("font")?;
        }
        xml.end_element("fonts")?;

        xml.start_element("fills")?;
        xml.attribute_int("count", fills.len() as i64 + 2)?;
        xml.close_start_tag()?;
        xml.write_str("<fill><patternFill patternType=\"none\"/></fill>")?;
        xml.write_str("<fill><patternFill patternType=\"gray125\"/></fill>")?;
        for rgb in &fills {
            xml.write_str("<fill><patternFill patternType=\"solid\">")?;
            xml.start_element("fgColor")?;
            xml.attribute("rgb", &format!("FF{}", rgb))?;
            xml.close_empty()?;
            xml.write_str("<bgColor indexed=\"64\"/></patternFill></fill>")?;
        }
        xml.end_element("fills")?;

        xml.start_element("borders")?;
        xml.attribute_int("count", borders.len() as i64 + 1)?;
        xml.close_start_tag()?;
        xml.write_str("<border><left/><right/><top/><bottom/><diagonal/></border>")?;
        for border in &borders {
            let weight = match border {
                BorderStyle::Thin => "thin",
                BorderStyle::Medium => "medium",
                BorderStyle::Thick => "thick",
            };
            xml.open_element("border")?;
            for side in ["left", "right", "top", "bottom"] {
                xml.start_element(side)?;
                xml.attribute("style", weight)?;
                xml.close_start_tag()?;
                xml.write_str("<color auto=\"1\"/>")?;
                xml.end_element(side)?;
            }
            xml.write_str("<diagonal/>")?;
            xml.end_element("border")?;
        }
        xml.end_element("borders")?;

        xml.write_str(
            "<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>",
        )?;

        xml.start_element("cellXfs")?;
        xml.attribute_int("count", cell_xfs.len() as i64)?;
        xml.close_start_tag()?;
        for (num_fmt, font, fill, border, wrap) in cell_xfs {
            xml.start_element("xf")?;
            xml.attribute_int("numFmtId", i64::from(num_fmt))?;
            xml.attribute_int("fontId", font as i64)?;
            xml.attribute_int("fillId", fill as i64)?;
            xml.attribute_int("borderId", border as i64)?;
            xml.attribute_int("xfId", 0)?;
            if num_fmt != 0 {
                xml.attribute("applyNumberFormat", "1")?;
            }
            if font != 0 {
                xml.attribute("applyFont", "1")?;
            }
            if fill != 0 {
                xml.attribute("applyFill", "1")?;
            }
            if border != 0 {
                xml.attribute("applyBorder", "1")?;
            }
            if wrap {
                xml.attribute("applyAlignment", "1")?;
                xml.close_start_tag()?;
                xml.write_str("<alignment wrapText=\"1\"/>")?;
                xml.end_element("xf")?;
            } else {
                xml.close_empty()?;
            }
        }
        xml.end_element("cellXfs")?;

        xml.write_str(
            "<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>",
        )?;
        xml.end_element("styleSheet")?;
        xml.flush_buffer()
    }
}

/// Read `cellXfs` from a styles part: entry `i` is true when xf `i` shows a date
pub fn parse_date_styles(xml: &[u8]) -> Result<Vec<bool>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut custom_formats: HashMap<u32, bool> = HashMap::new();
    let mut flags = Vec::new();
    let mut in_cell_xfs = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let id = attr_value(e, b"numFmtId")?.and_then(|v| v.parse().ok());
                    let code = attr_value(e, b"formatCode")?;
                    if let (Some(id), Some(code)) = (id, code) {
                        custom_formats.insert(id, is_date_format(&code));
                    }
                }
                b"xf" if in_cell_xfs => {
                    let id: u32 = attr_value(e, b"numFmtId")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    let date = custom_formats
                        .get(&id)
                        .copied()
                        .unwrap_or_else(|| is_builtin_date_format(id));
                    flags.push(date);
                }
                _ => {}
            },
            Event::End(ref e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(flags)
}

/// Built-in number formats that display dates or times
pub fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Does a custom format code display a date or time?
///
/// Quoted literals, `\`-escaped characters and bracketed sections such as
/// colours or locales are ignored; elapsed-time sections like `[h]` count.
pub fn is_date_format(code: &str) -> bool {
    // only the positive-number section matters
    let section = code.split(';').next().unwrap_or("");
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let inner: String = chars.by_ref().take_while(|&b| b != ']').collect();
                let inner = inner.to_ascii_lowercase();
                if !inner.is_empty() && inner.chars().all(|ch| matches!(ch, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}
