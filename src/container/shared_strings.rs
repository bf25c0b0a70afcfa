//! Shared strings table for string deduplication

use super::xml_writer::XmlWriter;
use crate::error::Result;
use std::collections::HashMap;
use std::io::Write;

/// Workbook-wide string pool referenced by index from `t="s"` cells
#[derive(Debug, Default)]
pub struct SharedStrings {
    strings: Vec<String>,
    lookup: HashMap<String, u32>,
    /// Cells that referenced the pool, written as `count`
    references: u64,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table loaded from an existing workbook; indices are positions in `strings`
    pub fn from_loaded(strings: Vec<String>) -> Self {
        SharedStrings {
            strings,
            lookup: HashMap::new(),
            references: 0,
        }
    }

    /// Index of `s`, adding it on first use
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.references += 1;
        match self.lookup.get(s) {
            Some(&index) => index,
            None => {
                let index = self.strings.len() as u32;
                self.lookup.insert(s.to_owned(), index);
                self.strings.push(s.to_owned());
                index
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    /// Unique strings in the pool
    pub fn count(&self) -> usize {
        self.strings.len()
    }

    /// Write `xl/sharedStrings.xml`
    pub fn write_xml<W: Write>(&self, writer: &mut XmlWriter<W>) -> Result<()> {
        writer.declaration()?;

        writer.start_element("sst")?;
        writer.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
        )?;
        let references = self.references.max(self.strings.len() as u64);
        writer.attribute_int("count", references as i64)?;
        writer.attribute_int("uniqueCount", self.strings.len() as i64)?;
        writer.close_start_tag()?;

        for s in &self.strings {
            writer.open_element("si")?;
            writer.start_element("t")?;
            if needs_space_preserve(s) {
                writer.attribute("xml:space", "preserve")?;
            }
            writer.close_start_tag()?;
            writer.write_escaped(s)?;
            writer.end_element("t")?;
            writer.end_element("si")?;
        }

        writer.end_element("sst")?;
        writer.flush_buffer()
    }
}

/// Leading/trailing whitespace or line breaks are lost unless marked
pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace)
        || s.ends_with(char::is_whitespace)
        || s.contains('\n')
        || s.contains("  ")
}
