//! Streaming ODS writer
//!
//! Rows are compressed into `content.xml` as they arrive. Styles, metadata
//! and the manifest are written on close.

use super::cells::{self, CellStyles};
use crate::container::{StreamingZipWriter, XmlWriter, COMPRESSION_LEVEL};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::types::{Row, Style};
use crate::writer::{SheetNames, SheetWriter};
use chrono::Utc;
use log::{debug, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const NAMESPACES: &[(&str, &str)] = &[
    ("xmlns:office", "urn:oasis:names:tc:opendocument:xmlns:office:1.0"),
    ("xmlns:style", "urn:oasis:names:tc:opendocument:xmlns:style:1.0"),
    ("xmlns:text", "urn:oasis:names:tc:opendocument:xmlns:text:1.0"),
    ("xmlns:table", "urn:oasis:names:tc:opendocument:xmlns:table:1.0"),
    ("xmlns:number", "urn:oasis:names:tc:opendocument:xmlns:datastyle:1.0"),
    ("xmlns:fo", "urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0"),
    ("xmlns:of", "urn:oasis:names:tc:opendocument:xmlns:of:1.2"),
];

/// ODS writer over any byte sink
pub struct OdsWriter<W: Write> {
    xml: Option<XmlWriter<StreamingZipWriter<W>>>,
    sheets: SheetNames,
    table_open: bool,
    table_rows: u64,
    styles: CellStyles,
    row_count: u64,
}

impl OdsWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::with_capacity(64 * 1024, file))
    }
}

impl<W: Write> OdsWriter<W> {
    /// Start the package: the uncompressed `mimetype` entry, then the body of
    /// `content.xml`
    pub fn new(output: W) -> Result<Self> {
        let mut zip = StreamingZipWriter::new(output, COMPRESSION_LEVEL);
        zip.add_stored_entry("mimetype", MIMETYPE.as_bytes())?;
        zip.start_entry("content.xml")?;

        let mut xml = XmlWriter::new(zip);
        xml.declaration()?;
        xml.start_element("office:document-content")?;
        for (name, uri) in NAMESPACES {
            xml.attribute(name, uri)?;
        }
        xml.attribute("office:version", "1.2")?;
        xml.close_start_tag()?;
        xml.open_element("office:body")?;
        xml.open_element("office:spreadsheet")?;

        Ok(OdsWriter {
            xml: Some(xml),
            sheets: SheetNames::default(),
            table_open: false,
            table_rows: 0,
            styles: CellStyles::new(),
            row_count: 0,
        })
    }

    fn xml(&mut self) -> Result<&mut XmlWriter<StreamingZipWriter<W>>> {
        self.xml.as_mut().ok_or(ExcelError::WriterClosed)
    }

    /// Open `<table:table>` for the most recently registered sheet
    fn begin_table(&mut self) -> Result<()> {
        self.end_table()?;
        let name = self.sheets.names().last().cloned().unwrap_or_default();
        let xml = self.xml()?;
        xml.start_element("table:table")?;
        xml.attribute("table:name", &name)?;
        xml.close_start_tag()?;
        xml.write_str("<table:table-column/>")?;
        self.table_open = true;
        self.table_rows = 0;
        Ok(())
    }

    fn end_table(&mut self) -> Result<()> {
        if self.table_open {
            let empty = self.table_rows == 0;
            let xml = self.xml()?;
            if empty {
                // a table needs at least one row
                xml.write_str("<table:table-row><table:table-cell/></table:table-row>")?;
            }
            xml.end_element("table:table")?;
            self.table_open = false;
        }
        Ok(())
    }

    fn write_styles<X: Write>(&self, xml: &mut XmlWriter<X>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("office:document-styles")?;
        for (name, uri) in NAMESPACES {
            xml.attribute(name, uri)?;
        }
        xml.attribute("office:version", "1.2")?;
        xml.close_start_tag()?;
        xml.open_element("office:styles")?;
        self.styles.write_xml(xml)?;
        xml.end_element("office:styles")?;
        xml.end_element("office:document-styles")?;
        xml.flush_buffer()
    }
}

impl<W: Write> SheetWriter for OdsWriter<W> {
    fn format(&self) -> Format {
        Format::Ods
    }

    fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.xml()?;
        self.sheets.add(name)?;
        debug!("ods: starting sheet '{}'", name);
        self.begin_table()
    }

    fn add_row(&mut self, row: &Row, style: Option<&Style>) -> Result<()> {
        self.xml()?;
        if !self.table_open {
            self.sheets.add_default();
            self.begin_table()?;
        }
        let xml = self.xml.as_mut().ok_or(ExcelError::WriterClosed)?;
        cells::write_row(xml, &row.cells, style, &mut self.styles)?;
        self.row_count += 1;
        self.table_rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.xml.is_none() {
            return Ok(());
        }
        if self.sheets.is_empty() {
            self.sheets.add_default();
            self.begin_table()?;
        }
        self.end_table()?;

        let Some(mut xml) = self.xml.take() else {
            return Ok(());
        };
        xml.end_element("office:spreadsheet")?;
        xml.end_element("office:body")?;
        xml.end_element("office:document-content")?;

        xml.get_mut()?.start_entry("styles.xml")?;
        self.write_styles(&mut xml)?;

        xml.get_mut()?.start_entry("meta.xml")?;
        write_meta(&mut xml)?;

        xml.get_mut()?.start_entry("META-INF/manifest.xml")?;
        xml.write_str(MANIFEST)?;

        let mut output = xml.into_inner()?.finish()?;
        output.flush()?;
        debug!(
            "ods: closed with {} sheet(s), {} row(s)",
            self.sheets.len(),
            self.row_count
        );
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.xml.is_none()
    }
}

impl<W: Write> Drop for OdsWriter<W> {
    fn drop(&mut self) {
        if self.xml.is_some() {
            warn!("ODS writer dropped without close(); the output is not a valid spreadsheet");
        }
    }
}

fn write_meta<X: Write>(xml: &mut XmlWriter<X>) -> Result<()> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    xml.declaration()?;
    xml.write_str(
        "<office:document-meta xmlns:office=\"urn:oasis:names:tc:opendocument:xmlns:office:1.0\" \
         xmlns:meta=\"urn:oasis:names:tc:opendocument:xmlns:meta:1.0\" office:version=\"1.2\">\
         <office:meta><meta:generator>miniexcel</meta:generator>",
    )?;
    xml.text_element("meta:creation-date", &now)?;
    xml.write_str("</office:meta></office:document-meta>")?;
    xml.flush_buffer()
}

const MANIFEST: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<manifest:manifest xmlns:manifest=\"urn:oasis:names:tc:opendocument:xmlns:manifest:1.0\" manifest:version=\"1.2\">\
<manifest:file-entry manifest:full-path=\"/\" manifest:version=\"1.2\" manifest:media-type=\"application/vnd.oasis.opendocument.spreadsheet\"/>\
<manifest:file-entry manifest:full-path=\"content.xml\" manifest:media-type=\"text/xml\"/>\
<manifest:file-entry manifest:full-path=\"styles.xml\" manifest:media-type=\"text/xml\"/>\
<manifest:file-entry manifest:full-path=\"meta.xml\" manifest:media-type=\"text/xml\"/>\
</manifest:manifest>";
