//! Streaming XLSX writer
//!
//! Each sheet is compressed into the archive while its rows arrive. The
//! workbook-level parts that depend on everything written (shared strings,
//! styles, sheet list, content types) are emitted on close.

use super::cells;
use super::styles::StyleTable;
use crate::container::{SharedStrings, StreamingZipWriter, XmlWriter, COMPRESSION_LEVEL};
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::types::{Row, Style};
use crate::writer::{SheetNames, SheetWriter};
use chrono::Utc;
use log::{debug, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Last row number a worksheet can hold
pub const MAX_ROWS: u32 = 1_048_576;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// XLSX writer over any byte sink
pub struct XlsxWriter<W: Write> {
    xml: Option<XmlWriter<StreamingZipWriter<W>>>,
    sheets: SheetNames,
    sheet_open: bool,
    current_row: u32,
    shared_strings: SharedStrings,
    styles: StyleTable,
}

impl XlsxWriter<BufWriter<File>> {
    /// Create the file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::with_capacity(64 * 1024, file)))
    }
}

impl<W: Write> XlsxWriter<W> {
    pub fn new(output: W) -> Self {
        XlsxWriter {
            xml: Some(XmlWriter::new(StreamingZipWriter::new(
                output,
                COMPRESSION_LEVEL,
            ))),
            sheets: SheetNames::default(),
            sheet_open: false,
            current_row: 0,
            shared_strings: SharedStrings::new(),
            styles: StyleTable::new(),
        }
    }

    fn xml(&mut self) -> Result<&mut XmlWriter<StreamingZipWriter<W>>> {
        self.xml.as_mut().ok_or(ExcelError::WriterClosed)
    }

    /// Open the worksheet part for the most recently registered sheet
    fn begin_sheet(&mut self) -> Result<()> {
        self.finish_sheet()?;
        let part = format!("xl/worksheets/sheet{}.xml", self.sheets.len());

        let xml = self.xml()?;
        xml.get_mut()?.start_entry(&part)?;
        xml.declaration()?;
        xml.start_element("worksheet")?;
        xml.attribute("xmlns", MAIN_NS)?;
        xml.attribute("xmlns:r", REL_NS)?;
        xml.close_start_tag()?;
        xml.open_element("sheetData")?;

        self.sheet_open = true;
        self.current_row = 0;
        Ok(())
    }

    fn finish_sheet(&mut self) -> Result<()> {
        if self.sheet_open {
            let xml = self.xml()?;
            xml.end_element("sheetData")?;
            xml.end_element("worksheet")?;
            self.sheet_open = false;
        }
        Ok(())
    }

    fn write_parts(&mut self, xml: &mut XmlWriter<StreamingZipWriter<W>>) -> Result<()> {
        xml.get_mut()?.start_entry("xl/sharedStrings.xml")?;
        self.shared_strings.write_xml(xml)?;

        xml.get_mut()?.start_entry("xl/styles.xml")?;
        self.styles.write_xml(xml)?;

        xml.get_mut()?.start_entry("xl/workbook.xml")?;
        self.write_workbook_xml(xml)?;

        xml.get_mut()?.start_entry("xl/_rels/workbook.xml.rels")?;
        self.write_workbook_rels(xml)?;

        xml.get_mut()?.start_entry("[Content_Types].xml")?;
        self.write_content_types(xml)?;

        xml.get_mut()?.start_entry("_rels/.rels")?;
        xml.write_str(ROOT_RELS)?;

        xml.get_mut()?.start_entry("docProps/core.xml")?;
        write_core_props(xml)?;

        xml.get_mut()?.start_entry("docProps/app.xml")?;
        xml.write_str(APP_PROPS)?;
        xml.flush_buffer()
    }

    fn write_workbook_xml<X: Write>(&self, xml: &mut XmlWriter<X>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("workbook")?;
        xml.attribute("xmlns", MAIN_NS)?;
        xml.attribute("xmlns:r", REL_NS)?;
        xml.close_start_tag()?;
        xml.open_element("sheets")?;
        for (i, name) in self.sheets.names().iter().enumerate() {
            let sheet_id = i as i64 + 1;
            xml.start_element("sheet")?;
            xml.attribute("name", name)?;
            xml.attribute_int("sheetId", sheet_id)?;
            xml.attribute("r:id", &format!("rId{}", sheet_id))?;
            xml.close_empty()?;
        }
        xml.end_element("sheets")?;
        xml.end_element("workbook")?;
        xml.flush_buffer()
    }

    fn write_workbook_rels<X: Write>(&self, xml: &mut XmlWriter<X>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("Relationships")?;
        xml.attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/package/2006/relationships",
        )?;
        xml.close_start_tag()?;

        let count = self.sheets.len();
        let mut relationship = |id: usize, kind: &str, target: &str| -> Result<()> {
            xml.start_element("Relationship")?;
            xml.attribute("Id", &format!("rId{}", id))?;
            xml.attribute("Type", &format!("{}/{}", REL_NS, kind))?;
            xml.attribute("Target", target)?;
            xml.close_empty()
        };
        for i in 1..=count {
            relationship(i, "worksheet", &format!("worksheets/sheet{}.xml", i))?;
        }
        relationship(count + 1, "styles", "styles.xml")?;
        relationship(count + 2, "sharedStrings", "sharedStrings.xml")?;

        xml.end_element("Relationships")?;
        xml.flush_buffer()
    }

    fn write_content_types<X: Write>(&self, xml: &mut XmlWriter<X>) -> Result<()> {
        xml.declaration()?;
        xml.write_str(
            "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
             <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
             <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
             <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
        )?;
        for i in 1..=self.sheets.len() {
            xml.start_element("Override")?;
            xml.attribute("PartName", &format!("/xl/worksheets/sheet{}.xml", i))?;
            xml.attribute(
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            )?;
            xml.close_empty()?;
        }
        xml.write_str(
            "<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\
             <Override PartName=\"/xl/sharedStrings.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml\"/>\
             <Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
             <Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>\
             </Types>",
        )?;
        xml.flush_buffer()
    }
}

impl<W: Write> SheetWriter for XlsxWriter<W> {
    fn format(&self) -> Format {
        Format::Xlsx
    }

    fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.xml()?;
        self.sheets.add(name)?;
        debug!("xlsx: starting sheet '{}'", name);
        self.begin_sheet()
    }

    fn add_row(&mut self, row: &Row, style: Option<&Style>) -> Result<()> {
        self.xml()?;
        if !self.sheet_open {
            self.sheets.add_default();
            self.begin_sheet()?;
        }
        if self.current_row >= MAX_ROWS {
            return Err(ExcelError::Format(format!(
                "a worksheet holds at most {} rows",
                MAX_ROWS
            )));
        }

        let xml = self.xml.as_mut().ok_or(ExcelError::WriterClosed)?;
        cells::write_row(
            xml,
            self.current_row + 1,
            &row.cells,
            style,
            &mut self.shared_strings,
            &mut self.styles,
        )?;
        self.current_row += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.xml.is_none() {
            return Ok(());
        }
        if self.sheets.is_empty() {
            self.sheets.add_default();
            self.begin_sheet()?;
        }
        self.finish_sheet()?;

        let Some(mut xml) = self.xml.take() else {
            return Ok(());
        };
        self.write_parts(&mut xml)?;
        let mut output = xml.into_inner()?.finish()?;
        output.flush()?;

        debug!(
            "xlsx: closed with {} sheet(s), {} shared string(s)",
            self.sheets.len(),
            self.shared_strings.count()
        );
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.xml.is_none()
    }
}

impl<W: Write> Drop for XlsxWriter<W> {
    fn drop(&mut self) {
        if self.xml.is_some() {
            warn!("XLSX writer dropped without close(); the output is not a valid workbook");
        }
    }
}

fn write_core_props<X: Write>(xml: &mut XmlWriter<X>) -> Result<()> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    xml.declaration()?;
    xml.write_str(
        "<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\
         <dc:creator>miniexcel</dc:creator>",
    )?;
    for element in ["dcterms:created", "dcterms:modified"] {
        xml.start_element(element)?;
        xml.attribute("xsi:type", "dcterms:W3CDTF")?;
        xml.close_start_tag()?;
        xml.write_str(&now)?;
        xml.end_element(element)?;
    }
    xml.end_element("cp:coreProperties")?;
    xml.flush_buffer()
}

const ROOT_RELS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties\" Target=\"docProps/core.xml\"/>\
<Relationship Id=\"rId3\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties\" Target=\"docProps/app.xml\"/>\
</Relationships>";

const APP_PROPS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">\
<Application>miniexcel</Application><DocSecurity>0</DocSecurity><ScaleCrop>false</ScaleCrop>\
<LinksUpToDate>false</LinksUpToDate><SharedDoc>false</SharedDoc>\
<HyperlinksChanged>false</HyperlinksChanged><AppVersion>1.0</AppVersion></Properties>";
