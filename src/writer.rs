//! Row-at-a-time writers for every supported format
//!
//! A writer streams rows to its destination as they are added. Container
//! formats only become valid files once [`SheetWriter::close`] succeeds; a
//! writer dropped before that leaves a truncated container behind.

use crate::config::CsvOptions;
use crate::csv_writer::CsvWriter;
use crate::error::{ExcelError, Result};
use crate::format::Format;
use crate::ods::OdsWriter;
use crate::types::{Row, Style};
use crate::xlsx::XlsxWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Longest sheet name Excel accepts
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_NAME_CHARS: [char; 7] = ['\\', '/', '?', '*', ':', '[', ']'];

/// Streaming sink for rows
///
/// # Examples
///
/// ```no_run
/// use miniexcel::{create_file_writer, CellValue, CsvOptions, Row, SheetWriter, Style};
///
/// let mut writer = create_file_writer("report.xlsx", &CsvOptions::default()).unwrap();
/// writer.add_sheet("Totals").unwrap();
/// writer
///     .add_row(&Row::new(vec!["region".into(), "sum".into()]), Some(&Style::new().bold()))
///     .unwrap();
/// writer
///     .add_row(&Row::new(vec!["north".into(), CellValue::Int(12)]), None)
///     .unwrap();
/// writer.close().unwrap();
/// ```
pub trait SheetWriter {
    fn format(&self) -> Format;

    /// Start a new sheet; following rows go into it.
    ///
    /// Names must be 1 to 31 characters, must not contain `\ / ? * : [ ]`,
    /// must not start or end with `'`, and must be unique ignoring case.
    fn add_sheet(&mut self, name: &str) -> Result<()>;

    /// Append one row to the current sheet (a default sheet is started if none is)
    fn add_row(&mut self, row: &Row, style: Option<&Style>) -> Result<()>;

    fn add_rows(&mut self, rows: &[Row], style: Option<&Style>) -> Result<()> {
        for row in rows {
            self.add_row(row, style)?;
        }
        Ok(())
    }

    /// Finalize the container. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Writer for `format` over any byte sink
pub fn create_writer<'w, W: Write + 'w>(
    format: Format,
    output: W,
    csv: &CsvOptions,
) -> Result<Box<dyn SheetWriter + 'w>> {
    Ok(match format {
        Format::Csv => Box::new(CsvWriter::new(output, csv)?),
        Format::Xlsx => Box::new(XlsxWriter::new(output)),
        Format::Ods => Box::new(OdsWriter::new(output)?),
    })
}

/// Create `path` and pick the writer from its extension
pub fn create_file_writer<P: AsRef<Path>>(
    path: P,
    csv: &CsvOptions,
) -> Result<Box<dyn SheetWriter>> {
    let format = Format::from_path(&path);
    let file = File::create(path.as_ref())?;
    log::debug!("writing {:?} to {}", format, path.as_ref().display());
    create_writer(format, BufWriter::with_capacity(64 * 1024, file), csv)
}

/// Check a sheet name against the naming rules shared by XLSX and ODS
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let invalid = |reason: String| ExcelError::InvalidSheetName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty".to_string()));
    }
    if name.chars().count() > MAX_SHEET_NAME_LEN {
        return Err(invalid(format!(
            "longer than {} characters",
            MAX_SHEET_NAME_LEN
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_NAME_CHARS.contains(c)) {
        return Err(invalid(format!("contains '{}'", c)));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(invalid("starts or ends with an apostrophe".to_string()));
    }
    Ok(())
}

/// Sheet names of a workbook being written
#[derive(Debug, Default)]
pub(crate) struct SheetNames {
    names: Vec<String>,
}

impl SheetNames {
    /// Register an explicitly named sheet
    pub fn add(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name)?;
        if self.contains(name) {
            return Err(ExcelError::InvalidSheetName {
                name: name.to_string(),
                reason: "a sheet with this name already exists".to_string(),
            });
        }
        self.names.push(name.to_string());
        Ok(())
    }

    /// Register an implicit sheet: `Sheet1`, or the next free `SheetN`
    pub fn add_default(&mut self) -> &str {
        let mut n = self.names.len() + 1;
        let mut name = format!("Sheet{}", n);
        while self.contains(&name) {
            n += 1;
            name = format!("Sheet{}", n);
        }
        self.names.push(name);
        &self.names[self.names.len() - 1]
    }

    fn contains(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|existing| existing.to_lowercase() == name.to_lowercase())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
