//! Container format selection by file extension

use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Supported containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Format {
    Csv,
    Xlsx,
    Ods,
}

impl Format {
    /// `.csv` and `.ods` select their codecs; every other name, with or
    /// without an extension, is written and read as XLSX.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Format::Csv,
            Some("ods") => Format::Ods,
            _ => Format::Xlsx,
        }
    }

    /// MIME type for download responses
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Csv => "text/csv",
            Format::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Format::Ods => "application/vnd.oasis.opendocument.spreadsheet",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Xlsx => "xlsx",
            Format::Ods => "ods",
        }
    }

    /// Whether one file can hold several named sheets
    pub fn supports_multiple_sheets(self) -> bool {
        !matches!(self, Format::Csv)
    }
}
