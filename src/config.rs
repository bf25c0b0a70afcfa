//! Reader/writer and table shaping options

use crate::error::{ExcelError, Result};
use encoding_rs::Encoding;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// CSV dialect and character encoding
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CsvOptions {
    /// Field separator
    pub delimiter: u8,
    /// Quote character used when a field needs enclosing
    pub enclosure: u8,
    /// WHATWG encoding label, e.g. `"UTF-8"`, `"windows-1252"`, `"Shift_JIS"`
    pub encoding: String,
    /// Prefix written output with a byte order mark.
    ///
    /// Readers always skip a leading BOM whatever this is set to.
    pub byte_order_mark: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            enclosure: b'"',
            encoding: "UTF-8".to_string(),
            byte_order_mark: false,
        }
    }
}

impl CsvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_enclosure(mut self, enclosure: u8) -> Self {
        self.enclosure = enclosure;
        self
    }

    pub fn with_encoding(mut self, label: &str) -> Self {
        self.encoding = label.to_string();
        self
    }

    pub fn with_byte_order_mark(mut self, enabled: bool) -> Self {
        self.byte_order_mark = enabled;
        self
    }

    /// Resolve the encoding label and check the dialect is usable
    pub fn resolve(&self) -> Result<&'static Encoding> {
        let encoding = Encoding::for_label(self.encoding.trim().as_bytes()).ok_or_else(|| {
            ExcelError::Argument(format!("unknown encoding '{}'", self.encoding))
        })?;
        if !encoding.is_ascii_compatible() {
            return Err(ExcelError::Argument(format!(
                "encoding '{}' is not ASCII-compatible",
                encoding.name()
            )));
        }
        if self.delimiter == self.enclosure {
            return Err(ExcelError::Argument(
                "delimiter and enclosure must differ".to_string(),
            ));
        }
        for (what, byte) in [("delimiter", self.delimiter), ("enclosure", self.enclosure)] {
            if !byte.is_ascii() || byte == b'\n' || byte == b'\r' {
                return Err(ExcelError::Argument(format!(
                    "{} must be a single ASCII character other than a line break",
                    what
                )));
            }
        }
        Ok(encoding)
    }
}

/// Shape of the table on import and export
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableOptions {
    /// Treat the first captured row as column names
    pub with_header: bool,
    /// Zero-based physical row where header or data capture begins
    pub start_row: usize,
    /// Swap rows and columns
    pub transpose: bool,
    /// One-based sheet to import when a single sheet is requested
    pub sheet_index: usize,
    /// Key multi-sheet imports by sheet name instead of position
    pub use_sheet_names_as_keys: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            with_header: true,
            start_row: 0,
            transpose: false,
            sheet_index: 1,
            use_sheet_names_as_keys: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let csv = CsvOptions::default();
        assert_eq!(csv.delimiter, b',');
        assert_eq!(csv.enclosure, b'"');
        assert!(!csv.byte_order_mark);
        assert_eq!(csv.resolve().unwrap(), encoding_rs::UTF_8);

        let table = TableOptions::default();
        assert!(table.with_header);
        assert_eq!(table.start_row, 0);
        assert_eq!(table.sheet_index, 1);
    }

    #[test]
    fn test_resolve_rejects_bad_dialects() {
        assert!(CsvOptions::new().with_encoding("klingon").resolve().is_err());
        assert!(CsvOptions::new().with_encoding("UTF-16LE").resolve().is_err());
        assert!(CsvOptions::new().with_delimiter(b'"').resolve().is_err());
        assert_eq!(
            CsvOptions::new().with_encoding("latin1").resolve().unwrap(),
            encoding_rs::WINDOWS_1252
        );
    }
}
