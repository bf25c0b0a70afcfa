//! Error types for miniexcel

use thiserror::Error;

/// Result type alias for miniexcel operations
pub type Result<T> = std::result::Result<T, ExcelError>;

/// Main error type for all import/export operations
#[derive(Error, Debug)]
pub enum ExcelError {
    /// Source or destination unreachable or unwritable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid container, or a row/column cardinality violation
    #[error("Invalid format: {0}")]
    Format(String),

    /// Malformed XML inside a container part
    #[error("Invalid XML: {0}")]
    Xml(String),

    /// Cell value that has no encoding in the target format
    #[error("Unsupported cell value: {0}")]
    UnsupportedValue(String),

    /// Rows requested from a reader that was closed or never opened
    #[error("Reader is not open")]
    ReaderNotOpen,

    /// Writer used after `close()`
    #[error("Writer is already closed")]
    WriterClosed,

    /// Sheet name violates the container's naming rules
    #[error("Invalid sheet name '{name}': {reason}")]
    InvalidSheetName { name: String, reason: String },

    /// Sheet name not present in the workbook
    #[error("Sheet '{sheet}' not found. Available sheets: {available}")]
    SheetNotFound { sheet: String, available: String },

    /// Caller passed data or options of an unsupported shape
    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl From<quick_xml::Error> for ExcelError {
    fn from(err: quick_xml::Error) -> Self {
        ExcelError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ExcelError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ExcelError::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: ExcelError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ExcelError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_sheet_name_message() {
        let err = ExcelError::InvalidSheetName {
            name: "a/b".to_string(),
            reason: "contains '/'".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid sheet name 'a/b': contains '/'");
    }
}
