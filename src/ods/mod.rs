//! OpenDocument spreadsheets (`.ods`)

pub mod cells;
pub mod reader;
pub mod writer;

pub use cells::CellStyles;
pub use reader::OdsReader;
pub use writer::{OdsWriter, MIMETYPE};
