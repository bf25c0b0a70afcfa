//! # miniexcel
//!
//! Streaming import and export of tables as CSV, XLSX and ODS.
//!
//! ## Features
//!
//! - **Streaming Read**: sheet XML is parsed as rows are pulled, never loaded whole
//! - **Streaming Write**: rows are compressed into the container as they are added
//! - **Table shaping**: header rows, start row, transposition and per-row callbacks
//! - **Typed cells**: strings, integers, floats, booleans, dates and formulas with cached results
//! - **Format by name**: `.csv` and `.ods` select their codecs, anything else is XLSX
//! - **Downloads**: stream a file into any HTTP framework through [`DownloadSink`]
//!
//! ## Quick Start
//!
//! ### Importing
//!
//! ```rust,no_run
//! use miniexcel::Excel;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let table = Excel::new().import("users.xlsx")?;
//! for user in table.rows().unwrap_or_default() {
//!     println!("{:?}", user.get_by_name("email"));
//! }
//!
//! // Keep only adults
//! let adults = Excel::new().import_with("users.csv", |row| {
//!     let age = row.get_by_name("age")?.as_string().parse::<u32>().ok()?;
//!     (age >= 18).then_some(row)
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Exporting
//!
//! ```rust,no_run
//! use miniexcel::{CellValue, Excel, Row, Style};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rows = vec![
//!     Row::from_pairs([("name", CellValue::from("ada")), ("score", CellValue::Float(9.5))]),
//!     Row::from_pairs([("name", CellValue::from("alan")), ("score", CellValue::Float(8.0))]),
//! ];
//! Excel::new()
//!     .header_style(Style::new().bold().background_color("#DDEEFF"))
//!     .export("scores.ods", rows)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Row at a time
//!
//! ```rust,no_run
//! use miniexcel::{create_file_writer, CellValue, CsvOptions, Row, SheetWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = create_file_writer("big.xlsx", &CsvOptions::default())?;
//! for i in 0..1_000_000i64 {
//!     writer.add_row(&Row::new(vec![CellValue::Int(i)]), None)?;
//! }
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod container;
pub mod csv;
pub mod csv_reader;
pub mod csv_writer;
pub mod download;
pub mod error;
pub mod format;
#[cfg(feature = "http")]
pub mod http;
pub mod ods;
pub mod reader;
pub mod session;
pub mod transform;
pub mod types;
pub mod writer;
pub mod xlsx;

pub use codec::RowCodec;
pub use config::{CsvOptions, TableOptions};
pub use download::{BufferSink, DownloadSink};
pub use error::{ExcelError, Result};
pub use format::Format;
pub use reader::{open_reader, SheetReader};
pub use session::{CodecFactory, DefaultCodecFactory, Excel, SheetCollection, SheetKey};
pub use transform::Table;
pub use types::{BorderStyle, CellValue, Header, IntoRow, Row, SheetHandle, Style};
pub use writer::{create_file_writer, create_writer, SheetWriter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_imports() {
        let _ = std::marker::PhantomData::<ExcelError>;
        let _ = std::marker::PhantomData::<Box<dyn SheetReader>>;
        let _ = std::marker::PhantomData::<Box<dyn SheetWriter>>;
        let _ = std::marker::PhantomData::<Excel>;
    }
}
