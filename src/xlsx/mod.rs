//! Office Open XML spreadsheets (`.xlsx`)

pub mod cells;
pub mod reader;
pub mod styles;
pub mod writer;

pub use reader::XlsxReader;
pub use styles::StyleTable;
pub use writer::{XlsxWriter, MAX_ROWS};
