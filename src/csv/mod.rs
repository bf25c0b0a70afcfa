//! CSV utilities for encoding and parsing

mod encoder;
mod parser;

pub use encoder::CsvEncoder;
pub use parser::{trim_line_ending, CsvParser};

use crate::types::{float_text, CellValue, DATETIME_FORMAT};
use encoding_rs::{Encoding, UTF_8};
use log::warn;
use std::borrow::Cow;

/// Text written for a cell. CSV has no type hints, so everything becomes text;
/// formulas contribute their cached result.
pub fn field_text(value: &CellValue) -> Cow<'_, str> {
    match value {
        CellValue::Empty => Cow::Borrowed(""),
        CellValue::String(s) => Cow::Borrowed(s),
        CellValue::Int(i) => Cow::Owned(itoa::Buffer::new().format(*i).to_string()),
        CellValue::Float(f) => Cow::Owned(float_text(*f)),
        CellValue::Bool(b) => Cow::Borrowed(if *b { "TRUE" } else { "FALSE" }),
        CellValue::DateTime(d) => Cow::Owned(d.format(DATETIME_FORMAT).to_string()),
        CellValue::Formula { cached, .. } => field_text(cached),
    }
}

/// Value of a parsed field: empty fields are `Empty`, everything else a string
pub fn field_value(text: String) -> CellValue {
    if text.is_empty() {
        CellValue::Empty
    } else {
        CellValue::String(text)
    }
}

/// Transcode UTF-8 text into the target encoding
pub(crate) fn encode_text<'a>(encoding: &'static Encoding, text: &'a str) -> Cow<'a, [u8]> {
    if encoding == UTF_8 {
        return Cow::Borrowed(text.as_bytes());
    }
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        warn!(
            "characters not representable in {} were written as numeric references",
            encoding.name()
        );
    }
    bytes
}

/// Decode bytes of one physical line from the source encoding
pub(crate) fn decode_text<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Cow<'a, str> {
    let (text, malformed) = encoding.decode_without_bom_handling(bytes);
    if malformed {
        warn!(
            "malformed {} input replaced with U+FFFD",
            encoding.name()
        );
    }
    text
}
