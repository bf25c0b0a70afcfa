//! Zip + XML plumbing shared by the XLSX and ODS codecs

pub mod shared_strings;
pub mod streaming_zip_reader;
pub mod streaming_zip_writer;
pub mod xml_writer;

pub use shared_strings::SharedStrings;
pub use streaming_zip_reader::{StreamingZipReader, ZipEntry};
pub use streaming_zip_writer::StreamingZipWriter;
pub use xml_writer::{check_text, XmlWriter};

use crate::error::Result;
use quick_xml::events::BytesStart;

/// Deflate level used for every generated part
pub const COMPRESSION_LEVEL: u32 = 6;

/// Look up an attribute by local name, unescaped
pub(crate) fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
