//! Buffered XML writer with minimal allocations

use crate::error::{ExcelError, Result};
use std::io::Write;

const FLUSH_THRESHOLD: usize = 4096;

/// Characters XML 1.0 allows in text and attribute values
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Fail on text XML 1.0 cannot carry
pub fn check_text(text: &str) -> Result<()> {
    match text.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(ExcelError::UnsupportedValue(format!(
            "character U+{:04X} cannot be stored in XML text",
            c as u32
        ))),
        None => Ok(()),
    }
}

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

/// XML writer that batches small writes before handing them to the sink
pub struct XmlWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(writer: W) -> Self {
        XmlWriter {
            writer,
            buffer: Vec::with_capacity(8192),
        }
    }

    /// Write raw bytes directly
    #[inline]
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        self.spill()
    }

    /// Write string data
    #[inline]
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_raw(s.as_bytes())
    }

    #[inline]
    pub fn write_int(&mut self, value: i64) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.write_raw(buf.format(value).as_bytes())
    }

    pub fn declaration(&mut self) -> Result<()> {
        self.write_str(XML_DECLARATION)
    }

    /// Write XML element start tag (left open for attributes)
    #[inline]
    pub fn start_element(&mut self, name: &str) -> Result<()> {
        self.buffer.push(b'<');
        self.write_str(name)
    }

    /// `<name>`
    #[inline]
    pub fn open_element(&mut self, name: &str) -> Result<()> {
        self.start_element(name)?;
        self.close_start_tag()
    }

    #[inline]
    pub fn end_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"</")?;
        self.write_str(name)?;
        self.write_raw(b">")
    }

    /// Close a start tag as self-closing (`/>`)
    #[inline]
    pub fn close_empty(&mut self) -> Result<()> {
        self.write_raw(b"/>")
    }

    #[inline]
    pub fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.buffer.push(b' ');
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_escaped(value)?;
        self.write_raw(b"\"")
    }

    #[inline]
    pub fn attribute_int(&mut self, name: &str, value: i64) -> Result<()> {
        self.buffer.push(b' ');
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_int(value)?;
        self.write_raw(b"\"")
    }

    #[inline]
    pub fn close_start_tag(&mut self) -> Result<()> {
        self.write_raw(b">")
    }

    /// `<name>text</name>` with escaping
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.open_element(name)?;
        self.write_escaped(text)?;
        self.end_element(name)
    }

    /// Write text content with XML escaping
    #[inline]
    pub fn write_escaped(&mut self, text: &str) -> Result<()> {
        check_text(text)?;
        for ch in text.chars() {
            match ch {
                '&' => self.buffer.extend_from_slice(b"&amp;"),
                '<' => self.buffer.extend_from_slice(b"&lt;"),
                '>' => self.buffer.extend_from_slice(b"&gt;"),
                '"' => self.buffer.extend_from_slice(b"&quot;"),
                '\'' => self.buffer.extend_from_slice(b"&apos;"),
                c => {
                    let mut utf8 = [0u8; 4];
                    self.buffer
                        .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
            }
        }
        self.spill()
    }

    /// Hand buffered bytes to the sink without flushing it
    pub fn flush_buffer(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush buffer to underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.flush_buffer()?;
        self.writer.flush()?;
        Ok(())
    }

    /// Access the sink; pending bytes are written first
    pub fn get_mut(&mut self) -> Result<&mut W> {
        self.flush_buffer()?;
        Ok(&mut self.writer)
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.flush_buffer()?;
        Ok(self.writer)
    }

    #[inline]
    fn spill(&mut self) -> Result<()> {
        if self.buffer.len() > FLUSH_THRESHOLD {
            self.flush_buffer()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_writer() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.start_element("root").unwrap();
        writer.attribute("attr", "value").unwrap();
        writer.attribute_int("n", -12).unwrap();
        writer.close_start_tag().unwrap();
        writer.write_str("content").unwrap();
        writer.start_element("leaf").unwrap();
        writer.close_empty().unwrap();
        writer.end_element("root").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "<root attr=\"value\" n=\"-12\">content<leaf/></root>"
        );
    }

    #[test]
    fn test_xml_escaping() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.write_escaped("<a href=\"x\">&\tt</a>\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "&lt;a href=&quot;x&quot;&gt;&amp;\tt&lt;/a&gt;\n"
        );
    }

    #[test]
    fn test_illegal_characters_rejected() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        for text in ["a\u{1}b", "\u{0}", "x\u{FFFE}", "\u{1F}"] {
            assert!(matches!(
                writer.write_escaped(text),
                Err(ExcelError::UnsupportedValue(_))
            ));
        }
        writer.write_escaped("ok \u{1F600}").unwrap();
        writer.flush().unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "ok \u{1F600}");
    }
}
