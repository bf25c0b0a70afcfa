//! CSV encoding with RFC 4180-like behavior

/// CSV encoder for writing properly formatted CSV records
#[derive(Debug, Clone, Copy)]
pub struct CsvEncoder {
    delimiter: u8,
    quote_char: u8,
}

impl CsvEncoder {
    /// Create a new CSV encoder with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter,
            quote_char,
        }
    }

    /// Encode entire row into buffer (no line terminator)
    pub fn encode_row<S: AsRef<str>>(&self, fields: &[S], buffer: &mut Vec<u8>) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                buffer.push(self.delimiter);
            }
            self.encode_field(field.as_ref(), buffer);
        }
    }

    /// Encode single field, quoting and doubling embedded quotes when needed
    pub fn encode_field(&self, field: &str, buffer: &mut Vec<u8>) {
        if self.needs_quoting(field) {
            buffer.push(self.quote_char);
            for byte in field.bytes() {
                if byte == self.quote_char {
                    buffer.push(self.quote_char);
                }
                buffer.push(byte);
            }
            buffer.push(self.quote_char);
        } else {
            buffer.extend_from_slice(field.as_bytes());
        }
    }

    /// Check if field requires quoting
    fn needs_quoting(&self, field: &str) -> bool {
        field
            .bytes()
            .any(|b| b == self.delimiter || b == self.quote_char || b == b'\n' || b == b'\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(encoder: CsvEncoder, fields: &[&str]) -> String {
        let mut buffer = Vec::new();
        encoder.encode_row(fields, &mut buffer);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_simple_fields() {
        assert_eq!(encode(CsvEncoder::new(b',', b'"'), &["a", "b", "c"]), "a,b,c");
    }

    #[test]
    fn test_quoted_fields() {
        assert_eq!(encode(CsvEncoder::new(b',', b'"'), &["a,b", "c"]), r#""a,b",c"#);
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(
            encode(CsvEncoder::new(b',', b'"'), &[r#"Say "Hello""#, "world"]),
            r#""Say ""Hello""",world"#
        );
    }

    #[test]
    fn test_line_breaks() {
        let encoder = CsvEncoder::new(b',', b'"');
        assert_eq!(encode(encoder, &["Line 1\nLine 2", "x"]), "\"Line 1\nLine 2\",x");
        assert_eq!(encode(encoder, &["a\rb"]), "\"a\rb\"");
    }

    #[test]
    fn test_empty_fields() {
        assert_eq!(encode(CsvEncoder::new(b',', b'"'), &["a", "", "c"]), "a,,c");
        assert_eq!(encode(CsvEncoder::new(b',', b'"'), &["", "", ""]), ",,");
    }

    #[test]
    fn test_custom_dialect() {
        assert_eq!(
            encode(CsvEncoder::new(b';', b'\''), &["a", "b;c", "it's", "d,e"]),
            "a;'b;c';'it''s';d,e"
        );
    }
}
