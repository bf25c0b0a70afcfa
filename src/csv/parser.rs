//! CSV parsing with RFC 4180-like behavior

use crate::error::{ExcelError, Result};

/// CSV parser for splitting records into fields
#[derive(Debug, Clone, Copy)]
pub struct CsvParser {
    delimiter: char,
    quote_char: char,
}

impl CsvParser {
    /// Create a new CSV parser with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter: delimiter as char,
            quote_char: quote_char as char,
        }
    }

    /// True while `text` ends inside an open quoted field.
    ///
    /// Doubled quotes contribute two characters, so parity of the quote
    /// count is enough.
    pub fn is_incomplete(&self, text: &str) -> bool {
        text.chars().filter(|&c| c == self.quote_char).count() % 2 == 1
    }

    /// Parse one complete record (which may span physical lines) into fields
    pub fn parse_record(&self, record: &str) -> Result<Vec<String>> {
        let mut fields = Vec::new();
        let mut current_field = String::new();
        let mut in_quotes = false;
        let mut chars = record.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch == self.quote_char {
                if in_quotes {
                    if chars.peek() == Some(&self.quote_char) {
                        current_field.push(self.quote_char);
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            } else if ch == self.delimiter && !in_quotes {
                fields.push(std::mem::take(&mut current_field));
            } else {
                current_field.push(ch);
            }
        }

        if in_quotes {
            return Err(ExcelError::Format(
                "unterminated quoted field in CSV record".to_string(),
            ));
        }

        fields.push(current_field);
        Ok(fields)
    }
}

/// Strip one trailing `\n` or `\r\n`
pub fn trim_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Vec<String> {
        CsvParser::new(b',', b'"').parse_record(line).unwrap()
    }

    #[test]
    fn test_simple() {
        assert_eq!(parse("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse("hello"), vec!["hello"]);
        assert_eq!(parse(""), vec![""]);
    }

    #[test]
    fn test_quoted() {
        assert_eq!(parse(r#""a,b",c"#), vec!["a,b", "c"]);
        assert_eq!(parse(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(parse(r#""","""#), vec!["", ""]);
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(
            parse(r#""Say ""Hello""",world"#),
            vec![r#"Say "Hello""#, "world"]
        );
    }

    #[test]
    fn test_empty_fields() {
        assert_eq!(parse("a,,c"), vec!["a", "", "c"]);
        assert_eq!(parse(",,"), vec!["", "", ""]);
    }

    #[test]
    fn test_multiline_record() {
        let parser = CsvParser::new(b',', b'"');
        assert!(parser.is_incomplete("\"Line 1\n"));
        assert!(!parser.is_incomplete("\"Line 1\nLine 2\",normal\n"));
        assert_eq!(
            parse("\"Line 1\nLine 2\",normal"),
            vec!["Line 1\nLine 2", "normal"]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        let err = CsvParser::new(b',', b'"')
            .parse_record("\"open,field")
            .unwrap_err();
        assert!(matches!(err, ExcelError::Format(_)));
    }

    #[test]
    fn test_custom_delimiter() {
        let parser = CsvParser::new(b';', b'"');
        assert_eq!(
            parser.parse_record(r#"a;"b;c";d"#).unwrap(),
            vec!["a", "b;c", "d"]
        );
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending("a,b\r\n"), "a,b");
        assert_eq!(trim_line_ending("a,b\n"), "a,b");
        assert_eq!(trim_line_ending("a,b"), "a,b");
    }
}
