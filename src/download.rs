//! Streaming download responses
//!
//! The library does not own an HTTP stack. A [`DownloadSink`] is whatever the
//! caller's framework uses to stream a file to a client: it receives the
//! filename, the MIME type and a closure that writes the file's bytes.

use crate::error::Result;
use std::io::Write;

/// Producer of a download's body
pub type ContentFn<'a> = Box<dyn FnOnce(&mut dyn Write) -> Result<()> + 'a>;

/// Destination for [`Excel::download`](crate::Excel::download)
pub trait DownloadSink {
    /// Run `content` against the response body
    fn stream_download(
        &mut self,
        filename: &str,
        content_type: &str,
        content: ContentFn<'_>,
    ) -> Result<()>;
}

/// Sink that keeps the download in memory
///
/// # Examples
///
/// ```
/// use miniexcel::{BufferSink, Excel, Row};
///
/// let mut sink = BufferSink::default();
/// Excel::new()
///     .download("users.csv", vec![Row::from_pairs([("name", "ada")])], &mut sink)
///     .unwrap();
/// assert_eq!(sink.content_type, "text/csv");
/// assert_eq!(sink.body, b"name\nada\n");
/// ```
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl DownloadSink for BufferSink {
    fn stream_download(
        &mut self,
        filename: &str,
        content_type: &str,
        content: ContentFn<'_>,
    ) -> Result<()> {
        self.filename = filename.to_string();
        self.content_type = content_type.to_string();
        self.body.clear();
        content(&mut self.body)
    }
}

/// Base name of a download path, as sent in `Content-Disposition`
pub fn attachment_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_replaces_body() {
        let mut sink = BufferSink {
            body: b"stale".to_vec(),
            ..BufferSink::default()
        };
        sink.stream_download(
            "a.csv",
            "text/csv",
            Box::new(|out: &mut dyn Write| {
                out.write_all(b"x\n")?;
                Ok(())
            }),
        )
        .unwrap();
        assert_eq!(sink.filename, "a.csv");
        assert_eq!(sink.body, b"x\n");
    }

    #[test]
    fn test_attachment_name() {
        assert_eq!(attachment_name("exports/2024/report.xlsx"), "report.xlsx");
        assert_eq!(attachment_name("C:\\tmp\\r.ods"), "r.ods");
        assert_eq!(attachment_name("plain.csv"), "plain.csv");
    }
}
