//! axum download responses (feature `http`)
//!
//! ```no_run
//! use axum::response::Response;
//! use miniexcel::http::AxumDownload;
//! use miniexcel::{Excel, Row};
//!
//! async fn users() -> Result<Response, String> {
//!     let rows = vec![Row::from_pairs([("name", "ada"), ("role", "admin")])];
//!     let mut download = AxumDownload::default();
//!     Excel::new()
//!         .download("users.xlsx", rows, &mut download)
//!         .map_err(|e| e.to_string())?;
//!     Ok(download.into_response())
//! }
//! ```

use crate::download::{attachment_name, ContentFn, DownloadSink};
use crate::error::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// Sink that renders the download into an axum [`Response`]
///
/// The content callback borrows the caller's rows, so the body is produced
/// in full inside [`DownloadSink::stream_download`] and handed to axum as
/// one buffer.
#[derive(Debug, Default)]
pub struct AxumDownload {
    filename: String,
    content_type: String,
    body: Option<Vec<u8>>,
}

impl DownloadSink for AxumDownload {
    fn stream_download(
        &mut self,
        filename: &str,
        content_type: &str,
        content: ContentFn<'_>,
    ) -> Result<()> {
        let mut body = Vec::with_capacity(64 * 1024);
        content(&mut body)?;
        self.filename = attachment_name(filename).to_string();
        self.content_type = content_type.to_string();
        self.body = Some(body);
        Ok(())
    }
}

impl IntoResponse for AxumDownload {
    fn into_response(self) -> Response {
        let Some(body) = self.body else {
            return (StatusCode::NO_CONTENT, ()).into_response();
        };
        let disposition = format!(
            "attachment; filename=\"{}\"",
            self.filename.replace('"', "")
        );
        (
            [
                (header::CONTENT_TYPE, self.content_type),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Excel, Row};

    #[test]
    fn test_response_headers() {
        let mut download = AxumDownload::default();
        Excel::new()
            .download(
                "out/report.csv",
                vec![Row::from_pairs([("a", 1i64)])],
                &mut download,
            )
            .unwrap();
        let response = download.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.csv\""
        );
    }

    #[test]
    fn test_nothing_streamed_is_no_content() {
        let response = AxumDownload::default().into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
