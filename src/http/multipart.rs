//! Multipart form data framing for file uploads.
//!
//! The file itself is streamed, so a [`Form`] only renders the bytes that go
//! before and after it. The upload body is `prefix ++ file ++ suffix`.
//!
//! # Example
//! ```ignore
//! use sessionnet::http::multipart::Form;
//!
//! let envelope = Form::new()
//!     .text("album", "holiday")
//!     .file("files", "photo.jpg", "image/jpeg")
//!     .into_envelope()?;
//! ```

use crate::base::neterror::NetError;
use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderValue;
use std::borrow::Cow;

/// Rendered framing around a streamed file part.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub content_type: String,
    pub prefix: Bytes,
    pub suffix: Bytes,
}

impl Envelope {
    /// Framing bytes, excluding the file itself.
    pub fn overhead(&self) -> u64 {
        (self.prefix.len() + self.suffix.len()) as u64
    }
}

#[derive(Debug, Clone)]
struct FilePart {
    name: String,
    file_name: String,
    content_type: String,
}

/// A multipart form with text fields and one streamed file part.
#[derive(Debug)]
pub struct Form {
    boundary: String,
    fields: Vec<(String, String)>,
    file: Option<FilePart>,
}

impl Default for Form {
    fn default() -> Self {
        Self::new()
    }
}

impl Form {
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            fields: Vec::new(),
            file: None,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Add a text field. Fields render before the file part.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Set the streamed file part.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.file = Some(FilePart {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
        });
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Render the framing. The file part's content type must be a valid
    /// header value, and no text value may contain the boundary delimiter.
    /// Line breaks inside text values are kept as they are.
    pub fn into_envelope(self) -> Result<Envelope, NetError> {
        if let Some(file) = &self.file {
            HeaderValue::from_str(&file.content_type)
                .map_err(|_| NetError::InvalidHeader(file.content_type.clone()))?;
        }
        let delimiter = format!("--{}", self.boundary);
        if let Some((name, _)) = self.fields.iter().find(|(_, v)| v.contains(&delimiter)) {
            return Err(NetError::InvalidOptions(format!(
                "multipart field {name} contains the form boundary"
            )));
        }

        let content_type = self.content_type();
        let mut prefix = BytesMut::new();

        for (name, value) in &self.fields {
            put_delimiter(&mut prefix, &self.boundary);
            prefix.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    escape_quotes(name)
                )
                .as_bytes(),
            );
            prefix.put_slice(value.as_bytes());
            prefix.put_slice(b"\r\n");
        }

        if let Some(file) = &self.file {
            put_delimiter(&mut prefix, &self.boundary);
            prefix.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: {}\r\n\r\n",
                    escape_quotes(&file.name),
                    escape_quotes(&file.file_name),
                    file.content_type
                )
                .as_bytes(),
            );
        }

        let mut suffix = BytesMut::new();
        if self.file.is_some() {
            suffix.put_slice(b"\r\n");
        }
        suffix.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        Ok(Envelope {
            content_type,
            prefix: prefix.freeze(),
            suffix: suffix.freeze(),
        })
    }
}

fn put_delimiter(buf: &mut BytesMut, boundary: &str) {
    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"\r\n");
}

/// Escape quotes, backslashes and line breaks in a disposition parameter.
fn escape_quotes(s: &str) -> Cow<'_, str> {
    if s.contains(['"', '\\', '\r', '\n']) {
        Cow::Owned(
            s.replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\r', "\\r")
                .replace('\n', "\\n"),
        )
    } else {
        Cow::Borrowed(s)
    }
}

fn generate_boundary() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("----sessionnet-boundary-{nanos:016x}{seq:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(envelope: &Envelope, file: &[u8]) -> String {
        let mut body = envelope.prefix.to_vec();
        body.extend_from_slice(file);
        body.extend_from_slice(&envelope.suffix);
        String::from_utf8(body).unwrap()
    }

    #[test]
    fn test_file_part_framing() {
        let form = Form::new().file("files", "report.csv", "text/csv");
        let boundary = form.boundary().to_string();
        let envelope = form.into_envelope().unwrap();
        let body = assemble(&envelope, b"a,b\n1,2");

        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains("name=\"files\"; filename=\"report.csv\""));
        assert!(body.contains("Content-Type: text/csv\r\n\r\na,b\n1,2\r\n"));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn test_text_fields_precede_file() {
        let envelope = Form::new()
            .text("album", "holiday")
            .file("files", "a.jpg", "image/jpeg")
            .into_envelope()
            .unwrap();
        let body = assemble(&envelope, b"JPEG");

        let field = body.find("name=\"album\"").unwrap();
        let file = body.find("filename=\"a.jpg\"").unwrap();
        assert!(field < file);
        assert!(body.contains("\r\n\r\nholiday\r\n"));
    }

    #[test]
    fn test_overhead_matches_framing() {
        let envelope = Form::new()
            .file("files", "x.bin", "application/octet-stream")
            .into_envelope()
            .unwrap();
        let body = assemble(&envelope, b"12345");
        assert_eq!(envelope.overhead() + 5, body.len() as u64);
    }

    #[test]
    fn test_boundaries_are_unique() {
        assert_ne!(Form::new().boundary(), Form::new().boundary());
        assert!(Form::new().boundary().starts_with("----sessionnet-boundary-"));
    }

    #[test]
    fn test_content_type() {
        let form = Form::new();
        assert!(form
            .content_type()
            .starts_with("multipart/form-data; boundary="));
    }

    #[test]
    fn test_content_type_with_line_break_rejected() {
        let err = Form::new()
            .file("files", "a.txt", "text/plain\r\nX-Injected: 1")
            .into_envelope()
            .unwrap_err();
        assert!(matches!(err, NetError::InvalidHeader(_)));
    }

    #[test]
    fn test_field_value_with_boundary_rejected() {
        let form = Form::new();
        let forged = format!("x\r\n--{}\r\nContent-Disposition: form-data", form.boundary());
        let err = form
            .text("note", forged)
            .file("files", "a.txt", "text/plain")
            .into_envelope()
            .unwrap_err();
        assert_eq!(err.code(), "InvalidOptions");
    }

    #[test]
    fn test_multiline_text_value_kept() {
        let envelope = Form::new()
            .text("message", "line one\r\nline two")
            .into_envelope()
            .unwrap();
        assert!(assemble(&envelope, b"").contains("\r\n\r\nline one\r\nline two\r\n"));
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_quotes("normal"), "normal");
        assert_eq!(escape_quotes("with\"quote"), "with\\\"quote");
        assert_eq!(escape_quotes("with\\slash"), "with\\\\slash");
    }
}
