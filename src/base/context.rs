//! Ergonomic error context helpers.
//!
//! Extension traits that turn `std::io::Error` into context-rich `NetError`
//! variants at the point where the host, port or path is still known.

use crate::base::neterror::{NetError, TransportErrorKind};
use std::io;
use std::path::Path;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use sessionnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect((host, port)).await
    ///     .connection_context(host, port)?;
    /// // Error: "Transport error (connect): example.com:443: connection refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Add file context to an IO error raised while preparing an upload.
    fn file_context(self, path: &Path) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            let kind = match e.kind() {
                io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
                _ => TransportErrorKind::Connect,
            };
            NetError::transport(kind, format!("{host}:{port}: {e}"))
        })
    }

    fn file_context(self, path: &Path) -> Result<T, NetError> {
        self.map_err(|e| NetError::FileUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
