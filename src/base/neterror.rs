use std::fmt;
use thiserror::Error;

/// Classification of a failure below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// TCP connect failed (refused, unreachable, name not resolved).
    Connect,
    /// The attempt exceeded its request or resource timeout.
    Timeout,
    /// TLS handshake or configuration failure.
    Tls,
    /// Reading or writing the connection failed mid-exchange.
    Io,
    /// The peer spoke malformed HTTP.
    Protocol,
    /// The redirect chain exceeded the follow limit.
    TooManyRedirects,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Io => "io",
            TransportErrorKind::Protocol => "protocol",
            TransportErrorKind::TooManyRedirects => "too_many_redirects",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("Session for {0} has been invalidated")]
    SessionNotFound(String),
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    #[error("No in-flight task with id {0}")]
    UnknownTask(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("File {path} is unreadable: {message}")]
    FileUnreadable { path: String, message: String },
    #[error("Upload offset {skip} exceeds file length {len}")]
    InvalidUploadOffset { skip: u64, len: u64 },
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl NetError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        NetError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Kind of the underlying transport failure, if this is one.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            NetError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether a retry policy may schedule another attempt after this error.
    ///
    /// Only network-level failures qualify. Redirect loops are deterministic
    /// and never improve on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetError::Transport { kind, .. } if *kind != TransportErrorKind::TooManyRedirects
        )
    }

    /// Stable code handed to bridge callers when rejecting a call.
    pub fn code(&self) -> &'static str {
        match self {
            NetError::MalformedUrl(_) => "MalformedURL",
            NetError::SessionNotFound(_) => "SessionNotFound",
            NetError::Transport { .. } => "TransportError",
            NetError::UnknownTask(_) => "UnknownTask",
            NetError::Cancelled => "Cancelled",
            NetError::InvalidHeader(_) => "InvalidHeader",
            NetError::InvalidOptions(_) => "InvalidOptions",
            NetError::FileUnreadable { .. } => "FileUnreadable",
            NetError::InvalidUploadOffset { .. } => "InvalidUploadOffset",
            NetError::Serialization(_) => "Serialization",
        }
    }
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Serialization(err.to_string())
    }
}
