//! Error types for the `sse` crate.
use std::error::Error as StdError;
use std::fmt;

/// Top-level error for streaming operations. `error_kind` tells callers what
/// went wrong; `source` keeps the lower-level error (serde, io, channel) that
/// caused it, if any.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Kinds of errors a producer or a connection can run into.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The transport lacks a capability a streaming connection needs. The
    /// connection is refused and never registered.
    UnsupportedTransport(Capability),
    /// A structured payload could not be serialized. Nothing was broadcast.
    Encoding,
    /// Writing or flushing to one client's transport failed. Scoped to that
    /// connection and treated as a disconnect.
    TransportWrite,
    /// The coordinator task is no longer running, e.g. during runtime shutdown.
    CoordinatorUnavailable,
}

/// Transport capabilities required for streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Flush,
    CloseNotify,
}

impl Error {
    pub fn new(error_kind: ErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }

    pub fn unsupported(capability: Capability) -> Self {
        Self::new(ErrorKind::UnsupportedTransport(capability))
    }

    pub fn coordinator_unavailable() -> Self {
        Self::new(ErrorKind::CoordinatorUnavailable)
    }

    pub fn transport_write(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::TransportWrite,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Capability::Flush => write!(f, "Flushing not supported"),
            Capability::CloseNotify => write!(f, "Closing not supported"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::UnsupportedTransport(capability) => write!(f, "{capability}"),
            ErrorKind::Encoding => match &self.source {
                Some(source) => write!(f, "Failed to encode event payload: {source}"),
                None => write!(f, "Failed to encode event payload"),
            },
            ErrorKind::TransportWrite => match &self.source {
                Some(source) => write!(f, "Failed to write to client transport: {source}"),
                None => write!(f, "Failed to write to client transport"),
            },
            ErrorKind::CoordinatorUnavailable => write!(f, "SSE coordinator is not running"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Encoding,
        }
    }
}
