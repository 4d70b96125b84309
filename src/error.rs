//! Error types for layer resolution and stream decoding
//!
//! Every failure in the crate is a [`VfsError`]. Callers that scan many
//! containers usually only care about the broad [`ErrorKind`], e.g. to skip a
//! corrupt compressed stream (`BackEnd`) but abort on a missing image (`Io`).

use std::io;
use thiserror::Error;

/// Result type alias for VFS operations
pub type Result<T> = std::result::Result<T, VfsError>;

/// Broad failure classes a caller can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed path specification, unknown layer kind, bad registration
    Configuration,
    /// A codec or back-end library rejected its input
    BackEnd,
    /// The byte layout violates the container format
    Format,
    /// The resource exists but cannot be accessed (permissions, locked volume)
    Access,
    /// Generic read/seek failure, closed stream, bad offset
    Io,
}

/// Errors that can occur while resolving or reading a layered stream
#[derive(Debug, Error)]
pub enum VfsError {
    /// Invalid or incomplete path specification
    #[error("Path specification error: {0}")]
    PathSpec(String),

    /// No resolver helper registered for a layer kind
    #[error("Unsupported layer type: {0}")]
    UnsupportedType(String),

    /// Registry already holds an entry under this name
    #[error("{registry} already registered: {name}")]
    AlreadyRegistered { registry: &'static str, name: String },

    /// Registry holds no entry under this name
    #[error("{registry} not registered: {name}")]
    NotRegistered { registry: &'static str, name: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Codec or back-end failure on otherwise readable input
    #[error("{backend} failure{}: {message}", .offset.map(|o| format!(" at offset {o}")).unwrap_or_default())]
    BackEnd {
        backend: &'static str,
        message: String,
        offset: Option<u64>,
    },

    /// The data does not follow the expected container layout
    #[error("Format error: {0}")]
    Format(String),

    /// The resource cannot be accessed
    #[error("Access denied: {message}")]
    Access {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Generic I/O failure
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Release of a resolver context entry that is not cached
    #[error("Not cached in resolver context: {0}")]
    NotCached(String),
}

impl VfsError {
    /// Classify the error per the crate's error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::PathSpec(_)
            | VfsError::UnsupportedType(_)
            | VfsError::AlreadyRegistered { .. }
            | VfsError::NotRegistered { .. }
            | VfsError::Config(_) => ErrorKind::Configuration,
            VfsError::BackEnd { .. } => ErrorKind::BackEnd,
            VfsError::Format(_) => ErrorKind::Format,
            VfsError::Access { .. } => ErrorKind::Access,
            VfsError::Io { .. } | VfsError::NotCached(_) => ErrorKind::Io,
        }
    }

    /// I/O error without an underlying OS error
    pub fn io(message: impl Into<String>) -> Self {
        VfsError::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an OS error with context, classifying permission failures as access errors
    pub fn from_io(context: impl Into<String>, err: io::Error) -> Self {
        let message = format!("{}: {}", context.into(), err);
        if err.kind() == io::ErrorKind::PermissionDenied {
            VfsError::Access {
                message,
                source: Some(err),
            }
        } else {
            VfsError::Io {
                message,
                source: Some(err),
            }
        }
    }

    /// Back-end failure without a known offset
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        VfsError::BackEnd {
            backend,
            message: message.into(),
            offset: None,
        }
    }

    /// Attach an offset to a back-end failure; other variants pass through
    pub fn at_offset(self, at: u64) -> Self {
        match self {
            VfsError::BackEnd {
                backend,
                message,
                offset: None,
            } => VfsError::BackEnd {
                backend,
                message,
                offset: Some(at),
            },
            other => other,
        }
    }

    /// Error for an operation on a closed stream
    pub(crate) fn not_open(what: &str) -> Self {
        VfsError::io(format!("{what} not open"))
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        VfsError::from_io("I/O failure", err)
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(err: serde_json::Error) -> Self {
        VfsError::PathSpec(format!("invalid serialized form: {err}"))
    }
}
