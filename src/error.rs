use std::io;

use nix::libc;

use crate::path::RelPath;
use crate::types::FileType;

/// error type for fileset operations
///
/// every variant belongs to exactly one [`ErrorKind`]; callers branch on
/// `kind()` rather than on the variant or on raw os errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    #[error("not a directory: {path} (found {found})")]
    NotADirectory { path: String, found: &'static str },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// a symlink was found where a path was expected to be traversed
    #[error("breakout: {path} traverses symlink {prefix} -> {target}")]
    Breakout {
        path: String,
        prefix: String,
        target: String,
    },

    #[error("short write: {path}")]
    ShortWrite { path: String },

    #[error("unexpected end of input: {path}")]
    UnexpectedEof { path: String },

    /// a bucket was filled with records that cannot form a tree.
    /// this is a caller bug or malformed input and is never retried.
    #[error("invalid filesystem: {0}")]
    InvalidFilesystem(String),

    #[error("invalid {field} filter {value:?}: {reason}")]
    InvalidFilter {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid ware id {0:?}: expected \"<type>:<hash>\"")]
    InvalidWareId(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("unsupported file type {kind} at {path}")]
    UnsupportedType { path: String, kind: &'static str },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// coarse category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotADirectory,
    PermissionDenied,
    Breakout,
    ShortWrite,
    UnexpectedEof,
    InvalidFilesystem,
    Usage,
    HashMismatch,
    Cancelled,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::NotADirectory { .. } => ErrorKind::NotADirectory,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::Breakout { .. } => ErrorKind::Breakout,
            Error::ShortWrite { .. } => ErrorKind::ShortWrite,
            Error::UnexpectedEof { .. } => ErrorKind::UnexpectedEof,
            Error::InvalidFilesystem(_) | Error::CborEncode(_) => ErrorKind::InvalidFilesystem,
            Error::InvalidFilter { .. }
            | Error::InvalidWareId(_)
            | Error::InvalidPath { .. }
            | Error::InvalidHashHex(_)
            | Error::Config(_)
            | Error::ConfigSerialize(_) => ErrorKind::Usage,
            Error::HashMismatch { .. } => ErrorKind::HashMismatch,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::UnsupportedType { .. } | Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// normalize an os-level error into a kinded error for `path`
    pub fn from_io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.raw_os_error() == Some(libc::ENOTDIR) {
            return Error::NotADirectory {
                path,
                found: "non-directory",
            };
        }
        match source.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path },
            io::ErrorKind::AlreadyExists => Error::AlreadyExists { path },
            io::ErrorKind::PermissionDenied => Error::PermissionDenied { path },
            io::ErrorKind::WriteZero => Error::ShortWrite { path },
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof { path },
            _ => Error::Io { path, source },
        }
    }

    pub(crate) fn not_a_directory(path: &RelPath, found: FileType) -> Self {
        Error::NotADirectory {
            path: path.to_string(),
            found: found.type_name(),
        }
    }
}

/// adapter so nix and std errors share one `with_path` conversion
pub struct ErrorSource(io::Error);

impl From<io::Error> for ErrorSource {
    fn from(e: io::Error) -> Self {
        ErrorSource(e)
    }
}

impl From<nix::errno::Errno> for ErrorSource {
    fn from(e: nix::errno::Errno) -> Self {
        ErrorSource(io::Error::from(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap os errors with path context, normalizing their kind
pub trait IoResultExt<T> {
    fn with_path(self, path: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<ErrorSource>> IoResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| Error::from_io(path.to_string(), e.into().0))
    }
}
