use std::{error::Error, fmt, io};

/// Classifies a [`SmallError`] the way the error-handling design expects
/// callers to match on failure class instead of string-sniffing `details`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A log block is not yet fully flushed, or a record parse ran past the
    /// end of the parse buffer. Not fatal; the caller may retry later.
    Truncated,
    /// A record or page failed a structural check (bad type byte,
    /// out-of-range offset, compressed integer overflow, ...).
    Malformed,
    /// The underlying block device failed a read or write.
    Io,
    /// `space_id` has no entry in the tablespace map.
    UnknownTablespace,
    /// `new_page` was called for a `(space, page)` already cached.
    AlreadyPresent,
}

#[derive(Debug)]
pub struct SmallError {
    kind: ErrorKind,
    details: String,
}

impl SmallError {
    pub fn new(msg: &str) -> SmallError {
        SmallError {
            kind: ErrorKind::Malformed,
            details: msg.to_string(),
        }
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> SmallError {
        SmallError {
            kind,
            details: msg.into(),
        }
    }

    pub fn truncated(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Truncated, msg)
    }

    pub fn malformed(msg: impl Into<String>) -> SmallError {
        Self::with_kind(ErrorKind::Malformed, msg)
    }

    pub fn unknown_tablespace(space_id: u32) -> SmallError {
        Self::with_kind(
            ErrorKind::UnknownTablespace,
            format!("no tablespace mapping for space_id {}", space_id),
        )
    }

    pub fn already_present(space_id: u32, page_id: u32) -> SmallError {
        Self::with_kind(
            ErrorKind::AlreadyPresent,
            format!("page ({}, {}) already cached", space_id, page_id),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)
    }
}

impl Error for SmallError {}

impl From<io::Error> for SmallError {
    fn from(e: io::Error) -> Self {
        SmallError::with_kind(ErrorKind::Io, e.to_string())
    }
}

pub type SmallResult = Result<(), SmallError>;
