//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout cartkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug)]
pub enum Error {
    /// No decoder recognized the input.
    UnsupportedFormat,
    /// A decoder recognized its magic but a field is inconsistent.
    InvalidFormat(&'static str),
    /// A path did not resolve to anything (blacklisted, missing partition,
    /// unknown top-level name).
    NotFound,
    /// A byte accessor read would have gone outside its window.
    OutOfRange,
    /// ExeFS rebuild exceeded 10 files or an 8-byte name.
    ExeFsCapacity,
    /// A rebuilt region would exceed its size limit.
    SizeLimit,
    /// The tree being rebuilt is not well-formed (duplicate sibling names).
    InvalidTree,
    /// The operation does not make sense for the target (e.g. creating a
    /// directory inside ExeFS).
    NotSupported(&'static str),
    /// An underlying host filesystem or I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedFormat => write!(f, "unsupported container format"),
            Error::InvalidFormat(s) => write!(f, "invalid format: {s}"),
            Error::NotFound => write!(f, "path not found"),
            Error::OutOfRange => write!(f, "read outside accessor window"),
            Error::ExeFsCapacity => write!(f, "exefs capacity exceeded (max 10 files, 8-byte names)"),
            Error::SizeLimit => write!(f, "rebuilt region exceeds size limit"),
            Error::InvalidTree => write!(f, "tree is not well-formed"),
            Error::NotSupported(s) => write!(f, "not supported: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
