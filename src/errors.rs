//! Crate-wide error type.
//!
//! Three variants mirror the three error categories the storage engine and REPL
//! distinguish: `Io` and `Storage` are both fatal (operational failure / invariant
//! violation), `Syntax` is a user error the REPL reports and recovers from.

use std::error;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Operational: a read/write/seek against the backing file failed.
    Io(std::io::Error),
    /// Invariant violation: out-of-bounds cell, invalid page number, flush of an
    /// empty slot, or any other condition the node codec/pager/tree treats as a bug.
    Storage(String),
    /// User error: the REPL could not parse or validate a statement.
    Syntax(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Syntax(msg) => write!(f, "Syntax error: {}", msg),
        }
    }
}

impl error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl Error {
    /// True for errors the REPL should treat as fatal (print a diagnostic, exit non-zero)
    /// rather than report and return to the prompt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Storage(_))
    }
}

/// Builds an `Error` of the named variant from a format string, saving the
/// `Error::Variant(format!(...))` boilerplate at call sites in the node codec and tree.
#[macro_export]
macro_rules! err {
    (Storage, $($arg:tt)*) => {
        $crate::errors::Error::Storage(format!($($arg)*))
    };
    (Syntax, $($arg:tt)*) => {
        $crate::errors::Error::Syntax(format!($($arg)*))
    };
}
