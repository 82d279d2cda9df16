//! Error types for the undo/redo log.
//!
//! A unified error type that can represent failures from the log, the store,
//! and the engine's own invariant checks.

use std::fmt;
use std::io;

/// Unified error type for undo-log operations.
#[derive(Debug)]
pub enum Error {
    /// I/O failure opening, reading, writing, or renaming log/store files.
    Io(io::Error),
    /// Record or store (de)serialization failure.
    Json(serde_json::Error),
    /// On-disk framing is malformed: bad magic, or header/footer length mismatch.
    Corruption(String),
    /// `Store::apply`/`Store::rollback` precondition violated (current value
    /// didn't match the expected old/new value).
    StoreOutOfSync(String),
    /// Caller-facing misuse: undo on empty history, redo with nothing to
    /// redo, an out-of-range redo index, or a write against a sealed log.
    UserError(String),
    /// The transaction body asked to abandon the action. Caught internally
    /// by `OpLog::do_action`; callers of the engine's public API never see
    /// this variant.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{}", e),
            Error::Json(e) => write!(f, "{}", e),
            Error::Corruption(msg) => write!(f, "log corrupted: {}", msg),
            Error::StoreOutOfSync(msg) => write!(f, "store out of sync: {}", msg),
            Error::UserError(msg) => write!(f, "{}", msg),
            Error::Cancelled => write!(f, "transaction cancelled"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

/// Result type alias for undo-log operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_passes_through_inner_messages() {
        let err = Error::UserError("nothing to undo".to_string());
        assert_eq!(err.to_string(), "nothing to undo");
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
