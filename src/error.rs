//! Error types for the I/O subsystem
//!
//! The error surface is a small closed set of kinds, so callers can make
//! a retry-vs-abandon decision by matching on the variant alone. We use
//! `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for subsystem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for channels, streams, and durable-write sessions
///
/// Every variant carries the name of the failing operation; the I/O
/// variants additionally carry the byte offset reached when the failure
/// occurred, where one is meaningful (bulk transfers, flushes).
#[derive(Debug, Error)]
pub enum Error {
    /// Interrupted or temporarily unavailable; the identical call may be retried
    #[error("transient I/O error in {op}: {source}")]
    Transient {
        /// Operation that failed
        op: &'static str,
        /// Byte offset reached before the failure, if meaningful
        offset: Option<u64>,
        /// Underlying OS error
        source: io::Error,
    },

    /// Not found, permission denied, device full; must not be retried unchanged
    #[error("permanent I/O error in {op}: {source}")]
    Permanent {
        /// Operation that failed
        op: &'static str,
        /// Byte offset reached before the failure, if meaningful
        offset: Option<u64>,
        /// Underlying OS error
        source: io::Error,
    },

    /// The backing storage exposes no durability primitive
    ///
    /// Surfaced instead of silently downgrading a commit to a flush-only
    /// guarantee.
    #[error("durability unavailable in {op}: {reason}")]
    Durability {
        /// Operation that failed
        op: &'static str,
        /// Why the durability barrier is unavailable
        reason: String,
    },

    /// Misuse of a component's state machine
    ///
    /// Examples: push after close, writing through an aborted session,
    /// operating on a closed channel.
    #[error("protocol violation in {op}: {reason}")]
    Protocol {
        /// Operation that was misused
        op: &'static str,
        /// Description of the state-machine violation
        reason: String,
    },
}

impl Error {
    /// Classify a raw OS error under the operation that produced it.
    ///
    /// `Interrupted`, `WouldBlock`, and `TimedOut` are transient; every
    /// other kind is permanent.
    pub fn from_io(op: &'static str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Error::Transient {
                    op,
                    offset: None,
                    source,
                }
            }
            _ => Error::Permanent {
                op,
                offset: None,
                source,
            },
        }
    }

    /// Classify a raw OS error, recording the byte offset reached so far.
    pub fn from_io_at(op: &'static str, offset: u64, source: io::Error) -> Self {
        Error::from_io(op, source).with_offset(offset)
    }

    /// Build a durability error.
    pub fn durability(op: &'static str, reason: impl Into<String>) -> Self {
        Error::Durability {
            op,
            reason: reason.into(),
        }
    }

    /// Build a protocol (state-machine misuse) error.
    pub fn protocol(op: &'static str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            op,
            reason: reason.into(),
        }
    }

    /// Whether the identical call may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// Name of the operation that failed.
    pub fn op(&self) -> &'static str {
        match self {
            Error::Transient { op, .. }
            | Error::Permanent { op, .. }
            | Error::Durability { op, .. }
            | Error::Protocol { op, .. } => op,
        }
    }

    /// Byte offset reached before the failure, if one was recorded.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Error::Transient { offset, .. } | Error::Permanent { offset, .. } => *offset,
            _ => None,
        }
    }

    /// Re-stamp the operation context, preserving the error kind.
    ///
    /// Used by wrapping layers (a flush failure inside `write` keeps its
    /// transient/permanent classification but reports the outer call).
    pub fn at(self, op: &'static str) -> Self {
        match self {
            Error::Transient { offset, source, .. } => Error::Transient { op, offset, source },
            Error::Permanent { offset, source, .. } => Error::Permanent { op, offset, source },
            Error::Durability { reason, .. } => Error::Durability { op, reason },
            Error::Protocol { reason, .. } => Error::Protocol { op, reason },
        }
    }

    /// Attach a byte offset to an I/O error; no-op for the other kinds.
    pub fn with_offset(self, at: u64) -> Self {
        match self {
            Error::Transient { op, source, .. } => Error::Transient {
                op,
                offset: Some(at),
                source,
            },
            Error::Permanent { op, source, .. } => Error::Permanent {
                op,
                offset: Some(at),
                source,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_is_transient() {
        let err = Error::from_io("read", io::Error::new(io::ErrorKind::Interrupted, "eintr"));
        assert!(err.is_transient());
        assert_eq!(err.op(), "read");
    }

    #[test]
    fn test_not_found_is_permanent() {
        let err = Error::from_io("open", io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(!err.is_transient());
        assert!(matches!(err, Error::Permanent { .. }));
    }

    #[test]
    fn test_offset_recorded() {
        let err = Error::from_io_at(
            "transfer",
            4096,
            io::Error::new(io::ErrorKind::Other, "disk"),
        );
        assert_eq!(err.offset(), Some(4096));
    }

    #[test]
    fn test_restamp_preserves_kind() {
        let err = Error::from_io("write", io::Error::new(io::ErrorKind::TimedOut, "slow"));
        let err = err.at("flush");
        assert!(err.is_transient());
        assert_eq!(err.op(), "flush");
    }

    #[test]
    fn test_display_durability() {
        let err = Error::durability("commit", "pipe has no durability barrier");
        let msg = err.to_string();
        assert!(msg.contains("durability unavailable"));
        assert!(msg.contains("commit"));
    }

    #[test]
    fn test_display_protocol() {
        let err = Error::protocol("push", "push after close");
        assert!(err.to_string().contains("protocol violation"));
    }
}
