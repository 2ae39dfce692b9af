//! Error types for traced values and verification sessions.
//!
//! Errors are layered: a [`ValueError`] comes from the real operation on
//! an operand, a [`TraceError`] adds registry misses on top, and a
//! [`VerificationError`] is what a session reports to its caller.

use thiserror::Error;

use crate::registry::Handle;

/// Failure of a real operation performed on an operand.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// The operator is not defined for this pair of operand kinds.
    #[error("unsupported operand types for {op}: '{left}' and '{right}'")]
    UnsupportedOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// The operation is not defined for this operand kind.
    #[error("'{kind}' does not support {operation}")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic left the `i64` range.
    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },

    #[error("negative shift count")]
    NegativeShift,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("'{kind}' object has no attribute '{name}'")]
    NoAttribute { kind: String, name: String },

    #[error("'{0}' object is not callable")]
    NotCallable(&'static str),

    #[error("'{0}' object is not iterable")]
    NotIterable(&'static str),

    #[error("unhashable type: '{0}'")]
    Unhashable(&'static str),

    /// A conversion to a native type was not possible.
    #[error("cannot convert {from} to {target}: {reason}")]
    InvalidCast {
        from: &'static str,
        target: &'static str,
        reason: String,
    },

    /// A wrapped function reported an error.
    #[error("call to {function} failed: {message}")]
    Call { function: String, message: String },
}

/// Failure of an operation on a traced value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    /// No live metadata is registered for the handle.
    #[error("no metadata registered for {0}")]
    Untracked(Handle),

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Errors surfaced by a verification session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    /// A blocking verification failed.
    #[error("{message}")]
    Blocked { message: String },

    /// The aggregate check at scope exit failed.
    #[error("{message}")]
    Aggregate { message: String },

    /// The session was already closed.
    #[error("verification session is closed")]
    SessionClosed,

    /// The verified result could not be resolved.
    #[error(transparent)]
    Trace(#[from] TraceError),
}

impl VerificationError {
    /// Returns true for the assertion-style failures a scope reports as
    /// "Assertion failed".
    pub fn is_assertion(&self) -> bool {
        matches!(self, VerificationError::Blocked { .. })
    }
}

/// Result type for operations on traced values.
pub type TraceResult<T> = Result<T, TraceError>;
