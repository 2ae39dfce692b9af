//! Pluggable session strategies.
//!
//! A [`VerificationSession`](crate::VerificationSession) delegates three
//! decisions:
//!
//! - [`MessageFormatter`]: the text logged for each verification.
//! - [`BlockHandler`]: what happens when a blocking verification fails.
//! - [`ExitHandler`]: the aggregate check when the session closes.
//!
//! Closures implement the first two traits directly.

use std::any::Any;
use std::fmt;

use tracing::Level;

use crate::error::VerificationError;
use crate::logger::VerificationLogger;
use crate::session::Failure;

// ============================================================================
// Message Formatting
// ============================================================================

/// Builds the log message for a single verification.
pub trait MessageFormatter {
    fn format(&self, result: bool, description: &str, annotation: &str) -> String;
}

impl<F> MessageFormatter for F
where
    F: Fn(bool, &str, &str) -> String,
{
    fn format(&self, result: bool, description: &str, annotation: &str) -> String {
        self(result, description, annotation)
    }
}

/// Renders
///
/// ```text
/// ::VERIFICATION FAILED::
/// count must reset
/// (counter['count']) == (0)
/// ```
///
/// The annotation line is omitted when the annotation is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl MessageFormatter for DefaultFormatter {
    fn format(&self, result: bool, description: &str, annotation: &str) -> String {
        let verdict = if result { "PASSED" } else { "FAILED" };
        let mut message = format!("::VERIFICATION {verdict}::\n");
        if !annotation.is_empty() {
            message.push_str(annotation);
            message.push('\n');
        }
        message.push_str(description);
        message
    }
}

// ============================================================================
// Blocking
// ============================================================================

/// What a block handler is told about the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMessage<'a> {
    /// A message already produced by the session's formatter.
    Formatted(&'a str),
    /// Raw parts, to be formatted by the handler.
    Parts {
        description: &'a str,
        annotation: &'a str,
    },
}

impl BlockMessage<'_> {
    /// The formatted message, rendering raw parts with [`DefaultFormatter`].
    pub fn render(&self, result: bool) -> String {
        match *self {
            BlockMessage::Formatted(message) => message.to_string(),
            BlockMessage::Parts {
                description,
                annotation,
            } => DefaultFormatter.format(result, description, annotation),
        }
    }
}

/// Invoked for every failing blocking verification.
///
/// Returning `Err` aborts the caller with that error.
pub trait BlockHandler {
    fn block(&self, result: bool, message: BlockMessage<'_>) -> Result<(), VerificationError>;
}

impl<F> BlockHandler for F
where
    F: Fn(bool, BlockMessage<'_>) -> Result<(), VerificationError>,
{
    fn block(&self, result: bool, message: BlockMessage<'_>) -> Result<(), VerificationError> {
        self(result, message)
    }
}

/// Fails with [`VerificationError::Blocked`] carrying the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBlockHandler;

impl BlockHandler for DefaultBlockHandler {
    fn block(&self, result: bool, message: BlockMessage<'_>) -> Result<(), VerificationError> {
        if result {
            return Ok(());
        }
        Err(VerificationError::Blocked {
            message: message.render(result),
        })
    }
}

/// Panics with the message, for callers that want a failing blocking
/// verification to end the test immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicBlockHandler;

impl BlockHandler for PanicBlockHandler {
    fn block(&self, result: bool, message: BlockMessage<'_>) -> Result<(), VerificationError> {
        assert!(result, "{}", message.render(result));
        Ok(())
    }
}

// ============================================================================
// Scope Exit
// ============================================================================

/// An assertion-style failure that was unwinding when the session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub message: String,
    /// Where the failure came from, logged at debug level on exit.
    pub trace: Option<String>,
}

impl InFlight {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Describes a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        Self::new(message)
    }
}

impl fmt::Display for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Everything an exit handler can inspect.
pub struct ExitContext<'a> {
    pub failures: &'a [Failure],
    pub in_flight: Option<&'a InFlight>,
    pub logger: &'a dyn VerificationLogger,
}

/// Performs the aggregate check when a session closes.
pub trait ExitHandler {
    fn on_exit(&self, context: &ExitContext<'_>) -> Result<(), VerificationError>;
}

/// Fails if an assertion was in flight or any verification failed.
///
/// The aggregate message joins, one per line, `Assertion failed: <msg>`
/// and `Verification failed.` as they apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExitHandler;

impl ExitHandler for DefaultExitHandler {
    fn on_exit(&self, context: &ExitContext<'_>) -> Result<(), VerificationError> {
        let mut messages = Vec::new();

        if let Some(in_flight) = context.in_flight {
            if let Some(trace) = &in_flight.trace {
                context.logger.log(Level::DEBUG, trace);
            }
            messages.push(format!("Assertion failed: {}", in_flight.message));
        }
        if !context.failures.is_empty() {
            messages.push("Verification failed.".to_string());
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::Aggregate {
                message: messages.join("\n"),
            })
        }
    }
}
