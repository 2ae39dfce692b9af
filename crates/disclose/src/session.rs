//! Verification sessions.
//!
//! A session takes the boolean-like result of an expression, recovers how
//! it was derived from the registry, and logs the outcome:
//!
//! | outcome | message | component dump | call stack |
//! |---------|---------|----------------|------------|
//! | pass    | info    | debug          | -          |
//! | fail    | error   | info           | debug      |
//!
//! Failures accumulate and only surface when the session closes, unless a
//! verification is blocking (or the session is configured to fail fast),
//! in which case the block handler runs immediately.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::rc::Rc;

use disclose_config::{DiscloseConfig, VerificationSettings};
use tracing::{Level, warn};

use crate::error::{TraceResult, VerificationError};
use crate::handlers::{
    BlockHandler, BlockMessage, DefaultBlockHandler, DefaultExitHandler, DefaultFormatter,
    ExitContext, ExitHandler, InFlight, MessageFormatter,
};
use crate::logger::{TracingLogger, VerificationLogger};
use crate::registry::Metadata;
use crate::traced::{Operand, Traced};
use crate::value::Value;

// ============================================================================
// Verifiable Results
// ============================================================================

/// A result resolved for verification: its real value, description and
/// (when traced) its record.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub value: Value,
    pub description: String,
    pub metadata: Option<Rc<Metadata>>,
}

impl Outcome {
    /// An untracked result, described by its display.
    pub fn plain(value: Value) -> Self {
        Self {
            description: value.to_string(),
            value,
            metadata: None,
        }
    }

    /// `description = value` for every component, skipping any that
    /// cannot be rendered.
    pub fn dump_lines(&self) -> Vec<String> {
        self.metadata
            .iter()
            .flat_map(|metadata| metadata.components())
            .filter_map(|component| component.dump_line())
            .collect()
    }
}

/// Anything a session can verify.
pub trait Verifiable {
    fn outcome(&self) -> TraceResult<Outcome>;
}

impl Verifiable for bool {
    fn outcome(&self) -> TraceResult<Outcome> {
        Ok(Outcome::plain(Value::Bool(*self)))
    }
}

impl Verifiable for Value {
    fn outcome(&self) -> TraceResult<Outcome> {
        Ok(Outcome::plain(self.clone()))
    }
}

impl Verifiable for Traced {
    fn outcome(&self) -> TraceResult<Outcome> {
        let metadata = self.metadata()?;
        Ok(Outcome {
            value: metadata.value(),
            description: metadata.label(),
            metadata: Some(metadata),
        })
    }
}

impl Verifiable for &Traced {
    fn outcome(&self) -> TraceResult<Outcome> {
        Traced::outcome(self)
    }
}

impl Verifiable for Operand {
    fn outcome(&self) -> TraceResult<Outcome> {
        match self {
            Operand::Traced(traced) => traced.outcome(),
            Operand::Plain(value) => value.outcome(),
        }
    }
}

// ============================================================================
// Failures
// ============================================================================

/// One failed verification.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The real value that was verified.
    pub result: Value,
    pub description: String,
    pub annotation: String,
    /// Where `verify` was called.
    pub location: &'static Location<'static>,
    /// Caller location, followed by a backtrace when capture is enabled.
    pub call_stack: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.description, self.location)?;
        if !self.annotation.is_empty() {
            write!(f, " ({})", self.annotation)?;
        }
        Ok(())
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

// ============================================================================
// Session
// ============================================================================

/// Accumulates verification outcomes for one logical scope, such as a
/// test case.
pub struct VerificationSession {
    failures: Vec<Failure>,
    state: SessionState,
    settings: VerificationSettings,
    formatter: Box<dyn MessageFormatter>,
    block_handler: Box<dyn BlockHandler>,
    exit_handler: Box<dyn ExitHandler>,
    logger: Box<dyn VerificationLogger>,
}

impl VerificationSession {
    /// A session with the default strategies and settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// A session configured from `disclose.toml` and friends.
    ///
    /// Configuration errors are logged and the defaults used instead.
    pub fn from_environment() -> Self {
        let config = DiscloseConfig::load().unwrap_or_else(|error| {
            warn!(error = %error, "failed to load disclose configuration, using defaults");
            DiscloseConfig::default()
        });
        Self::builder().config(&config).build()
    }

    // ------------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------------

    /// Verifies `result`, logging the outcome and recording a failure if
    /// it is falsy.
    ///
    /// Returns `result` unchanged so the call can sit inside a larger
    /// expression.
    ///
    /// # Errors
    ///
    /// - [`VerificationError::SessionClosed`] once the session is closed.
    /// - [`VerificationError::Trace`] if a traced result has no metadata.
    /// - Whatever the block handler returns for a failing blocking call;
    ///   [`VerificationError::Blocked`] by default.
    #[track_caller]
    pub fn verify<R: Verifiable>(
        &mut self,
        result: R,
        annotation: &str,
        blocking: bool,
    ) -> Result<R, VerificationError> {
        let location = Location::caller();
        if self.state == SessionState::Closed {
            return Err(VerificationError::SessionClosed);
        }

        let outcome = result.outcome()?;
        let passed = outcome.value.is_truthy();
        let dump = if self.settings.dump_components {
            outcome.dump_lines()
        } else {
            Vec::new()
        };
        let message = self
            .formatter
            .format(passed, &outcome.description, annotation);

        if passed {
            self.logger.log(Level::INFO, &message);
            if !dump.is_empty() {
                self.logger.log(Level::DEBUG, &dump.join("\n"));
            }
            return Ok(result);
        }

        let call_stack = self.call_stack(location);
        self.failures.push(Failure {
            result: outcome.value,
            description: outcome.description,
            annotation: annotation.to_string(),
            location,
            call_stack: call_stack.clone(),
        });
        self.logger.log(Level::ERROR, &message);
        if !dump.is_empty() {
            self.logger.log(Level::INFO, &dump.join("\n"));
        }
        self.logger.log(Level::DEBUG, &call_stack);

        if blocking || self.settings.fail_fast {
            self.block_handler
                .block(false, BlockMessage::Formatted(&message))?;
        }
        Ok(result)
    }

    /// Non-blocking verification without an annotation.
    #[track_caller]
    pub fn check<R: Verifiable>(&mut self, result: R) -> Result<R, VerificationError> {
        self.verify(result, "", false)
    }

    /// Blocking verification.
    #[track_caller]
    pub fn require<R: Verifiable>(
        &mut self,
        result: R,
        annotation: &str,
    ) -> Result<R, VerificationError> {
        self.verify(result, annotation, true)
    }

    fn call_stack(&self, location: &'static Location<'static>) -> String {
        self.with_backtrace(format!("verification called at {location}"))
    }

    /// Captured where the scope caught the unwind, not where it started.
    fn panic_trace(&self, message: &str) -> String {
        self.with_backtrace(format!("panic in verification scope: {message}"))
    }

    fn with_backtrace(&self, mut stack: String) -> String {
        if self.settings.capture_backtrace {
            stack.push('\n');
            stack.push_str(&Backtrace::force_capture().to_string());
        }
        stack
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// True if no verification has failed.
    pub fn is_fully_passing(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    // ------------------------------------------------------------------------
    // Scope Exit
    // ------------------------------------------------------------------------

    /// Runs the aggregate check and closes the session.
    ///
    /// # Errors
    ///
    /// [`VerificationError::Aggregate`] (from the default exit handler) if
    /// an assertion was in flight or any verification failed;
    /// [`VerificationError::SessionClosed`] if already closed.
    pub fn close(&mut self, in_flight: Option<&InFlight>) -> Result<(), VerificationError> {
        if self.state == SessionState::Closed {
            return Err(VerificationError::SessionClosed);
        }
        self.state = SessionState::Closed;

        let context = ExitContext {
            failures: &self.failures,
            in_flight,
            logger: self.logger.as_ref(),
        };
        self.exit_handler.on_exit(&context)
    }

    /// Runs `body` against this session, then closes it.
    ///
    /// A blocking failure or a panic inside `body` is reported to the exit
    /// handler as an assertion in flight. If the exit handler lets it
    /// through, the original error is returned (or the panic resumed).
    /// Any other error from `body` is returned once the aggregate check
    /// passes.
    ///
    /// # Errors
    ///
    /// The aggregate error from [`VerificationSession::close`], or the
    /// error returned by `body`.
    pub fn scope<T, F>(&mut self, body: F) -> Result<T, VerificationError>
    where
        F: FnOnce(&mut VerificationSession) -> Result<T, VerificationError>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(self)));

        match outcome {
            Ok(Ok(value)) => {
                self.close(None)?;
                Ok(value)
            }
            Ok(Err(error)) if error.is_assertion() => {
                let mut in_flight = InFlight::new(error.to_string());
                if let Some(failure) = self.failures.last() {
                    in_flight = in_flight.with_trace(failure.call_stack.clone());
                }
                self.close(Some(&in_flight))?;
                Err(error)
            }
            Ok(Err(error)) => {
                self.close(None)?;
                Err(error)
            }
            Err(payload) => {
                let in_flight = InFlight::from_panic(payload.as_ref());
                let trace = self.panic_trace(&in_flight.message);
                self.close(Some(&in_flight.with_trace(trace)))?;
                panic::resume_unwind(payload)
            }
        }
    }
}

impl Default for VerificationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VerificationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationSession")
            .field("state", &self.state)
            .field("failures", &self.failures.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`VerificationSession`].
pub struct SessionBuilder {
    settings: VerificationSettings,
    formatter: Box<dyn MessageFormatter>,
    block_handler: Box<dyn BlockHandler>,
    exit_handler: Box<dyn ExitHandler>,
    logger: Box<dyn VerificationLogger>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            settings: VerificationSettings::default(),
            formatter: Box::new(DefaultFormatter),
            block_handler: Box::new(DefaultBlockHandler),
            exit_handler: Box::new(DefaultExitHandler),
            logger: Box::new(TracingLogger),
        }
    }

    #[must_use]
    pub fn message_formatter(mut self, formatter: impl MessageFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    #[must_use]
    pub fn block_handler(mut self, handler: impl BlockHandler + 'static) -> Self {
        self.block_handler = Box::new(handler);
        self
    }

    #[must_use]
    pub fn exit_handler(mut self, handler: impl ExitHandler + 'static) -> Self {
        self.exit_handler = Box::new(handler);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: impl VerificationLogger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: VerificationSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn config(self, config: &DiscloseConfig) -> Self {
        self.settings(config.verification.clone())
    }

    pub fn build(self) -> VerificationSession {
        VerificationSession {
            failures: Vec::new(),
            state: SessionState::Open,
            settings: self.settings,
            formatter: self.formatter,
            block_handler: self.block_handler,
            exit_handler: self.exit_handler,
            logger: self.logger,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
