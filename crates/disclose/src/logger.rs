//! Logging sinks for verification sessions.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{Level, debug, error, info, trace, warn};

/// Target used by [`TracingLogger`] for every event.
pub const LOG_TARGET: &str = "test.validation";

/// Destination for verification output.
pub trait VerificationLogger {
    fn log(&self, level: Level, message: &str);
}

/// Emits events through `tracing` on the `test.validation` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl VerificationLogger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        // Event levels must be known at the call site.
        if level == Level::ERROR {
            error!(target: LOG_TARGET, "{message}");
        } else if level == Level::WARN {
            warn!(target: LOG_TARGET, "{message}");
        } else if level == Level::INFO {
            info!(target: LOG_TARGET, "{message}");
        } else if level == Level::DEBUG {
            debug!(target: LOG_TARGET, "{message}");
        } else {
            trace!(target: LOG_TARGET, "{message}");
        }
    }
}

/// Keeps every message in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    records: Rc<RefCell<Vec<(Level, String)>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in the order they were logged.
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records.borrow().clone()
    }

    /// Messages logged at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|(logged, _)| *logged == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// True if any message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .borrow()
            .iter()
            .any(|(logged, message)| *logged == level && message.contains(needle))
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl VerificationLogger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.records.borrow_mut().push((level, message.to_string()));
    }
}

impl<L: VerificationLogger + ?Sized> VerificationLogger for Box<L> {
    fn log(&self, level: Level, message: &str) {
        (**self).log(level, message);
    }
}

impl<L: VerificationLogger + ?Sized> VerificationLogger for Rc<L> {
    fn log(&self, level: Level, message: &str) {
        (**self).log(level, message);
    }
}
