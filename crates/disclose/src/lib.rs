//! disclose: test verifications that say what they checked
//!
//! Wrap the values a test inspects in [`Traced`] handles. Every operation
//! on a traced value is forwarded to the real value, and the result
//! carries a description of the expression that produced it. A
//! [`VerificationSession`] then logs each verified result with that
//! description, prints the intermediate values on failure, and reports
//! all failures together when the session closes.
//!
//! # Components
//!
//! - **Registry** ([`registry`]): thread-local map from traced handles to
//!   their metadata (real value, description, contributing records).
//!   Entries are released when the last clone of a handle is dropped.
//! - **Traced values** ([`Traced`]): forward attribute, item, call,
//!   iteration, arithmetic and comparison operations, extending the
//!   description as they go.
//! - **Sessions** ([`VerificationSession`]): resolve, log and collect
//!   outcomes through pluggable [`handlers`] and a [`logger`].
//!
//! # Example
//!
//! ```
//! use disclose::{Traced, Value, VerificationError, VerificationSession};
//!
//! let data = Traced::wrap(Value::map([("count", 1)]), "data");
//! let mut session = VerificationSession::new();
//!
//! let reset = data.item("count")?.equals(0)?;
//! session.verify(&reset, "count must reset", false)?;
//!
//! assert!(!session.is_fully_passing());
//! assert_eq!(session.failures()[0].description, "(data['count']) == (0)");
//!
//! let error = session.close(None).unwrap_err();
//! assert_eq!(error.to_string(), "Verification failed.");
//! # Ok::<(), VerificationError>(())
//! ```

mod error;
mod iter;
mod operators;
mod session;
mod traced;

pub mod handlers;
pub mod logger;
pub mod ops;
pub mod registry;
pub mod value;

#[cfg(feature = "json")]
pub mod encode;

pub use disclose_config::{DiscloseConfig, VerificationSettings};
pub use error::{TraceError, TraceResult, ValueError, VerificationError};
pub use handlers::{
    BlockHandler, BlockMessage, DefaultBlockHandler, DefaultExitHandler, DefaultFormatter,
    ExitContext, ExitHandler, InFlight, MessageFormatter, PanicBlockHandler,
};
pub use iter::TracedIter;
pub use logger::{MemoryLogger, TracingLogger, VerificationLogger};
pub use ops::{BinaryOp, CompareOp};
pub use registry::{Handle, Metadata};
pub use session::{
    Failure, Outcome, SessionBuilder, SessionState, Verifiable, VerificationSession,
};
pub use traced::{Args, Operand, Traced};
pub use value::{CallArgs, Function, Key, Object, Value};

#[cfg(feature = "json")]
pub use encode::{EncodeError, EncodeInterceptor, JsonEncoder, RegistryInterceptor};

#[cfg(test)]
mod tests;
