//! Serialization of values and traced handles.
//!
//! A traced value never reaches serialized output: its `Serialize` impl
//! looks up the real operand in the registry. [`JsonEncoder`] goes one
//! step further and lets an [`EncodeInterceptor`] substitute any operand
//! before normal encoding runs.

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::error::TraceError;
use crate::registry;
use crate::traced::{Operand, Traced};
use crate::value::{Key, Value};

/// Errors from [`JsonEncoder`].
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A traced operand had no metadata to substitute.
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Serialize
// ============================================================================

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Key::Int(i) => serializer.serialize_i64(*i),
            Key::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => serializer.collect_seq(items),
            Value::Map(entries) => serializer.collect_map(entries),
            Value::Object(object) => {
                let mut map = serializer.serialize_map(None)?;
                for (name, value) in object.attrs() {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Function(function) => Err(S::Error::custom(format!(
                "function {} cannot be serialized",
                function.name()
            ))),
        }
    }
}

impl Serialize for Traced {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let metadata = self.metadata().map_err(S::Error::custom)?;
        let operand = metadata.operand();
        operand.serialize(serializer)
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Operand::Traced(traced) => traced.serialize(serializer),
            Operand::Plain(value) => value.serialize(serializer),
        }
    }
}

// ============================================================================
// Interception
// ============================================================================

/// Chance to replace an operand before it is encoded.
pub trait EncodeInterceptor {
    /// Returns the value to encode instead, or `None` to encode normally.
    fn intercept(&self, operand: &Operand) -> Option<Value>;
}

/// Substitutes the real operand of every tracked value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryInterceptor;

impl EncodeInterceptor for RegistryInterceptor {
    fn intercept(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Traced(traced) => registry::lookup(traced.handle())
                .ok()
                .map(|metadata| metadata.value()),
            Operand::Plain(_) => None,
        }
    }
}

impl<F> EncodeInterceptor for F
where
    F: Fn(&Operand) -> Option<Value>,
{
    fn intercept(&self, operand: &Operand) -> Option<Value> {
        self(operand)
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// JSON encoder that consults an interceptor first.
#[derive(Debug, Clone, Default)]
pub struct JsonEncoder<I = RegistryInterceptor> {
    interceptor: I,
    pretty: bool,
}

impl JsonEncoder {
    /// Compact output with the registry interceptor.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: EncodeInterceptor> JsonEncoder<I> {
    /// Replaces the interceptor.
    pub fn with_interceptor<J: EncodeInterceptor>(self, interceptor: J) -> JsonEncoder<J> {
        JsonEncoder {
            interceptor,
            pretty: self.pretty,
        }
    }

    #[must_use]
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Encodes to a JSON string.
    pub fn encode(&self, operand: impl Into<Operand>) -> Result<String, EncodeError> {
        let operand = operand.into();
        let encoded = match self.interceptor.intercept(&operand) {
            Some(value) => self.to_string(&value)?,
            None => self.to_string(&operand)?,
        };
        Ok(encoded)
    }

    /// Encodes to a `serde_json::Value`.
    pub fn to_json(&self, operand: impl Into<Operand>) -> Result<serde_json::Value, EncodeError> {
        let operand = operand.into();
        let encoded = match self.interceptor.intercept(&operand) {
            Some(value) => serde_json::to_value(&value)?,
            None => serde_json::to_value(&operand)?,
        };
        Ok(encoded)
    }

    fn to_string<T: Serialize>(&self, value: &T) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }
}
