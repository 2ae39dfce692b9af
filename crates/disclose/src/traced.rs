//! Traced values.
//!
//! A [`Traced`] stands in for a [`Value`]: every operation is forwarded to
//! the real operand, and the result comes back as a new traced value
//! whose description spells out the operation, e.g. `data['a'][1]` or
//! `(len(xs)) >= (3)`. The records of every value that contributed to a
//! result travel with it as its component chain, so a failing
//! verification can print each intermediate value.
//!
//! Conversions to native Rust types (`to_int`, `is_truthy`, ...) return
//! plain values and end the trace.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::{TraceResult, ValueError};
use crate::iter::TracedIter;
use crate::ops::{BinaryOp, CompareOp};
use crate::registry::{self, Handle, Metadata};
use crate::value::{CallArgs, Value};

// ============================================================================
// Proxy Identity
// ============================================================================

/// Shared identity of a traced value and all of its clones.
///
/// The registry holds a weak reference to the cell; dropping the last
/// strong reference releases the registry entry.
#[derive(Debug)]
pub(crate) struct ProxyCell {
    handle: Handle,
}

impl ProxyCell {
    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }
}

impl Drop for ProxyCell {
    fn drop(&mut self) {
        registry::release(self.handle);
    }
}

// ============================================================================
// Operands
// ============================================================================

/// Argument accepted by every traced operation: a traced value or a plain one.
#[derive(Debug, Clone)]
pub enum Operand {
    Traced(Traced),
    Plain(Value),
}

impl Operand {
    /// The real value behind the operand.
    pub fn value(&self) -> TraceResult<Value> {
        match self {
            Operand::Traced(traced) => traced.value(),
            Operand::Plain(value) => Ok(value.clone()),
        }
    }

    /// How the operand reads inside a description.
    pub fn label(&self) -> TraceResult<String> {
        match self {
            Operand::Traced(traced) => traced.label(),
            Operand::Plain(value) => Ok(value.to_string()),
        }
    }

    pub fn is_traced(&self) -> bool {
        matches!(self, Operand::Traced(_))
    }

    fn resolve(&self) -> TraceResult<Resolved> {
        match self {
            Operand::Traced(traced) => traced.resolve(),
            Operand::Plain(value) => Ok(Resolved {
                label: value.to_string(),
                value: value.clone(),
                metadata: None,
            }),
        }
    }
}

impl From<Traced> for Operand {
    fn from(traced: Traced) -> Self {
        Operand::Traced(traced)
    }
}

impl From<&Traced> for Operand {
    fn from(traced: &Traced) -> Self {
        Operand::Traced(traced.clone())
    }
}

impl From<&Operand> for Operand {
    fn from(operand: &Operand) -> Self {
        operand.clone()
    }
}

macro_rules! plain_operand {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for Operand {
            fn from(value: $ty) -> Self {
                Operand::Plain(Value::from(value))
            }
        }
    )*};
}

plain_operand!(Value, bool, i32, i64, u32, f64, &str, String);

/// An operand with its real value, description label and record.
struct Resolved {
    value: Value,
    label: String,
    metadata: Option<Rc<Metadata>>,
}

/// Concatenated component chains of every tracked operand, in order.
fn chain_of<'a>(operands: impl IntoIterator<Item = &'a Resolved>) -> Vec<Rc<Metadata>> {
    operands
        .into_iter()
        .filter_map(|resolved| resolved.metadata.as_ref())
        .flat_map(Metadata::chain)
        .collect()
}

// ============================================================================
// Call Arguments
// ============================================================================

/// Positional and keyword arguments for [`Traced::call`].
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Operand>,
    keyword: Vec<(String, Operand)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Operand>) -> Self {
        self.positional.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

// ============================================================================
// Traced Value
// ============================================================================

/// A value that records how it was derived.
///
/// Cloning is cheap and keeps the identity: clones share one registry
/// entry, which is released when the last clone is dropped.
#[derive(Clone)]
pub struct Traced {
    cell: Rc<ProxyCell>,
}

impl Traced {
    /// Wraps `value` under `description`.
    pub fn wrap(value: impl Into<Value>, description: impl Into<String>) -> Self {
        Self::register(value.into(), Some(description.into()), Vec::new())
    }

    /// Wraps `value` without a description; its display stands in.
    pub fn anonymous(value: impl Into<Value>) -> Self {
        Self::register(value.into(), None, Vec::new())
    }

    /// Wraps an operand, re-wrapping the real value if it is already traced.
    pub fn from_operand(
        operand: impl Into<Operand>,
        description: Option<String>,
        components: Vec<Rc<Metadata>>,
    ) -> TraceResult<Self> {
        let value = operand.into().value()?;
        Ok(Self::register(value, description, components))
    }

    fn register(value: Value, description: Option<String>, components: Vec<Rc<Metadata>>) -> Self {
        let cell = Rc::new(ProxyCell {
            handle: registry::allocate_handle(),
        });
        registry::register(&cell, value, description, components);
        Self { cell }
    }

    pub(crate) fn derive(value: Value, description: String, components: Vec<Rc<Metadata>>) -> Self {
        Self::register(value, Some(description), components)
    }

    fn resolve(&self) -> TraceResult<Resolved> {
        let metadata = self.metadata()?;
        Ok(Resolved {
            value: metadata.value(),
            label: metadata.label(),
            metadata: Some(metadata),
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn handle(&self) -> Handle {
        self.cell.handle()
    }

    pub fn metadata(&self) -> TraceResult<Rc<Metadata>> {
        registry::lookup(self.handle())
    }

    /// A copy of the real operand.
    pub fn value(&self) -> TraceResult<Value> {
        Ok(self.metadata()?.value())
    }

    pub fn description(&self) -> TraceResult<Option<String>> {
        Ok(self.metadata()?.description().map(str::to_string))
    }

    /// The description, or the display of the operand when there is none.
    pub fn label(&self) -> TraceResult<String> {
        Ok(self.metadata()?.label())
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    /// `base.name`
    pub fn attr(&self, name: &str) -> TraceResult<Traced> {
        let metadata = self.metadata()?;
        let value = metadata.operand().get_attr(name)?;
        let description = format!("{}.{name}", metadata.label());
        Ok(Self::derive(value, description, metadata.chain()))
    }

    /// Stores the real value of `value` on the operand.
    pub fn set_attr(&self, name: &str, value: impl Into<Operand>) -> TraceResult<()> {
        let value = value.into().value()?;
        let metadata = self.metadata()?;
        metadata.update(|operand| operand.set_attr(name, value))?;
        Ok(())
    }

    pub fn del_attr(&self, name: &str) -> TraceResult<()> {
        let metadata = self.metadata()?;
        metadata.update(|operand| operand.del_attr(name))?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------------

    /// `len(base)`
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> TraceResult<Traced> {
        let metadata = self.metadata()?;
        let len = metadata.operand().len()?;
        let len = i64::try_from(len).map_err(|_| ValueError::Overflow { op: "len" })?;
        let description = format!("len({})", metadata.label());
        Ok(Self::derive(Value::Int(len), description, metadata.chain()))
    }

    /// `base['key']` for string keys, `base[key]` otherwise.
    pub fn item(&self, key: impl Into<Operand>) -> TraceResult<Traced> {
        let base = self.resolve()?;
        let key = key.into().resolve()?;
        let value = base.value.get_item(&key.value)?;
        let description = match &key.value {
            Value::Str(s) => format!("{}['{s}']", base.label),
            other => format!("{}[{other}]", base.label),
        };
        Ok(Self::derive(value, description, chain_of([&base, &key])))
    }

    /// Stores the real value of `value` under `key`.
    pub fn set_item(&self, key: impl Into<Operand>, value: impl Into<Operand>) -> TraceResult<()> {
        let key = key.into().value()?;
        let value = value.into().value()?;
        let metadata = self.metadata()?;
        metadata.update(|operand| operand.set_item(&key, value))?;
        Ok(())
    }

    pub fn del_item(&self, key: impl Into<Operand>) -> TraceResult<()> {
        let key = key.into().value()?;
        let metadata = self.metadata()?;
        metadata.update(|operand| operand.del_item(&key))?;
        Ok(())
    }

    /// Lazily yields `base[0]`, `base[1]`, ...; map iteration yields keys
    /// as `list(base)[i]`.
    pub fn iter(&self) -> TraceResult<TracedIter> {
        let metadata = self.metadata()?;
        let (items, base) = {
            let operand = metadata.operand();
            let base = match &*operand {
                Value::Map(_) => format!("list({})", metadata.label()),
                _ => metadata.label(),
            };
            (operand.iter_values()?, base)
        };
        Ok(TracedIter::new(items, base, metadata.chain()))
    }

    /// `needle in base`
    pub fn contains(&self, needle: impl Into<Operand>) -> TraceResult<Traced> {
        let base = self.resolve()?;
        let needle = needle.into().resolve()?;
        let found = base.value.contains(&needle.value)?;
        let description = format!("{} in {}", needle.label, base.label);
        Ok(Self::derive(
            Value::Bool(found),
            description,
            chain_of([&base, &needle]),
        ))
    }

    /// `reversed(base)`
    pub fn reversed(&self) -> TraceResult<Traced> {
        let metadata = self.metadata()?;
        let value = metadata.operand().reversed()?;
        let description = format!("reversed({})", metadata.label());
        Ok(Self::derive(value, description, metadata.chain()))
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// `base(a, b, name=c)`
    pub fn call(&self, args: Args) -> TraceResult<Traced> {
        let callee = self.resolve()?;
        let positional = args
            .positional
            .iter()
            .map(Operand::resolve)
            .collect::<TraceResult<Vec<_>>>()?;
        let keyword = args
            .keyword
            .iter()
            .map(|(name, operand)| Ok((name.clone(), operand.resolve()?)))
            .collect::<TraceResult<Vec<_>>>()?;

        let rendered: Vec<String> = positional
            .iter()
            .map(|arg| arg.label.clone())
            .chain(keyword.iter().map(|(name, arg)| format!("{name}={}", arg.label)))
            .collect();
        let description = format!("{}({})", callee.label, rendered.join(", "));

        let call_args = CallArgs {
            positional: positional.iter().map(|arg| arg.value.clone()).collect(),
            keyword: keyword
                .iter()
                .map(|(name, arg)| (name.clone(), arg.value.clone()))
                .collect(),
        };
        let value = callee.value.call(&call_args)?;

        let components = chain_of(
            std::iter::once(&callee)
                .chain(positional.iter())
                .chain(keyword.iter().map(|(_, arg)| arg)),
        );
        Ok(Self::derive(value, description, components))
    }

    // ------------------------------------------------------------------------
    // Binary Operators
    // ------------------------------------------------------------------------

    /// `(self) OP (rhs)`
    pub fn binary(&self, op: BinaryOp, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        let left = self.resolve()?;
        let right = rhs.into().resolve()?;
        Self::apply_binary(op, &left, &right)
    }

    /// `(lhs) OP (self)`, for when the traced value is on the right.
    pub fn reflected(&self, op: BinaryOp, lhs: impl Into<Operand>) -> TraceResult<Traced> {
        let left = lhs.into().resolve()?;
        let right = self.resolve()?;
        Self::apply_binary(op, &left, &right)
    }

    fn apply_binary(op: BinaryOp, left: &Resolved, right: &Resolved) -> TraceResult<Traced> {
        let value = op.apply(&left.value, &right.value)?;
        let description = op.describe(&left.label, &right.label);
        Ok(Self::derive(value, description, chain_of([left, right])))
    }

    /// Augmented assignment: replaces `self` with `self OP rhs`.
    ///
    /// The previous operand is not mutated.
    pub fn augment(&mut self, op: BinaryOp, rhs: impl Into<Operand>) -> TraceResult<()> {
        *self = self.binary(op, rhs)?;
        Ok(())
    }

    pub fn add(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn sub(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn mul(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn div(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn floor_div(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::FloorDiv, rhs)
    }

    pub fn rem(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Mod, rhs)
    }

    pub fn pow(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Pow, rhs)
    }

    pub fn shl(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Shl, rhs)
    }

    pub fn shr(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::Shr, rhs)
    }

    pub fn bitand(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::BitAnd, rhs)
    }

    pub fn bitor(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::BitOr, rhs)
    }

    pub fn bitxor(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.binary(BinaryOp::BitXor, rhs)
    }

    // ------------------------------------------------------------------------
    // Comparisons
    // ------------------------------------------------------------------------

    /// `(self) OP (rhs)`, wrapped so a session can recover the description.
    pub fn compare(&self, op: CompareOp, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        let left = self.resolve()?;
        let right = rhs.into().resolve()?;
        let outcome = op.apply(&left.value, &right.value)?;
        let description = op.describe(&left.label, &right.label);
        Ok(Self::derive(
            Value::Bool(outcome),
            description,
            chain_of([&left, &right]),
        ))
    }

    pub fn equals(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.compare(CompareOp::Eq, rhs)
    }

    pub fn not_equals(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn lt(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.compare(CompareOp::Lt, rhs)
    }

    pub fn le(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.compare(CompareOp::Le, rhs)
    }

    pub fn gt(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.compare(CompareOp::Gt, rhs)
    }

    pub fn ge(&self, rhs: impl Into<Operand>) -> TraceResult<Traced> {
        self.compare(CompareOp::Ge, rhs)
    }

    // ------------------------------------------------------------------------
    // Conversions (plain results)
    // ------------------------------------------------------------------------

    /// Truth value of the operand. Never traced.
    pub fn is_truthy(&self) -> TraceResult<bool> {
        Ok(self.metadata()?.operand().is_truthy())
    }

    pub fn to_int(&self) -> TraceResult<i64> {
        Ok(self.metadata()?.operand().to_int()?)
    }

    pub fn to_float(&self) -> TraceResult<f64> {
        Ok(self.metadata()?.operand().to_float()?)
    }

    pub fn to_str(&self) -> TraceResult<String> {
        Ok(self.metadata()?.operand().to_string())
    }

    pub fn repr(&self) -> TraceResult<String> {
        Ok(self.metadata()?.operand().repr())
    }

    pub fn hex(&self) -> TraceResult<String> {
        Ok(self.metadata()?.operand().hex()?)
    }

    pub fn oct(&self) -> TraceResult<String> {
        Ok(self.metadata()?.operand().oct()?)
    }

    pub fn index(&self) -> TraceResult<i64> {
        Ok(self.metadata()?.operand().index()?)
    }

    pub fn trunc(&self) -> TraceResult<i64> {
        Ok(self.metadata()?.operand().trunc()?)
    }

    pub fn dir(&self) -> TraceResult<Vec<String>> {
        Ok(self.metadata()?.operand().dir())
    }
}

impl Hash for Traced {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.metadata() {
            Ok(metadata) => metadata.value().hash(state),
            Err(_) => self.handle().hash(state),
        }
    }
}

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.metadata() {
            Ok(metadata) => write!(f, "{}", metadata.value()),
            Err(_) => write!(f, "<untracked {}>", self.handle()),
        }
    }
}

impl fmt::Debug for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Traced");
        debug.field("handle", &self.handle());
        if let Ok(metadata) = self.metadata() {
            debug
                .field("description", &metadata.description())
                .field("value", &metadata.value());
        }
        debug.finish()
    }
}
