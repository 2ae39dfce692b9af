//! Dynamic operand model.
//!
//! A [`Value`] is the real thing behind a traced handle: a small dynamic
//! data model with numeric-aware equality, "truthiness", and the
//! container operations (attributes, items, membership, iteration,
//! calls) that traced values forward to.
//!
//! Display follows the usual script-language conventions so that
//! descriptions read naturally: `None`, `True`, `1.0`, `['a', 2]`,
//! `{'count': 1}`, `Point(x=1, y=2)`.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::ValueError;

// ============================================================================
// Keys
// ============================================================================

/// Hashable subset of [`Value`] usable as a map key.
///
/// Booleans and integral floats normalise to [`Key::Int`] so that keys
/// compare the same way values do (`1 == 1.0 == True`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Converts a value into a map key.
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(Key::Int(i64::from(*b))),
            Value::Int(i) => Ok(Key::Int(*i)),
            Value::Float(f) => float_as_int(*f)
                .map(Key::Int)
                .ok_or(ValueError::Unhashable("float")),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(ValueError::Unhashable(other.kind())),
        }
    }

    /// Returns the key as a value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write_quoted(f, s),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(i64::from(value))
    }
}

// ============================================================================
// Objects and Functions
// ============================================================================

/// A named bag of attributes, the dynamic stand-in for a struct instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: String,
    attrs: BTreeMap<String, Value>,
}

impl Object {
    /// Creates an object with no attributes.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Builder method adding one attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Arguments handed to a [`Function`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

type Callable = dyn Fn(&CallArgs) -> Result<Value, ValueError>;

/// A named callable operand.
///
/// Two functions are equal only when they share the same closure.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    callable: Rc<Callable>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        callable: impl Fn(&CallArgs) -> Result<Value, ValueError> + 'static,
    ) -> Self {
        let name: String = name.into();
        Self {
            name: name.into(),
            callable: Rc::new(callable),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &CallArgs) -> Result<Value, ValueError> {
        (self.callable)(args)
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.callable).cast::<()>() as usize
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.name).finish()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

// ============================================================================
// Value
// ============================================================================

/// A dynamic operand.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<Key, Value>),
    Object(Object),
    Function(Function),
}

/// Numeric view of a value; booleans count as integers.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn to_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl Value {
    /// Builds a list from anything convertible to values.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a map from key/value pairs.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    pub(crate) fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Truth value: empty, zero and `None` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Representation: like display, but strings are quoted.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_repr(&mut out);
        out
    }

    fn write_repr<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            Value::Str(s) => write_quoted(out, s),
            other => other.write_display(out),
        }
    }

    fn write_display<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            Value::None => out.write_str("None"),
            Value::Bool(true) => out.write_str("True"),
            Value::Bool(false) => out.write_str("False"),
            Value::Int(i) => write!(out, "{i}"),
            Value::Float(f) => out.write_str(&format_float(*f)),
            Value::Str(s) => out.write_str(s),
            Value::List(items) => {
                out.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    item.write_repr(out)?;
                }
                out.write_char(']')
            }
            Value::Map(entries) => {
                out.write_char('{')?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    write!(out, "{key}: ")?;
                    value.write_repr(out)?;
                }
                out.write_char('}')
            }
            Value::Object(object) => {
                write!(out, "{}(", object.type_name)?;
                for (i, (name, value)) in object.attrs().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    write!(out, "{name}=")?;
                    value.write_repr(out)?;
                }
                out.write_char(')')
            }
            Value::Function(function) => write!(out, "<function {}>", function.name),
        }
    }

    // ------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------

    pub fn get_attr(&self, name: &str) -> Result<Value, ValueError> {
        match self {
            Value::Object(object) => {
                object
                    .attrs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ValueError::NoAttribute {
                        kind: object.type_name.clone(),
                        name: name.to_string(),
                    })
            }
            other => Err(ValueError::NoAttribute {
                kind: other.kind().to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub fn set_attr(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        match self {
            Value::Object(object) => {
                object.attrs.insert(name.to_string(), value);
                Ok(())
            }
            other => Err(ValueError::Unsupported {
                operation: "attribute assignment",
                kind: other.kind(),
            }),
        }
    }

    pub fn del_attr(&mut self, name: &str) -> Result<(), ValueError> {
        match self {
            Value::Object(object) => {
                object
                    .attrs
                    .remove(name)
                    .map(|_| ())
                    .ok_or_else(|| ValueError::NoAttribute {
                        kind: object.type_name.clone(),
                        name: name.to_string(),
                    })
            }
            other => Err(ValueError::NoAttribute {
                kind: other.kind().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Attribute names, sorted. Empty for anything but objects.
    pub fn dir(&self) -> Vec<String> {
        match self {
            Value::Object(object) => object.attrs.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Sequence interface
    // ------------------------------------------------------------------

    pub fn len(&self) -> Result<usize, ValueError> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::List(items) => Ok(items.len()),
            Value::Map(entries) => Ok(entries.len()),
            other => Err(ValueError::Unsupported {
                operation: "len()",
                kind: other.kind(),
            }),
        }
    }

    pub fn get_item(&self, key: &Value) -> Result<Value, ValueError> {
        match self {
            Value::List(items) => {
                let index = resolve_index("list", key, items.len())?;
                Ok(items[index].clone())
            }
            Value::Str(s) => {
                let len = s.chars().count();
                let index = resolve_index("str", key, len)?;
                Ok(s.chars()
                    .nth(index)
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or_default())
            }
            Value::Map(entries) => {
                let key = Key::from_value(key)?;
                entries
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| ValueError::KeyNotFound(key.to_string()))
            }
            other => Err(ValueError::Unsupported {
                operation: "item access",
                kind: other.kind(),
            }),
        }
    }

    pub fn set_item(&mut self, key: &Value, value: Value) -> Result<(), ValueError> {
        match self {
            Value::List(items) => {
                let index = resolve_index("list", key, items.len())?;
                items[index] = value;
                Ok(())
            }
            Value::Map(entries) => {
                entries.insert(Key::from_value(key)?, value);
                Ok(())
            }
            other => Err(ValueError::Unsupported {
                operation: "item assignment",
                kind: other.kind(),
            }),
        }
    }

    pub fn del_item(&mut self, key: &Value) -> Result<(), ValueError> {
        match self {
            Value::List(items) => {
                let index = resolve_index("list", key, items.len())?;
                items.remove(index);
                Ok(())
            }
            Value::Map(entries) => {
                let key = Key::from_value(key)?;
                entries
                    .remove(&key)
                    .map(|_| ())
                    .ok_or_else(|| ValueError::KeyNotFound(key.to_string()))
            }
            other => Err(ValueError::Unsupported {
                operation: "item deletion",
                kind: other.kind(),
            }),
        }
    }

    /// Membership test: substring, list element, or map key.
    pub fn contains(&self, needle: &Value) -> Result<bool, ValueError> {
        match (self, needle) {
            (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
            (Value::Str(_), other) => Err(ValueError::UnsupportedOperands {
                op: "in",
                left: other.kind(),
                right: "str",
            }),
            (Value::List(items), needle) => Ok(items.iter().any(|item| item == needle)),
            (Value::Map(entries), needle) => Ok(entries.contains_key(&Key::from_value(needle)?)),
            (other, _) => Err(ValueError::Unsupported {
                operation: "membership test",
                kind: other.kind(),
            }),
        }
    }

    /// Elements produced by iterating the value.
    pub fn iter_values(&self) -> Result<Vec<Value>, ValueError> {
        match self {
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::List(items) => Ok(items.clone()),
            Value::Map(entries) => Ok(entries.keys().map(Key::to_value).collect()),
            other => Err(ValueError::NotIterable(other.kind())),
        }
    }

    /// Elements in reverse iteration order, as a list.
    pub fn reversed(&self) -> Result<Value, ValueError> {
        let mut items = self.iter_values()?;
        items.reverse();
        Ok(Value::List(items))
    }

    // ------------------------------------------------------------------
    // Callable interface
    // ------------------------------------------------------------------

    pub fn call(&self, args: &CallArgs) -> Result<Value, ValueError> {
        match self {
            Value::Function(function) => function.invoke(args),
            other => Err(ValueError::NotCallable(other.kind())),
        }
    }

    // ------------------------------------------------------------------
    // Casts. These always produce plain native values.
    // ------------------------------------------------------------------

    pub fn to_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            Value::Float(f) => {
                if !f.is_finite() {
                    return Err(self.cast_error("int", "not finite"));
                }
                float_as_int(f.trunc()).ok_or_else(|| self.cast_error("int", "out of range"))
            }
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| self.cast_error("int", &e.to_string())),
            _ => Err(self.cast_error("int", "not a number")),
        }
    }

    pub fn to_float(&self) -> Result<f64, ValueError> {
        match self {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| self.cast_error("float", &e.to_string())),
            other => other
                .as_number()
                .map(Number::to_f64)
                .ok_or_else(|| self.cast_error("float", "not a number")),
        }
    }

    /// Integer value for use as an index; only integers qualify.
    pub fn index(&self) -> Result<i64, ValueError> {
        self.as_integer()
            .ok_or_else(|| self.cast_error("index", "not an integer"))
    }

    /// Truncation toward zero.
    pub fn trunc(&self) -> Result<i64, ValueError> {
        match self {
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => self.to_int(),
            _ => Err(self.cast_error("int", "not a number")),
        }
    }

    pub fn hex(&self) -> Result<String, ValueError> {
        let n = self.index()?;
        Ok(if n < 0 {
            format!("-0x{:x}", n.unsigned_abs())
        } else {
            format!("0x{n:x}")
        })
    }

    pub fn oct(&self) -> Result<String, ValueError> {
        let n = self.index()?;
        Ok(if n < 0 {
            format!("-0o{:o}", n.unsigned_abs())
        } else {
            format!("0o{n:o}")
        })
    }

    fn cast_error(&self, target: &'static str, reason: &str) -> ValueError {
        ValueError::InvalidCast {
            from: self.kind(),
            target,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_display(f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return numbers_equal(a, b);
        }
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal numbers must hash alike across int, float and bool.
        if let Some(number) = self.as_number() {
            match number {
                Number::Int(i) => Key::Int(i).hash(state),
                Number::Float(f) => match float_as_int(f) {
                    Some(i) => Key::Int(i).hash(state),
                    None => f.to_bits().hash(state),
                },
            }
            return;
        }
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Str(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(entries) => {
                for (key, value) in entries {
                    key.hash(state);
                    value.hash(state);
                }
            }
            Value::Object(object) => {
                object.type_name.hash(state);
                for (name, value) in object.attrs() {
                    name.hash(state);
                    value.hash(state);
                }
            }
            Value::Function(function) => function.address().hash(state),
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {}
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::None
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::list(value)
    }
}

impl From<BTreeMap<Key, Value>> for Value {
    fn from(value: BTreeMap<Key, Value>) -> Self {
        Value::Map(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::list(items),
            serde_json::Value::Object(entries) => Value::map(entries),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Integral floats inside the `i64` range.
fn float_as_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

pub(crate) fn numbers_equal(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => a == b,
        (Number::Float(a), Number::Float(b)) => a == b,
        (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
            float_as_int(f) == Some(i)
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn write_quoted<W: fmt::Write>(out: &mut W, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if c == quote => {
                out.write_char('\\')?;
                out.write_char(c)?;
            }
            c => out.write_char(c)?,
        }
    }
    out.write_char(quote)
}

/// Resolves a possibly negative index for reading.
fn resolve_index(container: &'static str, key: &Value, len: usize) -> Result<usize, ValueError> {
    let raw = key.as_integer().ok_or(ValueError::UnsupportedOperands {
        op: "[]",
        left: container,
        right: key.kind(),
    })?;
    normalize_index(raw, len)
}

fn normalize_index(raw: i64, len: usize) -> Result<usize, ValueError> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let adjusted = if raw < 0 { raw + len_i } else { raw };
    if adjusted < 0 || adjusted >= len_i {
        return Err(ValueError::IndexOutOfRange { index: raw, len });
    }
    Ok(adjusted as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn point() -> Value {
        Object::new("Point").with_attr("x", 1).with_attr("y", 2.5).into()
    }

    #[test]
    fn display_matches_script_conventions() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(Value::list(vec![Value::from(1), "a".into()]).to_string(), "[1, 'a']");
        assert_eq!(Value::map([("count", 1)]).to_string(), "{'count': 1}");
        assert_eq!(point().to_string(), "Point(x=1, y=2.5)");
    }

    #[test]
    fn repr_quotes_strings_only() {
        assert_eq!(Value::from("it").repr(), "'it'");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from("a\nb").repr(), "'a\\nb'");
        assert_eq!(Value::Int(3).repr(), "3");
    }

    #[test]
    fn numeric_equality_and_hash_agree() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::from("1"));
        assert_eq!(hash_of(&Value::Int(1)), hash_of(&Value::Float(1.0)));
        assert_eq!(hash_of(&Value::Bool(true)), hash_of(&Value::Int(1)));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::List(Vec::new()).is_truthy());
        assert!(Value::Float(0.1).is_truthy());
        assert!(point().is_truthy());
    }

    #[test]
    fn list_indexing_supports_negative_indices() {
        let list = Value::list([1, 2, 3]);
        assert_eq!(list.get_item(&Value::Int(-1)).unwrap(), Value::Int(3));
        assert_eq!(
            list.get_item(&Value::Int(3)),
            Err(ValueError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert!(matches!(
            list.get_item(&"a".into()),
            Err(ValueError::UnsupportedOperands { op: "[]", .. })
        ));
    }

    #[test]
    fn map_keys_normalise() {
        let mut map = Value::map([(1, "one")]);
        assert_eq!(map.get_item(&Value::Float(1.0)).unwrap(), Value::from("one"));
        assert_eq!(map.get_item(&Value::Bool(true)).unwrap(), Value::from("one"));
        map.set_item(&"two".into(), Value::Int(2)).unwrap();
        assert!(map.contains(&"two".into()).unwrap());
        map.del_item(&Value::Int(1)).unwrap();
        assert_eq!(map.len().unwrap(), 1);
        assert!(matches!(
            map.get_item(&Value::list([1])),
            Err(ValueError::Unhashable("list"))
        ));
    }

    #[test]
    fn object_attributes() {
        let mut p = point();
        assert_eq!(p.get_attr("x").unwrap(), Value::Int(1));
        p.set_attr("z", Value::Int(9)).unwrap();
        assert_eq!(p.dir(), vec!["x", "y", "z"]);
        p.del_attr("x").unwrap();
        assert!(matches!(p.get_attr("x"), Err(ValueError::NoAttribute { .. })));
        assert!(Value::Int(1).set_attr("x", Value::None).is_err());
    }

    #[test]
    fn iteration_and_reversal() {
        assert_eq!(
            Value::from("ab").iter_values().unwrap(),
            vec![Value::from("a"), Value::from("b")]
        );
        assert_eq!(
            Value::map([("b", 1), ("a", 2)]).iter_values().unwrap(),
            vec![Value::from("a"), Value::from("b")]
        );
        assert_eq!(Value::list([1, 2]).reversed().unwrap(), Value::list([2, 1]));
        assert_eq!(Value::Int(3).iter_values(), Err(ValueError::NotIterable("int")));
    }

    #[test]
    fn functions_are_callable() {
        let double = Function::new("double", |args: &CallArgs| {
            let n = args.arg(0).map_or(Ok(0), Value::to_int)?;
            Ok(Value::Int(n * 2))
        });
        let value = Value::from(double.clone());
        let args = CallArgs {
            positional: vec![Value::Int(21)],
            keyword: Vec::new(),
        };
        assert_eq!(value.call(&args).unwrap(), Value::Int(42));
        assert_eq!(value, Value::from(double));
        assert_eq!(value.to_string(), "<function double>");
        assert_eq!(Value::Int(1).call(&args), Err(ValueError::NotCallable("int")));
    }

    #[test]
    fn casts_produce_native_values() {
        assert_eq!(Value::Float(-2.7).to_int().unwrap(), -2);
        assert_eq!(Value::from(" 42 ").to_int().unwrap(), 42);
        assert_eq!(Value::Int(3).to_float().unwrap(), 3.0);
        assert_eq!(Value::Int(31).hex().unwrap(), "0x1f");
        assert_eq!(Value::Int(-31).hex().unwrap(), "-0x1f");
        assert_eq!(Value::Int(15).oct().unwrap(), "0o17");
        assert!(Value::Float(1.0).index().is_err());
        assert!(Value::Float(f64::NAN).to_int().is_err());
        assert!(Value::from("x").trunc().is_err());
    }

    #[cfg(feature = "json")]
    #[test]
    fn converts_from_json() {
        let value = Value::from(serde_json::json!({"a": [1, 2.5, null, true]}));
        assert_eq!(
            value,
            Value::map([(
                "a",
                Value::list(vec![Value::Int(1), Value::Float(2.5), Value::None, Value::Bool(true)])
            )])
        );
    }
}
