//! Binary and comparison operators on [`Value`]s.
//!
//! Numeric semantics follow the conventions of dynamic scripting
//! languages rather than Rust's: `/` always yields a float, `//` and `%`
//! round toward negative infinity, and integer overflow is an error
//! instead of a wrap or a panic.

use std::cmp::Ordering;
use std::fmt;

use crate::error::ValueError;
use crate::value::{Number, Value, numbers_equal};

// ============================================================================
// Binary Operators
// ============================================================================

/// Arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 12] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::FloorDiv,
        BinaryOp::Mod,
        BinaryOp::Pow,
        BinaryOp::Shl,
        BinaryOp::Shr,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }

    /// Renders the description of `left OP right`.
    pub fn describe(self, left: &str, right: &str) -> String {
        format!("({left}) {} ({right})", self.symbol())
    }

    /// Applies the operator to real operands.
    pub fn apply(self, left: &Value, right: &Value) -> Result<Value, ValueError> {
        match self {
            BinaryOp::Add => match (left, right) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                (Value::List(a), Value::List(b)) => {
                    Ok(Value::List(a.iter().chain(b).cloned().collect()))
                }
                _ => numeric(self, left, right, i64::checked_add, |a, b| a + b),
            },
            BinaryOp::Sub => numeric(self, left, right, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => match (left, right) {
                (Value::Str(s), n) | (n, Value::Str(s)) if n.as_integer().is_some() => {
                    let count = repeat_count(self, s.len(), n)?;
                    let mut out = String::new();
                    out.try_reserve_exact(s.len() * count)
                        .map_err(|_| ValueError::Overflow { op: self.symbol() })?;
                    for _ in 0..count {
                        out.push_str(s);
                    }
                    Ok(Value::Str(out))
                }
                (Value::List(items), n) | (n, Value::List(items)) if n.as_integer().is_some() => {
                    let count = repeat_count(self, items.len(), n)?;
                    let mut out = Vec::new();
                    out.try_reserve_exact(items.len() * count)
                        .map_err(|_| ValueError::Overflow { op: self.symbol() })?;
                    for _ in 0..count {
                        out.extend(items.iter().cloned());
                    }
                    Ok(Value::List(out))
                }
                _ => numeric(self, left, right, i64::checked_mul, |a, b| a * b),
            },
            BinaryOp::Div => {
                let (a, b) = numbers(self, left, right)?;
                if b.to_f64() == 0.0 {
                    return Err(ValueError::DivisionByZero);
                }
                Ok(Value::Float(a.to_f64() / b.to_f64()))
            }
            BinaryOp::FloorDiv => match numbers(self, left, right)? {
                (Number::Int(_), Number::Int(0)) => Err(ValueError::DivisionByZero),
                (Number::Int(a), Number::Int(b)) => floor_div(a, b)
                    .map(Value::Int)
                    .ok_or(ValueError::Overflow { op: "//" }),
                (a, b) => {
                    let (a, b) = (a.to_f64(), b.to_f64());
                    if b == 0.0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    Ok(Value::Float((a / b).floor()))
                }
            },
            BinaryOp::Mod => match numbers(self, left, right)? {
                (Number::Int(_), Number::Int(0)) => Err(ValueError::DivisionByZero),
                (Number::Int(a), Number::Int(b)) => {
                    let r = a.wrapping_rem(b);
                    Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
                }
                (a, b) => {
                    let (a, b) = (a.to_f64(), b.to_f64());
                    if b == 0.0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    let r = a % b;
                    Ok(Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        r + b
                    } else {
                        r
                    }))
                }
            },
            BinaryOp::Pow => match numbers(self, left, right)? {
                (Number::Int(a), Number::Int(b)) if b >= 0 => u32::try_from(b)
                    .ok()
                    .and_then(|exp| a.checked_pow(exp))
                    .map(Value::Int)
                    .ok_or(ValueError::Overflow { op: "**" }),
                (a, b) => {
                    let (a, b) = (a.to_f64(), b.to_f64());
                    if a == 0.0 && b < 0.0 {
                        return Err(ValueError::DivisionByZero);
                    }
                    Ok(Value::Float(a.powf(b)))
                }
            },
            BinaryOp::Shl | BinaryOp::Shr => {
                let (a, b) = integers(self, left, right)?;
                if b < 0 {
                    return Err(ValueError::NegativeShift);
                }
                if self == BinaryOp::Shr {
                    return Ok(Value::Int(if b >= 64 { if a < 0 { -1 } else { 0 } } else { a >> b }));
                }
                if a == 0 {
                    return Ok(Value::Int(0));
                }
                if b >= 64 {
                    return Err(ValueError::Overflow { op: "<<" });
                }
                i64::try_from(i128::from(a) << b)
                    .map(Value::Int)
                    .map_err(|_| ValueError::Overflow { op: "<<" })
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
                    return Ok(Value::Bool(match self {
                        BinaryOp::BitAnd => a & b,
                        BinaryOp::BitOr => a | b,
                        _ => a ^ b,
                    }));
                }
                let (a, b) = integers(self, left, right)?;
                Ok(Value::Int(match self {
                    BinaryOp::BitAnd => a & b,
                    BinaryOp::BitOr => a | b,
                    _ => a ^ b,
                }))
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// Comparison Operators
// ============================================================================

/// Rich comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Renders the description of `left OP right`.
    pub fn describe(self, left: &str, right: &str) -> String {
        format!("({left}) {} ({right})", self.symbol())
    }

    /// Compares real operands.
    pub fn apply(self, left: &Value, right: &Value) -> Result<bool, ValueError> {
        match self {
            CompareOp::Eq => Ok(left == right),
            CompareOp::Ne => Ok(left != right),
            _ => {
                // An unordered pair (NaN involved) makes every ordering false.
                let Some(ordering) = order(self, left, right)? else {
                    return Ok(false);
                };
                Ok(match self {
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn unsupported(op: &'static str, left: &Value, right: &Value) -> ValueError {
    ValueError::UnsupportedOperands {
        op,
        left: left.kind(),
        right: right.kind(),
    }
}

fn numbers(op: BinaryOp, left: &Value, right: &Value) -> Result<(Number, Number), ValueError> {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn integers(op: BinaryOp, left: &Value, right: &Value) -> Result<(i64, i64), ValueError> {
    match (left.as_integer(), right.as_integer()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn numeric(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, ValueError> {
    match numbers(op, left, right)? {
        (Number::Int(a), Number::Int(b)) => int_op(a, b)
            .map(Value::Int)
            .ok_or(ValueError::Overflow { op: op.symbol() }),
        (a, b) => Ok(Value::Float(float_op(a.to_f64(), b.to_f64()))),
    }
}

/// Repetition count for `seq * n`; negative counts and empty sequences
/// repeat zero times. The caller still has to reserve the result.
fn repeat_count(op: BinaryOp, unit_len: usize, n: &Value) -> Result<usize, ValueError> {
    if unit_len == 0 {
        return Ok(0);
    }
    let count = usize::try_from(n.as_integer().unwrap_or(0)).unwrap_or(0);
    unit_len
        .checked_mul(count)
        .filter(|total| isize::try_from(*total).is_ok())
        .map(|_| count)
        .ok_or(ValueError::Overflow { op: op.symbol() })
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn order(op: CompareOp, left: &Value, right: &Value) -> Result<Option<Ordering>, ValueError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return Ok(match (a, b) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                let equal = match (x.as_number(), y.as_number()) {
                    (Some(p), Some(q)) => numbers_equal(p, q),
                    _ => x == y,
                };
                if !equal {
                    return order(op, x, y);
                }
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}
