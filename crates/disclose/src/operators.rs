//! `std::ops` sugar for traced values.
//!
//! Every operator returns `TraceResult<Traced>` since the real operation
//! can fail (overflow, unsupported operand kinds). Operators are
//! implemented on `&Traced` so a value can be reused after an
//! expression; a primitive on the left produces the reflected form.
//!
//! `//` and `**` have no Rust operator; use [`Traced::floor_div`] and
//! [`Traced::pow`].

use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Rem, Shl, Shr, Sub};

use crate::error::TraceResult;
use crate::ops::BinaryOp;
use crate::traced::{Operand, Traced};

macro_rules! traced_binary {
    ($($trait:ident $method:ident => $op:expr),* $(,)?) => {$(
        impl<R: Into<Operand>> $trait<R> for &Traced {
            type Output = TraceResult<Traced>;

            fn $method(self, rhs: R) -> Self::Output {
                self.binary($op, rhs)
            }
        }
    )*};
}

macro_rules! reflected_binary {
    ($lhs:ty: $($trait:ident $method:ident => $op:expr),* $(,)?) => {$(
        impl $trait<&Traced> for $lhs {
            type Output = TraceResult<Traced>;

            fn $method(self, rhs: &Traced) -> Self::Output {
                rhs.reflected($op, self)
            }
        }

        impl $trait<Traced> for $lhs {
            type Output = TraceResult<Traced>;

            fn $method(self, rhs: Traced) -> Self::Output {
                rhs.reflected($op, self)
            }
        }
    )*};
}

macro_rules! reflected_all {
    ($($lhs:ty),* $(,)?) => {$(
        reflected_binary!($lhs:
            Add add => BinaryOp::Add,
            Sub sub => BinaryOp::Sub,
            Mul mul => BinaryOp::Mul,
            Div div => BinaryOp::Div,
            Rem rem => BinaryOp::Mod,
            Shl shl => BinaryOp::Shl,
            Shr shr => BinaryOp::Shr,
            BitAnd bitand => BinaryOp::BitAnd,
            BitOr bitor => BinaryOp::BitOr,
            BitXor bitxor => BinaryOp::BitXor,
        );
    )*};
}

traced_binary!(
    Add add => BinaryOp::Add,
    Sub sub => BinaryOp::Sub,
    Mul mul => BinaryOp::Mul,
    Div div => BinaryOp::Div,
    Rem rem => BinaryOp::Mod,
    Shl shl => BinaryOp::Shl,
    Shr shr => BinaryOp::Shr,
    BitAnd bitand => BinaryOp::BitAnd,
    BitOr bitor => BinaryOp::BitOr,
    BitXor bitxor => BinaryOp::BitXor,
);

reflected_all!(i32, i64, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_operator_sugar_matches_named_operations() {
        let x = Traced::wrap(6, "x");
        let y = Traced::wrap(4, "y");

        let sum = (&x + &y).unwrap();
        assert_eq!(sum.value().unwrap(), Value::Int(10));
        assert_eq!(sum.label().unwrap(), "(x) + (y)");

        let rem = (&x % 4).unwrap();
        assert_eq!(rem.label().unwrap(), "(x) % (4)");
        assert_eq!(rem.value().unwrap(), Value::Int(2));
    }

    #[test]
    fn test_reflected_keeps_written_order() {
        let x = Traced::wrap(4, "x");

        let diff = (10_i64 - &x).unwrap();
        assert_eq!(diff.label().unwrap(), "(10) - (x)");
        assert_eq!(diff.value().unwrap(), Value::Int(6));

        let ratio = (1.0_f64 / x.clone()).unwrap();
        assert_eq!(ratio.label().unwrap(), "(1.0) / (x)");
        assert_eq!(ratio.value().unwrap(), Value::Float(0.25));

        let shifted = (1_i64 << &x).unwrap();
        assert_eq!(shifted.value().unwrap(), Value::Int(16));
    }

    #[test]
    fn test_operator_errors_propagate() {
        let x = Traced::wrap(i64::MAX, "x");
        assert!((&x + 1).is_err());
        assert!((&x / 0).is_err());
    }
}
