// BBASIC: an interpreter for a subset of BBC BASIC II.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! Runtime values and arithmetic/comparison operators.

use crate::error::BasicError;
use crate::error::BasicError::*;
use crate::symbols::FormatRegister;

pub type Result<T> = core::result::Result<T, BasicError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Int,
    Float,
    Str,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Str(String),
}

use Value::*;

// Factors out the boilerplate in binary operator implementations: each
// arm matches a pair of variants and produces the result, anything else
// falls through to a type-mismatch error.
macro_rules! binop {
    ($name:ident { $( $p:pat => $e:expr ),+ $(,)? }) => {
        pub fn $name(&self, other: &Value) -> Result<Value> {
            match (self, other) {
                $($p => Ok($e)),+,
                (a, b) => Err(Self::type_mismatch(a, b)),
            }
        }
    };
}

impl Value {
    pub fn get_type(&self) -> TypeTag {
        match self {
            Int(_) => TypeTag::Int,
            Float(_) => TypeTag::Float,
            Str(_) => TypeTag::Str,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Int(_) | Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Str(_))
    }

    /// Truncating conversion to int, per `value_int` in the original:
    /// floats truncate towards zero, strings are not convertible.
    pub fn as_int(&self) -> Result<i32> {
        match self {
            Int(n) => Ok(*n),
            Float(f) => Ok(*f as i32),
            Str(_) => Err(TypeMismatch),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Int(n) => Ok(*n as f64),
            Float(f) => Ok(*f),
            Str(_) => Err(TypeMismatch),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Str(s) => Ok(s),
            _ => Err(TypeMismatch),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Int(n) => *n == 0,
            Float(f) => *f == 0.0,
            Str(s) => s.is_empty(),
        }
    }

    fn type_mismatch(_a: &Value, _b: &Value) -> BasicError {
        TypeMismatch
    }

    /// `+ - * / DIV MOD ^ AND OR EOR`, per the coercion table: strings
    /// only combine with `+` (concatenation); numeric pairs stay integer
    /// unless the specific operator forces a float result.
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Str(a), Str(b)) => Ok(Str(format!("{}{}", a, b))),
            (Str(_), _) | (_, Str(_)) => Err(TypeMismatch),
            (Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Ok(Float(a.as_float()? + b.as_float()?))
            }
            (a, b) => Err(Self::type_mismatch(a, b)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        Self::numeric_binop(self, other, |a, b| a.wrapping_sub(b), |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        Self::numeric_binop(self, other, |a, b| a.wrapping_mul(b), |a, b| a * b)
    }

    fn numeric_binop(
        a: &Value,
        b: &Value,
        int_op: impl Fn(i32, i32) -> i32,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> Result<Value> {
        if a.is_string() || b.is_string() {
            return Err(TypeMismatch);
        }
        match (a, b) {
            (Int(x), Int(y)) => Ok(Int(int_op(*x, *y))),
            _ => Ok(Float(float_op(a.as_float()?, b.as_float()?))),
        }
    }

    /// `/`: integer result only when it divides exactly, float otherwise.
    pub fn div(&self, other: &Value) -> Result<Value> {
        if self.is_string() || other.is_string() {
            return Err(TypeMismatch);
        }
        let (a, b) = (self, other);
        if other.is_zero() {
            return Err(DivisionByZero);
        }
        match (a, b) {
            (Int(x), Int(y)) if x % y == 0 => Ok(Int(x / y)),
            _ => Ok(Float(a.as_float()? / b.as_float()?)),
        }
    }

    /// `DIV`: always integer, truncating float operands first.
    pub fn idiv(&self, other: &Value) -> Result<Value> {
        if self.is_string() || other.is_string() {
            return Err(TypeMismatch);
        }
        let b = other.as_int()?;
        if b == 0 {
            return Err(DivisionByZero);
        }
        Ok(Int(self.as_int()? / b))
    }

    /// `MOD`: always integer, truncating float operands first.
    pub fn imod(&self, other: &Value) -> Result<Value> {
        if self.is_string() || other.is_string() {
            return Err(TypeMismatch);
        }
        let b = other.as_int()?;
        if b == 0 {
            return Err(DivisionByZero);
        }
        Ok(Int(self.as_int()? % b))
    }

    /// `^`: always float, range errors surface as *Log range*.
    pub fn pow(&self, other: &Value) -> Result<Value> {
        if self.is_string() || other.is_string() {
            return Err(TypeMismatch);
        }
        let result = self.as_float()?.powf(other.as_float()?);
        if result.is_nan() || result.is_infinite() {
            return Err(LogRange);
        }
        Ok(Float(result))
    }

    pub fn bitand(&self, other: &Value) -> Result<Value> {
        Self::int_binop(self, other, |a, b| a & b)
    }

    pub fn bitor(&self, other: &Value) -> Result<Value> {
        Self::int_binop(self, other, |a, b| a | b)
    }

    pub fn bitxor(&self, other: &Value) -> Result<Value> {
        Self::int_binop(self, other, |a, b| a ^ b)
    }

    fn int_binop(a: &Value, b: &Value, op: impl Fn(i32, i32) -> i32) -> Result<Value> {
        if a.is_string() || b.is_string() {
            return Err(TypeMismatch);
        }
        Ok(Int(op(a.as_int()?, b.as_int()?)))
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Int(n) => Ok(Int(n.wrapping_neg())),
            Float(f) => Ok(Float(-f)),
            Str(_) => Err(TypeMismatch),
        }
    }

    /// `NOT`: bitwise complement of the integer coercion.
    pub fn not(&self) -> Result<Value> {
        Ok(Int(!self.as_int()?))
    }

    binop! { eq {
        (Int(a), Int(b)) => Self::bool_val(a == b),
        (Str(a), Str(b)) => Self::bool_val(a == b),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            Self::bool_val(a.as_float().unwrap() == b.as_float().unwrap())
        },
    } }

    binop! { lt {
        (Int(a), Int(b)) => Self::bool_val(a < b),
        (Str(a), Str(b)) => Self::bool_val(a < b),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            Self::bool_val(a.as_float().unwrap() < b.as_float().unwrap())
        },
    } }

    pub fn ne(&self, other: &Value) -> Result<Value> {
        self.eq(other).map(|v| Int(if v.is_zero() { -1 } else { 0 }))
    }

    pub fn gt(&self, other: &Value) -> Result<Value> {
        other.lt(self)
    }

    pub fn le(&self, other: &Value) -> Result<Value> {
        self.gt(other).map(|v| Int(if v.is_zero() { -1 } else { 0 }))
    }

    pub fn ge(&self, other: &Value) -> Result<Value> {
        self.lt(other).map(|v| Int(if v.is_zero() { -1 } else { 0 }))
    }

    /// BBC convention: `TRUE = -1`, `FALSE = 0`.
    fn bool_val(b: bool) -> Value {
        Int(if b { -1 } else { 0 })
    }

    /// Stringify per the format register. `with_width` corresponds to the
    /// spec's `format: bool` flag on `value_to_string` -- when false the
    /// field-width padding is skipped but places/format still apply.
    pub fn to_string_formatted(&self, fmt: &FormatRegister, with_width: bool) -> String {
        match self {
            Str(s) => s.clone(),
            Int(n) => {
                let body = n.to_string();
                if with_width {
                    pad_left(&body, fmt.width as usize)
                } else {
                    body
                }
            }
            Float(f) => {
                let body = fmt.render_float(*f);
                if with_width {
                    pad_left(&body, fmt.width as usize)
                } else {
                    body
                }
            }
        }
    }
}

fn pad_left(s: &str, width: usize) -> String {
    if s.len() >= width {
        s.to_string()
    } else {
        format!("{}{}", " ".repeat(width - s.len()), s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::FormatRegister;

    #[test]
    fn string_concat_only_on_add() {
        let a = Str("foo".into());
        let b = Str("bar".into());
        assert!(matches!(a.add(&b), Ok(Str(s)) if s == "foobar"));
        assert_eq!(a.sub(&b), Err(TypeMismatch));
    }

    #[test]
    fn integer_division_promotes_on_inexact() {
        assert!(matches!(Int(4).div(&Int(2)), Ok(Int(2))));
        assert!(matches!(Int(5).div(&Int(2)), Ok(Float(f)) if (f - 2.5).abs() < 1e-9));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(Int(1).div(&Int(0)), Err(DivisionByZero));
        assert_eq!(Int(1).idiv(&Int(0)), Err(DivisionByZero));
        assert_eq!(Int(1).imod(&Int(0)), Err(DivisionByZero));
    }

    #[test]
    fn idiv_and_imod_round_trip() {
        let a = 7;
        let b = 2;
        let q = Int(a).idiv(&Int(b)).unwrap().as_int().unwrap();
        let r = Int(a).imod(&Int(b)).unwrap().as_int().unwrap();
        assert_eq!(q * b + r, a);
    }

    #[test]
    fn comparisons_follow_bbc_convention() {
        assert!(matches!(Int(1).lt(&Int(2)), Ok(Int(-1))));
        assert!(matches!(Int(2).lt(&Int(2)), Ok(Int(0))));
    }

    #[test]
    fn mixed_numeric_promotes_like_plain_addition() {
        let n = Int(3);
        let f = Float(1.5);
        assert!(matches!(n.add(&f), Ok(Float(v)) if (v - 4.5).abs() < 1e-9));
    }

    #[test]
    fn format_padding_uses_field_width() {
        let fmt = FormatRegister::default();
        assert_eq!(Int(55).to_string_formatted(&fmt, true), "        55");
    }
}
