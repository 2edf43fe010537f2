//! Binary/unary arithmetic, comparisons and string concatenation.
//!
//! Non-numeric operands never fault: they coerce to `0` the same way a
//! missing field reads as a default value, matching this language's
//! "misuse surfaces as a default, the interpreter never crashes" contract.

use crate::value::{Number, Value};

fn as_num(v: &Value) -> Number {
    v.as_number().unwrap_or(Number::Int(0))
}

fn as_int(v: &Value) -> i64 {
    match as_num(v) {
        Number::Int(i) => i,
        Number::Double(d) => d as i64,
    }
}

fn numeric(a: &Value, b: &Value, int_op: impl Fn(i64, i64) -> i64, double_op: impl Fn(f64, f64) -> f64) -> Value {
    match (as_num(a), as_num(b)) {
        (Number::Int(x), Number::Int(y)) => Value::Int(int_op(x, y)),
        (x, y) => Value::Double(double_op(x.as_f64(), y.as_f64())),
    }
}

/// `+`: string concatenation if either side is text, numeric addition
/// otherwise.
pub fn add(a: &Value, b: &Value) -> Value {
    if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
        return Value::str(format!("{}{}", a.stringify(), b.stringify()));
    }
    numeric(a, b, i64::wrapping_add, |x, y| x + y)
}

pub fn sub(a: &Value, b: &Value) -> Value {
    numeric(a, b, i64::wrapping_sub, |x, y| x - y)
}

pub fn mul(a: &Value, b: &Value) -> Value {
    numeric(a, b, i64::wrapping_mul, |x, y| x * y)
}

/// Division by zero degrades to `nulo` rather than panicking or returning
/// infinity, consistent with this interpreter's "never crash" contract.
pub fn div(a: &Value, b: &Value) -> Value {
    match (as_num(a), as_num(b)) {
        (Number::Int(x), Number::Int(y)) => {
            if y == 0 {
                Value::Null
            } else if x % y == 0 {
                Value::Int(x / y)
            } else {
                Value::Double(x as f64 / y as f64)
            }
        }
        (x, y) => {
            let y = y.as_f64();
            if y == 0.0 {
                Value::Null
            } else {
                Value::Double(x.as_f64() / y)
            }
        }
    }
}

pub fn rem(a: &Value, b: &Value) -> Value {
    match (as_num(a), as_num(b)) {
        (Number::Int(x), Number::Int(y)) => {
            if y == 0 {
                Value::Null
            } else {
                Value::Int(x.wrapping_rem(y))
            }
        }
        (x, y) => {
            let y = y.as_f64();
            if y == 0.0 {
                Value::Null
            } else {
                Value::Double(x.as_f64() % y)
            }
        }
    }
}

pub fn neg(v: &Value) -> Value {
    match as_num(v) {
        Number::Int(i) => Value::Int(i.wrapping_neg()),
        Number::Double(d) => Value::Double(-d),
    }
}

pub fn not(v: &Value) -> Value {
    Value::Int(!v.is_truthy() as i64)
}

pub fn bitnot(v: &Value) -> Value {
    Value::Int(!as_int(v))
}

pub fn bitand(a: &Value, b: &Value) -> Value {
    Value::Int(as_int(a) & as_int(b))
}

pub fn bitor(a: &Value, b: &Value) -> Value {
    Value::Int(as_int(a) | as_int(b))
}

pub fn bitxor(a: &Value, b: &Value) -> Value {
    Value::Int(as_int(a) ^ as_int(b))
}

pub fn shl(a: &Value, b: &Value) -> Value {
    Value::Int(as_int(a).wrapping_shl(as_int(b) as u32 & 63))
}

pub fn shr(a: &Value, b: &Value) -> Value {
    Value::Int(as_int(a).wrapping_shr(as_int(b) as u32 & 63))
}

/// `Concat`: always stringifies both sides and joins them, unlike `Add`
/// which only concatenates when an operand is already text.
pub fn concat(a: &Value, b: &Value) -> Value {
    Value::str(format!("{}{}", a.stringify(), b.stringify()))
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        if a.as_number().is_none() || b.as_number().is_none() {
            return x.as_ref().cmp(y.as_ref());
        }
    }
    as_num(a).as_f64().partial_cmp(&as_num(b).as_f64()).unwrap_or(std::cmp::Ordering::Equal)
}

/// Loose `==`: numeric coercion when both sides parse as numbers, string
/// comparison otherwise. Matches `Value::as_number`'s string-to-number
/// coercion used elsewhere for mixed comparisons.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => a.stringify() == b.stringify(),
        },
    }
}

/// Strict `===`: no coercion, both tag and value must match.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Double(x), Value::Double(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

pub fn cmp_eq(a: &Value, b: &Value) -> Value {
    Value::Int(loose_eq(a, b) as i64)
}

pub fn cmp_not_eq(a: &Value, b: &Value) -> Value {
    Value::Int(!loose_eq(a, b) as i64)
}

pub fn cmp_strict_eq(a: &Value, b: &Value) -> Value {
    Value::Int(strict_eq(a, b) as i64)
}

pub fn cmp_strict_not_eq(a: &Value, b: &Value) -> Value {
    Value::Int(!strict_eq(a, b) as i64)
}

pub fn cmp_lt(a: &Value, b: &Value) -> Value {
    Value::Int((compare(a, b) == std::cmp::Ordering::Less) as i64)
}

pub fn cmp_gt(a: &Value, b: &Value) -> Value {
    Value::Int((compare(a, b) == std::cmp::Ordering::Greater) as i64)
}

pub fn cmp_lt_eq(a: &Value, b: &Value) -> Value {
    Value::Int((compare(a, b) != std::cmp::Ordering::Greater) as i64)
}

pub fn cmp_gt_eq(a: &Value, b: &Value) -> Value {
    Value::Int((compare(a, b) != std::cmp::Ordering::Less) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_concatenates_when_either_side_is_text() {
        let v = add(&Value::str("idade: "), &Value::Int(9));
        assert!(matches!(v, Value::Str(s) if &*s == "idade: 9"));
    }

    #[test]
    fn div_by_zero_is_null_not_a_panic() {
        assert!(matches!(div(&Value::Int(1), &Value::Int(0)), Value::Null));
    }

    #[test]
    fn loose_eq_coerces_numeric_strings() {
        assert!(loose_eq(&Value::str("3"), &Value::Int(3)));
        assert!(!strict_eq(&Value::str("3"), &Value::Int(3)));
    }
}
