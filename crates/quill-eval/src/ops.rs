//! Value arithmetic: the partial operations of spec.md §4.2, §9.
//!
//! Each operation is a total function from a pair of values to an
//! `Option`/`Result`; `None`/`Err` means "type-incompatible" and is
//! turned into a diagnostic by the caller in [`crate::code`].

use ecow::eco_format;

use crate::diag::StrResult;
use crate::value::{compare, values_equal, Angle, Content, Dict, Fraction, Length, Ratio, Value};

type Res = StrResult<Value>;

fn mismatch(op: &str, a: &Value, b: &Value) -> Res {
    Err(eco_format!("cannot {op} {} and {}", a.ty(), b.ty()))
}

pub fn pos(value: Value) -> Res {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Ratio(_) | Value::Length(_) | Value::Angle(_) | Value::Fraction(_) => {
            Ok(value)
        }
        other => Err(eco_format!("cannot apply unary '+' to {}", other.ty())),
    }
}

pub fn neg(value: Value) -> Res {
    match value {
        Value::Int(i) => Ok(Value::Int(-i)),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Ratio(r) => Ok(Value::Ratio(Ratio(-r.0))),
        Value::Length(Length::Abs(pt)) => Ok(Value::Length(Length::Abs(-pt))),
        Value::Length(Length::Em(em)) => Ok(Value::Length(Length::Em(-em))),
        Value::Angle(a) => Ok(Value::Angle(Angle(-a.0))),
        Value::Fraction(f) => Ok(Value::Fraction(Fraction(-f.0))),
        other => Err(eco_format!("cannot apply unary '-' to {}", other.ty())),
    }
}

pub fn not(value: Value) -> Res {
    match value {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(eco_format!("expected boolean, found {}", other.ty())),
    }
}

pub fn and(a: Value, b: Value) -> Res {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
        (Value::Bool(_), b) => Err(eco_format!("expected boolean, found {}", b.ty())),
        (a, _) => Err(eco_format!("expected boolean, found {}", a.ty())),
    }
}

pub fn or(a: Value, b: Value) -> Res {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
        (Value::Bool(_), b) => Err(eco_format!("expected boolean, found {}", b.ty())),
        (a, _) => Err(eco_format!("expected boolean, found {}", a.ty())),
    }
}

/// `**`: integer^integer truncates the `f64` power back to an
/// integer; any mixed pairing, or a ratio operand, returns a float.
pub fn pow(a: Value, b: Value) -> Res {
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        return Ok(Value::Int((*x as f64).powf(*y as f64).floor() as i64));
    }
    match (as_f64(&a), as_f64(&b)) {
        (Some(af), Some(bf)) => Ok(Value::Float(af.powf(bf))),
        _ => mismatch("raise to a power", &a, &b),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Ratio(r) => Some(r.0),
        _ => None,
    }
}

pub fn add(a: Value, b: Value) -> Res {
    if let (Value::Alignment(x), Value::Alignment(y)) = (&a, &b) {
        return Ok(Value::Alignment(x.merge(*y)));
    }
    maybe_plus(a, b)
}

/// `maybePlus` (spec.md §9): numeric widening, concatenation for
/// string/array/dict/content, same-unit addition for length-likes.
pub fn maybe_plus(a: Value, b: Value) -> Res {
    use Value::*;
    match (a, b) {
        (Int(a), Int(b)) => Ok(Int(a + b)),
        (Int(a), Float(b)) | (Float(b), Int(a)) => Ok(Float(a as f64 + b)),
        (Float(a), Float(b)) => Ok(Float(a + b)),
        (Int(a), Ratio(b)) | (Ratio(b), Int(a)) => Ok(Ratio(crate::value::Ratio(a as f64 + b.0))),
        (Ratio(a), Ratio(b)) => Ok(Ratio(crate::value::Ratio(a.0 + b.0))),
        (Ratio(a), Float(b)) | (Float(b), Ratio(a)) => Ok(Float(a.0 + b)),
        (Length(Length::Abs(a)), Length(Length::Abs(b))) => Ok(Length(Length::Abs(a + b))),
        (Length(Length::Em(a)), Length(Length::Em(b))) => Ok(Length(Length::Em(a + b))),
        (Angle(a), Angle(b)) => Ok(Angle(crate::value::Angle(a.0 + b.0))),
        (Fraction(a), Fraction(b)) => Ok(Fraction(crate::value::Fraction(a.0 + b.0))),
        (Str(a), Str(b)) => Ok(Str(a + b.as_str())),
        (Array(mut a), Array(b)) => {
            a.extend(b);
            Ok(Array(a))
        }
        (Dict(a), Dict(b)) => Ok(Dict(merge_dict(a, b))),
        (Content(a), Content(b)) => Ok(Content(concat_content(a, b))),
        (a, b) => mismatch("add", &a, &b),
    }
}

fn merge_dict(mut a: Dict, b: Dict) -> Dict {
    for (k, v) in b {
        a.insert(k, v);
    }
    a
}

fn concat_content(mut a: Content, b: Content) -> Content {
    a.0.extend(b.0);
    a
}

/// `joinVals` (spec.md §4.2): `None` is the identity; content wins
/// over any other value kind via [`crate::content::value_to_content`].
pub fn join(a: Value, b: Value) -> Res {
    match (a, b) {
        (Value::None, b) => Ok(b),
        (a, Value::None) => Ok(a),
        (Value::Content(a), Value::Content(b)) => Ok(Value::Content(concat_content(a, b))),
        (Value::Content(a), b) => {
            let b = crate::content::value_to_content(&b);
            Ok(Value::Content(concat_content(a, b)))
        }
        (a, Value::Content(b)) => {
            let a = crate::content::value_to_content(&a);
            Ok(Value::Content(concat_content(a, b)))
        }
        (a, b) => maybe_plus(a, b),
    }
}

pub fn sub(a: Value, b: Value) -> Res {
    use Value::*;
    match (a, b) {
        (Int(a), Int(b)) => Ok(Int(a - b)),
        (Int(a), Float(b)) => Ok(Float(a as f64 - b)),
        (Float(a), Int(b)) => Ok(Float(a - b as f64)),
        (Float(a), Float(b)) => Ok(Float(a - b)),
        (Ratio(a), Ratio(b)) => Ok(Ratio(crate::value::Ratio(a.0 - b.0))),
        (Int(a), Ratio(b)) => Ok(Ratio(crate::value::Ratio(a as f64 - b.0))),
        (Ratio(a), Int(b)) => Ok(Ratio(crate::value::Ratio(a.0 - b as f64))),
        (Ratio(a), Float(b)) => Ok(Float(a.0 - b)),
        (Float(a), Ratio(b)) => Ok(Float(a - b.0)),
        (Length(Length::Abs(a)), Length(Length::Abs(b))) => Ok(Length(Length::Abs(a - b))),
        (Length(Length::Em(a)), Length(Length::Em(b))) => Ok(Length(Length::Em(a - b))),
        (Angle(a), Angle(b)) => Ok(Angle(crate::value::Angle(a.0 - b.0))),
        (Fraction(a), Fraction(b)) => Ok(Fraction(crate::value::Fraction(a.0 - b.0))),
        (a, b) => mismatch("subtract", &a, &b),
    }
}

pub fn mul(a: Value, b: Value) -> Res {
    use Value::*;
    match (a, b) {
        (Int(a), Int(b)) => Ok(Int(a * b)),
        (Int(a), Float(b)) | (Float(b), Int(a)) => Ok(Float(a as f64 * b)),
        (Float(a), Float(b)) => Ok(Float(a * b)),
        (Ratio(a), Ratio(b)) => Ok(Ratio(crate::value::Ratio(a.0 * b.0))),
        (Int(a), Ratio(b)) | (Ratio(b), Int(a)) => Ok(Ratio(crate::value::Ratio(a as f64 * b.0))),
        (Float(a), Ratio(b)) | (Ratio(b), Float(a)) => Ok(Float(a * b.0)),
        (Length(Length::Abs(a)), Int(b)) | (Int(b), Length(Length::Abs(a))) => {
            Ok(Length(Length::Abs(a * b as f64)))
        }
        (Length(Length::Abs(a)), Float(b)) | (Float(b), Length(Length::Abs(a))) => {
            Ok(Length(Length::Abs(a * b)))
        }
        (Length(Length::Em(a)), Int(b)) | (Int(b), Length(Length::Em(a))) => {
            Ok(Length(Length::Em(a * b as f64)))
        }
        (Length(Length::Em(a)), Float(b)) | (Float(b), Length(Length::Em(a))) => {
            Ok(Length(Length::Em(a * b)))
        }
        (Str(s), Int(n)) | (Int(n), Str(s)) => {
            Ok(Str(s.repeat(n.max(0) as usize).into()))
        }
        (Array(items), Int(n)) | (Int(n), Array(items)) => {
            let mut out = Vec::with_capacity(items.len() * n.max(0) as usize);
            for _ in 0..n.max(0) {
                out.extend(items.iter().cloned());
            }
            Ok(Array(out))
        }
        (a, b) => mismatch("multiply", &a, &b),
    }
}

pub fn div(a: Value, b: Value) -> Res {
    use Value::*;
    if is_zero(&b) {
        return Err("cannot divide by zero".into());
    }
    match (a, b) {
        (Int(a), Int(b)) if a % b == 0 => Ok(Int(a / b)),
        (Int(a), Int(b)) => Ok(Float(a as f64 / b as f64)),
        (Int(a), Float(b)) => Ok(Float(a as f64 / b)),
        (Float(a), Int(b)) => Ok(Float(a / b as f64)),
        (Float(a), Float(b)) => Ok(Float(a / b)),
        (Ratio(a), Ratio(b)) => Ok(Float(a.0 / b.0)),
        (Ratio(a), Int(b)) => Ok(Ratio(crate::value::Ratio(a.0 / b as f64))),
        (Ratio(a), Float(b)) => Ok(Float(a.0 / b)),
        (Length(Length::Abs(a)), Int(b)) => Ok(Length(Length::Abs(a / b as f64))),
        (Length(Length::Abs(a)), Float(b)) => Ok(Length(Length::Abs(a / b))),
        (Length(Length::Abs(a)), Length(Length::Abs(b))) => Ok(Float(a / b)),
        (Length(Length::Em(a)), Int(b)) => Ok(Length(Length::Em(a / b as f64))),
        (Length(Length::Em(a)), Float(b)) => Ok(Length(Length::Em(a / b))),
        (Angle(a), Angle(b)) => Ok(Float(a.0 / b.0)),
        (Fraction(a), Fraction(b)) => Ok(Float(a.0 / b.0)),
        (a, b) => mismatch("divide", &a, &b),
    }
}

fn is_zero(v: &Value) -> bool {
    match v {
        Value::Int(0) => true,
        Value::Float(f) => *f == 0.0,
        Value::Ratio(r) => r.0 == 0.0,
        _ => false,
    }
}

pub fn eq(a: Value, b: Value) -> Res {
    Ok(Value::Bool(values_equal(&a, &b)))
}

pub fn neq(a: Value, b: Value) -> Res {
    Ok(Value::Bool(!values_equal(&a, &b)))
}

pub fn lt(a: Value, b: Value) -> Res {
    ordering(&a, &b, "<", |o| o == std::cmp::Ordering::Less)
}

pub fn leq(a: Value, b: Value) -> Res {
    ordering(&a, &b, "<=", |o| o != std::cmp::Ordering::Greater)
}

pub fn gt(a: Value, b: Value) -> Res {
    ordering(&a, &b, ">", |o| o == std::cmp::Ordering::Greater)
}

pub fn geq(a: Value, b: Value) -> Res {
    ordering(&a, &b, ">=", |o| o != std::cmp::Ordering::Less)
}

fn ordering(a: &Value, b: &Value, op: &str, pred: fn(std::cmp::Ordering) -> bool) -> Res {
    match compare(a, b) {
        Some(ord) => Ok(Value::Bool(pred(ord))),
        None => Err(eco_format!("cannot compare {} and {} with '{op}'", a.ty(), b.ty())),
    }
}

pub fn in_(a: Value, b: Value) -> Res {
    use Value::*;
    match (a, b) {
        (Str(needle), Str(hay)) => Ok(Bool(hay.contains(needle.as_str()))),
        (Regex(re), Str(hay)) => Ok(Bool(re.is_match(&hay))),
        (needle, Array(items)) => Ok(Bool(items.iter().any(|v| values_equal(v, &needle)))),
        (Str(key), Dict(map)) => Ok(Bool(map.contains_key(key.as_str()))),
        (a, b) => mismatch("apply 'in' to", &a, &b),
    }
}

pub fn not_in(a: Value, b: Value) -> Res {
    in_(a, b).map(|v| match v {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Alignment;

    #[test]
    fn test_maybe_plus_widens_int_and_float() {
        assert!(matches!(maybe_plus(Value::Int(1), Value::Float(2.5)), Ok(Value::Float(f)) if f == 3.5));
    }

    #[test]
    fn test_maybe_plus_concatenates_strings_and_arrays() {
        let s = maybe_plus(Value::Str("foo".into()), Value::Str("bar".into())).unwrap();
        assert!(matches!(s, Value::Str(s) if s == "foobar"));

        let arr = maybe_plus(Value::Array(vec![Value::Int(1)]), Value::Array(vec![Value::Int(2)])).unwrap();
        assert!(matches!(arr, Value::Array(items) if items.len() == 2));
    }

    #[test]
    fn test_maybe_plus_rejects_mismatched_kinds() {
        assert!(maybe_plus(Value::Int(1), Value::Str("x".into())).is_err());
    }

    #[test]
    fn test_add_merges_alignments_componentwise() {
        let h = Value::Alignment(Alignment { horiz: Some(crate::value::HAlign::Left), vert: None });
        let v = Value::Alignment(Alignment { horiz: None, vert: Some(crate::value::VAlign::Top) });
        let merged = add(h, v).unwrap();
        let Value::Alignment(a) = merged else { panic!("expected alignment") };
        assert_eq!(a.horiz, Some(crate::value::HAlign::Left));
        assert_eq!(a.vert, Some(crate::value::VAlign::Top));
    }

    #[test]
    fn test_div_rejects_division_by_zero() {
        assert!(div(Value::Int(1), Value::Int(0)).is_err());
        assert!(div(Value::Int(1), Value::Float(0.0)).is_err());
    }

    #[test]
    fn test_div_keeps_integers_when_exact() {
        assert!(matches!(div(Value::Int(6), Value::Int(3)), Ok(Value::Int(2))));
        assert!(matches!(div(Value::Int(7), Value::Int(2)), Ok(Value::Float(f)) if f == 3.5));
    }

    #[test]
    fn test_pow_integer_base_and_exponent_stays_integer() {
        assert!(matches!(pow(Value::Int(2), Value::Int(10)), Ok(Value::Int(1024))));
    }

    #[test]
    fn test_join_drops_none_and_prefers_content() {
        assert!(matches!(join(Value::None, Value::Int(4)), Ok(Value::Int(4))));
        let joined = join(Value::Content(Content(Vec::new())), Value::Str("x".into())).unwrap();
        assert!(matches!(joined, Value::Content(_)));
    }

    #[test]
    fn test_mul_repeats_string_and_array() {
        assert!(matches!(mul(Value::Str("ab".into()), Value::Int(2)), Ok(Value::Str(s)) if s == "abab"));
        let arr = mul(Value::Array(vec![Value::Int(1)]), Value::Int(3)).unwrap();
        assert!(matches!(arr, Value::Array(items) if items.len() == 3));
    }

    #[test]
    fn test_in_checks_membership_across_kinds() {
        assert!(matches!(in_(Value::Str("b".into()), Value::Str("abc".into())), Ok(Value::Bool(true))));
        assert!(matches!(
            in_(Value::Int(2), Value::Array(vec![Value::Int(1), Value::Int(2)])),
            Ok(Value::Bool(true))
        ));
        assert!(matches!(not_in(Value::Int(3), Value::Array(vec![Value::Int(1)])), Ok(Value::Bool(true))));
    }

    #[test]
    fn test_ordering_rejects_incomparable_kinds() {
        assert!(lt(Value::Int(1), Value::Str("x".into())).is_err());
        assert!(matches!(lt(Value::Int(1), Value::Int(2)), Ok(Value::Bool(true))));
    }
}
