// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Soft (coercive) and hard (tag-strict) value equality.

use crate::coerce::Coerce;
use crate::Value;

/// Cross-type, coercive equality: `1 == "1"` is `true`. Total, never raises.
/// Backs the `==`/`!=` operators.
#[must_use]
pub fn soft_eq(left: &Value, right: &Value) -> bool {
    use Value::{Bool, Float, Int, Nothing, Null};
    match (left, right) {
        (Nothing, Nothing) | (Null, Null) => true,
        (Nothing, _) | (_, Nothing) => false,
        (Float(_), _) | (_, Float(_)) => {
            (left.get_as_float() - right.get_as_float()).abs() < f64::EPSILON
        }
        (Int(_), _) | (_, Int(_)) | (Bool(_), _) | (_, Bool(_)) => {
            left.get_as_int() == right.get_as_int()
        }
        _ => hard_eq(left, right),
    }
}

/// Type-strict equality: the tags must match, then the contents must match
/// with no coercion. Backs the `===`/`!==` operators.
#[must_use]
pub fn hard_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Nothing, Value::Nothing) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Date(a), Value::Date(b)) => a == b,
        (Value::String(a), Value::String(b)) => a.with(|a| b.with(|b| a.as_str() == b.as_str())),
        (Value::Binary(a), Value::Binary(b)) => a.with(|a| b.with(|b| a.as_bytes() == b.as_bytes())),
        (Value::List(a), Value::List(b)) => a.with(|a| {
            b.with(|b| {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| hard_eq(x, y))
            })
        }),
        (Value::Hash(a), Value::Hash(b)) => a.with(|a| {
            b.with(|b| {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| hard_eq(v, bv)))
            })
        }),
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Closure(a), Value::Closure(b)) => a.ptr_eq(b),
        (Value::CallRef(a), Value::CallRef(b)) => a.ptr_eq(b),
        (Value::Regex(a), Value::Regex(b)) => a.ptr_eq(b),
        (Value::Reference(a), Value::Reference(b)) => a.ptr_eq(b),
        (Value::WeakList(a), Value::WeakList(b)) => a.ptr_eq(b),
        (Value::WeakHash(a), Value::WeakHash(b)) => a.ptr_eq(b),
        (Value::WeakObject(a), Value::WeakObject(b)) => a.ptr_eq(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_eq_coerces_across_types() {
        assert!(soft_eq(&Value::Int(1), &Value::string("1")));
        assert!(!hard_eq(&Value::Int(1), &Value::string("1")));
    }

    #[test]
    fn test_soft_eq_nothing_only_equals_nothing() {
        assert!(soft_eq(&Value::Nothing, &Value::Nothing));
        assert!(!soft_eq(&Value::Nothing, &Value::Int(0)));
    }

    #[test]
    fn test_hard_eq_lists_compare_elementwise() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(hard_eq(&a, &b));
        let c = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert!(!hard_eq(&a, &c));
    }

    #[test]
    fn test_hard_eq_hash_ignores_insertion_order() {
        let mut ha = crate::QHash::new();
        ha.insert("x", Value::Int(1));
        ha.insert("y", Value::Int(2));
        let mut hb = crate::QHash::new();
        hb.insert("y", Value::Int(2));
        hb.insert("x", Value::Int(1));
        assert!(hard_eq(&Value::hash(ha), &Value::hash(hb)));
    }

    #[test]
    fn test_hard_eq_objects_are_identity_based() {
        let a = Value::object(crate::QObject::new("Point"));
        let b = Value::object(crate::QObject::new("Point"));
        assert!(!hard_eq(&a, &b));
        assert!(hard_eq(&a, &a.clone()));
    }
}
