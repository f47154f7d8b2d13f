// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Arithmetic, comparison, and bitwise operator semantics: the argument
//! widening rule and the `DIVISION-BY-ZERO` check.
//!
//! Soft/hard equality are not reimplemented here — `vellum_value::equality`
//! already provides them as total, never-raising free functions; this
//! module only owns the operators that *can* raise (`/`, `%`) and the
//! numeric widening rule shared by arithmetic and ordered comparison.

use vellum_exceptions::ErrorKind;
use vellum_value::{soft_eq, Coerce, Sink, Value};

/// The binary operators `vellum-eval` evaluates directly (as opposed to
/// `&&`/`||`/`??`, which short-circuit and so need access to the
/// unevaluated right-hand node rather than a plain `Value`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    SoftEq,
    SoftNe,
    HardEq,
    HardNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// The assignment-family combining operator carried by an `Assign` node,
/// matching spec §4.5.2's `+=`/`-=`/... family sharing one lvalue
/// acquisition with `=` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

impl AssignOp {
    #[must_use]
    pub fn as_binop(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Mod => Some(BinOp::Mod),
            AssignOp::Shl => Some(BinOp::Shl),
            AssignOp::Shr => Some(BinOp::Shr),
            AssignOp::BitAnd => Some(BinOp::BitAnd),
            AssignOp::BitOr => Some(BinOp::BitOr),
            AssignOp::BitXor => Some(BinOp::BitXor),
        }
    }
}

/// The widened numeric kind two operands arithmetic-combine under: `number`
/// isn't a representable `Value` variant in this data model (see
/// `DESIGN.md`'s Open Question note), so the rule collapses to "float wins
/// over int."
enum Widen {
    Float,
    Int,
}

fn widen_of(a: &Value, b: &Value) -> Widen {
    if matches!(a, Value::Float(_)) || matches!(b, Value::Float(_)) {
        Widen::Float
    } else {
        Widen::Int
    }
}

/// Applies `op` to `left`/`right`, consuming both (releasing them via
/// `deref` once their contents have been read, per the "a Value is owned by
/// the stack frame that produced it" lifecycle rule). Returns a freshly
/// owned result `Value`.
pub fn apply_binary(op: BinOp, left: Value, right: Value, sink: &mut Sink) -> Value {
    let result = match op {
        BinOp::SoftEq => Value::Bool(soft_eq(&left, &right)),
        BinOp::SoftNe => Value::Bool(!soft_eq(&left, &right)),
        BinOp::HardEq => Value::Bool(vellum_value::hard_eq(&left, &right)),
        BinOp::HardNe => Value::Bool(!vellum_value::hard_eq(&left, &right)),
        BinOp::Add => apply_add(&left, &right),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => apply_compare(op, &left, &right),
        BinOp::Sub | BinOp::Mul => apply_arith(op, &left, &right),
        BinOp::Div | BinOp::Mod => apply_div_mod(op, &left, &right, sink),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            apply_bitwise(op, &left, &right)
        }
    };
    left.deref(sink);
    right.deref(sink);
    result
}

fn apply_add(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::String(a), Value::String(b)) => {
            Value::string(format!("{}{}", a.with(|s| s.as_str().to_string()), b.with(|s| s.as_str().to_string())))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.with(|l| l.as_slice().to_vec());
            items.extend(b.with(|l| l.as_slice().to_vec()));
            Value::list(items)
        }
        (Value::Hash(a), Value::Hash(b)) => {
            let mut merged = a.with(|h| h.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<vellum_value::QHash>());
            b.with(|h| {
                for (k, v) in h.iter() {
                    merged.insert(k, v.clone());
                }
            });
            Value::hash(merged)
        }
        _ => match widen_of(left, right) {
            Widen::Float => Value::Float(left.get_as_float() + right.get_as_float()),
            Widen::Int => Value::Int(left.get_as_int().wrapping_add(right.get_as_int())),
        },
    }
}

fn apply_arith(op: BinOp, left: &Value, right: &Value) -> Value {
    match widen_of(left, right) {
        Widen::Float => {
            let (a, b) = (left.get_as_float(), right.get_as_float());
            Value::Float(match op {
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                _ => unreachable!("apply_arith only handles Sub/Mul"),
            })
        }
        Widen::Int => {
            let (a, b) = (left.get_as_int(), right.get_as_int());
            Value::Int(match op {
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                _ => unreachable!("apply_arith only handles Sub/Mul"),
            })
        }
    }
}

/// Integer `/`/`%` by zero raises `DIVISION-BY-ZERO`; float division by zero
/// yields IEEE infinity/NaN without an exception, per spec §4.5.2.
fn apply_div_mod(op: BinOp, left: &Value, right: &Value, sink: &mut Sink) -> Value {
    match widen_of(left, right) {
        Widen::Float => {
            let (a, b) = (left.get_as_float(), right.get_as_float());
            Value::Float(if op == BinOp::Div { a / b } else { a % b })
        }
        Widen::Int => {
            let (a, b) = (left.get_as_int(), right.get_as_int());
            if b == 0 {
                sink.raise_system(ErrorKind::DivisionByZero, "integer division or modulo by zero");
                return Value::Nothing;
            }
            Value::Int(if op == BinOp::Div { a.wrapping_div(b) } else { a.wrapping_rem(b) })
        }
    }
}

fn apply_bitwise(op: BinOp, left: &Value, right: &Value) -> Value {
    let (a, b) = (left.get_as_int(), right.get_as_int());
    Value::Int(match op {
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a.wrapping_shr(b as u32),
        _ => unreachable!("apply_bitwise only handles bitwise ops"),
    })
}

/// Strings compare lexicographically, dates chronologically, everything
/// else widens per the arithmetic rule.
fn apply_compare(op: BinOp, left: &Value, right: &Value) -> Value {
    use std::cmp::Ordering;
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => {
            a.with(|a| b.with(|b| a.as_str().cmp(b.as_str())))
        }
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        _ => match widen_of(left, right) {
            Widen::Float => left
                .get_as_float()
                .partial_cmp(&right.get_as_float())
                .unwrap_or(Ordering::Equal),
            Widen::Int => left.get_as_int().cmp(&right.get_as_int()),
        },
    };
    Value::Bool(match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("apply_compare only handles ordered comparisons"),
    })
}

/// Applies a unary operator, consuming its operand.
pub fn apply_unary(op: UnaryOp, operand: Value, sink: &mut Sink) -> Value {
    let result = match op {
        UnaryOp::Not => Value::Bool(!operand.get_as_bool()),
        UnaryOp::BitNot => Value::Int(!operand.get_as_int()),
        UnaryOp::Neg => match operand {
            Value::Float(f) => Value::Float(-f),
            ref other => Value::Int(-other.get_as_int()),
        },
    };
    operand.deref(sink);
    result
}

/// Truthiness per spec's general-purpose `get_as_bool` coercion: used by
/// `&&`/`||`/`?:`/`??`/`if`/`while` conditions.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    value.get_as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_add_widens_to_float_when_either_operand_is_float() {
        let mut sink = Sink::new();
        let result = apply_binary(BinOp::Add, Value::Int(1), Value::Float(2.5), &mut sink);
        assert!(matches!(result, Value::Float(f) if (f - 3.5).abs() < f64::EPSILON));
    }

    #[test]
    fn test_string_concat() {
        let mut sink = Sink::new();
        let result = apply_binary(BinOp::Add, Value::string("foo"), Value::string("bar"), &mut sink);
        assert!(matches!(&result, Value::String(s) if s.with(|s| s.as_str() == "foobar")));
        result.deref(&mut sink);
    }

    #[test]
    fn test_integer_division_by_zero_raises_and_returns_nothing() {
        let mut sink = Sink::new();
        let result = apply_binary(BinOp::Div, Value::Int(4), Value::Int(0), &mut sink);
        assert!(matches!(result, Value::Nothing));
        assert_eq!(sink.peek().unwrap().error_code(), Some("DIVISION-BY-ZERO"));
    }

    #[test]
    fn test_float_division_by_zero_yields_infinity_without_exception() {
        let mut sink = Sink::new();
        let result = apply_binary(BinOp::Div, Value::Float(1.0), Value::Float(0.0), &mut sink);
        assert!(matches!(result, Value::Float(f) if f.is_infinite()));
        assert!(!sink.is_exception());
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let mut sink = Sink::new();
        let result = apply_binary(BinOp::Lt, Value::string("abc"), Value::string("abd"), &mut sink);
        assert!(matches!(result, Value::Bool(true)));
    }

    #[test]
    fn test_unary_negate_preserves_float() {
        let mut sink = Sink::new();
        let result = apply_unary(UnaryOp::Neg, Value::Float(3.0), &mut sink);
        assert!(matches!(result, Value::Float(f) if f == -3.0));
    }
}
