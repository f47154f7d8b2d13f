// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Total (never-failing) coercions between [`Value`] and the host scalar
//! types.

use crate::qdate::QDate;
use crate::Value;

/// Total `get_as_*` coercions, matching the data-model contract: numeric
/// strings parse, non-numeric strings yield `0`, and nothing ever returns an
/// `Err` or raises into a sink.
pub trait Coerce {
    fn get_as_bool(&self) -> bool;
    fn get_as_int(&self) -> i64;
    fn get_as_float(&self) -> f64;
    fn get_as_string(&self) -> String;
    fn get_as_date(&self) -> QDate;
}

impl Coerce for Value {
    fn get_as_bool(&self) -> bool {
        match self {
            Value::Nothing | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Date(d) => d.to_epoch_seconds() != 0,
            Value::String(s) => !s.with(|s| s.as_str().is_empty()),
            Value::Binary(b) => !b.with(|b| b.is_empty()),
            Value::List(l) => !l.with(|l| l.is_empty()),
            Value::Hash(h) => !h.with(|h| h.is_empty()),
            Value::Object(_) => true,
            Value::Closure(_) | Value::CallRef(_) | Value::Regex(_) | Value::Reference(_) => true,
            Value::WeakList(_) | Value::WeakHash(_) | Value::WeakObject(_) => !self.is_deleted(),
        }
    }

    fn get_as_int(&self) -> i64 {
        match self {
            Value::Nothing | Value::Null => 0,
            Value::Bool(b) => i64::from(*b),
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Date(d) => d.to_epoch_seconds(),
            Value::String(s) => s.with(|s| parse_leading_int(s.as_str())),
            _ => 0,
        }
    }

    fn get_as_float(&self) -> f64 {
        match self {
            Value::Nothing | Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Date(d) => d.to_epoch_seconds() as f64,
            Value::String(s) => s.with(|s| parse_leading_float(s.as_str())),
            _ => 0.0,
        }
    }

    fn get_as_string(&self) -> String {
        match self {
            Value::Nothing => String::new(),
            Value::Null => "<NULL>".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Date(d) => d.to_epoch_seconds().to_string(),
            Value::String(s) => s.with(|s| s.as_str().to_string()),
            Value::Binary(b) => format!("<{} bytes of binary data>", b.with(|b| b.len())),
            Value::List(l) => format!("<list of {} elements>", l.with(|l| l.len())),
            Value::Hash(h) => format!("<hash of {} members>", h.with(|h| h.len())),
            Value::Object(o) => format!("<object of class {}>", o.with(|o| o.class_name().to_string())),
            Value::Closure(_) => "<closure>".to_string(),
            Value::CallRef(c) => format!("<callref {}>", c.with(|c| c.name().to_string())),
            Value::Regex(r) => format!("/{}/", r.with(|r| r.source().to_string())),
            Value::Reference(_) => "<reference>".to_string(),
            Value::WeakList(_) | Value::WeakHash(_) | Value::WeakObject(_) => {
                if self.is_deleted() {
                    "<deleted>".to_string()
                } else {
                    "<weak reference>".to_string()
                }
            }
        }
    }

    fn get_as_date(&self) -> QDate {
        match self {
            Value::Date(d) => *d,
            other => QDate::from_epoch_seconds(other.get_as_int()),
        }
    }
}

/// Parses the leading optionally-signed decimal integer in `s`, yielding `0`
/// for a string with no leading digits.
fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let mut chars = s.char_indices().peekable();
    let mut end = 0;
    if let Some((_, c)) = chars.peek() {
        if *c == '+' || *c == '-' {
            end += c.len_utf8();
            chars.next();
        }
    }
    let mut saw_digit = false;
    for (i, c) in chars {
        if c.is_ascii_digit() {
            saw_digit = true;
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    if !saw_digit {
        return 0;
    }
    s[..end].parse().unwrap_or(0)
}

/// Parses the leading floating-point literal in `s` (sign, digits, optional
/// fractional part), yielding `0.0` for a string with no leading digits.
fn parse_leading_float(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes: Vec<char> = s.chars().collect();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == '+' || bytes[i] == '-') {
        i += 1;
    }
    let start_digits = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut saw_digit = i > start_digits;
    if i < bytes.len() && bytes[i] == '.' {
        let dot = i;
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == frac_start && !saw_digit {
            i = dot;
        } else {
            saw_digit = saw_digit || i > frac_start;
        }
    }
    if !saw_digit {
        return 0.0;
    }
    let end: usize = bytes[..i].iter().map(|c| c.len_utf8()).sum();
    s[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_string_parses_to_int() {
        assert_eq!(Value::string("42abc").get_as_int(), 42);
        assert_eq!(Value::string("-7").get_as_int(), -7);
    }

    #[test]
    fn test_non_numeric_string_yields_zero() {
        assert_eq!(Value::string("hello").get_as_int(), 0);
        assert_eq!(Value::string("hello").get_as_float(), 0.0);
    }

    #[test]
    fn test_float_string_parses_fractional_part() {
        assert!((Value::string("3.5 apples").get_as_float() - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bool_coercion_matches_truthiness() {
        assert!(!Value::Int(0).get_as_bool());
        assert!(Value::Int(1).get_as_bool());
        assert!(!Value::string("").get_as_bool());
        assert!(Value::string("x").get_as_bool());
    }

    #[test]
    fn test_date_roundtrips_through_int() {
        let d = QDate::from_epoch_seconds(12345);
        let v = Value::Date(d);
        assert_eq!(v.get_as_int(), 12345);
        assert_eq!(v.get_as_date(), d);
    }
}
