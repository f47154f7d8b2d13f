// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The type constraint a storage cell may be declared with.

use vellum_value::Value;

/// A declared type constraint on a local, member, or static class variable.
/// `Any` accepts every value and is the default for undeclared cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Any,
    Int,
    Float,
    Bool,
    String,
    Date,
    Binary,
    List,
    Hash,
    /// Accepts `Nothing` plus any object, or (if a class name is given) only
    /// objects of that class.
    Object(Option<String>),
}

impl DeclaredType {
    /// Whether `value` satisfies this constraint. `Nothing` always satisfies
    /// any declared type (an unset typed cell is always legal).
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        if matches!(value, Value::Nothing) {
            return true;
        }
        match self {
            DeclaredType::Any => true,
            DeclaredType::Int => matches!(value, Value::Int(_)),
            DeclaredType::Float => matches!(value, Value::Float(_)),
            DeclaredType::Bool => matches!(value, Value::Bool(_)),
            DeclaredType::String => matches!(value, Value::String(_)),
            DeclaredType::Date => matches!(value, Value::Date(_)),
            DeclaredType::Binary => matches!(value, Value::Binary(_)),
            DeclaredType::List => matches!(value, Value::List(_)),
            DeclaredType::Hash => matches!(value, Value::Hash(_)),
            DeclaredType::Object(None) => matches!(value, Value::Object(_)),
            DeclaredType::Object(Some(class_name)) => match value {
                Value::Object(o) => o.with(|o| o.class_name() == class_name),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_value::{QObject, StrongRef};

    #[test]
    fn test_nothing_always_accepted() {
        assert!(DeclaredType::Int.accepts(&Value::Nothing));
        assert!(DeclaredType::Object(Some("Widget".to_string())).accepts(&Value::Nothing));
    }

    #[test]
    fn test_int_rejects_string() {
        assert!(DeclaredType::Int.accepts(&Value::Int(3)));
        assert!(!DeclaredType::Int.accepts(&Value::string("3")));
    }

    #[test]
    fn test_object_class_constraint() {
        let constraint = DeclaredType::Object(Some("Widget".to_string()));
        let matching = Value::Object(StrongRef::new(QObject::new("Widget")));
        let mismatched = Value::Object(StrongRef::new(QObject::new("Gadget")));
        assert!(constraint.accepts(&matching));
        assert!(!constraint.accepts(&mismatched));
    }
}
