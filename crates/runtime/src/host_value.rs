// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Host-facing [`Value`] construction: spec §6's "constructors for each
//! primitive plus container builders that accept iterators from host
//! collections".
//!
//! `vellum-value` already exposes `Value::string`/`Value::list`/
//! `Value::hash`/`Value::object` for in-runtime callers; this module is the
//! thin, intentionally boring layer embedding host code is meant to reach
//! for instead, so a host never has to know that a list or hash is secretly
//! a refcounted envelope.

use vellum_value::{QBinary, QDate, QHash, Value};

/// Builds a `list` value from any host iterator of `Value`s.
pub fn list_from(items: impl IntoIterator<Item = Value>) -> Value {
    Value::list(items.into_iter().collect())
}

/// Builds a `hash` value from any host iterator of `(key, value)` pairs,
/// preserving the iteration order the host collection produced (the data
/// model's insertion-order contract applies from the first element on).
pub fn hash_from(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
    let mut hash = QHash::new();
    for (key, value) in entries {
        hash.insert(key, value);
    }
    Value::hash(hash)
}

/// Builds a `binary` value from any host byte source.
#[must_use]
pub fn binary_from(bytes: impl Into<Vec<u8>>) -> Value {
    Value::Binary(vellum_value::StrongRef::new(QBinary::new(bytes.into())))
}

/// Builds a `date` value from a Unix epoch timestamp, the host-facing
/// equivalent of spec §4.1's "dates convert to/from epoch seconds" coercion.
#[must_use]
pub fn date_from_epoch_seconds(secs: i64) -> Value {
    Value::Date(QDate::from_epoch_seconds(secs))
}

#[cfg(test)]
mod tests {
    use vellum_value::Coerce;

    use super::*;

    #[test]
    fn test_list_from_host_iterator() {
        let value = list_from([Value::Int(1), Value::Int(2)]);
        match value {
            Value::List(l) => assert_eq!(l.with(|l| l.len()), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_hash_from_preserves_insertion_order() {
        let value = hash_from([("b".to_string(), Value::Int(1)), ("a".to_string(), Value::Int(2))]);
        match value {
            Value::Hash(h) => {
                let keys: Vec<String> = h.with(|h| h.keys().map(str::to_string).collect());
                assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
            }
            other => panic!("expected hash, got {other:?}"),
        }
    }

    #[test]
    fn test_binary_from_host_bytes() {
        let value = binary_from(vec![1u8, 2, 3]);
        match value {
            Value::Binary(b) => assert_eq!(b.with(|b| b.len()), 3),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_date_from_epoch_seconds_round_trips() {
        let value = date_from_epoch_seconds(1_700_000_000);
        assert_eq!(value.get_as_int(), 1_700_000_000);
    }
}
