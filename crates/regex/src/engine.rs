// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Compiling a pattern into a `Value::Regex` and running it against UTF-8
//! targets.
//!
//! [`vellum_value::QRegex`] already holds the compiled pattern and the raw
//! match/substitute mechanics; this module is the layer above it that the
//! evaluator actually calls: it turns parse errors and bad option letters
//! into sink exceptions, and turns match results into `Value`s instead of
//! plain `Option<String>`/`String`.

use tracing::debug;

use vellum_core::correctness::{self, FAILED};
use vellum_exceptions::ErrorKind;
use vellum_value::{QRegex, RegexOptions, Sink, StrongRef, Value};

use crate::options::parse_options;

/// Compiles `source` with the option letters in `option_letters` (e.g.
/// `"ix"`), raising `REGEX-OPTION-ERROR` for an unrecognized letter or
/// `REGEX-COMPILATION-ERROR` for a pattern the `regex` crate rejects.
/// Returns `Value::Nothing` in either failure case, with the sink set.
pub fn compile(source: &str, option_letters: &str, sink: &mut Sink) -> Value {
    let options = match parse_options(option_letters) {
        Ok(options) => options,
        Err(bad) => {
            sink.raise_system(
                ErrorKind::RegexOptionError,
                format!("unrecognized regex option '{bad}'"),
            );
            return Value::Nothing;
        }
    };
    compile_with_options(source, options, sink)
}

/// As [`compile`], but takes an already-assembled [`RegexOptions`] bitset
/// rather than parsing option letters (used when the evaluator has already
/// resolved a `RegexOptions` at parse time for a constant pattern).
///
/// # Panics
///
/// Panics if `source` is empty; an empty regex literal is a parse-time
/// error the evaluator must reject before ever reaching this call.
pub fn compile_with_options(source: &str, options: RegexOptions, sink: &mut Sink) -> Value {
    correctness::check_nonempty_string(source, "source").expect(FAILED);
    match QRegex::compile(source, options) {
        Ok(compiled) => Value::Regex(StrongRef::new(compiled)),
        Err(err) => {
            debug!(pattern = source, %err, "regex compilation failed");
            sink.raise_system(ErrorKind::RegexCompilationError, err.to_string());
            Value::Nothing
        }
    }
}

/// True if `pattern` (a `Value::Regex`) matches `haystack`. Any other
/// `Value` kind never matches.
#[must_use]
pub fn is_match(pattern: &Value, haystack: &str) -> bool {
    match pattern {
        Value::Regex(r) => r.with(|r| r.is_match(haystack)),
        _ => false,
    }
}

/// Extracts the match (or, for a pattern with capture groups, each group)
/// from the first match of `pattern` in `haystack`, as a list of strings
/// (`Value::Nothing` per unmatched optional group). `Value::Nothing` if
/// there is no match at all.
#[must_use]
pub fn extract(pattern: &Value, haystack: &str) -> Value {
    match pattern {
        Value::Regex(r) => r
            .with(|r| r.extract_substrings(haystack))
            .map(|groups| {
                Value::list(
                    groups
                        .into_iter()
                        .map(|g| g.map(Value::string).unwrap_or(Value::Nothing))
                        .collect(),
                )
            })
            .unwrap_or(Value::Nothing),
        _ => Value::Nothing,
    }
}

/// Substitutes matches of `pattern` in `haystack` with `replacement`
/// (replacing only the first match unless the pattern was compiled with
/// `GLOBAL`), returning the result as a `Value::String`.
#[must_use]
pub fn substitute(pattern: &Value, haystack: &str, replacement: &str) -> Value {
    match pattern {
        Value::Regex(r) => Value::string(r.with(|r| r.substitute(haystack, replacement))),
        _ => Value::string(haystack),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_rejects_unknown_option_letter() {
        let mut sink = Sink::new();
        let result = compile("abc", "z", &mut sink);
        assert!(matches!(result, Value::Nothing));
        assert_eq!(sink.peek().unwrap().error_code(), Some("REGEX-OPTION-ERROR"));
    }

    #[test]
    fn test_compile_rejects_invalid_pattern() {
        let mut sink = Sink::new();
        let result = compile("(unterminated", "", &mut sink);
        assert!(matches!(result, Value::Nothing));
        assert_eq!(
            sink.peek().unwrap().error_code(),
            Some("REGEX-COMPILATION-ERROR")
        );
    }

    #[test]
    fn test_is_match_and_extract() {
        let mut sink = Sink::new();
        let pattern = compile(r"(\d+)-(\d+)", "", &mut sink);
        assert!(!sink.is_exception());
        assert!(is_match(&pattern, "12-34"));
        let extracted = extract(&pattern, "12-34");
        match extracted {
            Value::List(list) => {
                assert_eq!(list.with(|l| l.len()), 2);
            }
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn test_substitute_global() {
        let mut sink = Sink::new();
        let pattern = compile("a", "g", &mut sink);
        let replaced = substitute(&pattern, "banana", "o");
        assert!(matches!(replaced, Value::String(_)));
        if let Value::String(s) = replaced {
            assert_eq!(s.with(|s| s.as_str().to_string()), "bonono");
        }
    }
}
