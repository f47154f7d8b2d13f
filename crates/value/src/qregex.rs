// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Compiled regular-expression values.
//!
//! Unlike closures and callrefs, a regex needs no callback into `vellum-eval`
//! — matching is pure data manipulation, so this crate compiles the pattern
//! itself via the `regex` crate and stores the result directly.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use regex::Regex;

use crate::envelope::HeapDestroy;

/// Compilation flags, mirroring the option letters accepted by the
/// language's regex literal syntax. A plain hand-rolled bitset, in the style
/// of the runtime's other option bitsets, rather than an external crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegexOptions(u8);

impl RegexOptions {
    pub const CASE_INSENSITIVE: RegexOptions = RegexOptions(0b0000_0001);
    pub const MULTILINE: RegexOptions = RegexOptions(0b0000_0010);
    pub const DOT_ALL: RegexOptions = RegexOptions(0b0000_0100);
    pub const EXTENDED: RegexOptions = RegexOptions(0b0000_1000);
    pub const EXTRACT: RegexOptions = RegexOptions(0b0001_0000);
    pub const GLOBAL: RegexOptions = RegexOptions(0b0010_0000);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: RegexOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RegexOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RegexOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A compiled pattern plus the source text and options it was built from
/// (kept around for `Value` display/coercion to string).
pub struct QRegex {
    source: String,
    options: RegexOptions,
    compiled: Regex,
}

impl QRegex {
    /// Compiles `source` under `options`. `GLOBAL` affects only how callers
    /// of the match/substitute routines behave, not compilation itself.
    pub fn compile(source: impl Into<String>, options: RegexOptions) -> Result<Self, regex::Error> {
        let source = source.into();
        let mut builder = regex::RegexBuilder::new(&translate_extended(&source, options));
        builder
            .case_insensitive(options.contains(RegexOptions::CASE_INSENSITIVE))
            .multi_line(options.contains(RegexOptions::MULTILINE))
            .dot_matches_new_line(options.contains(RegexOptions::DOT_ALL));
        let compiled = builder.build()?;
        Ok(Self {
            source,
            options,
            compiled,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn options(&self) -> RegexOptions {
        self.options
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.options.contains(RegexOptions::GLOBAL)
    }

    #[must_use]
    pub fn is_match(&self, haystack: &str) -> bool {
        self.compiled.is_match(haystack)
    }

    /// Extracts either the one full match, or (if the pattern has capture
    /// groups) each group's text, for the first match in `haystack`.
    #[must_use]
    pub fn extract_substrings(&self, haystack: &str) -> Option<Vec<Option<String>>> {
        let captures = self.compiled.captures(haystack)?;
        if self.compiled.captures_len() > 1 {
            Some(
                captures
                    .iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()))
                    .collect(),
            )
        } else {
            Some(vec![captures.get(0).map(|m| m.as_str().to_string())])
        }
    }

    /// Replaces the first match (or all matches, if `GLOBAL` is set) with
    /// `replacement`, which may reference capture groups as `$1`, `$name`.
    #[must_use]
    pub fn substitute(&self, haystack: &str, replacement: &str) -> String {
        if self.is_global() {
            self.compiled.replace_all(haystack, replacement).into_owned()
        } else {
            self.compiled.replace(haystack, replacement).into_owned()
        }
    }
}

/// Extended mode (`EXTENDED`) strips unescaped whitespace and `#`-to-end-of-line
/// comments from the pattern before compilation, matching the behavior of
/// most `/x`-flagged regex dialects. `regex` doesn't support this natively,
/// so it's done as a pre-pass.
fn translate_extended(source: &str, options: RegexOptions) -> String {
    if !options.contains(RegexOptions::EXTENDED) {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push(c);
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

impl fmt::Debug for QRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QRegex")
            .field("source", &self.source)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl HeapDestroy for QRegex {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_match_basic() {
        let re = QRegex::compile(r"^\d+$", RegexOptions::empty()).unwrap();
        assert!(re.is_match("1234"));
        assert!(!re.is_match("12a4"));
    }

    #[test]
    fn test_case_insensitive_option() {
        let re = QRegex::compile("hello", RegexOptions::CASE_INSENSITIVE).unwrap();
        assert!(re.is_match("HELLO world"));
    }

    #[test]
    fn test_extract_substrings_with_groups() {
        let re = QRegex::compile(r"(\w+)@(\w+)", RegexOptions::empty()).unwrap();
        let groups = re.extract_substrings("user@host").expect("should match");
        assert_eq!(groups, vec![Some("user".to_string()), Some("host".to_string())]);
    }

    #[test]
    fn test_substitute_global_replaces_all() {
        let re = QRegex::compile("a", RegexOptions::GLOBAL).unwrap();
        assert_eq!(re.substitute("banana", "o"), "bonono");
    }

    #[test]
    fn test_substitute_non_global_replaces_first_only() {
        let re = QRegex::compile("a", RegexOptions::empty()).unwrap();
        assert_eq!(re.substitute("banana", "o"), "bonana");
    }

    #[test]
    fn test_extended_mode_ignores_whitespace_and_comments() {
        let re = QRegex::compile(
            "\\d+  # a run of digits\n  -  \\d+",
            RegexOptions::EXTENDED,
        )
        .unwrap();
        assert!(re.is_match("12-34"));
    }
}
