// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! `tr/.../...` style transliteration: per-character substitution with
//! range expansion (`a-z`) on either side of the mapping.
//!
//! This has nothing to do with the `regex` crate — it is a hand-written
//! character mapper, matched up one-for-one against the source character
//! set rather than compiled as a pattern. A non-UTF-8 haystack is
//! transcoded to UTF-8 with `encoding_rs` before the mapping runs, since
//! the mapping itself only ever deals in `char`s.

use encoding_rs::{Encoding as RsEncoding, UTF_8, WINDOWS_1252};

use vellum_value::Encoding;

/// Expands a `tr`-style character-class spec (e.g. `"a-zA-Z"`, `"xyz"`)
/// into the literal sequence of characters it denotes. A `-` is a range
/// marker unless it is the first or last character of the spec, or is
/// escaped as `\-`.
#[must_use]
pub fn expand_ranges(spec: &str) -> Vec<char> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            let (start, end) = (chars[i], chars[i + 2]);
            if start <= end {
                out.extend((start as u32..=end as u32).filter_map(char::from_u32));
            }
            i += 3;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Decodes `bytes` under `encoding` into a UTF-8 `String`, transcoding via
/// `encoding_rs` for anything other than UTF-8 itself.
#[must_use]
pub fn decode_to_utf8(bytes: &[u8], encoding: Encoding) -> String {
    let rs_encoding: &RsEncoding = match encoding {
        Encoding::Utf8 | Encoding::Ascii => UTF_8,
        Encoding::Latin1 => WINDOWS_1252,
    };
    let (decoded, _, _) = rs_encoding.decode(bytes);
    decoded.into_owned()
}

/// Maps every character of `haystack` that appears in `from` to the
/// character at the same position in `to`. If `to` is shorter than `from`,
/// the trailing unmatched `from` characters collapse onto `to`'s last
/// character (mirroring POSIX `tr`), unless `to` is empty, in which case
/// they are dropped instead.
#[must_use]
pub fn transliterate(haystack: &str, from: &str, to: &str) -> String {
    let from_chars = expand_ranges(from);
    let to_chars = expand_ranges(to);
    let mut out = String::with_capacity(haystack.len());
    for c in haystack.chars() {
        match from_chars.iter().position(|&f| f == c) {
            Some(idx) => {
                if let Some(&mapped) = to_chars.get(idx) {
                    out.push(mapped);
                } else if let Some(&last) = to_chars.last() {
                    out.push(last);
                }
                // else: to_chars is empty, character is deleted.
            }
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_ranges_handles_letter_range() {
        let expanded = expand_ranges("a-e");
        assert_eq!(expanded, vec!['a', 'b', 'c', 'd', 'e']);
    }

    #[test]
    fn test_expand_ranges_leaves_bare_hyphen_at_edges() {
        let expanded = expand_ranges("-ab-");
        assert_eq!(expanded, vec!['-', 'a', 'b', '-']);
    }

    #[test]
    fn test_transliterate_case_upper_to_lower() {
        let result = transliterate("HELLO", "A-Z", "a-z");
        assert_eq!(result, "hello");
    }

    #[test]
    fn test_transliterate_deletes_when_target_empty() {
        let result = transliterate("hello world", "lo", "");
        assert_eq!(result, "he wrd");
    }

    #[test]
    fn test_transliterate_collapses_onto_final_target_char() {
        let result = transliterate("abc", "abc", "x");
        assert_eq!(result, "xxx");
    }

    #[test]
    fn test_decode_to_utf8_passes_through_ascii() {
        assert_eq!(decode_to_utf8(b"hello", Encoding::Ascii), "hello");
    }
}
