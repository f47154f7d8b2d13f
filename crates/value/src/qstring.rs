// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! String values, carrying an explicit character-encoding tag.

use crate::envelope::HeapDestroy;

/// The character encoding a [`QString`] claims to hold.
///
/// Matching is always performed in UTF-8; a non-UTF-8 string is transcoded to
/// a scratch UTF-8 copy first and the original is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    Latin1,
    Ascii,
}

impl Default for Encoding {
    fn default() -> Self {
        Self::Utf8
    }
}

/// A heap string value: UTF-8 text plus the encoding tag it was declared
/// with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QString {
    text: String,
    encoding: Encoding,
}

impl QString {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            encoding: Encoding::Utf8,
        }
    }

    #[must_use]
    pub fn with_encoding(text: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            text: text.into(),
            encoding,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn push_str(&mut self, other: &str) {
        self.text.push_str(other);
    }

    /// Returns the UTF-8 substring between character indices `start..end`,
    /// clamped to the string's length, matching the truncating-range
    /// semantics used by the indexing operators.
    #[must_use]
    pub fn char_slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.char_len());
        let start = start.min(end);
        self.text.chars().skip(start).take(end - start).collect()
    }
}

impl HeapDestroy for QString {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_len_counts_scalars_not_bytes() {
        let s = QString::new("héllo");
        assert_eq!(s.char_len(), 5);
        assert!(s.byte_len() > s.char_len());
    }

    #[test]
    fn test_char_slice_clamps_to_length() {
        let s = QString::new("abcdef");
        assert_eq!(s.char_slice(2, 100), "cdef");
        assert_eq!(s.char_slice(10, 20), "");
    }
}
