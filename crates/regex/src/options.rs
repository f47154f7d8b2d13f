// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Translates the regex literal's option letters into a [`RegexOptions`]
//! bitset.

use vellum_value::RegexOptions;

/// Parses a regex literal's option-letter suffix (e.g. `"ixg"`) into a
/// [`RegexOptions`] bitset. Returns the offending character on the first
/// letter that isn't one of `i`/`m`/`s`/`x`/`e`/`g`.
pub fn parse_options(letters: &str) -> Result<RegexOptions, char> {
    let mut options = RegexOptions::empty();
    for c in letters.chars() {
        let bit = match c {
            'i' => RegexOptions::CASE_INSENSITIVE,
            'm' => RegexOptions::MULTILINE,
            's' => RegexOptions::DOT_ALL,
            'x' => RegexOptions::EXTENDED,
            'e' => RegexOptions::EXTRACT,
            'g' => RegexOptions::GLOBAL,
            other => return Err(other),
        };
        options |= bit;
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_known_letters() {
        let options = parse_options("ig").unwrap();
        assert!(options.contains(RegexOptions::CASE_INSENSITIVE));
        assert!(options.contains(RegexOptions::GLOBAL));
        assert!(!options.contains(RegexOptions::MULTILINE));
    }

    #[test]
    fn test_unknown_letter_is_rejected() {
        assert_eq!(parse_options("iz"), Err('z'));
    }
}
