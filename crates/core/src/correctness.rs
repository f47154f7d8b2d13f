// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Functions for correctness checks similar to the *design by contract* philosophy.
//!
//! This module provides validation checking of function or method conditions.
//!
//! A condition is a predicate which must be true just prior to the execution of
//! some section of code, for correct behavior as per the design specification.
//!
//! An [`anyhow::Result`] is returned with a descriptive message when the
//! condition check fails.

use std::fmt::{Debug, Display};

/// A message prefix that can be used with calls to `expect` or other assertion-related functions.
pub const FAILED: &str = "Condition failed";

/// Checks the `predicate` is true.
///
/// # Errors
///
/// Returns an error if the validation check fails.
#[inline(always)]
pub fn check_predicate_true(predicate: bool, fail_msg: &str) -> anyhow::Result<()> {
    if !predicate {
        anyhow::bail!("{fail_msg}")
    }
    Ok(())
}

/// Checks the `predicate` is false.
///
/// # Errors
///
/// Returns an error if the validation check fails.
#[inline(always)]
pub fn check_predicate_false(predicate: bool, fail_msg: &str) -> anyhow::Result<()> {
    if predicate {
        anyhow::bail!("{fail_msg}")
    }
    Ok(())
}

/// Checks if the string `s` is not empty.
///
/// # Errors
///
/// Returns an error if `s` is empty.
#[inline(always)]
pub fn check_nonempty_string<T: AsRef<str>>(s: T, param: &str) -> anyhow::Result<()> {
    if s.as_ref().is_empty() {
        anyhow::bail!("invalid string for '{param}', was empty");
    }
    Ok(())
}

/// Checks the string `s` has semantic meaning: non-empty and not solely whitespace.
///
/// # Errors
///
/// Returns an error if `s` is empty or consists solely of whitespace.
#[inline(always)]
pub fn check_valid_string<T: AsRef<str>>(s: T, param: &str) -> anyhow::Result<()> {
    let s = s.as_ref();
    if s.is_empty() {
        anyhow::bail!("invalid string for '{param}', was empty");
    }
    if !s.chars().any(|c| !c.is_whitespace()) {
        anyhow::bail!("invalid string for '{param}', was all whitespace");
    }
    Ok(())
}

/// Checks the two values are equal, producing a labeled error otherwise.
///
/// # Errors
///
/// Returns an error if the validation check fails.
#[inline(always)]
pub fn check_equal<T: PartialEq + Debug + Display>(
    lhs: T,
    rhs: T,
    lhs_param: &str,
    rhs_param: &str,
) -> anyhow::Result<()> {
    if lhs != rhs {
        anyhow::bail!("'{lhs_param}' value of {lhs} was not equal to '{rhs_param}' value of {rhs}");
    }
    Ok(())
}

/// Checks the `usize` value is positive (> 0).
///
/// # Errors
///
/// Returns an error if the validation check fails.
#[inline(always)]
pub fn check_positive_usize(value: usize, param: &str) -> anyhow::Result<()> {
    if value == 0 {
        anyhow::bail!("invalid usize for '{param}' not positive, was {value}")
    }
    Ok(())
}

/// Checks the `i64` value is non-negative (>= 0).
///
/// # Errors
///
/// Returns an error if the validation check fails.
#[inline(always)]
pub fn check_non_negative_i64(value: i64, param: &str) -> anyhow::Result<()> {
    if value < 0 {
        anyhow::bail!("invalid i64 for '{param}' negative, was {value}")
    }
    Ok(())
}

/// Checks `index` is a valid position into a collection of length `len`
/// (strictly less than `len`).
///
/// # Errors
///
/// Returns an error if `index >= len`.
#[inline(always)]
pub fn check_index_in_bounds(index: usize, len: usize, param: &str) -> anyhow::Result<()> {
    if index >= len {
        anyhow::bail!("invalid index for '{param}': {index} out of bounds for length {len}")
    }
    Ok(())
}

/// Checks `slice` is not empty.
///
/// # Errors
///
/// Returns an error if the slice has no elements.
#[inline(always)]
pub fn check_slice_not_empty<T>(slice: &[T], param: &str) -> anyhow::Result<()> {
    if slice.is_empty() {
        anyhow::bail!("invalid slice for '{param}', was empty")
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn test_check_predicate_true(#[case] predicate: bool, #[case] expected_ok: bool) {
        assert_eq!(check_predicate_true(predicate, "must hold").is_ok(), expected_ok);
    }

    #[rstest]
    #[case("", false)]
    #[case("   ", false)]
    #[case("x", true)]
    fn test_check_valid_string(#[case] s: &str, #[case] expected_ok: bool) {
        assert_eq!(check_valid_string(s, "param").is_ok(), expected_ok);
    }

    #[rstest]
    fn test_check_equal_mismatch() {
        let err = check_equal(1, 2, "lhs", "rhs").unwrap_err();
        assert!(err.to_string().contains("lhs"));
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    fn test_check_positive_usize(#[case] value: usize, #[case] expected_ok: bool) {
        assert_eq!(check_positive_usize(value, "n").is_ok(), expected_ok);
    }

    #[rstest]
    #[case(3, 3, false)]
    #[case(2, 3, true)]
    fn test_check_index_in_bounds(#[case] index: usize, #[case] len: usize, #[case] expected_ok: bool) {
        assert_eq!(check_index_in_bounds(index, len, "i").is_ok(), expected_ok);
    }
}
