// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Regex compilation/matching and `tr`-style transliteration for the
//! Vellum runtime.
//!
//! [`vellum_value::QRegex`] holds the compiled pattern as inert data; this
//! crate is the behavior layer on top of it that the evaluator calls
//! directly: parsing option letters, raising `REGEX-COMPILATION-ERROR` and
//! `REGEX-OPTION-ERROR` through a [`vellum_value::Sink`], and turning match
//! results into `Value`s. Transliteration lives alongside it since both are
//! "take a string, a pattern-ish thing, and a replacement" operations, but
//! it is a hand-written character mapper rather than anything routed
//! through the `regex` crate.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

mod engine;
mod options;
mod transliterate;

pub use crate::engine::{compile, compile_with_options, extract, is_match, substitute};
pub use crate::options::parse_options;
pub use crate::transliterate::{decode_to_utf8, expand_ranges, transliterate};
