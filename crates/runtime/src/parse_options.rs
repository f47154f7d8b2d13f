// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! The parse-option bit set a host passes to [`crate::Program::create`].
//!
//! Hand-rolled over a `u32` rather than pulling in the `bitflags` crate: a
//! handful of named bit constants plus set/union/contains is small enough
//! that a dependency buys nothing a `const` table doesn't already give us.

use std::fmt;

/// A set of named restrictions a host places on a program before parsing it.
///
/// Each bit forbids a class of operation or definition at parse time. A
/// child program's options can only ever be a superset of its parent's
/// (see [`ParseOptions::child`]) unless the parent cleared
/// [`ParseOptions::NO_CHILD_RESTRICTIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions(u32);

macro_rules! parse_option_bits {
    ($($name:ident = $bit:expr => $label:literal),+ $(,)?) => {
        impl ParseOptions {
            $(
                pub const $name: ParseOptions = ParseOptions(1 << $bit);
            )+

            /// Every recognized name paired with its bit, in declaration order.
            pub const NAMES: &'static [(&'static str, ParseOptions)] = &[
                $(($label, ParseOptions::$name)),+
            ];
        }
    };
}

parse_option_bits! {
    NO_GLOBAL_VARS        = 0  => "no-global-vars",
    NO_SUBROUTINE_DEFS    = 1  => "no-subroutine-defs",
    NO_THREAD_CONTROL     = 2  => "no-thread-control",
    NO_THREAD_CLASSES     = 3  => "no-thread-classes",
    NO_TOP_LEVEL          = 4  => "no-top-level",
    NO_CLASS_DEFS         = 5  => "no-class-defs",
    NO_NAMESPACE_DEFS     = 6  => "no-namespace-defs",
    NO_CONSTANT_DEFS      = 7  => "no-constant-defs",
    NO_NEW                = 8  => "no-new",
    NO_SYSTEM_CLASSES     = 9  => "no-system-classes",
    NO_USER_CLASSES       = 10 => "no-user-classes",
    NO_CHILD_RESTRICTIONS = 11 => "no-child-restrictions",
    NO_EXTERNAL_PROCESS   = 12 => "no-external-process",
    REQUIRE_OUR           = 13 => "require-our",
    NO_PROCESS_CONTROL    = 14 => "no-process-control",
    NO_NETWORK            = 15 => "no-network",
    NO_FILESYSTEM         = 16 => "no-filesystem",
    NO_DATABASE           = 17 => "no-database",
    NO_GUI                = 18 => "no-gui",
    NO_TERMINAL_IO        = 19 => "no-terminal-io",
}

impl ParseOptions {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn all() -> Self {
        Self::NAMES.iter().fold(Self::empty(), |acc, (_, bit)| acc.union(*bit))
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Every bit set in `self` but not in `other`.
    #[must_use]
    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Parses a recognized bit name, e.g. `"no-global-vars"`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the unrecognized token.
    pub fn parse_name(name: &str) -> anyhow::Result<Self> {
        Self::NAMES
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, bit)| *bit)
            .ok_or_else(|| anyhow::anyhow!("unrecognized parse option '{name}'"))
    }

    /// Parses a `;`-separated list of names into a single set, e.g. the same
    /// spec string shape the teacher's `LoggerConfig::from_spec` accepts for
    /// its own `;`-joined key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unrecognized token.
    pub fn from_spec(spec: &str) -> anyhow::Result<Self> {
        let mut options = Self::empty();
        for name in spec.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            options.insert(Self::parse_name(name)?);
        }
        Ok(options)
    }

    /// The recognized names currently set, in declaration order.
    pub fn iter_names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES.iter().filter(move |(_, bit)| self.contains(*bit)).map(|(name, _)| *name)
    }

    /// Computes a child program's effective option set.
    ///
    /// A child cannot relax any bit its parent set: the result always
    /// contains every one of `self`'s bits, plus whatever `requested` adds,
    /// unless `self` has [`ParseOptions::NO_CHILD_RESTRICTIONS`] set, in
    /// which case `requested` is used verbatim.
    #[must_use]
    pub fn child(self, requested: Self) -> Self {
        if self.contains(Self::NO_CHILD_RESTRICTIONS) {
            requested
        } else {
            self.union(requested)
        }
    }
}

impl fmt::Display for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in self.iter_names() {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_spec_round_trips_through_display() {
        let options = ParseOptions::from_spec("no-network;no-filesystem").unwrap();
        assert!(options.contains(ParseOptions::NO_NETWORK));
        assert!(options.contains(ParseOptions::NO_FILESYSTEM));
        assert!(!options.contains(ParseOptions::NO_GUI));
        assert_eq!(options.to_string(), "no-network;no-filesystem");
    }

    #[test]
    fn test_from_spec_rejects_unknown_name() {
        assert!(ParseOptions::from_spec("no-such-thing").is_err());
    }

    #[test]
    fn test_child_inherits_parent_restrictions() {
        let parent = ParseOptions::NO_NEW;
        let child = parent.child(ParseOptions::NO_NETWORK);
        assert!(child.contains(ParseOptions::NO_NEW));
        assert!(child.contains(ParseOptions::NO_NETWORK));
    }

    #[test]
    fn test_child_can_relax_when_parent_allows_it() {
        let parent = ParseOptions::NO_NEW.union(ParseOptions::NO_CHILD_RESTRICTIONS);
        let child = parent.child(ParseOptions::NO_NETWORK);
        assert!(!child.contains(ParseOptions::NO_NEW));
        assert!(child.contains(ParseOptions::NO_NETWORK));
    }

    #[test]
    fn test_all_covers_every_named_bit() {
        let all = ParseOptions::all();
        for (_, bit) in ParseOptions::NAMES {
            assert!(all.contains(*bit));
        }
    }
}
