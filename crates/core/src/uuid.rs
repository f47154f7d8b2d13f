// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! A `Uuid4` identifier, version 4 (RFC 4122), used to name threads, exceptions, and program
//! instances without coordination.

use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use uuid::Uuid;

/// A Universally Unique Identifier, version 4, based on a 128-bit random label.
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub struct Uuid4(Uuid);

impl Uuid4 {
    /// Creates a new random [`Uuid4`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the all-zero nil UUID, used as a sentinel "no id" value.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the nil UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Uuid4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Uuid4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for Uuid4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uuid4({})", self.0)
    }
}

impl FromStr for Uuid4 {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uuids_are_distinct() {
        assert_ne!(Uuid4::new(), Uuid4::new());
    }

    #[test]
    fn test_nil_is_nil() {
        assert!(Uuid4::nil().is_nil());
        assert!(!Uuid4::new().is_nil());
    }

    #[test]
    fn test_roundtrip_through_string() {
        let id = Uuid4::new();
        let parsed: Uuid4 = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
