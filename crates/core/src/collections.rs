// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Abstraction layer over common map-like containers.

use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::Hash,
};

/// Represents a generic map-like container with keys and values.
///
/// `vellum-value`'s `QHash` is backed by `indexmap::IndexMap` specifically
/// because iteration order must equal insertion order; this trait lets code
/// that only needs presence/emptiness checks stay agnostic over which
/// concrete map type it was handed.
pub trait MapLike {
    type Key: Hash + Eq + Display + Clone;
    type Value: Debug;

    fn contains_key(&self, key: &Self::Key) -> bool;
    fn is_empty(&self) -> bool;
}

impl<K, V, S> MapLike for HashMap<K, V, S>
where
    K: Eq + Hash + Display + Clone,
    V: Debug,
    S: std::hash::BuildHasher,
{
    type Key = K;
    type Value = V;

    #[inline]
    fn contains_key(&self, k: &K) -> bool {
        self.contains_key(k)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> MapLike for indexmap::IndexMap<K, V, S>
where
    K: Eq + Hash + Display + Clone,
    V: Debug,
    S: std::hash::BuildHasher,
{
    type Key = K;
    type Value = V;

    #[inline]
    fn contains_key(&self, k: &K) -> bool {
        self.get(k).is_some()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    #[test]
    fn test_maplike_over_indexmap() {
        let mut m: IndexMap<String, i32> = IndexMap::new();
        assert!(m.is_empty());
        m.insert("a".to_string(), 1);
        assert!(MapLike::contains_key(&m, &"a".to_string()));
        assert!(!MapLike::is_empty(&m));
    }
}
