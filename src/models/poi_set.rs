//! Set of POI hashes with defined equality and subset comparisons.

use super::PoiHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An ordered-irrelevant set of POI hashes.
///
/// This is the value persisted per `(deployment, block)` in the notification
/// state store. Insertion order is irrelevant; membership is what matters.
/// Equality and strict-superset are the two comparisons the reconcile filter
/// is contracted on, so they are defined here rather than left to raw list
/// semantics.
///
/// Serializes as a sorted JSON array, which keeps the persisted column
/// comparable across writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoiSet(BTreeSet<PoiHash>);

impl PoiSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Number of distinct hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set holds no hashes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Membership test.
    #[must_use]
    pub fn contains(&self, hash: &PoiHash) -> bool {
        self.0.contains(hash)
    }

    /// Adds a hash. Returns `true` if it was not already present.
    pub fn insert(&mut self, hash: PoiHash) -> bool {
        self.0.insert(hash)
    }

    /// True when every element of `other` is in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        self.0.is_superset(&other.0)
    }

    /// True when `self` contains every element of `other` plus at least one
    /// more.
    #[must_use]
    pub fn is_strict_superset(&self, other: &Self) -> bool {
        self.0.len() > other.0.len() && self.0.is_superset(&other.0)
    }

    /// Iterates hashes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &PoiHash> {
        self.0.iter()
    }
}

impl FromIterator<PoiHash> for PoiSet {
    fn from_iter<I: IntoIterator<Item = PoiHash>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PoiSet {
    type Item = &'a PoiHash;
    type IntoIter = std::collections::btree_set::Iter<'a, PoiHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for PoiSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, hash) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{hash}")?;
        }
        write!(f, "}}")
    }
}
