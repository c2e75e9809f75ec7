//! Detected issues: discrepancies and reuse.

use super::{DeploymentId, IndexerId, PoiHash, PoiSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// First-seen origin of a POI hash, as recorded in the reuse index.
///
/// Append-only: created on first observation of a hash anywhere in the
/// system and never overwritten. "First seen wins" is the canonical origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReuseIndexEntry {
    /// Deployment the hash was first observed for.
    pub deployment: DeploymentId,
    /// Block height of the first observation.
    pub block_number: u64,
    /// Indexer that first submitted it.
    pub indexer: IndexerId,
    /// Timestamp of the first observation.
    pub observed_at: DateTime<Utc>,
}

/// Indexers disagree on the POI for one deployment/block key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// The deployment under dispute.
    pub deployment: DeploymentId,
    /// The block height under dispute.
    pub block_number: u64,
    /// Every distinct hash at this key, with the indexers that submitted it.
    pub submitters: BTreeMap<PoiHash, BTreeSet<IndexerId>>,
}

impl Discrepancy {
    /// The distinct hashes in dispute, as a comparable set.
    #[must_use]
    pub fn poi_set(&self) -> PoiSet {
        self.submitters.keys().cloned().collect()
    }
}

/// An identical POI hash observed for a different deployment/block pair
/// than its first-seen origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reuse {
    /// The reused hash.
    pub poi: PoiHash,
    /// Deployment of the current observation.
    pub deployment: DeploymentId,
    /// Block height of the current observation.
    pub block_number: u64,
    /// Indexer of the current observation.
    pub indexer: IndexerId,
    /// When the current observation was made.
    pub observed_at: DateTime<Utc>,
    /// The canonical first-seen origin.
    pub origin: ReuseIndexEntry,
}

impl Reuse {
    /// Whole days elapsed between the origin observation and this one.
    ///
    /// Clamped at zero if clocks disagree.
    #[must_use]
    pub fn days_since_origin(&self) -> i64 {
        (self.observed_at - self.origin.observed_at).num_days().max(0)
    }
}

/// A detected issue, either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// Indexer disagreement at one deployment/block key.
    Discrepancy(Discrepancy),
    /// Cross-key reuse of a hash.
    Reuse(Reuse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hash(n: u8) -> PoiHash {
        PoiHash::parse(&format!("0x{}", hex::encode([n; 32]))).unwrap()
    }

    #[test]
    fn test_discrepancy_poi_set() {
        let mut submitters = BTreeMap::new();
        submitters.insert(hash(1), BTreeSet::from([IndexerId::from("0xaa")]));
        submitters.insert(
            hash(2),
            BTreeSet::from([IndexerId::from("0xbb"), IndexerId::from("0xcc")]),
        );
        let d = Discrepancy {
            deployment: DeploymentId::from("QmDeployment"),
            block_number: 100,
            submitters,
        };
        let expected: PoiSet = [hash(1), hash(2)].into_iter().collect();
        assert_eq!(d.poi_set(), expected);
    }

    #[test]
    fn test_days_since_origin() {
        let origin_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let seen_at = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let reuse = Reuse {
            poi: hash(7),
            deployment: DeploymentId::from("QmB"),
            block_number: 5_000,
            indexer: IndexerId::from("0xdd"),
            observed_at: seen_at,
            origin: ReuseIndexEntry {
                deployment: DeploymentId::from("QmA"),
                block_number: 100,
                indexer: IndexerId::from("0xaa"),
                observed_at: origin_at,
            },
        };
        assert_eq!(reuse.days_since_origin(), 14);
    }

    #[test]
    fn test_days_since_origin_clamps_clock_skew() {
        let origin_at = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let seen_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let reuse = Reuse {
            poi: hash(7),
            deployment: DeploymentId::from("QmB"),
            block_number: 5_000,
            indexer: IndexerId::from("0xdd"),
            observed_at: seen_at,
            origin: ReuseIndexEntry {
                deployment: DeploymentId::from("QmA"),
                block_number: 100,
                indexer: IndexerId::from("0xaa"),
                observed_at: origin_at,
            },
        };
        assert_eq!(reuse.days_since_origin(), 0);
    }
}
