//! Grouping and detection engine.
//!
//! A pure function of `(submission snapshot, reuse index)`: it partitions
//! submissions by `(deployment, block)`, computes discrepancy and reuse
//! candidates, and returns the reuse index registrations to apply; it
//! never mutates durable state itself.
//!
//! Scoping invariant: a submission belongs to exactly one group, and groups
//! are never compared across `(deployment, block)` keys. Block heights are
//! only ever compared within one deployment, which is what makes analysis
//! across networks with wildly different heights safe.

mod reconcile;

pub use reconcile::{ReconcileAction, reconcile};

use crate::Result;
use crate::models::{
    DeploymentId, Discrepancy, IndexerId, PoiHash, PoiSet, Reuse, ReuseIndexEntry, Submission,
};
use crate::storage::ReuseIndex;
use std::collections::{BTreeMap, BTreeSet};

/// The submissions sharing one `(deployment, block)` key.
#[derive(Debug, Clone)]
pub struct DeploymentBlockGroup {
    /// The deployment all members belong to.
    pub deployment: DeploymentId,
    /// The block height all members share.
    pub block_number: u64,
    /// Members, in feed arrival order.
    pub submissions: Vec<Submission>,
}

impl DeploymentBlockGroup {
    /// Distinct hashes at this key, with the indexers that submitted each.
    #[must_use]
    pub fn submitters_by_hash(&self) -> BTreeMap<PoiHash, BTreeSet<IndexerId>> {
        let mut map: BTreeMap<PoiHash, BTreeSet<IndexerId>> = BTreeMap::new();
        for submission in &self.submissions {
            map.entry(submission.poi.clone())
                .or_default()
                .insert(submission.indexer.clone());
        }
        map
    }

    /// Distinct hashes at this key as a comparable set.
    #[must_use]
    pub fn poi_set(&self) -> PoiSet {
        self.submissions.iter().map(|s| s.poi.clone()).collect()
    }

    /// Earliest observation of `hash` at this key.
    ///
    /// Ties on `observed_at` resolve to feed arrival order (stable), which
    /// is also the tie-break used when registering a first-seen origin.
    #[must_use]
    pub fn first_observation(&self, hash: &PoiHash) -> Option<&Submission> {
        self.submissions
            .iter()
            .filter(|s| &s.poi == hash)
            .min_by_key(|s| s.observed_at)
    }
}

/// Selects, per deployment, the submissions at its latest observed block
/// height.
///
/// Only the freshest snapshot per deployment is analyzed each cycle; this
/// is the bounded-staleness policy, not an oversight. Detection latency is
/// therefore governed by the polling interval (see
/// [`MonitorConfig::poll_interval`](crate::config::MonitorConfig)).
///
/// Groups come back ordered by deployment id; submissions keep their feed
/// arrival order within each group.
#[must_use]
pub fn latest_height_groups(submissions: Vec<Submission>) -> Vec<DeploymentBlockGroup> {
    let mut groups: BTreeMap<DeploymentId, DeploymentBlockGroup> = BTreeMap::new();

    for submission in submissions {
        match groups.get_mut(&submission.deployment) {
            None => {
                groups.insert(
                    submission.deployment.clone(),
                    DeploymentBlockGroup {
                        deployment: submission.deployment.clone(),
                        block_number: submission.block_number,
                        submissions: vec![submission],
                    },
                );
            },
            Some(group) => {
                if submission.block_number > group.block_number {
                    // A newer height supersedes everything gathered so far.
                    group.block_number = submission.block_number;
                    group.submissions.clear();
                    group.submissions.push(submission);
                } else if submission.block_number == group.block_number {
                    group.submissions.push(submission);
                }
                // Older heights are outside the snapshot policy.
            },
        }
    }

    groups.into_values().collect()
}

/// Everything the engine concluded about one group.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Discrepancy candidate, when ≥2 distinct hashes were submitted.
    pub discrepancy: Option<Discrepancy>,
    /// Reuse candidates: hashes whose first-seen origin is a different key.
    pub reuses: Vec<Reuse>,
    /// Origins to register for hashes never seen before.
    ///
    /// Returned rather than applied: the caller registers them only after
    /// the cycle's candidates have been computed from a consistent
    /// snapshot (read-then-decide, not interleaved).
    pub registrations: Vec<(PoiHash, ReuseIndexEntry)>,
}

/// Runs discrepancy and reuse detection for one group.
///
/// Every distinct hash is checked against the reuse index regardless of
/// whether a discrepancy was found; a group with a single submitter cannot
/// produce a discrepancy but is still checked for reuse. A hash re-observed
/// at its own origin key is not reuse, which requires a differing key.
///
/// # Errors
///
/// Returns [`Error::StoreUnavailable`](crate::Error::StoreUnavailable) if
/// the reuse index cannot be read; the caller must then skip this group for
/// the cycle rather than proceed on partial state.
pub fn detect(group: &DeploymentBlockGroup, index: &dyn ReuseIndex) -> Result<DetectionOutcome> {
    let submitters = group.submitters_by_hash();

    let discrepancy = if submitters.len() >= 2 {
        Some(Discrepancy {
            deployment: group.deployment.clone(),
            block_number: group.block_number,
            submitters: submitters.clone(),
        })
    } else {
        None
    };

    let mut reuses = Vec::new();
    let mut registrations = Vec::new();

    for hash in submitters.keys() {
        let Some(current) = group.first_observation(hash) else {
            continue; // submitters_by_hash only yields present hashes
        };

        match index.lookup(hash)? {
            Some(origin) => {
                let same_key = origin.deployment == group.deployment
                    && origin.block_number == group.block_number;
                if !same_key {
                    reuses.push(Reuse {
                        poi: hash.clone(),
                        deployment: group.deployment.clone(),
                        block_number: group.block_number,
                        indexer: current.indexer.clone(),
                        observed_at: current.observed_at,
                        origin,
                    });
                }
            },
            None => {
                registrations.push((
                    hash.clone(),
                    ReuseIndexEntry {
                        deployment: group.deployment.clone(),
                        block_number: group.block_number,
                        indexer: current.indexer.clone(),
                        observed_at: current.observed_at,
                    },
                ));
            },
        }
    }

    Ok(DetectionOutcome {
        discrepancy,
        reuses,
        registrations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStateStore;
    use chrono::{TimeZone, Utc};

    fn hash(n: u8) -> PoiHash {
        PoiHash::parse(&format!("0x{}", hex::encode([n; 32]))).unwrap()
    }

    fn submission(deployment: &str, block: u64, poi: u8, indexer: &str, minute: u32) -> Submission {
        Submission {
            deployment: DeploymentId::from(deployment),
            block_number: block,
            poi: hash(poi),
            indexer: IndexerId::from(indexer),
            observed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_latest_height_selection_per_deployment() {
        let groups = latest_height_groups(vec![
            submission("QmA", 100, 1, "0xaa", 0),
            submission("QmA", 90, 2, "0xbb", 1),
            submission("QmA", 100, 3, "0xcc", 2),
            submission("QmB", 7, 4, "0xaa", 3),
        ]);

        assert_eq!(groups.len(), 2);
        let a = groups.iter().find(|g| g.deployment.as_str() == "QmA").unwrap();
        assert_eq!(a.block_number, 100);
        assert_eq!(a.submissions.len(), 2);
        let b = groups.iter().find(|g| g.deployment.as_str() == "QmB").unwrap();
        assert_eq!(b.block_number, 7);
    }

    #[test]
    fn test_heights_never_compared_across_deployments() {
        // Two deployments with heights differing by orders of magnitude:
        // each keeps its own latest height, the larger never shadows the
        // smaller.
        let groups = latest_height_groups(vec![
            submission("QmMainnet", 15_000_000, 1, "0xaa", 0),
            submission("QmSidechain", 5_000_000, 2, "0xbb", 1),
        ]);

        assert_eq!(groups.len(), 2);
        let side = groups
            .iter()
            .find(|g| g.deployment.as_str() == "QmSidechain")
            .unwrap();
        assert_eq!(side.block_number, 5_000_000);
    }

    #[test]
    fn test_two_hashes_produce_discrepancy_with_submitter_sets() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let groups = latest_height_groups(vec![
            submission("QmA", 100, 1, "0xaa", 0),
            submission("QmA", 100, 1, "0xbb", 1),
            submission("QmA", 100, 2, "0xcc", 2),
        ]);

        let outcome = detect(&groups[0], &store).unwrap();
        let discrepancy = outcome.discrepancy.unwrap();
        assert_eq!(discrepancy.poi_set(), [hash(1), hash(2)].into_iter().collect());
        assert_eq!(
            discrepancy.submitters[&hash(1)],
            BTreeSet::from([IndexerId::from("0xaa"), IndexerId::from("0xbb")])
        );
        assert_eq!(
            discrepancy.submitters[&hash(2)],
            BTreeSet::from([IndexerId::from("0xcc")])
        );
    }

    #[test]
    fn test_single_hash_never_discrepancy() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let groups = latest_height_groups(vec![
            submission("QmA", 100, 1, "0xaa", 0),
            submission("QmA", 100, 1, "0xbb", 1),
            submission("QmA", 100, 1, "0xcc", 2),
        ]);

        let outcome = detect(&groups[0], &store).unwrap();
        assert!(outcome.discrepancy.is_none());
        // The hash still gets registered for future reuse detection.
        assert_eq!(outcome.registrations.len(), 1);
    }

    #[test]
    fn test_unknown_hashes_register_with_earliest_observation() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let groups = latest_height_groups(vec![
            submission("QmA", 100, 1, "0xbb", 5),
            submission("QmA", 100, 1, "0xaa", 2),
        ]);

        let outcome = detect(&groups[0], &store).unwrap();
        let (_, origin) = &outcome.registrations[0];
        // 0xaa observed earlier, so it is the canonical origin indexer.
        assert_eq!(origin.indexer, IndexerId::from("0xaa"));
    }

    #[test]
    fn test_reuse_detected_across_keys_only() {
        let store = SqliteStateStore::open_in_memory().unwrap();

        // Seed the index: hash(1) first seen at (QmA, 100).
        let seed = latest_height_groups(vec![submission("QmA", 100, 1, "0xaa", 0)]);
        let outcome = detect(&seed[0], &store).unwrap();
        for (poi, origin) in &outcome.registrations {
            store.register_if_absent(poi, origin).unwrap();
        }

        // Same hash, same key: not reuse.
        let same = detect(&seed[0], &store).unwrap();
        assert!(same.reuses.is_empty());

        // Same hash at a different deployment/block: reuse, origin intact.
        let other = latest_height_groups(vec![submission("QmB", 5_000, 1, "0xdd", 9)]);
        let outcome = detect(&other[0], &store).unwrap();
        assert_eq!(outcome.reuses.len(), 1);
        let reuse = &outcome.reuses[0];
        assert_eq!(reuse.origin.deployment, DeploymentId::from("QmA"));
        assert_eq!(reuse.origin.block_number, 100);
        assert_eq!(reuse.deployment, DeploymentId::from("QmB"));
    }

    #[test]
    fn test_reuse_reported_even_without_discrepancy() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let seed = latest_height_groups(vec![submission("QmA", 100, 1, "0xaa", 0)]);
        for (poi, origin) in &detect(&seed[0], &store).unwrap().registrations {
            store.register_if_absent(poi, origin).unwrap();
        }

        // Single submitter at the new key: no discrepancy, reuse still found.
        let other = latest_height_groups(vec![submission("QmB", 5_000, 1, "0xdd", 9)]);
        let outcome = detect(&other[0], &store).unwrap();
        assert!(outcome.discrepancy.is_none());
        assert_eq!(outcome.reuses.len(), 1);
    }
}
