//! Idempotence filter over notification candidates.
//!
//! Converts a discrepancy candidate into an action by comparing it against
//! the durably recorded last-notified set for the same key. The comparison
//! is pure and driven entirely by state passed in, so it behaves
//! identically whether the process has been running for weeks or restarted
//! a second ago.

use crate::models::PoiSet;

/// What to do with a discrepancy candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing new to say; do not notify.
    Suppress,
    /// First notification for this key; send the full set.
    Notify(PoiSet),
    /// The dispute grew (e.g. a third indexer joined); re-send with the
    /// full updated picture.
    Reopen(PoiSet),
}

/// Decides whether a candidate warrants a notification.
///
/// Rules, in order:
///
/// 1. No prior record: notify iff the candidate signals a discrepancy
///    (≥2 distinct hashes).
/// 2. Candidate equals the prior set (set equality, order-irrelevant):
///    suppress: already notified, nothing changed.
/// 3. Candidate is a strict superset of the prior set: reopen with the
///    enlarged set.
/// 4. Anything else means the data did not grow monotonically (submissions
///    are append-only per block, so this should not normally occur):
///    suppress and log a data-consistency warning, never escalate.
#[must_use]
pub fn reconcile(prior: Option<&PoiSet>, candidate: &PoiSet) -> ReconcileAction {
    match prior {
        None => {
            if candidate.len() >= 2 {
                ReconcileAction::Notify(candidate.clone())
            } else {
                ReconcileAction::Suppress
            }
        },
        Some(prior) => {
            if candidate == prior {
                ReconcileAction::Suppress
            } else if candidate.is_strict_superset(prior) {
                ReconcileAction::Reopen(candidate.clone())
            } else {
                tracing::warn!(
                    prior = %prior,
                    candidate = %candidate,
                    "Notified POI set did not grow monotonically; suppressing"
                );
                metrics::counter!("poi_set_shrinkage_anomalies_total").increment(1);
                ReconcileAction::Suppress
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PoiHash;
    use test_case::test_case;

    fn set(hashes: &[u8]) -> PoiSet {
        hashes
            .iter()
            .map(|n| PoiHash::parse(&format!("0x{}", hex::encode([*n; 32]))).unwrap())
            .collect()
    }

    #[test]
    fn test_first_sighting_notifies_full_set() {
        let candidate = set(&[1, 2]);
        assert_eq!(
            reconcile(None, &candidate),
            ReconcileAction::Notify(candidate.clone())
        );
    }

    #[test]
    fn test_single_hash_without_prior_suppresses() {
        assert_eq!(reconcile(None, &set(&[1])), ReconcileAction::Suppress);
        assert_eq!(reconcile(None, &set(&[])), ReconcileAction::Suppress);
    }

    #[test]
    fn test_identical_candidate_suppresses() {
        let prior = set(&[1, 2]);
        assert_eq!(reconcile(Some(&prior), &set(&[2, 1])), ReconcileAction::Suppress);
    }

    #[test]
    fn test_growth_reopens_with_full_set() {
        let prior = set(&[1, 2]);
        let candidate = set(&[1, 2, 3]);
        assert_eq!(
            reconcile(Some(&prior), &candidate),
            ReconcileAction::Reopen(candidate.clone())
        );
    }

    #[test]
    fn test_idempotence_notify_then_suppress() {
        let candidate = set(&[1, 2]);
        let action = reconcile(None, &candidate);
        let ReconcileAction::Notify(notified) = action else {
            panic!("expected Notify, got {action:?}");
        };
        // The notified set becomes the prior for the next cycle.
        assert_eq!(
            reconcile(Some(&notified), &candidate),
            ReconcileAction::Suppress
        );
    }

    // Shrinkage and divergence are anomalies: suppressed, never reopened.
    #[test_case(&[1, 2, 3], &[1, 2]; "strict subset")]
    #[test_case(&[1, 2], &[1]; "single survivor")]
    #[test_case(&[1, 2], &[3, 4]; "disjoint")]
    #[test_case(&[1, 2], &[2, 3]; "overlap without superset")]
    fn test_non_monotonic_candidate_suppresses(prior: &[u8], candidate: &[u8]) {
        assert_eq!(
            reconcile(Some(&set(prior)), &set(candidate)),
            ReconcileAction::Suppress
        );
    }
}
