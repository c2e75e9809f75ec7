//! Property tests for the set semantics the reconcile filter depends on.
#![allow(clippy::unwrap_used)]

use poi_sentinel::{PoiHash, PoiSet, ReconcileAction, reconcile};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn hash(n: u8) -> PoiHash {
    PoiHash::parse(&format!("0x{}", hex::encode([n; 32]))).unwrap()
}

fn poi_set(ids: &BTreeSet<u8>) -> PoiSet {
    ids.iter().map(|n| hash(*n)).collect()
}

prop_compose! {
    fn arb_ids(min: usize)(ids in proptest::collection::btree_set(0u8..24, min..8)) -> BTreeSet<u8> {
        ids
    }
}

proptest! {
    /// Set equality is insertion-order independent.
    #[test]
    fn poi_set_equality_ignores_order(mut ids in proptest::collection::vec(0u8..24, 0..8)) {
        let forward: PoiSet = ids.iter().map(|n| hash(*n)).collect();
        ids.reverse();
        let backward: PoiSet = ids.iter().map(|n| hash(*n)).collect();
        prop_assert_eq!(forward, backward);
    }

    /// Notify, then the identical candidate again: always Suppress.
    #[test]
    fn reconcile_is_idempotent(ids in arb_ids(2)) {
        let candidate = poi_set(&ids);
        match reconcile(None, &candidate) {
            ReconcileAction::Notify(notified) => prop_assert_eq!(
                reconcile(Some(&notified), &candidate),
                ReconcileAction::Suppress
            ),
            other => prop_assert!(false, "first reconcile must notify, got {:?}", other),
        }
    }

    /// Any strict growth of a notified set reopens with the full new set,
    /// and reopening is itself idempotent.
    #[test]
    fn reconcile_reopens_on_strict_growth(
        prior_ids in arb_ids(2),
        extra in 24u8..48,
    ) {
        let prior = poi_set(&prior_ids);
        let mut grown_ids = prior_ids;
        grown_ids.insert(extra);
        let candidate = poi_set(&grown_ids);

        match reconcile(Some(&prior), &candidate) {
            ReconcileAction::Reopen(reopened) => {
                prop_assert_eq!(&reopened, &candidate);
                prop_assert_eq!(
                    reconcile(Some(&reopened), &candidate),
                    ReconcileAction::Suppress
                );
            },
            other => prop_assert!(false, "strict growth must reopen, got {:?}", other),
        }
    }

    /// Anything that is not first-notify or strict growth never notifies.
    #[test]
    fn reconcile_never_notifies_without_growth(
        prior_ids in arb_ids(2),
        candidate_ids in arb_ids(0),
    ) {
        let prior = poi_set(&prior_ids);
        let candidate = poi_set(&candidate_ids);
        let action = reconcile(Some(&prior), &candidate);

        if candidate.is_strict_superset(&prior) {
            prop_assert!(matches!(action, ReconcileAction::Reopen(_)));
        } else {
            prop_assert_eq!(action, ReconcileAction::Suppress);
        }
    }

    /// A strict superset is a superset with strictly more elements, and
    /// never symmetric.
    #[test]
    fn strict_superset_is_asymmetric(a in arb_ids(0), b in arb_ids(0)) {
        let set_a = poi_set(&a);
        let set_b = poi_set(&b);
        if set_a.is_strict_superset(&set_b) {
            prop_assert!(set_a.len() > set_b.len());
            prop_assert!(!set_b.is_strict_superset(&set_a));
        }
    }
}
