//! The active-order resolver: the canonical ordering of active participants.
//!
//! Every device derives the turn order independently, so the ordering must
//! be deterministic and identical everywhere given the same active set. The
//! rule is simple: active participants sorted ascending by id. The
//! comparator is `Ord::cmp`, a strict total order in which equal ids compare
//! `Equal`, never an unspecified result.

use smallvec::SmallVec;
use std::cmp::Ordering;

/// The sorted sequence of active participant ids.
///
/// Inline capacity of 4 covers the typical AR call without heap allocation.
pub type ActiveList<I> = SmallVec<[I; 4]>;

/// Compares two participant ids for turn-order purposes.
///
/// This is `Ord::cmp`, spelled out as the single place the ordering rule
/// lives: ascending by id, equal ids compare `Equal`.
#[inline]
#[must_use]
pub fn cmp_ids<I: Ord>(a: &I, b: &I) -> Ordering {
    a.cmp(b)
}

/// Sorts an active list into canonical order.
///
/// Stable sort by [`cmp_ids`]; a no-op on already sorted input.
pub fn sort_active<I: Ord>(list: &mut ActiveList<I>) {
    list.sort_by(cmp_ids);
}

/// Inserts `id` at its sorted position if absent. Returns `true` if the
/// list changed.
pub fn insert_active<I: Ord>(list: &mut ActiveList<I>, id: I) -> bool {
    match list.binary_search_by(|probe| cmp_ids(probe, &id)) {
        Ok(_) => false,
        Err(slot) => {
            list.insert(slot, id);
            true
        }
    }
}

/// Removes `id` if present. Returns `true` if the list changed.
pub fn remove_active<I: Ord>(list: &mut ActiveList<I>, id: &I) -> bool {
    match list.binary_search_by(|probe| cmp_ids(probe, id)) {
        Ok(slot) => {
            list.remove(slot);
            true
        }
        Err(_) => false,
    }
}

/// Returns the slot of `id` in the canonical order, if active.
#[must_use]
pub fn position<I: Ord>(list: &ActiveList<I>, id: &I) -> Option<usize> {
    list.binary_search_by(|probe| cmp_ids(probe, id)).ok()
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn list(ids: &[&str]) -> ActiveList<String> {
        ids.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn cmp_ids_is_a_total_order() {
        assert_eq!(cmp_ids(&"a", &"b"), Ordering::Less);
        assert_eq!(cmp_ids(&"b", &"a"), Ordering::Greater);
        // Equal ids compare Equal, never an unspecified result.
        assert_eq!(cmp_ids(&"a", &"a"), Ordering::Equal);
    }

    #[test]
    fn sort_active_orders_ascending() {
        let mut participants = list(&["carol", "alice", "bob"]);
        sort_active(&mut participants);
        assert_eq!(participants.as_slice(), list(&["alice", "bob", "carol"]).as_slice());
    }

    #[test]
    fn insert_active_keeps_order_and_rejects_duplicates() {
        let mut participants = list(&["alice", "carol"]);
        assert!(insert_active(&mut participants, "bob".to_owned()));
        assert_eq!(
            participants.as_slice(),
            list(&["alice", "bob", "carol"]).as_slice()
        );
        assert!(!insert_active(&mut participants, "bob".to_owned()));
        assert_eq!(participants.len(), 3);
    }

    #[test]
    fn remove_active_only_removes_present_ids() {
        let mut participants = list(&["alice", "bob"]);
        assert!(remove_active(&mut participants, &"alice".to_owned()));
        assert!(!remove_active(&mut participants, &"alice".to_owned()));
        assert_eq!(participants.as_slice(), list(&["bob"]).as_slice());
    }

    #[test]
    fn position_finds_the_canonical_slot() {
        let participants = list(&["alice", "bob", "carol"]);
        assert_eq!(position(&participants, &"alice".to_owned()), Some(0));
        assert_eq!(position(&participants, &"carol".to_owned()), Some(2));
        assert_eq!(position(&participants, &"mallory".to_owned()), None);
    }

    proptest! {
        /// Any interleaving of inserts and removes leaves the list sorted
        /// and free of duplicates.
        #[test]
        fn active_list_stays_sorted_and_deduped(ops in prop::collection::vec((any::<u8>(), any::<bool>()), 0..64)) {
            let mut participants: ActiveList<u8> = ActiveList::new();
            for (id, join) in ops {
                if join {
                    insert_active(&mut participants, id);
                } else {
                    remove_active(&mut participants, &id);
                }
                prop_assert!(participants.windows(2).all(|w| w[0] < w[1]));
            }
        }

        /// Sorting is deterministic: the same active set yields the same
        /// order regardless of arrival order.
        #[test]
        fn order_is_arrival_independent(mut ids in prop::collection::vec(any::<u16>(), 0..16)) {
            let mut forward: ActiveList<u16> = ActiveList::new();
            for id in &ids {
                insert_active(&mut forward, *id);
            }
            ids.reverse();
            let mut backward: ActiveList<u16> = ActiveList::new();
            for id in &ids {
                insert_active(&mut backward, *id);
            }
            prop_assert_eq!(forward, backward);
        }
    }
}
