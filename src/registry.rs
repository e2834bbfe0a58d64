//! Participant registry: every participant ever discovered, and which of
//! them are currently active in this effect instance.
//!
//! Participants are appended in discovery order and never removed; one that
//! leaves the effect stays listed, marked inactive. The registry also owns
//! the derived active order (see [`crate::order`]), kept sorted at all
//! times so the turn pointer has a stable, globally agreed meaning.

use crate::order::{self, ActiveList};
use crate::Config;

/// A participant known to the session.
///
/// Created on discovery, retained for the lifetime of the session even
/// after leaving the effect.
pub struct Participant<T>
where
    T: Config,
{
    id: T::Id,
    active: bool,
}

// Manual impls: derives would bound `T` itself, but only `T::Id` is stored.

impl<T: Config> std::fmt::Debug for Participant<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self { id, active } = self;

        f.debug_struct("Participant")
            .field("id", id)
            .field("active", active)
            .finish()
    }
}

impl<T: Config> Clone for Participant<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            active: self.active,
        }
    }
}

impl<T: Config> PartialEq for Participant<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.active == other.active
    }
}

impl<T: Config> Eq for Participant<T> {}

impl<T: Config> Participant<T> {
    /// The participant's opaque id.
    #[must_use]
    pub fn id(&self) -> &T::Id {
        &self.id
    }

    /// Whether the participant is currently active in this effect instance
    /// (as opposed to merely present in the call).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Registry tracking all known participants and the sorted active subset.
pub struct ParticipantRegistry<T>
where
    T: Config,
{
    /// All participants in discovery order, including self. Never shrinks.
    participants: Vec<Participant<T>>,
    /// Ids of active participants, sorted ascending. The canonical turn order.
    active: ActiveList<T::Id>,
}

impl<T> std::fmt::Debug for ParticipantRegistry<T>
where
    T: Config,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            participants,
            active,
        } = self;

        f.debug_struct("ParticipantRegistry")
            .field("participants", participants)
            .field("active", active)
            .finish()
    }
}

impl<T: Config> ParticipantRegistry<T> {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            active: ActiveList::new(),
        }
    }

    /// Adds a participant in discovery order and returns their index.
    ///
    /// An already known id resolves to the existing entry; the registry
    /// never holds duplicates. New participants start inactive.
    pub fn add(&mut self, id: T::Id) -> usize {
        if let Some(index) = self.index_of(&id) {
            return index;
        }
        self.participants.push(Participant { id, active: false });
        self.participants.len() - 1
    }

    /// Returns the discovery-order index of `id`, if known.
    #[must_use]
    pub fn index_of(&self, id: &T::Id) -> Option<usize> {
        self.participants.iter().position(|p| &p.id == id)
    }

    /// Returns the participant at the given discovery-order index.
    #[must_use]
    pub fn participant(&self, index: usize) -> Option<&Participant<T>> {
        self.participants.get(index)
    }

    /// Number of participants ever discovered, including inactive ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns `true` if no participant has been discovered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Flips the activity flag of the participant at `index` and keeps the
    /// active order in sync.
    ///
    /// Returns the `(id, is_active)` change, or `None` for an unknown index
    /// or a no-op (flag already in the requested state).
    pub fn set_active(&mut self, index: usize, is_active: bool) -> Option<(T::Id, bool)> {
        let participant = self.participants.get_mut(index)?;
        if participant.active == is_active {
            return None;
        }
        participant.active = is_active;
        let id = participant.id.clone();
        if is_active {
            order::insert_active(&mut self.active, id.clone());
        } else {
            order::remove_active(&mut self.active, &id);
        }
        order::sort_active(&mut self.active);
        Some((id, is_active))
    }

    /// The canonical active order: active ids sorted ascending.
    #[must_use]
    pub fn active_ids(&self) -> &[T::Id] {
        &self.active
    }

    /// Number of active participants.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// The slot of `id` in the canonical active order, if active.
    #[must_use]
    pub fn active_position(&self, id: &T::Id) -> Option<usize> {
        order::position(&self.active, id)
    }

    /// Returns an iterator over all participants in discovery order.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter(&self) -> impl Iterator<Item = &Participant<T>> + '_ {
        self.participants.iter()
    }
}

impl<T: Config> Default for ParticipantRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
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
    use crate::Config;

    struct TestConfig;

    impl Config for TestConfig {
        type Id = &'static str;
    }

    type Registry = ParticipantRegistry<TestConfig>;

    #[test]
    fn registry_new_is_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.active_len(), 0);
    }

    #[test]
    fn add_assigns_discovery_order_indices() {
        let mut registry = Registry::new();
        assert_eq!(registry.add("carol"), 0);
        assert_eq!(registry.add("alice"), 1);
        assert_eq!(registry.len(), 2);
        // Discovery order, not id order.
        assert_eq!(*registry.participant(0).unwrap().id(), "carol");
        assert_eq!(*registry.participant(1).unwrap().id(), "alice");
    }

    #[test]
    fn add_known_id_returns_existing_index() {
        let mut registry = Registry::new();
        assert_eq!(registry.add("alice"), 0);
        assert_eq!(registry.add("alice"), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn new_participants_start_inactive() {
        let mut registry = Registry::new();
        let index = registry.add("alice");
        assert!(!registry.participant(index).unwrap().is_active());
        assert_eq!(registry.active_len(), 0);
    }

    #[test]
    fn set_active_maintains_sorted_active_order() {
        let mut registry = Registry::new();
        let carol = registry.add("carol");
        let alice = registry.add("alice");
        let bob = registry.add("bob");

        registry.set_active(carol, true);
        registry.set_active(alice, true);
        registry.set_active(bob, true);

        assert_eq!(registry.active_ids(), &["alice", "bob", "carol"]);
    }

    #[test]
    fn set_active_returns_the_change() {
        let mut registry = Registry::new();
        let index = registry.add("alice");
        assert_eq!(registry.set_active(index, true), Some(("alice", true)));
        assert_eq!(registry.set_active(index, false), Some(("alice", false)));
    }

    #[test]
    fn set_active_is_a_noop_when_flag_unchanged() {
        let mut registry = Registry::new();
        let index = registry.add("alice");
        registry.set_active(index, true);
        assert_eq!(registry.set_active(index, true), None);
        assert_eq!(registry.active_len(), 1);
    }

    #[test]
    fn set_active_unknown_index_returns_none() {
        let mut registry = Registry::new();
        assert_eq!(registry.set_active(5, true), None);
    }

    #[test]
    fn leaving_participant_stays_in_registry() {
        let mut registry = Registry::new();
        let index = registry.add("alice");
        registry.set_active(index, true);
        registry.set_active(index, false);

        // Gone from the active order, retained in the full list.
        assert_eq!(registry.active_len(), 0);
        assert_eq!(registry.len(), 1);
        assert!(!registry.participant(index).unwrap().is_active());
    }

    #[test]
    fn active_position_reports_canonical_slot() {
        let mut registry = Registry::new();
        for id in ["carol", "alice", "bob"] {
            let index = registry.add(id);
            registry.set_active(index, true);
        }
        assert_eq!(registry.active_position(&"alice"), Some(0));
        assert_eq!(registry.active_position(&"bob"), Some(1));
        assert_eq!(registry.active_position(&"carol"), Some(2));
        assert_eq!(registry.active_position(&"mallory"), None);
    }

    #[test]
    fn iter_walks_discovery_order() {
        let mut registry = Registry::new();
        registry.add("carol");
        registry.add("alice");
        let ids: Vec<_> = registry.iter().map(|p| *p.id()).collect();
        assert_eq!(ids, vec!["carol", "alice"]);
    }

    #[test]
    fn debug_format_includes_fields() {
        let mut registry = Registry::new();
        registry.add("alice");
        let debug = format!("{:?}", registry);
        assert!(debug.contains("ParticipantRegistry"));
        assert!(debug.contains("alice"));
    }
}
