//! Contract for the external entity store.
//!
//! The kernel does not own the population: some surrounding data manager
//! holds the people and their attributes. The core only requires that store
//! to answer the queries below and to announce lifecycle changes as the two
//! event types defined here, which the partition engine reserves for itself.

use contracts::PersonId;

use crate::registry::DataManager;

/// Read-only view of the live population, implemented by the external entity
/// store.
///
/// Contract: `people()` lists live entities in ascending id order, and
/// `person_by_index` addresses the same sequence positionally in O(1);
/// degenerate-partition sampling relies on that.
pub trait PopulationView: DataManager {
    fn person_exists(&self, person: PersonId) -> bool;

    fn people(&self) -> Vec<PersonId>;

    fn population(&self) -> usize;

    fn person_by_index(&self, index: usize) -> Option<PersonId>;
}

/// Announces an entity that was just added to the population. Published by
/// the store after the entity is queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonCreatedEvent {
    pub person: PersonId,
}

/// Announces an entity about to leave the population. Subscribers observing
/// this event can still see the entity's current partition memberships; the
/// indexes (and the store's own record) are purged at the tail of the same
/// time step, not during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonRemovalEvent {
    pub person: PersonId,
}
