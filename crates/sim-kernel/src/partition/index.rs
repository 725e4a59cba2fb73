//! The materialized index backing one partition: for every entity currently
//! satisfying the filter, its label tuple and its slot in the per-tuple cell.
//!
//! Cells use swap-remove with position bookkeeping so insertion, removal,
//! and relabeling are O(1), and mutation never iterates a structure it is
//! mutating. Cells live in an ordered map so sampling walks them in a
//! reproducible order.

use std::collections::{BTreeMap, HashMap};

use contracts::{LabelSet, PersonId};

struct MemberSlot {
    labels: LabelSet,
    position: usize,
}

#[derive(Default)]
pub(crate) struct PartitionIndex {
    members: HashMap<PersonId, MemberSlot>,
    cells: BTreeMap<LabelSet, Vec<PersonId>>,
}

impl PartitionIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn contains(&self, person: PersonId) -> bool {
        self.members.contains_key(&person)
    }

    pub(crate) fn labels_of(&self, person: PersonId) -> Option<&LabelSet> {
        self.members.get(&person).map(|slot| &slot.labels)
    }

    /// The cell holding `person` and its position in that cell.
    pub(crate) fn position_of(&self, person: PersonId) -> Option<(&LabelSet, usize)> {
        self.members
            .get(&person)
            .map(|slot| (&slot.labels, slot.position))
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = (&LabelSet, &Vec<PersonId>)> {
        self.cells.iter()
    }

    /// Insert an absent member. Inserting a present member is a logic error
    /// upstream; the index treats it as a relabel to stay consistent.
    pub(crate) fn insert(&mut self, person: PersonId, labels: LabelSet) {
        if self.members.contains_key(&person) {
            self.update(person, labels);
            return;
        }
        let cell = self.cells.entry(labels.clone()).or_default();
        cell.push(person);
        self.members.insert(
            person,
            MemberSlot {
                labels,
                position: cell.len() - 1,
            },
        );
    }

    /// Remove a member if present. Returns whether anything was removed.
    pub(crate) fn remove(&mut self, person: PersonId) -> bool {
        let Some(slot) = self.members.remove(&person) else {
            return false;
        };
        if let Some(cell) = self.cells.get_mut(&slot.labels) {
            cell.swap_remove(slot.position);
            if slot.position < cell.len() {
                let moved = cell[slot.position];
                if let Some(moved_slot) = self.members.get_mut(&moved) {
                    moved_slot.position = slot.position;
                }
            }
            if cell.is_empty() {
                self.cells.remove(&slot.labels);
            }
        }
        true
    }

    /// Re-label a member, moving it between cells when the tuple changed.
    pub(crate) fn update(&mut self, person: PersonId, labels: LabelSet) {
        if self.labels_of(person) == Some(&labels) {
            return;
        }
        self.remove(person);
        self.insert(person, labels);
    }
}
