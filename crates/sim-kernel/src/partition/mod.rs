//! Partition engine: live, incrementally maintained indexes over the entity
//! population, keyed by derived labels, with weighted random sampling.
//!
//! A partition is a `(filter, labelers)` pair registered under an opaque
//! key. The engine derives the union of event types the filter's and
//! labelers' sensitivities declare, subscribes once per type (shared across
//! partitions), and re-evaluates exactly the partitions and entities an
//! arriving event concerns. Membership changes only through those declared
//! triggers and the two reserved lifecycle events; no other path touches an
//! index, which is what keeps each index consistent with its filter.
//!
//! Removal is two-phased: on the imminent-removal announcement the entity
//! stays indexed, and a purge runs at the tail of the same time step (a plan
//! at the current time carrying the reserved last tiebreak key), so every
//! handler reacting to the removal still observes current memberships.

mod filter;
mod index;
mod labeler;
mod sampler;


pub use filter::{AndFilter, FnFilter, NotFilter, OrFilter, PartitionFilter, TriggerSensitivity};
pub use labeler::{FnLabeler, Labeler};
pub use sampler::PartitionSampler;

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use contracts::{LabelSet, OwnerId, PartitionKey, PersonId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::SimError;
use crate::event::SubscriptionId;
use crate::kernel::Kernel;
use crate::partition::index::PartitionIndex;
use crate::people::{PersonCreatedEvent, PersonRemovalEvent, PopulationView};
use crate::plan::TIEBREAK_LAST;
use crate::registry::DataManager;

/// Definition of one partition: an optional filter and zero or more
/// labelers. With neither, the partition is degenerate ("all live
/// entities") and the engine answers size and sampling queries straight
/// from the store without materializing anything.
#[derive(Default)]
pub struct PartitionSpec {
    pub(crate) filter: Option<Box<dyn PartitionFilter>>,
    pub(crate) labelers: Vec<Box<dyn Labeler>>,
}

impl PartitionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<F: PartitionFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_labeler<L: Labeler + 'static>(mut self, labeler: L) -> Self {
        self.labelers.push(Box::new(labeler));
        self
    }

    pub fn is_degenerate(&self) -> bool {
        self.filter.is_none() && self.labelers.is_empty()
    }

    pub(crate) fn dimensions(&self) -> usize {
        self.labelers.len()
    }

    /// Filter sensitivities first, then each labeler's, in registration
    /// order.
    pub(crate) fn sensitivities(&self) -> Vec<TriggerSensitivity> {
        let mut all = match &self.filter {
            Some(filter) => filter.sensitivities(),
            None => Vec::new(),
        };
        for labeler in &self.labelers {
            all.extend(labeler.sensitivities());
        }
        all
    }

    pub(crate) fn sensitivities_for(&self, event_type: TypeId) -> Vec<TriggerSensitivity> {
        self.sensitivities()
            .into_iter()
            .filter(|sensitivity| sensitivity.event_type == event_type)
            .collect()
    }
}

struct PartitionRecord {
    owner: OwnerId,
    spec: PartitionSpec,
    index: PartitionIndex,
}

struct TriggerChannel {
    subscription: SubscriptionId,
    keys: Vec<PartitionKey>,
}

/// Data manager maintaining every registered partition.
///
/// Constructed with [`PartitionEngine::with_source`], naming the data
/// manager type that implements [`PopulationView`]; the engine initializes
/// that store before itself and only ever reads it through the trait.
pub struct PartitionEngine {
    view: for<'a> fn(&'a Kernel) -> Result<&'a dyn PopulationView, SimError>,
    ensure_source: fn(&mut Kernel) -> Result<(), SimError>,
    partitions: BTreeMap<PartitionKey, PartitionRecord>,
    triggers: HashMap<TypeId, TriggerChannel>,
    rng: ChaCha8Rng,
}

fn view_accessor<S: PopulationView>(kernel: &Kernel) -> Result<&dyn PopulationView, SimError> {
    kernel
        .data_manager_ref::<S>()
        .map(|store| store as &dyn PopulationView)
}

fn ensure_source<S: PopulationView>(kernel: &mut Kernel) -> Result<(), SimError> {
    kernel.data_manager::<S>().map(|_| ())
}

impl PartitionEngine {
    pub fn with_source<S: PopulationView>() -> Self {
        Self {
            view: view_accessor::<S>,
            ensure_source: ensure_source::<S>,
            partitions: BTreeMap::new(),
            triggers: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    fn reserved_trigger(event_type: TypeId) -> bool {
        event_type == TypeId::of::<PersonCreatedEvent>()
            || event_type == TypeId::of::<PersonRemovalEvent>()
    }

    pub(crate) fn add(
        &mut self,
        kernel: &mut Kernel,
        owner: OwnerId,
        key: PartitionKey,
        spec: PartitionSpec,
    ) -> Result<(), SimError> {
        if key.is_empty() {
            return Err(SimError::EmptyPartitionKey);
        }
        if self.partitions.contains_key(&key) {
            return Err(SimError::DuplicatePartitionKey { key });
        }
        let sensitivities = spec.sensitivities();
        for sensitivity in &sensitivities {
            if Self::reserved_trigger(sensitivity.event_type) {
                return Err(SimError::ReservedPartitionTrigger {
                    key,
                    event: sensitivity.event_name,
                });
            }
        }

        // One shared subscription per trigger type, across all partitions.
        let mut seen = Vec::new();
        for sensitivity in &sensitivities {
            if seen.contains(&sensitivity.event_type) {
                continue;
            }
            seen.push(sensitivity.event_type);
            match self.triggers.get_mut(&sensitivity.event_type) {
                Some(channel) => channel.keys.push(key.clone()),
                None => {
                    let subscription = (sensitivity.subscribe)(kernel);
                    self.triggers.insert(
                        sensitivity.event_type,
                        TriggerChannel {
                            subscription,
                            keys: vec![key.clone()],
                        },
                    );
                }
            }
        }

        // Materialize the initial index over the current population.
        let mut record = PartitionRecord {
            owner,
            spec,
            index: PartitionIndex::new(),
        };
        if !record.spec.is_degenerate() {
            let people = (self.view)(kernel)?.people();
            for person in people {
                if let Some(labels) = evaluate_member(kernel, &record.spec, person)? {
                    record.index.insert(person, labels);
                }
            }
        }
        debug!(%key, members = record.index.len(), "partition added");
        self.partitions.insert(key, record);
        Ok(())
    }

    pub(crate) fn remove(
        &mut self,
        kernel: &mut Kernel,
        caller: OwnerId,
        key: &PartitionKey,
    ) -> Result<(), SimError> {
        let owner = match self.partitions.get(key) {
            Some(record) => record.owner.clone(),
            None => {
                return Err(SimError::UnknownPartitionKey { key: key.clone() });
            }
        };
        if owner != caller {
            return Err(SimError::NotPartitionOwner {
                key: key.clone(),
                owner,
                caller,
            });
        }
        let Some(record) = self.partitions.remove(key) else {
            return Err(SimError::UnknownPartitionKey { key: key.clone() });
        };

        // Drop trigger subscriptions nobody needs any more.
        let mut seen = Vec::new();
        for sensitivity in record.spec.sensitivities() {
            if seen.contains(&sensitivity.event_type) {
                continue;
            }
            seen.push(sensitivity.event_type);
            if let Some(channel) = self.triggers.get_mut(&sensitivity.event_type) {
                channel.keys.retain(|other| other != key);
                if channel.keys.is_empty() {
                    let subscription = channel.subscription;
                    self.triggers.remove(&sensitivity.event_type);
                    kernel.unsubscribe(subscription)?;
                }
            }
        }
        debug!(%key, "partition removed");
        Ok(())
    }

    pub(crate) fn size(&self, kernel: &Kernel, key: &PartitionKey) -> Result<usize, SimError> {
        let record = self
            .partitions
            .get(key)
            .ok_or_else(|| SimError::UnknownPartitionKey { key: key.clone() })?;
        if record.spec.is_degenerate() {
            Ok((self.view)(kernel)?.population())
        } else {
            Ok(record.index.len())
        }
    }

    pub(crate) fn sample(
        &mut self,
        kernel: &Kernel,
        key: &PartitionKey,
        sampler: &PartitionSampler,
    ) -> Result<Option<PersonId>, SimError> {
        let record = self
            .partitions
            .get(key)
            .ok_or_else(|| SimError::UnknownPartitionKey { key: key.clone() })?;
        if record.spec.is_degenerate() {
            let view = (self.view)(kernel)?;
            sampler::sample_population(view, sampler, key, &mut self.rng)
        } else {
            sampler::sample_index(
                &record.index,
                sampler,
                record.spec.dimensions(),
                key,
                &mut self.rng,
            )
        }
    }

    /// Stored label tuple for one entity, if indexed. Exposed for invariant
    /// checks and diagnostics.
    pub(crate) fn member_labels(
        &self,
        key: &PartitionKey,
        person: PersonId,
    ) -> Result<Option<LabelSet>, SimError> {
        let record = self
            .partitions
            .get(key)
            .ok_or_else(|| SimError::UnknownPartitionKey { key: key.clone() })?;
        Ok(record.index.labels_of(person).cloned())
    }

    pub(crate) fn contains(
        &self,
        key: &PartitionKey,
        person: PersonId,
    ) -> Result<bool, SimError> {
        let record = self
            .partitions
            .get(key)
            .ok_or_else(|| SimError::UnknownPartitionKey { key: key.clone() })?;
        Ok(record.index.contains(person))
    }

    /// Route one trigger event to the partitions declared sensitive to its
    /// type, re-evaluating only the entities the event concerns.
    pub(crate) fn apply_trigger(
        &mut self,
        kernel: &mut Kernel,
        event_type: TypeId,
        event: &dyn std::any::Any,
    ) -> Result<(), SimError> {
        let Some(channel) = self.triggers.get(&event_type) else {
            return Ok(());
        };
        let keys = channel.keys.clone();
        for key in keys {
            let persons = {
                let Some(record) = self.partitions.get(&key) else {
                    continue;
                };
                let mut persons: Vec<PersonId> = Vec::new();
                for sensitivity in record.spec.sensitivities_for(event_type) {
                    if let Some(person) = (sensitivity.affected)(event) {
                        if !persons.contains(&person) {
                            persons.push(person);
                        }
                    }
                }
                persons
            };
            for person in persons {
                self.refresh(kernel, &key, person)?;
            }
        }
        Ok(())
    }

    pub(crate) fn handle_person_created(
        &mut self,
        kernel: &Kernel,
        person: PersonId,
    ) -> Result<(), SimError> {
        let keys: Vec<PartitionKey> = self.partitions.keys().cloned().collect();
        for key in keys {
            self.refresh(kernel, &key, person)?;
        }
        Ok(())
    }

    /// Drop an entity from every index. Runs at the tail of the time step in
    /// which its removal was announced.
    pub(crate) fn purge_person(&mut self, person: PersonId) {
        debug!(%person, "purging removed entity from partitions");
        for record in self.partitions.values_mut() {
            record.index.remove(person);
        }
    }

    /// Re-evaluate one entity against one partition and reconcile the index.
    /// Evaluation runs first on shared borrows, mutation after; no structure
    /// is iterated while being changed, so re-entrant refreshes compose.
    fn refresh(
        &mut self,
        kernel: &Kernel,
        key: &PartitionKey,
        person: PersonId,
    ) -> Result<(), SimError> {
        let labels = {
            let Some(record) = self.partitions.get(key) else {
                return Ok(());
            };
            if record.spec.is_degenerate() {
                return Ok(());
            }
            if !(self.view)(kernel)?.person_exists(person) {
                None
            } else {
                evaluate_member(kernel, &record.spec, person)?
            }
        };
        let Some(record) = self.partitions.get_mut(key) else {
            return Ok(());
        };
        match labels {
            Some(labels) => {
                if record.index.contains(person) {
                    record.index.update(person, labels);
                } else {
                    record.index.insert(person, labels);
                }
            }
            None => {
                record.index.remove(person);
            }
        }
        Ok(())
    }
}

/// Evaluate filter and labelers for one entity: `Some(labels)` when the
/// entity belongs in the index, `None` when it does not.
fn evaluate_member(
    kernel: &Kernel,
    spec: &PartitionSpec,
    person: PersonId,
) -> Result<Option<LabelSet>, SimError> {
    let passes = match &spec.filter {
        Some(filter) => filter.evaluate(kernel, person)?,
        None => true,
    };
    if !passes {
        return Ok(None);
    }
    let mut values = Vec::with_capacity(spec.labelers.len());
    for labeler in &spec.labelers {
        values.push(labeler.label(kernel, person)?);
    }
    Ok(Some(LabelSet(values)))
}

impl DataManager for PartitionEngine {
    fn name(&self) -> &'static str {
        "partition_engine"
    }

    fn init(&mut self, kernel: &mut Kernel) -> Result<(), SimError> {
        self.rng = ChaCha8Rng::seed_from_u64(kernel.stream_seed("partition_engine"));
        (self.ensure_source)(kernel)?;

        kernel.subscribe::<PersonCreatedEvent, _>(|kernel, event| {
            let person = event.person;
            kernel.with_data_manager_mut::<PartitionEngine, _, _>(move |kernel, engine| {
                engine.handle_person_created(kernel, person)
            })
        });
        kernel.subscribe::<PersonRemovalEvent, _>(|kernel, event| {
            let person = event.person;
            let now = kernel.time();
            kernel.add_plan_with_key(now, TIEBREAK_LAST, move |kernel| {
                kernel.with_data_manager_mut::<PartitionEngine, _, _>(|_, engine| {
                    engine.purge_person(person);
                    Ok(())
                })
            })
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Kernel facade
// ---------------------------------------------------------------------------

impl Kernel {
    /// Register a partition under `key`. Fails on an empty or duplicate key,
    /// or when a declared sensitivity names one of the engine's reserved
    /// lifecycle events.
    pub fn add_partition(
        &mut self,
        owner: impl Into<OwnerId>,
        key: impl Into<PartitionKey>,
        spec: PartitionSpec,
    ) -> Result<(), SimError> {
        let owner = owner.into();
        let key = key.into();
        self.with_data_manager_mut::<PartitionEngine, _, _>(move |kernel, engine| {
            engine.add(kernel, owner, key, spec)
        })
    }

    /// Remove a partition. Only its original registrant may do so.
    pub fn remove_partition(
        &mut self,
        caller: impl Into<OwnerId>,
        key: impl Into<PartitionKey>,
    ) -> Result<(), SimError> {
        let caller = caller.into();
        let key = key.into();
        self.with_data_manager_mut::<PartitionEngine, _, _>(move |kernel, engine| {
            engine.remove(kernel, caller, &key)
        })
    }

    pub fn partition_size(&mut self, key: impl Into<PartitionKey>) -> Result<usize, SimError> {
        let key = key.into();
        self.with_data_manager_mut::<PartitionEngine, _, _>(|kernel, engine| {
            engine.size(kernel, &key)
        })
    }

    /// Draw zero or one entity from a partition. An empty candidate set
    /// answers `Ok(None)`.
    pub fn sample_partition(
        &mut self,
        key: impl Into<PartitionKey>,
        sampler: &PartitionSampler,
    ) -> Result<Option<PersonId>, SimError> {
        let key = key.into();
        self.with_data_manager_mut::<PartitionEngine, _, _>(|kernel, engine| {
            engine.sample(kernel, &key, sampler)
        })
    }

    /// Whether an entity is currently indexed in a partition.
    pub fn partition_contains(
        &mut self,
        key: impl Into<PartitionKey>,
        person: PersonId,
    ) -> Result<bool, SimError> {
        let key = key.into();
        self.with_data_manager_mut::<PartitionEngine, _, _>(|_, engine| {
            engine.contains(&key, person)
        })
    }

    /// The stored label tuple for an indexed entity, if any.
    pub fn partition_member_labels(
        &mut self,
        key: impl Into<PartitionKey>,
        person: PersonId,
    ) -> Result<Option<LabelSet>, SimError> {
        let key = key.into();
        self.with_data_manager_mut::<PartitionEngine, _, _>(|_, engine| {
            engine.member_labels(&key, person)
        })
    }
}
