//! Fail-fast hardening of the setup-phase contracts: every typed fault a
//! misbehaving embedder can provoke is reported through the public API, plus
//! a replicate-level replay check and a coarse performance smoke over the
//! partition sampling path.

use std::collections::BTreeMap;
use std::time::Instant;

use contracts::{LabelSet, LabelValue, OwnerId, PartitionKey, PersonId, SimConfig};
use serde_json::json;
use sim_kernel::{
    run_replicates, DataManager, EventLabelerId, FnFilter, FnLabeler, Kernel, PartitionEngine,
    PartitionSampler, PartitionSpec, PersonCreatedEvent, PopulationView, SimError,
    TriggerSensitivity,
};

const PERF_SMOKE_MAX_MS: u128 = 5_000;

// ---------------------------------------------------------------------------
// Population fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AgeChanged {
    person: PersonId,
}

#[derive(Default)]
struct People {
    alive: Vec<PersonId>,
    ages: BTreeMap<PersonId, i64>,
}

impl DataManager for People {
    fn name(&self) -> &'static str {
        "people"
    }

    fn init(&mut self, _kernel: &mut Kernel) -> Result<(), SimError> {
        Ok(())
    }
}

impl PopulationView for People {
    fn person_exists(&self, person: PersonId) -> bool {
        self.alive.contains(&person)
    }

    fn people(&self) -> Vec<PersonId> {
        self.alive.clone()
    }

    fn population(&self) -> usize {
        self.alive.len()
    }

    fn person_by_index(&self, index: usize) -> Option<PersonId> {
        self.alive.get(index).copied()
    }
}

fn new_kernel(seed: u64) -> Kernel {
    let mut config = SimConfig::default();
    config.seed = seed;
    let mut kernel = Kernel::new(config);
    kernel.add_data_manager::<People, _>(People::default).unwrap();
    kernel
        .add_data_manager::<PartitionEngine, _>(PartitionEngine::with_source::<People>)
        .unwrap();
    kernel
}

// No removals in this suite, so the next id is just the population size.
fn add_person(kernel: &mut Kernel, age: i64) -> PersonId {
    let person = {
        let store = kernel.data_manager_mut::<People>().unwrap();
        let person = PersonId(store.alive.len());
        store.alive.push(person);
        store.ages.insert(person, age);
        person
    };
    kernel.publish(PersonCreatedEvent { person }).unwrap();
    person
}

fn adult_partition() -> PartitionSpec {
    let filter = FnFilter::new(|kernel: &Kernel, person| {
        let store = kernel.data_manager_ref::<People>()?;
        Ok(store.ages.get(&person).copied().unwrap_or(0) >= 18)
    })
    .with_sensitivity(TriggerSensitivity::of::<AgeChanged, _>(|event| {
        Some(event.person)
    }));
    let labeler = FnLabeler::new(|kernel: &Kernel, person| {
        let store = kernel.data_manager_ref::<People>()?;
        Ok(LabelValue::Int(
            store.ages.get(&person).copied().unwrap_or(0) / 10,
        ))
    })
    .with_sensitivity(TriggerSensitivity::of::<AgeChanged, _>(|event| {
        Some(event.person)
    }));
    PartitionSpec::new().with_filter(filter).with_labeler(labeler)
}

// ---------------------------------------------------------------------------
// Data manager protocol faults
// ---------------------------------------------------------------------------

#[test]
fn registering_the_same_manager_type_twice_is_rejected() {
    let mut kernel = new_kernel(3);
    assert!(matches!(
        kernel.add_data_manager::<People, _>(People::default),
        Err(SimError::DuplicateDataManager { .. })
    ));
}

#[test]
fn accessing_an_unregistered_manager_is_a_typed_fault() {
    let mut kernel = Kernel::new(SimConfig::default());
    assert!(matches!(
        kernel.data_manager::<People>(),
        Err(SimError::UnknownDataManager { .. })
    ));
}

struct Flaky;

impl DataManager for Flaky {
    fn name(&self) -> &'static str {
        "flaky"
    }

    // Requests a manager nobody registered, so its own init fails.
    fn init(&mut self, kernel: &mut Kernel) -> Result<(), SimError> {
        kernel.data_manager::<People>().map(|_| ())
    }
}

#[test]
fn a_failed_init_poisons_the_slot_instead_of_retrying() {
    let mut kernel = Kernel::new(SimConfig::default());
    kernel.add_data_manager::<Flaky, _>(|| Flaky).unwrap();

    assert!(matches!(
        kernel.data_manager::<Flaky>(),
        Err(SimError::UnknownDataManager { .. })
    ));
    // The slot stays poisoned; no half-constructed instance ever escapes.
    assert!(matches!(
        kernel.data_manager::<Flaky>(),
        Err(SimError::DataManagerInitFailed { .. })
    ));
}

// ---------------------------------------------------------------------------
// Plan validation
// ---------------------------------------------------------------------------

#[test]
fn plan_times_are_validated_at_insertion() {
    let mut kernel = new_kernel(5);
    assert!(matches!(
        kernel.add_plan(-1.0, |_| Ok(())),
        Err(SimError::PlanInPast { .. })
    ));
    assert!(matches!(
        kernel.add_plan(f64::NAN, |_| Ok(())),
        Err(SimError::PlanTimeNotFinite { .. })
    ));
    assert!(matches!(
        kernel.add_plan(f64::INFINITY, |_| Ok(())),
        Err(SimError::PlanTimeNotFinite { .. })
    ));
}

#[test]
fn halt_leaves_queued_plans_and_reports_status() {
    let mut kernel = new_kernel(7);
    kernel
        .add_plan(1.0, |kernel| {
            kernel.halt();
            Ok(())
        })
        .unwrap();
    kernel.add_plan(2.0, |_| Ok(())).unwrap();

    let summary = kernel.execute().unwrap();
    assert!(summary.halted);
    assert_eq!(summary.plans_executed, 1);

    let status = kernel.status();
    assert!(status.halted);
    assert_eq!(status.queue_depth, 1);
    assert_eq!(status.current_time, 1.0);
}

// ---------------------------------------------------------------------------
// Partition registration and removal faults
// ---------------------------------------------------------------------------

#[test]
fn partition_registration_rejects_malformed_requests() {
    let mut kernel = new_kernel(11);
    assert_eq!(
        kernel
            .add_partition("hardening", "", PartitionSpec::new())
            .unwrap_err(),
        SimError::EmptyPartitionKey
    );

    kernel
        .add_partition("hardening", "adults", adult_partition())
        .unwrap();
    assert!(matches!(
        kernel.add_partition("hardening", "adults", adult_partition()),
        Err(SimError::DuplicatePartitionKey { .. })
    ));

    let lifecycle_spy = PartitionSpec::new().with_filter(
        FnFilter::new(|_, _| Ok(true)).with_sensitivity(
            TriggerSensitivity::of::<PersonCreatedEvent, _>(|event| Some(event.person)),
        ),
    );
    assert!(matches!(
        kernel.add_partition("hardening", "spy", lifecycle_spy),
        Err(SimError::ReservedPartitionTrigger { .. })
    ));
}

#[test]
fn partition_removal_enforces_ownership() {
    let mut kernel = new_kernel(13);
    kernel
        .add_partition("hardening", "adults", adult_partition())
        .unwrap();

    match kernel.remove_partition("intruder", "adults").unwrap_err() {
        SimError::NotPartitionOwner { key, owner, caller } => {
            assert_eq!(key, PartitionKey::from("adults"));
            assert_eq!(owner, OwnerId::from("hardening"));
            assert_eq!(caller, OwnerId::from("intruder"));
        }
        other => panic!("unexpected error {other}"),
    }

    kernel.remove_partition("hardening", "adults").unwrap();
    assert!(matches!(
        kernel.remove_partition("hardening", "adults"),
        Err(SimError::UnknownPartitionKey { .. })
    ));
    assert!(matches!(
        kernel.partition_size("adults"),
        Err(SimError::UnknownPartitionKey { .. })
    ));
}

// ---------------------------------------------------------------------------
// Sampling request faults
// ---------------------------------------------------------------------------

#[test]
fn malformed_sampling_requests_are_typed_faults() {
    let mut kernel = new_kernel(17);
    kernel
        .add_partition("hardening", "adults", adult_partition())
        .unwrap();
    add_person(&mut kernel, 30);

    let overlong = PartitionSampler::uniform().constrain(vec![None, None]);
    assert_eq!(
        kernel.sample_partition("adults", &overlong).unwrap_err(),
        SimError::InvalidLabelConstraint {
            expected: 1,
            got: 2
        }
    );

    let negative = PartitionSampler::uniform().weight_by(|_: &LabelSet| -2.0);
    assert!(matches!(
        kernel.sample_partition("adults", &negative),
        Err(SimError::InvalidSamplingWeight { .. })
    ));

    let nan = PartitionSampler::uniform().weight_by(|_: &LabelSet| f64::NAN);
    assert!(matches!(
        kernel.sample_partition("adults", &nan),
        Err(SimError::InvalidSamplingWeight { .. })
    ));
}

// ---------------------------------------------------------------------------
// Event bus bookkeeping faults
// ---------------------------------------------------------------------------

#[test]
fn event_bus_bookkeeping_is_fail_fast() {
    let mut kernel = new_kernel(19);
    let id = kernel.subscribe::<AgeChanged, _>(|_, _| Ok(()));
    kernel.unsubscribe(id).unwrap();
    assert!(matches!(
        kernel.unsubscribe(id),
        Err(SimError::UnknownSubscription { .. })
    ));

    let by_person = EventLabelerId(7);
    kernel
        .add_event_labeler::<AgeChanged, _>(by_person, |event| {
            vec![LabelValue::Int(event.person.0 as i64)]
        })
        .unwrap();
    assert!(matches!(
        kernel.add_event_labeler::<AgeChanged, _>(by_person, |_| Vec::new()),
        Err(SimError::DuplicateEventLabeler { .. })
    ));
    assert!(matches!(
        kernel.subscribe_by_label::<AgeChanged, _>(EventLabelerId(8), LabelValue::Int(0), |_, _| {
            Ok(())
        }),
        Err(SimError::UnknownEventLabeler { .. })
    ));
}

// ---------------------------------------------------------------------------
// Replicate-level determinism
// ---------------------------------------------------------------------------

fn replicate_setup(kernel: &mut Kernel, _replicate: usize) -> Result<(), SimError> {
    kernel.add_data_manager::<People, _>(People::default)?;
    kernel.add_data_manager::<PartitionEngine, _>(PartitionEngine::with_source::<People>)?;
    kernel.add_partition("hardening", "adults", adult_partition())?;
    for step in 1..=4 {
        kernel.add_plan(f64::from(step), move |kernel| {
            let created = add_person(kernel, 14 + 2 * i64::from(step));
            let drawn = kernel.sample_partition("adults", &PartitionSampler::uniform())?;
            kernel.release_output(
                "probe",
                json!({ "created": created.0, "drawn": drawn.map(|person| person.0) }),
            );
            Ok(())
        })?;
    }
    Ok(())
}

#[test]
fn replicate_sets_reproduce_summaries_and_outputs() {
    let mut base = SimConfig::default();
    base.run_id = "hardening".to_string();

    let first = run_replicates(&base, 3, replicate_setup).unwrap();
    let second = run_replicates(&base, 3, replicate_setup).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.replicate, b.replicate);
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.outputs, b.outputs);
    }
}

// ---------------------------------------------------------------------------
// Performance smoke
// ---------------------------------------------------------------------------

#[test]
fn partition_build_and_sampling_smoke() {
    let mut kernel = new_kernel(97);
    {
        let store = kernel.data_manager_mut::<People>().unwrap();
        for id in 0..10_000 {
            let person = PersonId(id);
            store.alive.push(person);
            store.ages.insert(person, (id % 90) as i64);
        }
    }

    let started = Instant::now();
    kernel
        .add_partition("hardening", "adults", adult_partition())
        .unwrap();
    // Ages 18..=89 each occur 111 times in the cycle above.
    assert_eq!(kernel.partition_size("adults").unwrap(), 7_992);

    let sampler = PartitionSampler::uniform();
    for _ in 0..20_000 {
        let drawn = kernel.sample_partition("adults", &sampler).unwrap();
        assert!(drawn.is_some());
    }

    let elapsed = started.elapsed().as_millis();
    assert!(
        elapsed < PERF_SMOKE_MAX_MS,
        "index build plus 20k draws took {elapsed}ms"
    );
}
