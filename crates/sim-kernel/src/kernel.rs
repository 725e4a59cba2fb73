//! The simulation kernel: clock, plan queue, event dispatch, data manager
//! access, and the output channel, behind one owned object per replica.

use std::any::{Any, TypeId};
use std::rc::Rc;

use contracts::{KernelStatus, LabelValue, OutputRecord, SimConfig, SCHEMA_VERSION_V1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::SimError;
use crate::event::{EventBus, EventLabelerId, SubscriptionId};
use crate::plan::{PlanQueue, TIEBREAK_DEFAULT};
use crate::random;
use crate::registry::{DataManager, DataManagerRegistry};

/// Counters describing one completed execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionSummary {
    pub plans_executed: u64,
    pub events_published: u64,
    pub final_time: f64,
    pub halted: bool,
}

/// One isolated simulation replica.
///
/// All registration and query APIs live here; plans and event handlers
/// receive `&mut Kernel` and may call the same APIs re-entrantly. Execution
/// is strictly sequential: no plan, handler, or index update ever runs
/// concurrently with another inside one kernel.
pub struct Kernel {
    config: SimConfig,
    time: f64,
    plans: PlanQueue,
    pub(crate) bus: EventBus,
    pub(crate) registry: DataManagerRegistry,
    rng: ChaCha8Rng,
    outputs: Vec<OutputRecord>,
    halt_requested: bool,
    closed: bool,
    plans_executed: u64,
}

impl Kernel {
    pub fn new(config: SimConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            time: 0.0,
            plans: PlanQueue::new(),
            bus: EventBus::new(),
            registry: DataManagerRegistry::new(),
            rng,
            outputs: Vec::new(),
            halt_requested: false,
            closed: false,
            plans_executed: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current simulation time. Non-decreasing for the life of the kernel.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn status(&self) -> KernelStatus {
        KernelStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.config.run_id.clone(),
            current_time: self.time,
            queue_depth: self.plans.len(),
            halted: self.halt_requested,
        }
    }

    /// Request a graceful stop. Honored after the currently executing plan
    /// and its event chain fully unwind, never preemptively.
    pub fn halt(&mut self) {
        debug!(run_id = %self.config.run_id, time = self.time, "halt requested");
        self.halt_requested = true;
    }

    // -----------------------------------------------------------------------
    // Plans
    // -----------------------------------------------------------------------

    pub fn add_plan<F>(&mut self, time: f64, action: F) -> Result<(), SimError>
    where
        F: FnOnce(&mut Kernel) -> Result<(), SimError> + 'static,
    {
        self.add_plan_with_key(time, TIEBREAK_DEFAULT, action)
    }

    /// Schedule a plan with an explicit tiebreak key. Equal-time plans order
    /// by key, then by insertion sequence.
    pub fn add_plan_with_key<F>(
        &mut self,
        time: f64,
        tiebreak: i64,
        action: F,
    ) -> Result<(), SimError>
    where
        F: FnOnce(&mut Kernel) -> Result<(), SimError> + 'static,
    {
        self.plans
            .insert(time, tiebreak, self.time, Box::new(action))
    }

    // -----------------------------------------------------------------------
    // Execution loop
    // -----------------------------------------------------------------------

    /// Drive the simulation: repeatedly pop the earliest plan, advance the
    /// clock to its time, and run it. Stops when the queue drains, a halt is
    /// requested, or the next plan lies beyond `config.end_time`; data
    /// managers then receive their simulation-close callback in registration
    /// order. A fault from any plan or handler propagates out immediately and
    /// ends the run without the close pass.
    pub fn execute(&mut self) -> Result<ExecutionSummary, SimError> {
        debug!(run_id = %self.config.run_id, "simulation loop starting");
        while !self.halt_requested {
            let Some(plan) = self.plans.pop_next(self.config.end_time) else {
                break;
            };
            if plan.time > self.time {
                self.time = plan.time;
            }
            self.plans_executed = self.plans_executed.saturating_add(1);
            trace!(time = self.time, "executing plan");
            (plan.action)(self)?;
        }
        self.close()?;
        debug!(
            run_id = %self.config.run_id,
            time = self.time,
            plans = self.plans_executed,
            "simulation loop finished"
        );
        Ok(ExecutionSummary {
            plans_executed: self.plans_executed,
            events_published: self.bus.published(),
            final_time: self.time,
            halted: self.halt_requested,
        })
    }

    fn close(&mut self) -> Result<(), SimError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let order: Vec<TypeId> = self.registry.order().to_vec();
        for type_id in order {
            if !self.registry.is_ready(type_id) {
                continue;
            }
            let mut manager = self.registry.checkout(type_id)?;
            let result = manager.on_simulation_close(self);
            self.registry.restore(type_id, manager);
            result?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Dispatch an event synchronously to every subscriber of its exact
    /// type, in subscriber-registration order. Label-keyed subscribers fire
    /// only when a registered labeler derives their key from this event.
    /// Re-entrant publishes are legal and resolve depth-first.
    pub fn publish<E: 'static>(&mut self, event: E) -> Result<(), SimError> {
        let type_id = TypeId::of::<E>();
        self.bus.note_publish(std::any::type_name::<E>(), self.time);
        let Some((entries, labelers)) = self.bus.snapshot(type_id) else {
            return Ok(());
        };
        let raw: &dyn Any = &event;
        // Labels are derived once per publish, before any handler runs, so a
        // handler mutating labeler registrations cannot skew this dispatch.
        let derived: Vec<(EventLabelerId, Vec<LabelValue>)> = labelers
            .iter()
            .map(|(id, extract)| (*id, extract(raw)))
            .collect();
        for entry in entries {
            let fire = match &entry.selector {
                crate::event::Selector::All => true,
                crate::event::Selector::Labeled { labeler, key } => derived
                    .iter()
                    .find(|(id, _)| id == labeler)
                    .is_some_and(|(_, keys)| keys.contains(key)),
            };
            if fire {
                (entry.handler)(self, raw)?;
            }
        }
        Ok(())
    }

    pub fn subscribe<E, H>(&mut self, handler: H) -> SubscriptionId
    where
        E: 'static,
        H: Fn(&mut Kernel, &E) -> Result<(), SimError> + 'static,
    {
        self.bus
            .subscribe_all(TypeId::of::<E>(), erase_handler(handler))
    }

    /// Subscribe to only the events whose derived label under `labeler`
    /// contains `key`.
    pub fn subscribe_by_label<E, H>(
        &mut self,
        labeler: EventLabelerId,
        key: LabelValue,
        handler: H,
    ) -> Result<SubscriptionId, SimError>
    where
        E: 'static,
        H: Fn(&mut Kernel, &E) -> Result<(), SimError> + 'static,
    {
        self.bus.subscribe_labeled(
            TypeId::of::<E>(),
            std::any::type_name::<E>(),
            labeler,
            key,
            erase_handler(handler),
        )
    }

    /// Register a derived-key extractor for an event type. Extractors may
    /// emit zero keys (event routed to no labeled subscriber) or several.
    pub fn add_event_labeler<E, X>(
        &mut self,
        labeler: EventLabelerId,
        extract: X,
    ) -> Result<(), SimError>
    where
        E: 'static,
        X: Fn(&E) -> Vec<LabelValue> + 'static,
    {
        self.bus.add_labeler(
            TypeId::of::<E>(),
            std::any::type_name::<E>(),
            labeler,
            Rc::new(move |raw: &dyn Any| match raw.downcast_ref::<E>() {
                Some(event) => extract(event),
                None => Vec::new(),
            }),
        )
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), SimError> {
        self.bus.unsubscribe(id)
    }

    /// Producers use this to skip building an event nobody listens to.
    pub fn subscribers_exist<E: 'static>(&self) -> bool {
        self.bus.subscribers_exist(TypeId::of::<E>())
    }

    /// Running hash over every event issued so far, in order. Two runs with
    /// identical configuration and registration produce identical values.
    pub fn replay_hash(&self) -> u64 {
        self.bus.replay_hash()
    }

    // -----------------------------------------------------------------------
    // Data managers
    // -----------------------------------------------------------------------

    pub fn add_data_manager<T, F>(&mut self, factory: F) -> Result<(), SimError>
    where
        T: DataManager,
        F: FnOnce() -> T + 'static,
    {
        self.registry.register(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Box::new(move || Box::new(factory())),
        )
    }

    /// Eagerly initialize a manager during setup. Initializing one that is
    /// already ready is a protocol violation.
    pub fn initialize_data_manager<T: DataManager>(&mut self) -> Result<(), SimError> {
        if self.registry.is_ready(TypeId::of::<T>()) {
            return Err(SimError::DuplicateInitialization {
                type_name: std::any::type_name::<T>(),
            });
        }
        self.ensure_ready::<T>()
    }

    /// Shared access, constructing and initializing the manager on first
    /// call. Requires `&mut self` because first access may run `init`.
    pub fn data_manager<T: DataManager>(&mut self) -> Result<&T, SimError> {
        self.ensure_ready::<T>()?;
        let manager = self
            .registry
            .ready_ref(TypeId::of::<T>())
            .ok_or(SimError::UnknownDataManager {
                type_name: std::any::type_name::<T>(),
            })?;
        let any: &dyn Any = manager;
        any.downcast_ref::<T>().ok_or(SimError::UnknownDataManager {
            type_name: std::any::type_name::<T>(),
        })
    }

    pub fn data_manager_mut<T: DataManager>(&mut self) -> Result<&mut T, SimError> {
        self.ensure_ready::<T>()?;
        let manager = self
            .registry
            .ready_mut(TypeId::of::<T>())
            .ok_or(SimError::UnknownDataManager {
                type_name: std::any::type_name::<T>(),
            })?;
        let any: &mut dyn Any = manager;
        any.downcast_mut::<T>().ok_or(SimError::UnknownDataManager {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Read-only access without lazy construction: the manager must already
    /// be initialized. Filters and labelers use this form, since they only
    /// ever see the kernel immutably.
    pub fn data_manager_ref<T: DataManager>(&self) -> Result<&T, SimError> {
        let manager = self
            .registry
            .ready_ref(TypeId::of::<T>())
            .ok_or(SimError::UnknownDataManager {
                type_name: std::any::type_name::<T>(),
            })?;
        let any: &dyn Any = manager;
        any.downcast_ref::<T>().ok_or(SimError::UnknownDataManager {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Check the manager out of its slot so the caller can use it and the
    /// kernel together. Re-entrant checkout of the same type fails fast.
    pub fn with_data_manager_mut<T, R, F>(&mut self, f: F) -> Result<R, SimError>
    where
        T: DataManager,
        F: FnOnce(&mut Kernel, &mut T) -> Result<R, SimError>,
    {
        self.ensure_ready::<T>()?;
        let type_id = TypeId::of::<T>();
        let mut manager = self.registry.checkout(type_id)?;
        let result = {
            let any: &mut dyn Any = manager.as_mut();
            match any.downcast_mut::<T>() {
                Some(typed) => f(self, typed),
                None => Err(SimError::UnknownDataManager {
                    type_name: std::any::type_name::<T>(),
                }),
            }
        };
        self.registry.restore(type_id, manager);
        result
    }

    fn ensure_ready<T: DataManager>(&mut self) -> Result<(), SimError> {
        let type_id = TypeId::of::<T>();
        if !self.registry.is_registered(type_id) {
            return Err(SimError::UnknownDataManager {
                type_name: std::any::type_name::<T>(),
            });
        }
        if self.registry.is_ready(type_id) {
            return Ok(());
        }
        let factory = self.registry.begin_init(type_id)?;
        let mut manager = factory();
        match manager.init(self) {
            Ok(()) => {
                self.registry.finish_init(type_id, manager);
                Ok(())
            }
            Err(err) => {
                self.registry.poison(type_id);
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Randomness and outputs
    // -----------------------------------------------------------------------

    /// The kernel's seeded random stream, shared by sampling and any module
    /// that draws through the kernel.
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Derive a deterministic seed for an independent stream, e.g. for a data
    /// manager that owns its own generator.
    pub fn stream_seed(&self, label: &str) -> u64 {
        random::stream_seed(self.config.seed, label)
    }

    /// Release one untyped output object. The kernel forwards these to the
    /// embedding process after `execute` returns; it imposes no schema.
    pub fn release_output(&mut self, source: &str, payload: Value) {
        self.outputs.push(OutputRecord {
            run_id: self.config.run_id.clone(),
            time: self.time,
            source: source.to_string(),
            payload,
        });
    }

    pub fn outputs(&self) -> &[OutputRecord] {
        &self.outputs
    }

    pub fn take_outputs(&mut self) -> Vec<OutputRecord> {
        std::mem::take(&mut self.outputs)
    }
}

fn erase_handler<E, H>(handler: H) -> crate::event::ErasedHandler
where
    E: 'static,
    H: Fn(&mut Kernel, &E) -> Result<(), SimError> + 'static,
{
    Rc::new(move |kernel, raw| match raw.downcast_ref::<E>() {
        Some(event) => handler(kernel, event),
        None => Ok(()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn kernel() -> Kernel {
        Kernel::new(SimConfig::default())
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tagged {
        tag: u32,
    }

    #[test]
    fn plans_run_in_time_then_insertion_order() {
        let mut kernel = kernel();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for (time, tag) in [(2.0, 'b'), (1.0, 'a'), (2.0, 'c')] {
            let seen = Rc::clone(&seen);
            kernel
                .add_plan(time, move |_| {
                    seen.borrow_mut().push(tag);
                    Ok(())
                })
                .unwrap();
        }
        kernel.execute().unwrap();
        assert_eq!(*seen.borrow(), vec!['a', 'b', 'c']);
    }

    #[test]
    fn clock_is_monotonic_and_add_plan_in_past_fails() {
        let mut kernel = kernel();
        kernel
            .add_plan(5.0, |kernel| {
                assert_eq!(kernel.time(), 5.0);
                let result = kernel.add_plan(4.0, |_| Ok(()));
                assert_eq!(
                    result.unwrap_err(),
                    SimError::PlanInPast {
                        requested: 4.0,
                        current: 5.0
                    }
                );
                // Scheduling at the current time is allowed.
                kernel.add_plan(5.0, |_| Ok(()))
            })
            .unwrap();
        let summary = kernel.execute().unwrap();
        assert_eq!(summary.final_time, 5.0);
        assert_eq!(summary.plans_executed, 2);
    }

    #[test]
    fn halt_is_honored_between_plans() {
        let mut kernel = kernel();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_first = Rc::clone(&seen);
        kernel
            .add_plan(1.0, move |kernel| {
                seen_first.borrow_mut().push("first");
                kernel.halt();
                Ok(())
            })
            .unwrap();
        let seen_second = Rc::clone(&seen);
        kernel
            .add_plan(2.0, move |_| {
                seen_second.borrow_mut().push("second");
                Ok(())
            })
            .unwrap();
        let summary = kernel.execute().unwrap();
        assert!(summary.halted);
        assert_eq!(*seen.borrow(), vec!["first"]);
    }

    #[test]
    fn end_time_stops_before_later_plans() {
        let mut config = SimConfig::default();
        config.end_time = Some(3.0);
        let mut kernel = Kernel::new(config);
        kernel.add_plan(2.0, |_| Ok(())).unwrap();
        kernel.add_plan(9.0, |_| Ok(())).unwrap();
        let summary = kernel.execute().unwrap();
        assert_eq!(summary.plans_executed, 1);
        assert_eq!(summary.final_time, 2.0);
    }

    #[test]
    fn plan_errors_propagate_out_of_execute() {
        let mut kernel = kernel();
        kernel
            .add_plan(1.0, |_| {
                Err(SimError::EmptyPartitionKey)
            })
            .unwrap();
        assert_eq!(kernel.execute().unwrap_err(), SimError::EmptyPartitionKey);
    }

    #[test]
    fn publish_dispatches_in_subscription_order() {
        let mut kernel = kernel();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["one", "two"] {
            let seen = Rc::clone(&seen);
            kernel.subscribe::<Tagged, _>(move |_, event| {
                seen.borrow_mut().push((tag, event.tag));
                Ok(())
            });
        }
        kernel
            .add_plan(1.0, |kernel| kernel.publish(Tagged { tag: 7 }))
            .unwrap();
        kernel.execute().unwrap();
        assert_eq!(*seen.borrow(), vec![("one", 7), ("two", 7)]);
    }

    #[test]
    fn nested_publish_is_depth_first() {
        let mut kernel = kernel();
        let seen = Rc::new(RefCell::new(Vec::new()));

        #[derive(Debug)]
        struct Inner;

        let seen_inner = Rc::clone(&seen);
        kernel.subscribe::<Inner, _>(move |_, _| {
            seen_inner.borrow_mut().push("inner");
            Ok(())
        });
        let seen_outer = Rc::clone(&seen);
        kernel.subscribe::<Tagged, _>(move |kernel, _| {
            seen_outer.borrow_mut().push("outer-before");
            kernel.publish(Inner)?;
            seen_outer.borrow_mut().push("outer-after");
            Ok(())
        });
        let seen_tail = Rc::clone(&seen);
        kernel.subscribe::<Tagged, _>(move |_, _| {
            seen_tail.borrow_mut().push("tail");
            Ok(())
        });

        kernel
            .add_plan(1.0, |kernel| kernel.publish(Tagged { tag: 1 }))
            .unwrap();
        kernel.execute().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec!["outer-before", "inner", "outer-after", "tail"]
        );
    }

    #[test]
    fn subscribers_exist_reflects_subscriptions() {
        let mut kernel = kernel();
        assert!(!kernel.subscribers_exist::<Tagged>());
        let id = kernel.subscribe::<Tagged, _>(|_, _| Ok(()));
        assert!(kernel.subscribers_exist::<Tagged>());
        kernel.unsubscribe(id).unwrap();
        assert!(!kernel.subscribers_exist::<Tagged>());
    }

    #[test]
    fn unsubscribe_during_dispatch_affects_next_publish_only() {
        let mut kernel = kernel();
        let seen = Rc::new(RefCell::new(0_u32));
        let slot: Rc<RefCell<Option<SubscriptionId>>> = Rc::new(RefCell::new(None));

        let seen_handler = Rc::clone(&seen);
        let slot_handler = Rc::clone(&slot);
        let id = kernel.subscribe::<Tagged, _>(move |kernel, _| {
            *seen_handler.borrow_mut() += 1;
            let id = slot_handler.borrow_mut().take();
            if let Some(id) = id {
                kernel.unsubscribe(id)?;
            }
            Ok(())
        });
        *slot.borrow_mut() = Some(id);

        kernel
            .add_plan(1.0, |kernel| {
                kernel.publish(Tagged { tag: 0 })?;
                kernel.publish(Tagged { tag: 0 })
            })
            .unwrap();
        kernel.execute().unwrap();
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn label_keyed_subscription_fires_only_on_matching_key() {
        let mut kernel = kernel();
        let by_tag = EventLabelerId(1);
        kernel
            .add_event_labeler::<Tagged, _>(by_tag, |event| {
                vec![LabelValue::Int(i64::from(event.tag))]
            })
            .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_handler = Rc::clone(&seen);
        kernel
            .subscribe_by_label::<Tagged, _>(by_tag, LabelValue::Int(3), move |_, event| {
                seen_handler.borrow_mut().push(event.tag);
                Ok(())
            })
            .unwrap();

        kernel
            .add_plan(1.0, |kernel| {
                kernel.publish(Tagged { tag: 1 })?;
                kernel.publish(Tagged { tag: 3 })?;
                kernel.publish(Tagged { tag: 5 })
            })
            .unwrap();
        kernel.execute().unwrap();
        assert_eq!(*seen.borrow(), vec![3]);
    }

    // -- data manager protocol ----------------------------------------------

    struct Census {
        count: usize,
    }

    impl DataManager for Census {
        fn name(&self) -> &'static str {
            "census"
        }

        fn init(&mut self, _kernel: &mut Kernel) -> Result<(), SimError> {
            self.count = 10;
            Ok(())
        }

        fn on_simulation_close(&mut self, kernel: &mut Kernel) -> Result<(), SimError> {
            kernel.release_output(self.name(), serde_json::json!({ "count": self.count }));
            Ok(())
        }
    }

    struct Forward;
    struct Backward;

    impl DataManager for Forward {
        fn name(&self) -> &'static str {
            "forward"
        }

        fn init(&mut self, kernel: &mut Kernel) -> Result<(), SimError> {
            kernel.data_manager::<Backward>().map(|_| ())
        }
    }

    impl DataManager for Backward {
        fn name(&self) -> &'static str {
            "backward"
        }

        fn init(&mut self, kernel: &mut Kernel) -> Result<(), SimError> {
            kernel.data_manager::<Forward>().map(|_| ())
        }
    }

    #[test]
    fn data_manager_is_constructed_lazily_and_once() {
        let mut kernel = kernel();
        kernel
            .add_data_manager::<Census, _>(|| Census { count: 0 })
            .unwrap();
        assert_eq!(kernel.data_manager::<Census>().unwrap().count, 10);
        kernel.data_manager_mut::<Census>().unwrap().count = 11;
        assert_eq!(kernel.data_manager::<Census>().unwrap().count, 11);
    }

    #[test]
    fn unknown_data_manager_is_an_error() {
        let mut kernel = kernel();
        assert!(matches!(
            kernel.data_manager::<Census>(),
            Err(SimError::UnknownDataManager { .. })
        ));
    }

    #[test]
    fn mutual_init_fails_with_circular_dependency() {
        let mut kernel = kernel();
        kernel.add_data_manager::<Forward, _>(|| Forward).unwrap();
        kernel.add_data_manager::<Backward, _>(|| Backward).unwrap();
        assert!(matches!(
            kernel.data_manager::<Forward>(),
            Err(SimError::CircularDataManagerDependency { .. })
        ));
    }

    #[test]
    fn initialize_twice_is_duplicate_initialization() {
        let mut kernel = kernel();
        kernel
            .add_data_manager::<Census, _>(|| Census { count: 0 })
            .unwrap();
        kernel.initialize_data_manager::<Census>().unwrap();
        assert!(matches!(
            kernel.initialize_data_manager::<Census>(),
            Err(SimError::DuplicateInitialization { .. })
        ));
    }

    #[test]
    fn close_collects_outputs_in_registration_order() {
        let mut kernel = kernel();
        kernel
            .add_data_manager::<Census, _>(|| Census { count: 0 })
            .unwrap();
        kernel.initialize_data_manager::<Census>().unwrap();
        kernel.add_plan(4.0, |_| Ok(())).unwrap();
        kernel.execute().unwrap();

        let outputs = kernel.take_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].source, "census");
        assert_eq!(outputs[0].time, 4.0);
        assert_eq!(outputs[0].payload["count"], serde_json::json!(10));
    }

    #[test]
    fn with_data_manager_allows_kernel_access_but_not_reentry() {
        let mut kernel = kernel();
        kernel
            .add_data_manager::<Census, _>(|| Census { count: 0 })
            .unwrap();
        let outcome = kernel.with_data_manager_mut::<Census, _, _>(|kernel, census| {
            census.count += 1;
            // The kernel is usable while the manager is checked out.
            kernel.add_plan(1.0, |_| Ok(()))?;
            // Checking the same manager out again is refused.
            let nested = kernel.with_data_manager_mut::<Census, _, _>(|_, _| Ok(()));
            assert!(matches!(nested, Err(SimError::DataManagerInUse { .. })));
            Ok(census.count)
        });
        assert_eq!(outcome.unwrap(), 11);
    }

    #[test]
    fn stream_seeds_are_stable_and_label_dependent() {
        let kernel = kernel();
        assert_eq!(kernel.stream_seed("infection"), kernel.stream_seed("infection"));
        assert_ne!(kernel.stream_seed("infection"), kernel.stream_seed("mobility"));
    }
}
