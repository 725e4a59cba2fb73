//! Filters: predicates over an entity's attributes, with declared
//! re-evaluation triggers.
//!
//! A filter never pulls state of its own; it reads attribute stores through
//! the kernel, immutably. Each sub-predicate declares which event types
//! should trigger re-evaluation and how to find the entity an event instance
//! concerns. The engine unions those declarations to decide what to
//! subscribe to.

use std::any::{Any, TypeId};
use std::rc::Rc;

use contracts::PersonId;

use crate::error::SimError;
use crate::event::SubscriptionId;
use crate::kernel::Kernel;
use crate::partition::PartitionEngine;

/// Declares one event type that should trigger re-evaluation, together with
/// the projection from an event instance to the entity it concerns.
///
/// Built with [`TriggerSensitivity::of`], which also captures a monomorphized
/// subscription thunk so the engine can subscribe to the event type without
/// knowing it statically.
#[derive(Clone)]
pub struct TriggerSensitivity {
    pub(crate) event_type: TypeId,
    pub(crate) event_name: &'static str,
    pub(crate) affected: Rc<dyn Fn(&dyn Any) -> Option<PersonId>>,
    pub(crate) subscribe: fn(&mut Kernel) -> SubscriptionId,
}

impl TriggerSensitivity {
    /// Sensitivity to event type `E`. `affected` names the entity an event
    /// instance concerns; returning `None` means the event is irrelevant to
    /// this partition after all.
    pub fn of<E, F>(affected: F) -> Self
    where
        E: 'static,
        F: Fn(&E) -> Option<PersonId> + 'static,
    {
        Self {
            event_type: TypeId::of::<E>(),
            event_name: std::any::type_name::<E>(),
            affected: Rc::new(move |raw: &dyn Any| {
                raw.downcast_ref::<E>().and_then(&affected)
            }),
            subscribe: subscribe_trigger::<E>,
        }
    }
}

/// Shared engine-routing subscription for one trigger event type. Installed
/// at most once per type, no matter how many partitions are sensitive to it.
fn subscribe_trigger<E: 'static>(kernel: &mut Kernel) -> SubscriptionId {
    kernel.subscribe::<E, _>(|kernel, event| {
        let raw: &dyn Any = event;
        kernel.with_data_manager_mut::<PartitionEngine, _, _>(|kernel, engine| {
            engine.apply_trigger(kernel, TypeId::of::<E>(), raw)
        })
    })
}

/// A predicate over one entity's current attribute state.
pub trait PartitionFilter {
    fn evaluate(&self, kernel: &Kernel, person: PersonId) -> Result<bool, SimError>;

    /// Event types whose arrival should re-run this predicate.
    fn sensitivities(&self) -> Vec<TriggerSensitivity>;
}

/// Closure-backed filter, the common leaf case.
pub struct FnFilter {
    predicate: Rc<dyn Fn(&Kernel, PersonId) -> Result<bool, SimError>>,
    sensitivities: Vec<TriggerSensitivity>,
}

impl FnFilter {
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(&Kernel, PersonId) -> Result<bool, SimError> + 'static,
    {
        Self {
            predicate: Rc::new(predicate),
            sensitivities: Vec::new(),
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: TriggerSensitivity) -> Self {
        self.sensitivities.push(sensitivity);
        self
    }
}

impl PartitionFilter for FnFilter {
    fn evaluate(&self, kernel: &Kernel, person: PersonId) -> Result<bool, SimError> {
        (self.predicate)(kernel, person)
    }

    fn sensitivities(&self) -> Vec<TriggerSensitivity> {
        self.sensitivities.clone()
    }
}

/// Conjunction of sub-filters; sensitivities are the union.
pub struct AndFilter {
    parts: Vec<Box<dyn PartitionFilter>>,
}

impl AndFilter {
    pub fn new(parts: Vec<Box<dyn PartitionFilter>>) -> Self {
        Self { parts }
    }
}

impl PartitionFilter for AndFilter {
    fn evaluate(&self, kernel: &Kernel, person: PersonId) -> Result<bool, SimError> {
        for part in &self.parts {
            if !part.evaluate(kernel, person)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sensitivities(&self) -> Vec<TriggerSensitivity> {
        self.parts
            .iter()
            .flat_map(|part| part.sensitivities())
            .collect()
    }
}

/// Disjunction of sub-filters; sensitivities are the union.
pub struct OrFilter {
    parts: Vec<Box<dyn PartitionFilter>>,
}

impl OrFilter {
    pub fn new(parts: Vec<Box<dyn PartitionFilter>>) -> Self {
        Self { parts }
    }
}

impl PartitionFilter for OrFilter {
    fn evaluate(&self, kernel: &Kernel, person: PersonId) -> Result<bool, SimError> {
        for part in &self.parts {
            if part.evaluate(kernel, person)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn sensitivities(&self) -> Vec<TriggerSensitivity> {
        self.parts
            .iter()
            .flat_map(|part| part.sensitivities())
            .collect()
    }
}

/// Negation of a sub-filter. Sensitivities pass through unchanged: the same
/// events that could flip the inner predicate flip this one.
pub struct NotFilter {
    inner: Box<dyn PartitionFilter>,
}

impl NotFilter {
    pub fn new(inner: Box<dyn PartitionFilter>) -> Self {
        Self { inner }
    }
}

impl PartitionFilter for NotFilter {
    fn evaluate(&self, kernel: &Kernel, person: PersonId) -> Result<bool, SimError> {
        Ok(!self.inner.evaluate(kernel, person)?)
    }

    fn sensitivities(&self) -> Vec<TriggerSensitivity> {
        self.inner.sensitivities()
    }
}
