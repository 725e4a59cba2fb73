//! Labelers: functions from an entity's attribute state to a label value,
//! with their own re-evaluation triggers.

use contracts::{LabelValue, PersonId};
use std::rc::Rc;

use crate::error::SimError;
use crate::kernel::Kernel;
use crate::partition::filter::TriggerSensitivity;

/// Maps one entity to the label value it currently carries in one dimension
/// of a partition. Label tuples are assembled in labeler registration order.
pub trait Labeler {
    fn label(&self, kernel: &Kernel, person: PersonId) -> Result<LabelValue, SimError>;

    /// Event types whose arrival may change this labeler's output.
    fn sensitivities(&self) -> Vec<TriggerSensitivity>;
}

/// Closure-backed labeler.
pub struct FnLabeler {
    map: Rc<dyn Fn(&Kernel, PersonId) -> Result<LabelValue, SimError>>,
    sensitivities: Vec<TriggerSensitivity>,
}

impl FnLabeler {
    pub fn new<M>(map: M) -> Self
    where
        M: Fn(&Kernel, PersonId) -> Result<LabelValue, SimError> + 'static,
    {
        Self {
            map: Rc::new(map),
            sensitivities: Vec::new(),
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: TriggerSensitivity) -> Self {
        self.sensitivities.push(sensitivity);
        self
    }
}

impl Labeler for FnLabeler {
    fn label(&self, kernel: &Kernel, person: PersonId) -> Result<LabelValue, SimError> {
        (self.map)(kernel, person)
    }

    fn sensitivities(&self) -> Vec<TriggerSensitivity> {
        self.sensitivities.clone()
    }
}
