//! Data manager registry.
//!
//! A data manager is a stateful module identified by its Rust type, owning a
//! disjoint slice of simulation state. Managers are registered as factories
//! and constructed lazily on first access; `init` runs exactly once, and may
//! itself request other managers, which initializes them first. A cycle of
//! such requests is detected and fails fast instead of recursing forever.
//!
//! The registry is an owned field of one kernel, never a process-wide
//! singleton, so multiple kernels in one process stay fully isolated.
//!
//! Slot life cycle: `Vacant(factory) → Initializing → Ready`, with `Ready ⇄
//! CheckedOut` while a caller holds the manager through
//! [`Kernel::with_data_manager_mut`](crate::kernel::Kernel::with_data_manager_mut).
//! A failed `init` poisons the slot; every later access reports the failure
//! rather than exposing a half-constructed instance.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::error::SimError;
use crate::kernel::Kernel;

/// A stateful simulation module with a single-call `init` and an optional
/// final flush at simulation close.
pub trait DataManager: Any {
    /// Short stable name, used to tag output records and log lines.
    fn name(&self) -> &'static str;

    /// Called exactly once, before any other access to the manager. May add
    /// plans, subscribe to events, and request other data managers.
    fn init(&mut self, kernel: &mut Kernel) -> Result<(), SimError>;

    /// Called once per manager when the simulation closes, in registration
    /// order. A manager may release a final output object here.
    fn on_simulation_close(&mut self, kernel: &mut Kernel) -> Result<(), SimError> {
        let _ = kernel;
        Ok(())
    }
}

pub(crate) type ManagerFactory = Box<dyn FnOnce() -> Box<dyn DataManager>>;

pub(crate) enum Slot {
    Vacant(ManagerFactory),
    Initializing,
    Ready(Box<dyn DataManager>),
    CheckedOut,
    Poisoned,
}

struct SlotEntry {
    type_name: &'static str,
    slot: Slot,
}

#[derive(Default)]
pub(crate) struct DataManagerRegistry {
    entries: HashMap<TypeId, SlotEntry>,
    order: Vec<TypeId>,
}

impl DataManagerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        factory: ManagerFactory,
    ) -> Result<(), SimError> {
        if self.entries.contains_key(&type_id) {
            return Err(SimError::DuplicateDataManager { type_name });
        }
        self.entries.insert(
            type_id,
            SlotEntry {
                type_name,
                slot: Slot::Vacant(factory),
            },
        );
        self.order.push(type_id);
        Ok(())
    }

    pub(crate) fn is_registered(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    pub(crate) fn is_ready(&self, type_id: TypeId) -> bool {
        matches!(
            self.entries.get(&type_id),
            Some(SlotEntry {
                slot: Slot::Ready(_),
                ..
            })
        )
    }

    /// Move a `Vacant` slot to `Initializing`, handing the factory to the
    /// caller. Every non-vacant state maps to the protocol fault it implies.
    pub(crate) fn begin_init(&mut self, type_id: TypeId) -> Result<ManagerFactory, SimError> {
        let entry = match self.entries.get_mut(&type_id) {
            Some(entry) => entry,
            None => {
                return Err(SimError::UnknownDataManager {
                    type_name: "unregistered type",
                });
            }
        };
        let type_name = entry.type_name;
        match std::mem::replace(&mut entry.slot, Slot::Initializing) {
            Slot::Vacant(factory) => Ok(factory),
            Slot::Initializing => Err(SimError::CircularDataManagerDependency { type_name }),
            Slot::Ready(manager) => {
                entry.slot = Slot::Ready(manager);
                Err(SimError::DuplicateInitialization { type_name })
            }
            Slot::CheckedOut => {
                entry.slot = Slot::CheckedOut;
                Err(SimError::DataManagerInUse { type_name })
            }
            Slot::Poisoned => {
                entry.slot = Slot::Poisoned;
                Err(SimError::DataManagerInitFailed { type_name })
            }
        }
    }

    pub(crate) fn finish_init(&mut self, type_id: TypeId, manager: Box<dyn DataManager>) {
        if let Some(entry) = self.entries.get_mut(&type_id) {
            entry.slot = Slot::Ready(manager);
        }
    }

    pub(crate) fn poison(&mut self, type_id: TypeId) {
        if let Some(entry) = self.entries.get_mut(&type_id) {
            entry.slot = Slot::Poisoned;
        }
    }

    /// Move a `Ready` slot to `CheckedOut`, handing the manager to the
    /// caller. The caller restores it with [`Self::restore`].
    pub(crate) fn checkout(&mut self, type_id: TypeId) -> Result<Box<dyn DataManager>, SimError> {
        let entry = match self.entries.get_mut(&type_id) {
            Some(entry) => entry,
            None => {
                return Err(SimError::UnknownDataManager {
                    type_name: "unregistered type",
                });
            }
        };
        let type_name = entry.type_name;
        match std::mem::replace(&mut entry.slot, Slot::CheckedOut) {
            Slot::Ready(manager) => Ok(manager),
            Slot::Initializing => {
                entry.slot = Slot::Initializing;
                Err(SimError::CircularDataManagerDependency { type_name })
            }
            Slot::CheckedOut => {
                entry.slot = Slot::CheckedOut;
                Err(SimError::DataManagerInUse { type_name })
            }
            Slot::Poisoned => {
                entry.slot = Slot::Poisoned;
                Err(SimError::DataManagerInitFailed { type_name })
            }
            Slot::Vacant(factory) => {
                entry.slot = Slot::Vacant(factory);
                Err(SimError::UnknownDataManager { type_name })
            }
        }
    }

    pub(crate) fn restore(&mut self, type_id: TypeId, manager: Box<dyn DataManager>) {
        if let Some(entry) = self.entries.get_mut(&type_id) {
            entry.slot = Slot::Ready(manager);
        }
    }

    pub(crate) fn ready_ref(&self, type_id: TypeId) -> Option<&dyn DataManager> {
        match self.entries.get(&type_id) {
            Some(SlotEntry {
                slot: Slot::Ready(manager),
                ..
            }) => Some(manager.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn ready_mut(&mut self, type_id: TypeId) -> Option<&mut dyn DataManager> {
        match self.entries.get_mut(&type_id) {
            Some(SlotEntry {
                slot: Slot::Ready(manager),
                ..
            }) => Some(manager.as_mut()),
            _ => None,
        }
    }

    /// Registration order, the order simulation-close callbacks run in.
    pub(crate) fn order(&self) -> &[TypeId] {
        &self.order
    }
}
