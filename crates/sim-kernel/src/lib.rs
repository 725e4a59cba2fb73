//! Discrete-event simulation kernel for agent-based population models.
//!
//! One [`Kernel`] instance owns everything a single simulation replica needs:
//! a time-ordered plan queue, a typed event bus, a registry of lazily
//! initialized data managers, and a seeded random stream. On top of that core
//! sits the [`partition`] engine, which keeps live indexes over the entity
//! population keyed by derived labels and supports weighted random sampling.
//!
//! Domain modules (disease progression, transmission, reporting, loaders) are
//! deliberately absent: they plug in from outside through data-manager
//! registration, event subscription, and partition registration, and receive
//! results back through the untyped output channel at simulation close.
//!
//! Execution inside one kernel is strictly sequential and deterministic:
//! identical configuration, seeds, and registration order reproduce the same
//! event ordering and the same outputs. Parallelism lives one level up, in
//! [`experiment`], which runs fully isolated replicas side by side.

pub mod error;
pub mod event;
pub mod experiment;
pub mod kernel;
pub mod partition;
pub mod people;
pub mod plan;
pub mod random;
pub mod registry;

pub use error::SimError;
pub use event::{EventLabelerId, SubscriptionId};
pub use experiment::{run_replicates, ReplicateOutput};
pub use kernel::{ExecutionSummary, Kernel};
pub use partition::{
    AndFilter, FnFilter, FnLabeler, Labeler, NotFilter, OrFilter, PartitionEngine,
    PartitionFilter, PartitionSampler, PartitionSpec, TriggerSensitivity,
};
pub use people::{PersonCreatedEvent, PersonRemovalEvent, PopulationView};
pub use plan::{TIEBREAK_DEFAULT, TIEBREAK_LAST};
pub use registry::DataManager;

// Re-exported so embedders draw from the kernel stream without pinning their
// own copy of the crate.
pub use rand;
