//! Typed faults raised by the kernel, registry, event bus, and partition
//! engine. Setup-phase violations are fatal to the run being configured;
//! nothing here is retried.

use contracts::{OwnerId, PartitionKey};
use std::fmt;

/// Every failure the core can report, tagged by kind with enough context to
/// name the offending call site.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// A plan was scheduled before the kernel's current time.
    PlanInPast { requested: f64, current: f64 },
    /// A plan time was NaN or infinite.
    PlanTimeNotFinite { requested: f64 },
    /// No factory was registered for the requested data manager type.
    UnknownDataManager { type_name: &'static str },
    /// A factory for this data manager type was already registered.
    DuplicateDataManager { type_name: &'static str },
    /// `init` was requested a second time for an already initialized manager.
    DuplicateInitialization { type_name: &'static str },
    /// Two data managers requested each other during initialization.
    CircularDataManagerDependency { type_name: &'static str },
    /// A data manager was requested while already checked out to a caller
    /// higher on the stack.
    DataManagerInUse { type_name: &'static str },
    /// A data manager's `init` returned an error earlier in the run; the slot
    /// stays poisoned rather than exposing a half-constructed instance.
    DataManagerInitFailed { type_name: &'static str },
    /// An unsubscribe referenced a subscription that does not exist.
    UnknownSubscription { subscription: u64 },
    /// An event labeler id was registered twice for the same event type.
    DuplicateEventLabeler { labeler: u64, event: &'static str },
    /// A label-keyed subscription referenced a labeler never registered for
    /// that event type.
    UnknownEventLabeler { labeler: u64, event: &'static str },
    /// Partition keys must be non-empty.
    EmptyPartitionKey,
    /// A partition is already registered under this key.
    DuplicatePartitionKey { key: PartitionKey },
    /// No partition is registered under this key.
    UnknownPartitionKey { key: PartitionKey },
    /// The caller is not the registrant of the partition it tried to remove.
    NotPartitionOwner {
        key: PartitionKey,
        owner: OwnerId,
        caller: OwnerId,
    },
    /// A filter or labeler declared sensitivity to one of the lifecycle
    /// events the engine itself consumes to maintain its indexes.
    ReservedPartitionTrigger {
        key: PartitionKey,
        event: &'static str,
    },
    /// A label constraint named more dimensions than the partition has
    /// labelers.
    InvalidLabelConstraint { expected: usize, got: usize },
    /// A weighting function returned a negative or non-finite weight.
    InvalidSamplingWeight { key: PartitionKey, weight: f64 },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::PlanInPast { requested, current } => {
                write!(f, "plan time {requested} is before current time {current}")
            }
            SimError::PlanTimeNotFinite { requested } => {
                write!(f, "plan time {requested} is not finite")
            }
            SimError::UnknownDataManager { type_name } => {
                write!(f, "no data manager registered for {type_name}")
            }
            SimError::DuplicateDataManager { type_name } => {
                write!(f, "data manager {type_name} is already registered")
            }
            SimError::DuplicateInitialization { type_name } => {
                write!(f, "data manager {type_name} was already initialized")
            }
            SimError::CircularDataManagerDependency { type_name } => {
                write!(
                    f,
                    "data manager {type_name} was requested while its own init is in progress"
                )
            }
            SimError::DataManagerInUse { type_name } => {
                write!(f, "data manager {type_name} is already checked out")
            }
            SimError::DataManagerInitFailed { type_name } => {
                write!(f, "data manager {type_name} failed to initialize")
            }
            SimError::UnknownSubscription { subscription } => {
                write!(f, "subscription {subscription} does not exist")
            }
            SimError::DuplicateEventLabeler { labeler, event } => {
                write!(f, "event labeler {labeler} already registered for {event}")
            }
            SimError::UnknownEventLabeler { labeler, event } => {
                write!(f, "no event labeler {labeler} registered for {event}")
            }
            SimError::EmptyPartitionKey => f.write_str("partition key must be non-empty"),
            SimError::DuplicatePartitionKey { key } => {
                write!(f, "partition {key} is already registered")
            }
            SimError::UnknownPartitionKey { key } => {
                write!(f, "no partition registered under {key}")
            }
            SimError::NotPartitionOwner { key, owner, caller } => {
                write!(
                    f,
                    "partition {key} belongs to {owner}, not to caller {caller}"
                )
            }
            SimError::ReservedPartitionTrigger { key, event } => {
                write!(
                    f,
                    "partition {key} declares sensitivity to reserved lifecycle event {event}"
                )
            }
            SimError::InvalidLabelConstraint { expected, got } => {
                write!(
                    f,
                    "label constraint names {got} dimensions but the partition has {expected} labelers"
                )
            }
            SimError::InvalidSamplingWeight { key, weight } => {
                write!(
                    f,
                    "weighting function for partition {key} returned invalid weight {weight}"
                )
            }
        }
    }
}

impl std::error::Error for SimError {}
