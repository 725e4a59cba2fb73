//! Cross-boundary contracts shared by the simulation kernel and any process
//! embedding it: entity handles, partition keys, label values, run
//! configuration, run status, and the untyped output envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod seed_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Handle for one entity in the simulated population.
///
/// Ids are dense indexes assigned by the population store in creation order.
/// The kernel never interprets the value; it only compares and hashes it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PersonId(pub usize);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "person:{}", self.0)
    }
}

/// Opaque, caller-supplied name for a partition. At most one partition may be
/// registered per key; the empty string is rejected at registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PartitionKey {
    fn from(raw: &str) -> Self {
        PartitionKey(raw.to_string())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the module that registered a partition. Removal is only
/// honored when the caller presents the same identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl From<&str> for OwnerId {
    fn from(raw: &str) -> Self {
        OwnerId(raw.to_string())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One derived label for an entity, produced by a labeler.
///
/// A closed variant set with total ordering, so label tuples can key ordered
/// maps and sampling walks them in a reproducible order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LabelValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Bool(value) => write!(f, "{value}"),
            LabelValue::Int(value) => write!(f, "{value}"),
            LabelValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for LabelValue {
    fn from(value: bool) -> Self {
        LabelValue::Bool(value)
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::Int(value)
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Text(value.to_string())
    }
}

/// The full tuple of label values for one entity within one partition, in
/// labeler registration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LabelSet(pub Vec<LabelValue>);

impl LabelSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, dimension: usize) -> Option<&LabelValue> {
        self.0.get(dimension)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<LabelValue>> for LabelSet {
    fn from(values: Vec<LabelValue>) -> Self {
        LabelSet(values)
    }
}

/// Run configuration for one kernel instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "seed_string")]
    pub seed: u64,
    /// The kernel stops before executing any plan scheduled later than this
    /// horizon; `None` runs until the plan queue drains or a halt is issued.
    pub end_time: Option<f64>,
    pub notes: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "run_local_001".to_string(),
            seed: 1337,
            end_time: None,
            notes: None,
        }
    }
}

/// Point-in-time description of a kernel, suitable for progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelStatus {
    pub schema_version: String,
    pub run_id: String,
    pub current_time: f64,
    pub queue_depth: usize,
    pub halted: bool,
}

impl fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={} time={} queue_depth={} halted={}",
            self.run_id, self.current_time, self.queue_depth, self.halted
        )
    }
}

/// One record released through the output channel at simulation close.
///
/// The kernel imposes no schema on `payload`; it forwards whatever the data
/// manager produced, tagged with the manager's name and the release time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputRecord {
    pub run_id: String,
    pub time: f64,
    pub source: String,
    pub payload: Value,
}
