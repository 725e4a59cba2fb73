//! Time-ordered plan queue.
//!
//! A plan is a closure bound to a simulation time. The queue orders plans by
//! `(time, tiebreak key, insertion sequence)`; plans scheduled without an
//! explicit key carry the default key `0`, so equal-time unkeyed plans run in
//! insertion order while keyed plans order among themselves by key. Every
//! component of the ordering is total and derived from insertion state, never
//! from wall-clock or hash iteration, which is what makes replays
//! reproducible.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::SimError;
use crate::kernel::Kernel;

/// Tiebreak key the partition engine reserves for end-of-timestep work. Any
/// plan carrying it runs after every other plan scheduled at the same time.
pub const TIEBREAK_LAST: i64 = i64::MAX;

/// Default tiebreak for plans scheduled without an explicit key.
pub const TIEBREAK_DEFAULT: i64 = 0;

pub type PlanAction = Box<dyn FnOnce(&mut Kernel) -> Result<(), SimError>>;

/// One scheduled unit of work. Owned exclusively by the queue until popped;
/// the `FnOnce` action is consumed on execution, so a popped plan can never
/// be re-inserted.
pub struct Plan {
    pub time: f64,
    pub tiebreak: i64,
    pub sequence: u64,
    pub action: PlanAction,
}

// ---------------------------------------------------------------------------
// Ordering for Plan in the BinaryHeap
// ---------------------------------------------------------------------------

/// Wrapper that provides Ord for Plan.
/// Ordering: (time ASC via total_cmp, tiebreak ASC, sequence ASC).
/// `Reverse` in the heap makes the smallest tuple pop first.
struct OrderedPlan(Plan);

impl PartialEq for OrderedPlan {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OrderedPlan {}

impl PartialOrd for OrderedPlan {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedPlan {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .time
            .total_cmp(&other.0.time)
            .then_with(|| self.0.tiebreak.cmp(&other.0.tiebreak))
            .then_with(|| self.0.sequence.cmp(&other.0.sequence))
    }
}

// ---------------------------------------------------------------------------
// PlanQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct PlanQueue {
    heap: BinaryHeap<Reverse<OrderedPlan>>,
    next_sequence: u64,
}

impl PlanQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Insert a plan. `current_time` is the kernel clock at the moment of the
    /// call; scheduling into the past or at a non-finite time is rejected.
    pub(crate) fn insert(
        &mut self,
        time: f64,
        tiebreak: i64,
        current_time: f64,
        action: PlanAction,
    ) -> Result<(), SimError> {
        if !time.is_finite() {
            return Err(SimError::PlanTimeNotFinite { requested: time });
        }
        if time < current_time {
            return Err(SimError::PlanInPast {
                requested: time,
                current: current_time,
            });
        }
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.heap.push(Reverse(OrderedPlan(Plan {
            time,
            tiebreak,
            sequence,
            action,
        })));
        Ok(())
    }

    /// Pop the earliest plan. Returns `None` when the queue is empty or the
    /// next plan lies beyond `horizon`.
    pub(crate) fn pop_next(&mut self, horizon: Option<f64>) -> Option<Plan> {
        let next_time = self.heap.peek()?.0.0.time;
        if let Some(end) = horizon {
            if next_time > end {
                return None;
            }
        }
        self.heap.pop().map(|entry| entry.0.0)
    }

    pub(crate) fn peek_next_time(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.0.0.time)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
