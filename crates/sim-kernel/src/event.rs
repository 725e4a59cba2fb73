//! Typed publish/subscribe event bus.
//!
//! An event's identity is its Rust type: the subscriber table is indexed by
//! `TypeId`, built at setup time, and dispatch never inspects payloads beyond
//! an optional label extraction. Handlers run synchronously in registration
//! order. A handler may publish further events; those nested dispatches
//! complete depth-first before control returns to the outer publisher.
//!
//! The bus stores subscriptions; the dispatch loop itself lives on
//! [`Kernel::publish`](crate::kernel::Kernel::publish) because handlers
//! receive the kernel mutably. Dispatch snapshots the subscriber list per
//! publish, so handlers may subscribe and unsubscribe freely while a dispatch
//! is in flight.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use contracts::LabelValue;

use crate::error::SimError;
use crate::kernel::Kernel;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

/// Identity of an event labeler within one event type's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventLabelerId(pub u64);

pub(crate) type ErasedHandler = Rc<dyn Fn(&mut Kernel, &dyn Any) -> Result<(), SimError>>;
pub(crate) type ErasedExtractor = Rc<dyn Fn(&dyn Any) -> Vec<LabelValue>>;

/// What a subscription listens for: every event of the type, or only events
/// whose derived label matches a key.
#[derive(Clone)]
pub(crate) enum Selector {
    All,
    Labeled {
        labeler: EventLabelerId,
        key: LabelValue,
    },
}

#[derive(Clone)]
pub(crate) struct DispatchEntry {
    pub(crate) selector: Selector,
    pub(crate) handler: ErasedHandler,
}

#[derive(Default)]
struct Channel {
    // Registration-ordered; labeled and unlabeled entries share one list so
    // dispatch order is exactly subscription order.
    entries: Vec<(SubscriptionId, DispatchEntry)>,
    labelers: Vec<(EventLabelerId, ErasedExtractor)>,
}

#[derive(Default)]
pub(crate) struct EventBus {
    channels: HashMap<TypeId, Channel>,
    subscription_index: HashMap<u64, TypeId>,
    next_subscription: u64,
    published: u64,
    replay_hash: u64,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe_all(
        &mut self,
        type_id: TypeId,
        handler: ErasedHandler,
    ) -> SubscriptionId {
        self.push_entry(type_id, Selector::All, handler)
    }

    pub(crate) fn subscribe_labeled(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        labeler: EventLabelerId,
        key: LabelValue,
        handler: ErasedHandler,
    ) -> Result<SubscriptionId, SimError> {
        let known = self
            .channels
            .get(&type_id)
            .is_some_and(|channel| channel.labelers.iter().any(|(id, _)| *id == labeler));
        if !known {
            return Err(SimError::UnknownEventLabeler {
                labeler: labeler.0,
                event: type_name,
            });
        }
        Ok(self.push_entry(type_id, Selector::Labeled { labeler, key }, handler))
    }

    fn push_entry(
        &mut self,
        type_id: TypeId,
        selector: Selector,
        handler: ErasedHandler,
    ) -> SubscriptionId {
        let channel = self.channels.entry(type_id).or_default();
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);
        channel.entries.push((id, DispatchEntry { selector, handler }));
        self.subscription_index.insert(id.0, type_id);
        id
    }

    pub(crate) fn add_labeler(
        &mut self,
        type_id: TypeId,
        type_name: &'static str,
        labeler: EventLabelerId,
        extractor: ErasedExtractor,
    ) -> Result<(), SimError> {
        let channel = self.channels.entry(type_id).or_default();
        if channel.labelers.iter().any(|(id, _)| *id == labeler) {
            return Err(SimError::DuplicateEventLabeler {
                labeler: labeler.0,
                event: type_name,
            });
        }
        channel.labelers.push((labeler, extractor));
        Ok(())
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), SimError> {
        let type_id = self
            .subscription_index
            .remove(&id.0)
            .ok_or(SimError::UnknownSubscription { subscription: id.0 })?;
        if let Some(channel) = self.channels.get_mut(&type_id) {
            channel.entries.retain(|(entry_id, _)| *entry_id != id);
        }
        Ok(())
    }

    pub(crate) fn subscribers_exist(&self, type_id: TypeId) -> bool {
        self.channels
            .get(&type_id)
            .map_or(false, |channel| !channel.entries.is_empty())
    }

    /// Clone the dispatch list and labelers for one publish pass.
    pub(crate) fn snapshot(
        &self,
        type_id: TypeId,
    ) -> Option<(Vec<DispatchEntry>, Vec<(EventLabelerId, ErasedExtractor)>)> {
        self.channels.get(&type_id).map(|channel| {
            (
                channel
                    .entries
                    .iter()
                    .map(|(_, entry)| entry.clone())
                    .collect(),
                channel.labelers.clone(),
            )
        })
    }

    /// Fold one issued event into the running replay hash and publish count.
    pub(crate) fn note_publish(&mut self, type_name: &'static str, time: f64) {
        self.published = self.published.saturating_add(1);
        self.replay_hash = mix_replay_hash(self.replay_hash, type_name, time, self.published);
    }

    pub(crate) fn published(&self) -> u64 {
        self.published
    }

    pub(crate) fn replay_hash(&self) -> u64 {
        self.replay_hash
    }
}

fn mix_replay_hash(current: u64, type_name: &str, time: f64, sequence: u64) -> u64 {
    let mut hash = current ^ time.to_bits().wrapping_mul(0xA24B_1C62_5B93_2D47);
    hash ^= sequence.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for byte in type_name.as_bytes() {
        hash = hash.rotate_left(7) ^ u64::from(*byte);
        hash = hash.wrapping_mul(0x517C_C1B7_2722_0A95);
    }
    hash
}
