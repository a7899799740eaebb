//! Channel-to-subscriber routing table.
//!
//! The registry maps each subscribed channel to exactly one sink: the
//! sender half of a bounded batch channel. One routing slot per channel is
//! deliberate: if several consumers want the same channel, the caller
//! layers its own fan-out above the sink.
//!
//! All three operations are safe under concurrent access from the polling
//! task and caller tasks; the map sits behind a read-biased lock so lookups
//! on the hot delivery path don't contend with each other.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{BayeuxError, Result};
use crate::protocol::{Channel, Message};

/// The sender half a subscriber receives batches through.
pub type BatchSink = mpsc::Sender<Vec<Message>>;

/// A thread-safe map from channel to subscriber sink.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subs: RwLock<HashMap<Channel, BatchSink>>,
}

impl SubscriptionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` as the subscriber for `channel`.
    ///
    /// # Errors
    ///
    /// [`BayeuxError::AlreadySubscribed`] if the channel already has a
    /// sink; the existing registration is untouched.
    pub fn add(&self, channel: Channel, sink: BatchSink) -> Result<()> {
        let mut subs = self.subs.write();
        if subs.contains_key(&channel) {
            return Err(BayeuxError::AlreadySubscribed(channel));
        }
        subs.insert(channel, sink);
        Ok(())
    }

    /// Drop the registration for `channel`, if any. Idempotent.
    pub fn remove(&self, channel: &Channel) {
        self.subs.write().remove(channel);
    }

    /// The sink registered for `channel`.
    ///
    /// # Errors
    ///
    /// [`BayeuxError::NoSubscription`] if no sink is registered.
    pub fn get(&self, channel: &Channel) -> Result<BatchSink> {
        self.subs
            .read()
            .get(channel)
            .cloned()
            .ok_or_else(|| BayeuxError::NoSubscription(channel.clone()))
    }

    /// The channels currently registered, in no particular order.
    pub fn channels(&self) -> Vec<Channel> {
        self.subs.read().keys().cloned().collect()
    }
}
