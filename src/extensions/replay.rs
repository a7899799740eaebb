//! Event replay over the extension pipeline.
//!
//! Some Bayeux servers can re-deliver missed events when a subscribe
//! request names the last replay id seen per channel, negotiated through
//! the `ext` field. This extension handles the whole exchange:
//!
//! 1. Outgoing handshakes advertise replay support (`ext.replay = true`)
//! 2. An incoming handshake that echoes the flag marks the server capable
//! 3. Outgoing subscribes then carry the per-channel replay-id map
//! 4. Incoming broadcast events have their replay ids harvested from
//!    `data.event.replayId`
//! 5. Incoming unsubscribe acknowledgments drop the channel's stored id
//!
//! Replay ids live in a [`ReplayStore`]; the in-memory default forgets
//! everything on restart, and callers who need resumption across restarts
//! supply their own store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::extension::MessageExtension;
use crate::protocol::channel::{META_HANDSHAKE, META_SUBSCRIBE, META_UNSUBSCRIBE};
use crate::protocol::{ChannelType, Message};

/// The `ext` key servers use for the replay extension.
pub const EXTENSION_NAME: &str = "replay";

const EVENT_KEY: &str = "event";
const REPLAY_ID_KEY: &str = "replayId";

/// Stores the last replay id seen per channel.
pub trait ReplayStore: Send + Sync {
    /// Record the latest replay id for `channel`.
    fn set(&self, channel: &str, replay_id: i64);
    /// The stored replay id for `channel`, if any.
    fn get(&self, channel: &str) -> Option<i64>;
    /// Forget the replay id for `channel`.
    fn delete(&self, channel: &str);
    /// A snapshot of every stored channel and id.
    fn as_map(&self) -> HashMap<String, i64>;
}

/// The default [`ReplayStore`]: a locked in-memory map.
#[derive(Debug, Default)]
pub struct MemoryReplayStore {
    store: RwLock<HashMap<String, i64>>,
}

impl MemoryReplayStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayStore for MemoryReplayStore {
    fn set(&self, channel: &str, replay_id: i64) {
        self.store.write().insert(channel.to_string(), replay_id);
    }

    fn get(&self, channel: &str) -> Option<i64> {
        self.store.read().get(channel).copied()
    }

    fn delete(&self, channel: &str) {
        self.store.write().remove(channel);
    }

    fn as_map(&self) -> HashMap<String, i64> {
        self.store.read().clone()
    }
}

/// A [`MessageExtension`] implementing event replay.
pub struct ReplayExtension {
    supported_by_server: AtomicBool,
    store: Arc<dyn ReplayStore>,
}

impl ReplayExtension {
    /// An extension backed by a fresh [`MemoryReplayStore`].
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryReplayStore::new()))
    }

    /// An extension backed by a caller-supplied store.
    pub fn with_store(store: Arc<dyn ReplayStore>) -> Self {
        ReplayExtension {
            supported_by_server: AtomicBool::new(false),
            store,
        }
    }

    /// Whether the server confirmed replay support during handshake.
    pub fn is_supported(&self) -> bool {
        self.supported_by_server.load(Ordering::SeqCst)
    }

    fn harvest_replay_id(&self, message: &Message) {
        let Some(data) = &message.data else {
            return;
        };
        let Ok(value) = serde_json::from_str::<Value>(data.get()) else {
            return;
        };
        let Some(replay_id) = value
            .get(EVENT_KEY)
            .and_then(|event| event.get(REPLAY_ID_KEY))
            .and_then(Value::as_i64)
        else {
            return;
        };
        self.store.set(message.channel.as_str(), replay_id);
    }
}

impl Default for ReplayExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageExtension for ReplayExtension {
    fn name(&self) -> &str {
        EXTENSION_NAME
    }

    fn outgoing(&self, message: &mut Message) {
        match message.channel.as_str() {
            META_HANDSHAKE => {
                message
                    .ext_mut()
                    .insert(EXTENSION_NAME.to_string(), Value::Bool(true));
            }
            META_SUBSCRIBE => {
                if self.is_supported() {
                    if let Ok(map) = serde_json::to_value(self.store.as_map()) {
                        message.ext_mut().insert(EXTENSION_NAME.to_string(), map);
                    }
                }
            }
            _ => {}
        }
    }

    fn incoming(&self, message: &mut Message) {
        match message.channel.channel_type() {
            ChannelType::Meta => match message.channel.as_str() {
                META_HANDSHAKE => {
                    let confirmed = message
                        .ext()
                        .and_then(|ext| ext.get(EXTENSION_NAME))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    if confirmed {
                        self.supported_by_server.store(true, Ordering::SeqCst);
                    }
                }
                META_UNSUBSCRIBE => {
                    if let Some(subscription) = &message.subscription {
                        self.store.delete(subscription.as_str());
                    }
                }
                _ => {}
            },
            ChannelType::Broadcast => self.harvest_replay_id(message),
            ChannelType::Service => {}
        }
    }

    fn unregistered(&self) {
        self.supported_by_server.store(false, Ordering::SeqCst);
    }
}
