//! Handler registry with per-channel reference counting.

use hrdesk_protocol::{ChannelName, HitlEventPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Callback type for handling decoded events.
pub type EventHandler =
    Arc<dyn Fn(HitlEventPayload) -> std::result::Result<(), String> + Send + Sync>;

/// Handle identifying one registered handler on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    channel: ChannelName,
    id: u64,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    channels: HashMap<String, Vec<(u64, EventHandler)>>,
}

/// Registry mapping channel names to their handler sets.
///
/// Dispatch runs with the registry lock held, so `remove` cannot return
/// while a dispatch for that handler is mid-flight; once `remove` returns
/// the handler is never invoked again. Handlers must therefore not call
/// back into the registry.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Returns the handle and whether this is the first
    /// handler for the channel (the caller then owns the transport join).
    pub fn register(&self, channel: &ChannelName, handler: EventHandler) -> (SubscriptionHandle, bool) {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let handlers = inner.channels.entry(channel.as_str().to_string()).or_default();
        let first = handlers.is_empty();
        handlers.push((id, handler));
        (
            SubscriptionHandle {
                channel: channel.clone(),
                id,
            },
            first,
        )
    }

    /// Remove exactly the handler behind `handle`. Returns whether the
    /// channel's handler set became empty (the caller then owns the
    /// transport leave).
    pub fn remove(&self, handle: &SubscriptionHandle) -> bool {
        let mut inner = self.lock();
        let Some(handlers) = inner.channels.get_mut(handle.channel.as_str()) else {
            return false;
        };
        handlers.retain(|(id, _)| *id != handle.id);
        if handlers.is_empty() {
            inner.channels.remove(handle.channel.as_str());
            return true;
        }
        false
    }

    /// Invoke every handler registered for `channel`. Returns the number of
    /// handlers invoked; a name nothing is registered for invokes zero.
    pub fn dispatch(&self, channel: &str, payload: &HitlEventPayload) -> usize {
        let inner = self.lock();
        let Some(handlers) = inner.channels.get(channel) else {
            return 0;
        };
        let mut invoked = 0;
        for (_, handler) in handlers {
            if let Err(error) = handler(payload.clone()) {
                warn!("subscription callback error on {}: {}", channel, error);
            }
            invoked += 1;
        }
        invoked
    }

    /// Whether any channel still has handlers.
    pub fn is_empty(&self) -> bool {
        self.lock().channels.is_empty()
    }

    /// Names of all channels with at least one handler (resubscribe set).
    pub fn channel_names(&self) -> Vec<String> {
        self.lock().channels.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
