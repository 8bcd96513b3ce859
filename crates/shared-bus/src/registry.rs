//! # Subscription Registry
//!
//! Tracks which callbacks listen on which channel.
//!
//! - Registration has set semantics per channel: the same callback reference
//!   registered twice is stored once.
//! - Removal of an unknown callback is a no-op.
//! - The lock is held across mutation and snapshotting only, never across
//!   callback invocation, so a callback may unregister itself.
//! - Removed registrations are deactivated before the lock is released.
//!   Dispatchers check the activity flag right before invoking, so no new
//!   delivery starts once `unregister` has returned.

use crate::callback::MessageCallback;
use parking_lot::RwLock;
use shared_types::DeliveryOptions;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One `(callback, options)` entry.
///
/// `listener` is what was actually handed to the transport. For plain
/// registrations it is the callback itself; the event service registers a
/// wrapping listener that adds metrics and replay gating.
pub struct Registration<T> {
    pub callback: MessageCallback<T>,
    pub listener: MessageCallback<T>,
    pub options: DeliveryOptions,
    active: Arc<AtomicBool>,
}

impl<T> Registration<T> {
    /// A registration whose listener is the callback itself.
    pub fn new(callback: MessageCallback<T>, options: DeliveryOptions) -> Self {
        Self {
            listener: callback.clone(),
            callback,
            options,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A registration with a distinct listener sharing `active` with it.
    pub fn with_listener(
        callback: MessageCallback<T>,
        listener: MessageCallback<T>,
        options: DeliveryOptions,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            callback,
            listener,
            options,
            active,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop all future deliveries through this registration.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            listener: self.listener.clone(),
            options: self.options,
            active: Arc::clone(&self.active),
        }
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("callback", &self.callback)
            .field("options", &self.options)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Channel -> registrations map.
pub struct SubscriptionRegistry<T> {
    channels: RwLock<HashMap<String, Vec<Registration<T>>>>,
}

impl<T> SubscriptionRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Add a registration to a channel.
    ///
    /// Returns `false` (and stores nothing) if the same callback is already
    /// registered on that channel.
    pub fn register(&self, channel: &str, registration: Registration<T>) -> bool {
        let mut channels = self.channels.write();
        let entries = channels.entry(channel.to_string()).or_default();

        if entries
            .iter()
            .any(|existing| existing.callback.same_as(&registration.callback))
        {
            debug!(channel, callback = ?registration.callback.id(), "Callback already registered");
            return false;
        }

        entries.push(registration);
        debug!(channel, subscriptions = entries.len(), "Callback registered");
        true
    }

    /// Remove a callback from a channel.
    ///
    /// Returns the removed registration, already deactivated, or `None` if
    /// the callback was not registered.
    pub fn unregister(
        &self,
        channel: &str,
        callback: &MessageCallback<T>,
    ) -> Option<Registration<T>> {
        let mut channels = self.channels.write();
        let entries = channels.get_mut(channel)?;
        let index = entries
            .iter()
            .position(|existing| existing.callback.same_as(callback))?;

        let removed = entries.remove(index);
        removed.deactivate();
        if entries.is_empty() {
            channels.remove(channel);
        }
        debug!(channel, callback = ?callback.id(), "Callback unregistered");
        Some(removed)
    }

    /// Remove every registration on every channel.
    ///
    /// Returns what was removed so the caller can release transport-side
    /// listeners. Calling this on an empty registry returns an empty list.
    pub fn unregister_all(&self) -> Vec<(String, Registration<T>)> {
        let drained: Vec<(String, Registration<T>)> = {
            let mut channels = self.channels.write();
            channels
                .drain()
                .flat_map(|(channel, entries)| {
                    entries
                        .into_iter()
                        .map(move |entry| (channel.clone(), entry))
                })
                .collect()
        };

        for (_, registration) in &drained {
            registration.deactivate();
        }
        if !drained.is_empty() {
            debug!(removed = drained.len(), "All callbacks unregistered");
        }
        drained
    }

    /// Active subscriptions on one channel, or across all channels.
    #[must_use]
    pub fn count(&self, channel: Option<&str>) -> usize {
        let channels = self.channels.read();
        match channel {
            Some(channel) => channels.get(channel).map_or(0, Vec::len),
            None => channels.values().map(Vec::len).sum(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count(None) == 0
    }

    #[must_use]
    pub fn contains(&self, channel: &str, callback: &MessageCallback<T>) -> bool {
        self.channels
            .read()
            .get(channel)
            .is_some_and(|entries| entries.iter().any(|e| e.callback.same_as(callback)))
    }

    /// Look up the registration for a callback.
    #[must_use]
    pub fn get(&self, channel: &str, callback: &MessageCallback<T>) -> Option<Registration<T>> {
        self.channels
            .read()
            .get(channel)?
            .iter()
            .find(|e| e.callback.same_as(callback))
            .cloned()
    }

    /// Snapshot of active listeners on a channel, in registration order.
    #[must_use]
    pub fn listeners(&self, channel: &str) -> Vec<(MessageCallback<T>, Arc<AtomicBool>)> {
        self.channels
            .read()
            .get(channel)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_active())
                    .map(|e| (e.listener.clone(), Arc::clone(&e.active)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Channels with at least one registration.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl<T> Default for SubscriptionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SubscriptionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("channels", &self.channels())
            .field("subscriptions", &self.count(None))
            .finish()
    }
}
