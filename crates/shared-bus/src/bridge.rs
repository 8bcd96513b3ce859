//! # Bridge
//!
//! The bridge is the host-owned transport an event service delegates actual
//! delivery to. The event service never owns a bridge: it holds a weak
//! reference and never reconnects or recreates it.
//!
//! `InMemoryBridge` is a reference implementation delivering synchronously to
//! listeners registered in the same process. Suitable for single-process
//! hosts and tests; a host with remote instances supplies its own bridge.

use crate::callback::MessageCallback;
use crate::registry::{Registration, SubscriptionRegistry};
use async_trait::async_trait;
use shared_types::{BridgeError, DeliveryOptions, Envelope};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Host transport contract.
///
/// Any method may fail; the event service wraps failures into its own error
/// kinds and never swallows them.
#[async_trait]
pub trait Bridge<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Deliver `envelope` to every listener of `target_module_id`, and to
    /// remote targets when `options.remote` is set.
    async fn send_message(
        &self,
        target_module_id: &str,
        envelope: &Envelope<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError>;

    /// Start delivering messages addressed to `module_id` to `listener`.
    async fn subscribe_to_messages(
        &self,
        module_id: &str,
        listener: MessageCallback<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError>;

    /// Stop delivering to `listener`. Unknown listeners are not an error.
    async fn unsubscribe_from_messages(
        &self,
        module_id: &str,
        listener: &MessageCallback<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError>;
}

/// In-process bridge.
///
/// Listener panics are isolated: one failing listener does not prevent
/// delivery to the others. Sending to a module with no listeners succeeds.
pub struct InMemoryBridge<T> {
    listeners: SubscriptionRegistry<T>,
    messages_routed: AtomicU64,
    deliveries: AtomicU64,
    remote_dispatches: AtomicU64,
    listener_failures: AtomicU64,
}

impl<T> InMemoryBridge<T> {
    /// Create a bridge with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: SubscriptionRegistry::new(),
            messages_routed: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            remote_dispatches: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
        }
    }

    /// Listeners on one module, or on all modules.
    #[must_use]
    pub fn listener_count(&self, module_id: Option<&str>) -> usize {
        self.listeners.count(module_id)
    }

    /// Total messages accepted by `send_message`.
    pub fn messages_routed(&self) -> u64 {
        self.messages_routed.load(Ordering::Relaxed)
    }

    /// Total listener invocations that completed.
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Messages that requested remote fan-out.
    pub fn remote_dispatches(&self) -> u64 {
        self.remote_dispatches.load(Ordering::Relaxed)
    }

    /// Listener invocations that panicked.
    pub fn listener_failures(&self) -> u64 {
        self.listener_failures.load(Ordering::Relaxed)
    }

    /// Synchronously deliver to the local listeners of `target`.
    ///
    /// Returns the number of listeners that handled the envelope.
    pub fn dispatch(&self, target: &str, envelope: &Envelope<T>) -> usize {
        let listeners = self.listeners.listeners(target);
        if listeners.is_empty() {
            trace!(target_module = target, message_id = %envelope.id, "No listeners for message");
            return 0;
        }

        let mut delivered = 0;
        for (listener, active) in listeners {
            // Unregistered after the snapshot was taken.
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match listener.try_invoke(envelope) {
                Ok(()) => {
                    delivered += 1;
                    self.deliveries.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target_module = target,
                        message_id = %envelope.id,
                        error = %panic,
                        "Listener panicked"
                    );
                }
            }
        }
        delivered
    }
}

impl<T> Default for InMemoryBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Bridge<T> for InMemoryBridge<T>
where
    T: Send + Sync + 'static,
{
    async fn send_message(
        &self,
        target_module_id: &str,
        envelope: &Envelope<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError> {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);

        if options.remote {
            self.remote_dispatches.fetch_add(1, Ordering::Relaxed);
            debug!(
                target_module = target_module_id,
                message_id = %envelope.id,
                "Remote fan-out requested, no remote transport attached"
            );
        }

        let delivered = self.dispatch(target_module_id, envelope);
        debug!(
            target_module = target_module_id,
            message_id = %envelope.id,
            message_type = %envelope.message_type,
            listeners = delivered,
            "Message routed"
        );
        Ok(())
    }

    async fn subscribe_to_messages(
        &self,
        module_id: &str,
        listener: MessageCallback<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError> {
        if module_id.is_empty() {
            return Err(BridgeError::Rejected("empty module id".to_string()));
        }
        self.listeners
            .register(module_id, Registration::new(listener, *options));
        Ok(())
    }

    async fn unsubscribe_from_messages(
        &self,
        module_id: &str,
        listener: &MessageCallback<T>,
        _options: &DeliveryOptions,
    ) -> Result<(), BridgeError> {
        self.listeners.unregister(module_id, listener);
        Ok(())
    }
}
