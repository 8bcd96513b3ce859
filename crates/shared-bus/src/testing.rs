//! # Test Bridge
//!
//! `RecordingBridge` records every call it receives, delivers locally through
//! an inner `InMemoryBridge`, and can be told to fail for chosen targets.
//!
//! Enabled with the `test-utils` feature.

use crate::bridge::{Bridge, InMemoryBridge};
use crate::callback::MessageCallback;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{BridgeError, DeliveryOptions, Envelope};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One `send_message` call as seen by the bridge.
#[derive(Debug, Clone)]
pub struct RecordedSend<T> {
    pub target: String,
    pub envelope: Envelope<T>,
    pub options: DeliveryOptions,
    /// `false` when the bridge was configured to fail for this target.
    pub accepted: bool,
}

/// Call-recording bridge with injectable failures.
pub struct RecordingBridge<T> {
    inner: InMemoryBridge<T>,
    sends: Mutex<Vec<RecordedSend<T>>>,
    failing_targets: Mutex<HashSet<String>>,
    fail_subscriptions: AtomicBool,
    fail_unsubscriptions: AtomicBool,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl<T> RecordingBridge<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: InMemoryBridge::new(),
            sends: Mutex::new(Vec::new()),
            failing_targets: Mutex::new(HashSet::new()),
            fail_subscriptions: AtomicBool::new(false),
            fail_unsubscriptions: AtomicBool::new(false),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Make `send_message` fail for these targets.
    #[must_use]
    pub fn failing_for<I, S>(self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_targets
            .lock()
            .extend(targets.into_iter().map(Into::into));
        self
    }

    /// Make subsequent `subscribe_to_messages` calls fail.
    pub fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `unsubscribe_from_messages` calls fail.
    pub fn fail_unsubscriptions(&self, fail: bool) {
        self.fail_unsubscriptions.store(fail, Ordering::SeqCst);
    }

    pub fn send_calls(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// The inner local bridge.
    pub fn local(&self) -> &InMemoryBridge<T> {
        &self.inner
    }
}

impl<T: Clone> RecordingBridge<T> {
    /// Every recorded send, in call order.
    pub fn sent(&self) -> Vec<RecordedSend<T>> {
        self.sends.lock().clone()
    }

    /// Recorded sends addressed to one target.
    pub fn sent_to(&self, target: &str) -> Vec<RecordedSend<T>> {
        self.sends
            .lock()
            .iter()
            .filter(|send| send.target == target)
            .cloned()
            .collect()
    }
}

impl<T> Default for RecordingBridge<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Bridge<T> for RecordingBridge<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn send_message(
        &self,
        target_module_id: &str,
        envelope: &Envelope<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError> {
        let accepted = !self.failing_targets.lock().contains(target_module_id);
        self.sends.lock().push(RecordedSend {
            target: target_module_id.to_string(),
            envelope: envelope.clone(),
            options: *options,
            accepted,
        });

        if !accepted {
            return Err(BridgeError::Transport(format!(
                "injected failure for {target_module_id}"
            )));
        }
        self.inner
            .send_message(target_module_id, envelope, options)
            .await
    }

    async fn subscribe_to_messages(
        &self,
        module_id: &str,
        listener: MessageCallback<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(BridgeError::Transport("injected subscribe failure".into()));
        }
        self.inner
            .subscribe_to_messages(module_id, listener, options)
            .await
    }

    async fn unsubscribe_from_messages(
        &self,
        module_id: &str,
        listener: &MessageCallback<T>,
        options: &DeliveryOptions,
    ) -> Result<(), BridgeError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unsubscriptions.load(Ordering::SeqCst) {
            return Err(BridgeError::Transport("injected unsubscribe failure".into()));
        }
        self.inner
            .unsubscribe_from_messages(module_id, listener, options)
            .await
    }
}
