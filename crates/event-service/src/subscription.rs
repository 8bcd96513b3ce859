//! Scoped subscriptions
//!
//! `SubscriptionHandle` pairs every registration with its release:
//!
//! - `unsubscribe().await`: deterministic removal, bridge errors reported.
//! - drop: the registration is deactivated immediately (no further
//!   deliveries) and the bridge removal is spawned on the current tokio
//!   runtime.
//! - `detach()`: keep the subscription until `unsubscribe_from_messages` or
//!   `unsubscribe_all`.

use crate::error::EventServiceError;
use crate::service::event_service::ServiceCore;
use shared_bus::MessageCallback;
use shared_types::{DeliveryOptions, Envelope};
use std::fmt;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// Releases its subscription when dropped.
#[must_use = "dropping a SubscriptionHandle unsubscribes immediately; use detach() to keep it"]
pub struct SubscriptionHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    core: Weak<ServiceCore<T>>,
    callback: MessageCallback<T>,
    options: DeliveryOptions,
    /// Whether dropping this handle releases the registration.
    owns_registration: bool,
}

impl<T> SubscriptionHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn owning(
        core: Weak<ServiceCore<T>>,
        callback: MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            core,
            callback,
            options,
            owns_registration: true,
        }
    }

    /// A handle to a registration some other handle already owns.
    pub(crate) fn borrowed(
        core: Weak<ServiceCore<T>>,
        callback: MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            core,
            callback,
            options,
            owns_registration: false,
        }
    }

    /// The subscribed callback.
    pub fn callback(&self) -> &MessageCallback<T> {
        &self.callback
    }

    pub fn options(&self) -> DeliveryOptions {
        self.options
    }

    /// Whether the callback is still registered with the service.
    pub fn is_active(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| core.is_registered(&self.callback))
    }

    /// Remove the subscription and wait for the bridge to release it.
    ///
    /// Returns `false` if it had already been removed.
    pub async fn unsubscribe(mut self) -> Result<bool, EventServiceError> {
        self.owns_registration = false;
        match self.core.upgrade() {
            Some(core) => core.unsubscribe(&self.callback, Some(self.options)).await,
            None => Ok(false),
        }
    }

    /// Keep the subscription alive past this handle.
    pub fn detach(mut self) {
        self.owns_registration = false;
    }
}

impl<T> Drop for SubscriptionHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.owns_registration {
            return;
        }
        if let Some(core) = self.core.upgrade() {
            core.release(&self.callback);
        }
    }
}

impl<T> fmt::Debug for SubscriptionHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("callback", &self.callback)
            .field("options", &self.options)
            .field("owns_registration", &self.owns_registration)
            .finish()
    }
}

/// Envelopes delivered to a stream subscription, in delivery order.
pub struct EnvelopeStream<T> {
    inner: UnboundedReceiverStream<Envelope<T>>,
}

impl<T> EnvelopeStream<T> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<Envelope<T>>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(receiver),
        }
    }

    /// Next delivered envelope, or `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<Envelope<T>> {
        self.inner.next().await
    }

    /// Envelopes already delivered, without waiting.
    pub fn drain_ready(&mut self) -> Vec<Envelope<T>> {
        let receiver = self.inner.as_mut();
        let mut ready = Vec::new();
        while let Ok(envelope) = receiver.try_recv() {
            ready.push(envelope);
        }
        ready
    }
}

impl<T> Stream for EnvelopeStream<T> {
    type Item = Envelope<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::{OutgoingMessage, SourceIdentity};
    use tokio_test::{assert_pending, assert_ready, task};

    fn envelope(n: u32) -> Envelope<u32> {
        Envelope::stamp(
            format!("msg-{n}"),
            SourceIdentity::new("p", "m"),
            "m",
            OutgoingMessage::new("tick", n),
            DeliveryOptions::local(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_stream_wakes_on_delivery() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut stream = task::spawn(EnvelopeStream::new(receiver));

        assert_pending!(stream.poll_next());
        sender.send(envelope(1)).unwrap();
        assert!(stream.is_woken());

        let delivered = assert_ready!(stream.poll_next());
        assert_eq!(delivered.map(|e| e.content), Some(1));

        drop(sender);
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[test]
    fn test_drain_ready_keeps_order() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut stream = EnvelopeStream::new(receiver);
        for n in 0..3 {
            sender.send(envelope(n)).unwrap();
        }

        let drained: Vec<u32> = stream.drain_ready().into_iter().map(|e| e.content).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(stream.drain_ready().is_empty());
    }
}
