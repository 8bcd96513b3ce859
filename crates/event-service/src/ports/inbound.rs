//! Inbound Ports (Driving Ports)
//!
//! The API external components use to talk to an event service. Callers that
//! want to swap implementations (or mock the service) depend on this trait
//! instead of `EventService` directly.

use async_trait::async_trait;
use shared_bus::MessageCallback;
use shared_types::{DeliveryOptions, Envelope, OutgoingMessage};
use std::sync::Arc;

use crate::error::EventServiceError;
use crate::metrics::{PerformanceMetrics, ServiceStats};
use crate::service::{BroadcastReport, EventService};
use crate::subscription::SubscriptionHandle;

/// Primary event service API (Driving Port)
#[async_trait]
pub trait EventServiceApi<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Stamp and deliver a message to `target`.
    async fn send_message(
        &self,
        target: &str,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
    ) -> Result<Arc<Envelope<T>>, EventServiceError>;

    /// Subscribe to messages addressed to this module.
    async fn subscribe_to_messages(
        &self,
        callback: MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<SubscriptionHandle<T>, EventServiceError>;

    /// Remove a subscription. Unknown callbacks are not an error.
    async fn unsubscribe_from_messages(
        &self,
        callback: &MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<bool, EventServiceError>;

    /// Remove every subscription of this instance.
    async fn unsubscribe_all(&self) -> Result<usize, EventServiceError>;

    /// Fan one message out to several targets.
    async fn broadcast_message(
        &self,
        targets: Vec<String>,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
    ) -> Result<BroadcastReport, EventServiceError>;

    fn service_stats(&self) -> ServiceStats;

    fn performance_metrics(&self) -> PerformanceMetrics;
}

#[async_trait]
impl<T> EventServiceApi<T> for EventService<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn send_message(
        &self,
        target: &str,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
    ) -> Result<Arc<Envelope<T>>, EventServiceError> {
        EventService::send_message(self, target, message, options).await
    }

    async fn subscribe_to_messages(
        &self,
        callback: MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<SubscriptionHandle<T>, EventServiceError> {
        EventService::subscribe_to_messages(self, callback, options).await
    }

    async fn unsubscribe_from_messages(
        &self,
        callback: &MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<bool, EventServiceError> {
        EventService::unsubscribe_from_messages(self, callback, options).await
    }

    async fn unsubscribe_all(&self) -> Result<usize, EventServiceError> {
        EventService::unsubscribe_all(self).await
    }

    async fn broadcast_message(
        &self,
        targets: Vec<String>,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
    ) -> Result<BroadcastReport, EventServiceError> {
        EventService::broadcast_message(self, targets, message, options).await
    }

    fn service_stats(&self) -> ServiceStats {
        EventService::service_stats(self)
    }

    fn performance_metrics(&self) -> PerformanceMetrics {
        EventService::performance_metrics(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::create_event_service;
    use parking_lot::Mutex;
    use shared_bus::RecordingBridge;

    #[tokio::test]
    async fn test_service_driven_through_trait_object() {
        let bridge = Arc::new(RecordingBridge::<u32>::new());
        let service = create_event_service::<u32>("p", "m1").unwrap();
        service.set_bridge(bridge.clone());
        let api: &dyn EventServiceApi<u32> = &service;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = MessageCallback::new(move |e: &Envelope<u32>| sink.lock().push(e.content));
        api.subscribe_to_messages(callback.clone(), DeliveryOptions::local())
            .await
            .unwrap()
            .detach();

        let envelope = api
            .send_message("m1", OutgoingMessage::new("tick", 1), DeliveryOptions::local())
            .await
            .unwrap();
        assert!(envelope.id.starts_with("msg-"));

        let report = api
            .broadcast_message(
                vec!["m1".into(), "m2".into()],
                OutgoingMessage::new("tick", 2),
                DeliveryOptions::local(),
            )
            .await
            .unwrap();
        assert!(report.all_fulfilled());
        assert_eq!(bridge.sent_to("m2").len(), 1);
        assert_eq!(*seen.lock(), vec![1, 2]);

        let metrics = api.performance_metrics();
        assert_eq!(metrics.messages_sent, 3);
        assert_eq!(metrics.messages_received, 2);
        assert_eq!(api.service_stats().subscriptions, 1);

        assert!(api
            .unsubscribe_from_messages(&callback, DeliveryOptions::local())
            .await
            .unwrap());
        assert_eq!(api.unsubscribe_all().await.unwrap(), 0);
        assert_eq!(api.service_stats().subscriptions, 0);
    }
}
