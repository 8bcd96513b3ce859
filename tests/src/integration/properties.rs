//! # Delivery Properties
//!
//! Subscription, replay, eviction, stamping and broadcast guarantees,
//! checked across services sharing one bridge.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use event_service::{EventServiceConfig, MessageCallback, SubscriptionHandle};
use parking_lot::Mutex;
use shared_types::{DeliveryOptions, Envelope};

use super::fixtures::{settle, tick, Collector, Hub};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// =============================================================================
// IDEMPOTENT SUBSCRIPTION
// =============================================================================

#[tokio::test]
async fn test_same_callback_delivered_once() {
    let hub = Hub::<u32>::new();
    let receiver = hub.service("m2");
    let sender = hub.service("m1");
    let collector = Collector::new();

    let _first = receiver
        .subscribe_to_messages(collector.callback(), DeliveryOptions::local())
        .await
        .unwrap();
    let _second = receiver
        .subscribe_to_messages(collector.callback(), DeliveryOptions::persistent())
        .await
        .unwrap();

    for n in 0..3 {
        sender
            .send_message("m2", tick(n), DeliveryOptions::local())
            .await
            .unwrap();
    }

    assert_eq!(collector.contents(), vec![0, 1, 2]);
    assert_eq!(receiver.subscription_count(), 1);
    assert_eq!(hub.bridge().local().listener_count(Some("m2")), 1);
}

// =============================================================================
// REPLAY COMPLETENESS AND EVICTION BOUND
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_replay_delivers_most_recent_in_order(sent in 0u32..40, max_queue_size in 1usize..16) {
        let (replayed, live) = block_on(async move {
            let hub = Hub::<u32>::new();
            let config = EventServiceConfig::new("eb-tests", "m2")
                .unwrap()
                .with_max_queue_size(max_queue_size);
            let service = hub.service_with(config);
            for n in 0..sent {
                service
                    .send_message("m2", tick(n), DeliveryOptions::persistent())
                    .await
                    .unwrap();
            }

            let collector = Collector::new();
            let _subscription = service
                .subscribe_to_messages(collector.callback(), DeliveryOptions::persistent())
                .await
                .unwrap();
            let replayed = collector.contents();

            service
                .send_message("m2", tick(u32::MAX), DeliveryOptions::local())
                .await
                .unwrap();
            (replayed, collector.contents())
        });

        let kept = (sent as usize).min(max_queue_size) as u32;
        let expected: Vec<u32> = (sent - kept..sent).collect();
        prop_assert_eq!(&replayed, &expected);
        prop_assert_eq!(live.last().copied(), Some(u32::MAX));
        prop_assert_eq!(live.len(), expected.len() + 1);
    }

    #[test]
    fn prop_queue_never_exceeds_bound(max_queue_size in 1usize..16, extra in 0usize..16) {
        let queued = block_on(async move {
            let hub = Hub::<u32>::new();
            let config = EventServiceConfig::new("eb-tests", "m1")
                .unwrap()
                .with_max_queue_size(max_queue_size);
            let service = hub.service_with(config);
            for n in 0..(max_queue_size + extra) as u32 {
                service
                    .send_message("m3", tick(n), DeliveryOptions::persistent())
                    .await
                    .unwrap();
            }
            service
                .queue_snapshot("m3")
                .iter()
                .map(|e| e.content)
                .collect::<Vec<u32>>()
        });

        let expected: Vec<u32> = (extra as u32..(max_queue_size + extra) as u32).collect();
        prop_assert_eq!(queued, expected);
    }
}

// =============================================================================
// UNSUBSCRIBE IS FINAL
// =============================================================================

#[tokio::test]
async fn test_no_delivery_after_unsubscribe() {
    let hub = Hub::<u32>::new();
    let receiver = hub.service("m2");
    let sender = hub.service("m1");
    let collector = Collector::new();

    receiver
        .subscribe_to_messages(collector.callback(), DeliveryOptions::local())
        .await
        .unwrap()
        .detach();
    sender
        .send_message("m2", tick(1), DeliveryOptions::local())
        .await
        .unwrap();

    assert!(receiver
        .unsubscribe_from_messages(&collector.callback(), DeliveryOptions::local())
        .await
        .unwrap());
    sender
        .send_message("m2", tick(2), DeliveryOptions::local())
        .await
        .unwrap();

    assert_eq!(collector.contents(), vec![1]);
}

#[tokio::test]
async fn test_dropped_handle_stops_delivery_before_bridge_cleanup() {
    let hub = Hub::<u32>::new();
    let receiver = hub.service("m2");
    let sender = hub.service("m1");
    let collector = Collector::new();

    let handle = receiver
        .subscribe_to_messages(collector.callback(), DeliveryOptions::local())
        .await
        .unwrap();
    drop(handle);

    // The bridge listener may still be attached; it must not deliver.
    sender
        .send_message("m2", tick(1), DeliveryOptions::local())
        .await
        .unwrap();
    assert!(collector.is_empty());

    settle().await;
    assert_eq!(hub.bridge().local().listener_count(Some("m2")), 0);
}

#[tokio::test]
async fn test_handle_dropped_inside_callback() {
    let hub = Hub::<u32>::new();
    let receiver = hub.service("m2");
    let sender = hub.service("m1");

    let delivered = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<SubscriptionHandle<u32>>>> = Arc::new(Mutex::new(None));

    // Releases its own subscription on the second delivery.
    let counter = Arc::clone(&delivered);
    let own_handle = Arc::clone(&slot);
    let callback = MessageCallback::new(move |_: &Envelope<u32>| {
        if counter.fetch_add(1, Ordering::SeqCst) == 1 {
            drop(own_handle.lock().take());
        }
    });

    let handle = receiver
        .subscribe_to_messages(callback, DeliveryOptions::local())
        .await
        .unwrap();
    *slot.lock() = Some(handle);

    for n in 0..4 {
        sender
            .send_message("m2", tick(n), DeliveryOptions::local())
            .await
            .unwrap();
    }

    assert_eq!(delivered.load(Ordering::SeqCst), 2);
    assert_eq!(receiver.subscription_count(), 0);
}

// =============================================================================
// STAMPING IS AUTHORITATIVE
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_caller_identity_fields_ignored(
        forged_id in "[a-z0-9-]{1,24}",
        forged_module in "[a-z]{1,12}",
        forged_time in "[0-9TZ:.-]{1,24}",
    ) {
        let envelope = block_on(async {
            let hub = Hub::<Value>::new();
            let service = hub.service("m1");
            service
                .send_json(
                    "m2",
                    &json!({
                        "type": "spoof",
                        "id": forged_id.clone(),
                        "source": {"moduleId": forged_module.clone()},
                        "timestamp": forged_time.clone(),
                    }),
                    &Value::Null,
                )
                .await
                .unwrap()
        });

        prop_assert!(envelope.id.starts_with("msg-"));
        prop_assert_ne!(&envelope.id, &forged_id);
        prop_assert_eq!(envelope.source.module_id.as_str(), "m1");
        prop_assert_eq!(envelope.source.plugin_id.as_str(), "eb-tests");
        prop_assert_ne!(&envelope.timestamp, &forged_time);
        prop_assert_eq!(&envelope.metadata.message_id, &envelope.id);
        prop_assert_eq!(&envelope.content, &json!({}));
    }
}

// =============================================================================
// PARTIAL BROADCAST FAILURE ISOLATION
// =============================================================================

#[tokio::test]
async fn test_broadcast_failure_isolated_to_one_target() {
    let hub = Hub::<u32>::failing_for(["b"]);
    let sender = hub.service("m1");

    let mut receivers = Vec::new();
    for name in ["a", "b", "c"] {
        let service = hub.service(name);
        let collector = Collector::new();
        let handle = service
            .subscribe_to_messages(collector.callback(), DeliveryOptions::local())
            .await
            .unwrap();
        receivers.push((service, handle, collector));
    }

    let report = sender
        .broadcast_message(["a", "b", "c"], tick(7), DeliveryOptions::local())
        .await
        .unwrap();

    assert_eq!(report.fulfilled(), vec!["a", "c"]);
    assert_eq!(report.rejected(), vec!["b"]);
    assert!(!report.all_fulfilled());

    let delivered: Vec<usize> = receivers.iter().map(|(_, _, c)| c.len()).collect();
    assert_eq!(delivered, vec![1, 0, 1]);

    let metrics = sender.performance_metrics();
    assert_eq!(metrics.messages_sent, 2);
    assert_eq!(metrics.error_count, 1);
}
