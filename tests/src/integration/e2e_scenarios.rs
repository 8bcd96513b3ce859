//! # End-to-End Scenarios
//!
//! Services exchanging untyped JSON messages through one host bridge,
//! from construction to disposal.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use bridge_telemetry::{encode_registry, PrometheusRecorder};
use event_service::{
    create_event_service, ConfirmationTracker, DeliveryStatus, EventService, EventServiceConfig,
};
use shared_types::{DeliveryOptions, ErrorCode, OutgoingMessage};

use super::fixtures::{settle, Collector, Hub};

fn seq(n: u64) -> OutgoingMessage<Value> {
    OutgoingMessage::new("seq", json!(n))
}

// =============================================================================
// SCENARIO 1: SEND BEFORE CONNECT
// =============================================================================

#[tokio::test]
async fn test_send_before_bridge_fails_unavailable() {
    let m1 = create_event_service::<Value>("eb-tests", "m1").unwrap();

    let err = m1
        .send_json("m2", &json!({"type": "ping"}), &Value::Null)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    assert!(!m1.is_connected());
    assert_eq!(m1.performance_metrics().messages_sent, 0);
}

// =============================================================================
// SCENARIO 2: STAMPED, DELEGATED, PERSISTED
// =============================================================================

#[tokio::test]
async fn test_persistent_send_reaches_bridge_and_queue() {
    let hub = Hub::<Value>::new();
    let m1 = hub.service("m1");

    let envelope = m1
        .send_json(
            "m2",
            &json!({"type": "ping"}),
            &json!({"remote": false, "persist": true}),
        )
        .await
        .unwrap();

    let sent = hub.bridge().sent_to("m2");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].envelope.message_type, "ping");
    assert_eq!(sent[0].envelope.source.module_id, "m1");
    assert_eq!(sent[0].envelope.id, envelope.id);
    assert!(sent[0].options.persist);
    assert_eq!(m1.queue_len("m2"), 1);

    let stats = m1.service_stats();
    assert_eq!(stats.queued.get("m2"), Some(&1));
    assert_eq!(stats.performance.messages_sent, 1);
}

// =============================================================================
// SCENARIO 3: REPLAY BEFORE SUBSCRIBE RETURNS
// =============================================================================

#[tokio::test]
async fn test_backlog_replayed_before_subscribe_returns() {
    let hub = Hub::<Value>::new();
    let m2 = hub.service("m2");
    for n in 1..=3 {
        m2.send_message("m2", seq(n), DeliveryOptions::persistent())
            .await
            .unwrap();
    }

    let collector = Collector::new();
    let _subscription = m2
        .subscribe_to_messages(collector.callback(), DeliveryOptions::persistent())
        .await
        .unwrap();

    // Replay already happened when subscribe returned.
    assert_eq!(collector.contents(), vec![json!(1), json!(2), json!(3)]);

    // Live messages follow the backlog, once each.
    let m1 = hub.service("m1");
    m1.send_message("m2", seq(4), DeliveryOptions::local())
        .await
        .unwrap();
    assert_eq!(
        collector.contents(),
        vec![json!(1), json!(2), json!(3), json!(4)]
    );
}

// =============================================================================
// SCENARIO 4: BOUNDED QUEUE
// =============================================================================

#[tokio::test]
async fn test_queue_keeps_most_recent() {
    let hub = Hub::<Value>::new();
    let config = EventServiceConfig::new("eb-tests", "m1")
        .unwrap()
        .with_max_queue_size(2);
    let m1 = hub.service_with(config);

    for n in 1..=5 {
        m1.send_message("m3", seq(n), DeliveryOptions::persistent())
            .await
            .unwrap();
    }

    let queued: Vec<Value> = m1
        .queue_snapshot("m3")
        .iter()
        .map(|e| e.content.clone())
        .collect();
    assert_eq!(queued, vec![json!(4), json!(5)]);
    assert_eq!(hub.bridge().sent_to("m3").len(), 5);
}

// =============================================================================
// SCENARIO 5: PARTIAL BROADCAST
// =============================================================================

#[tokio::test]
async fn test_broadcast_isolates_failing_target() {
    let hub = Hub::<Value>::failing_for(["b"]);
    let m1 = hub.service("m1");

    let report = m1
        .broadcast_message(
            ["a", "b"],
            OutgoingMessage::new("x", Value::Null),
            DeliveryOptions::local(),
        )
        .await
        .unwrap();

    assert!(report.status("a").unwrap().is_fulfilled());
    assert!(matches!(
        report.status("b"),
        Some(DeliveryStatus::Rejected { code: ErrorCode::SendFailed, .. })
    ));
    assert_eq!(m1.performance_metrics().error_count, 1);

    let wire = serde_json::to_value(&report).unwrap();
    assert_eq!(wire["outcomes"][0]["status"], "fulfilled");
    assert_eq!(wire["outcomes"][1]["status"], "rejected");
    assert_eq!(wire["outcomes"][1]["code"], "SEND_FAILED");
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_broadcast_confirmations_through_receivers() {
    let hub = Hub::<Value>::new();
    let coordinator = hub.service("coordinator");
    let tracker = ConfirmationTracker::new();

    let mut services = Vec::new();
    let mut receivers = Vec::new();
    for name in ["a", "b"] {
        let service = hub.service(name);
        let (handle, stream) = service
            .subscribe_stream(DeliveryOptions::local())
            .await
            .unwrap();
        receivers.push((name, handle, stream));
        services.push(service);
    }

    let report = coordinator
        .broadcast_message(
            ["a", "b"],
            OutgoingMessage::new("sync", json!({"round": 1})),
            DeliveryOptions::local(),
        )
        .await
        .unwrap();
    tracker.track(&report);

    for (name, _handle, stream) in &mut receivers {
        let envelope = stream.recv().await.unwrap();
        let broadcast_id = envelope.broadcast_id().unwrap().to_string();
        assert!(tracker.acknowledge(&broadcast_id, *name));
    }

    let summary = tracker
        .wait(&report.broadcast_id, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.confirmed, vec!["a", "b"]);
}

#[tokio::test]
async fn test_dispose_releases_everything() {
    let hub = Hub::<Value>::new();
    let m1 = hub.service("m1");
    for _ in 0..2 {
        let collector = Collector::<Value>::new();
        m1.subscribe_to_messages(collector.callback(), DeliveryOptions::local())
            .await
            .unwrap()
            .detach();
    }
    m1.send_message("m1", seq(1), DeliveryOptions::persistent())
        .await
        .unwrap();

    assert_eq!(m1.dispose().await.unwrap(), 2);
    assert_eq!(m1.subscription_count(), 0);
    assert_eq!(m1.queue_len("m1"), 0);
    assert_eq!(hub.bridge().local().listener_count(None), 0);
}

#[tokio::test]
async fn test_dropping_service_releases_bridge_listeners() {
    let hub = Hub::<Value>::new();
    {
        let m1 = hub.service("m1");
        let collector = Collector::<Value>::new();
        m1.subscribe_to_messages(collector.callback(), DeliveryOptions::local())
            .await
            .unwrap()
            .detach();
        assert_eq!(hub.bridge().local().listener_count(Some("m1")), 1);
    }
    settle().await;
    assert_eq!(hub.bridge().local().listener_count(Some("m1")), 0);
}

#[tokio::test]
async fn test_reserved_fields_in_json_are_ignored() {
    let hub = Hub::<Value>::new();
    let m1 = hub.service("m1");

    let envelope = m1
        .send_json(
            "m2",
            &json!({
                "type": "spoof",
                "id": "msg-forged",
                "source": {"pluginId": "evil", "moduleId": "evil"},
                "timestamp": "1970-01-01T00:00:00.000Z",
                "content": {"text": "hi"},
            }),
            &Value::Null,
        )
        .await
        .unwrap();

    assert_ne!(envelope.id, "msg-forged");
    assert_eq!(envelope.source.module_id, "m1");
    assert_ne!(envelope.timestamp, "1970-01-01T00:00:00.000Z");
    assert_eq!(envelope.content, json!({"text": "hi"}));
}

#[tokio::test]
async fn test_invalid_json_inputs() {
    let hub = Hub::<Value>::new();
    let m1 = hub.service("m1");

    let err = m1.send_json("m2", &json!("ping"), &Value::Null).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);

    let err = m1
        .send_json("m2", &json!({"type": "ping"}), &json!({"persist": "yes"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOptions);

    let collector = Collector::<Value>::new();
    let err = m1
        .subscribe_json(collector.callback(), &json!({"priority": "urgent"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOptions);

    assert_eq!(hub.bridge().send_calls(), 0);
    assert_eq!(m1.performance_metrics().error_count, 0);
}

#[tokio::test]
async fn test_prometheus_recorder_sees_replay_and_eviction() {
    let registry = prometheus::Registry::new();
    let recorder = Arc::new(PrometheusRecorder::register(&registry).unwrap());
    let hub = Hub::<Value>::new();
    let config = EventServiceConfig::new("eb-tests", "m2")
        .unwrap()
        .with_max_queue_size(2);
    let m2 = EventService::<Value>::with_metrics(config, recorder.clone()).unwrap();
    hub.connect(&m2);

    for n in 1..=3 {
        m2.send_message("m2", seq(n), DeliveryOptions::persistent())
            .await
            .unwrap();
    }
    let collector = Collector::new();
    let _subscription = m2
        .subscribe_to_messages(collector.callback(), DeliveryOptions::persistent())
        .await
        .unwrap();

    assert_eq!(recorder.sent_total("m2"), 3.0);
    assert_eq!(recorder.received_total("m2"), 2.0);

    let text = encode_registry(&registry).unwrap();
    assert!(text.contains("eb_replayed_messages_total{module=\"m2\"} 2"));
    assert!(text.contains("eb_evicted_messages_total{channel=\"m2\"} 1"));
}
