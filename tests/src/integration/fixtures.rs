//! Shared fixtures: a host bridge, collecting callbacks, message builders.

use event_service::{Bridge, EventService, EventServiceConfig, MessageCallback};
use parking_lot::Mutex;
use shared_bus::RecordingBridge;
use shared_types::{Envelope, OutgoingMessage};
use std::sync::Arc;

pub const PLUGIN_ID: &str = "eb-tests";

/// One host bridge shared by every service built from it.
pub struct Hub<T> {
    bridge: Arc<RecordingBridge<T>>,
}

impl<T> Hub<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            bridge: Arc::new(RecordingBridge::new()),
        }
    }

    /// A hub whose bridge rejects sends to `targets`.
    pub fn failing_for<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bridge: Arc::new(RecordingBridge::new().failing_for(targets)),
        }
    }

    pub fn bridge(&self) -> &Arc<RecordingBridge<T>> {
        &self.bridge
    }

    pub fn connect(&self, service: &EventService<T>) {
        let bridge: Arc<dyn Bridge<T>> = self.bridge.clone();
        service.set_bridge(bridge);
    }

    /// A connected service for `module_id` with default configuration.
    pub fn service(&self, module_id: &str) -> EventService<T> {
        let config = EventServiceConfig::new(PLUGIN_ID, module_id).expect("valid module id");
        self.service_with(config)
    }

    pub fn service_with(&self, config: EventServiceConfig) -> EventService<T> {
        let service = EventService::new(config).expect("valid config");
        self.connect(&service);
        service
    }
}

impl<T> Default for Hub<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Callback that keeps every envelope it receives.
pub struct Collector<T> {
    seen: Arc<Mutex<Vec<Envelope<T>>>>,
    callback: MessageCallback<T>,
}

impl<T> Collector<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = MessageCallback::new(move |envelope: &Envelope<T>| {
            sink.lock().push(envelope.clone());
        });
        Self { seen, callback }
    }

    /// The registered identity; clones compare equal.
    pub fn callback(&self) -> MessageCallback<T> {
        self.callback.clone()
    }

    pub fn envelopes(&self) -> Vec<Envelope<T>> {
        self.seen.lock().clone()
    }

    pub fn contents(&self) -> Vec<T> {
        self.seen.lock().iter().map(|e| e.content.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Collector<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Numbered message, for ordering assertions.
pub fn tick(n: u32) -> OutgoingMessage<u32> {
    OutgoingMessage::new("tick", n)
}

/// Let background unsubscribe tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
