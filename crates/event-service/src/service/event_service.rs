//! Event Service
//!
//! Orchestrates validation, stamping, replay and subscription bookkeeping,
//! and delegates actual delivery to the injected bridge.
//!
//! ## State
//!
//! `UNINITIALIZED -> CONNECTED` on `set_bridge`. Until then every send and
//! subscribe fails with `SERVICE_UNAVAILABLE`. The bridge is held weakly: if
//! the host drops it, operations fail the same way.
//!
//! ## Send path
//!
//! ```text
//! send_message(target, message, options)
//!   ├─ bridge connected?        else SERVICE_UNAVAILABLE
//!   ├─ target non-empty?        else INVALID_TARGET
//!   ├─ message valid?           else INVALID_MESSAGE
//!   ├─ stamp envelope (id, source, timestamp, metadata)
//!   ├─ bridge.send_message      else SEND_FAILED (counted)
//!   ├─ persist? enqueue into the replay queue of `target`
//!   └─ count send + latency
//! ```

use crate::domain::validator::{validate_message, validate_message_value, validate_options_value};
use crate::domain::EventServiceConfig;
use crate::error::{ConfigError, EventServiceError};
use crate::metrics::{
    ConnectionState, MetricsRecorder, NoOpMetrics, PerformanceCounters, PerformanceMetrics,
    ServiceStats,
};
use crate::service::broadcast::{BroadcastReport, DeliveryStatus, TargetOutcome};
use crate::service::delivery::{self, ReplayGate};
use crate::subscription::{EnvelopeStream, SubscriptionHandle};
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use shared_bus::{Bridge, MessageCallback, Registration, ReplayQueue, SubscriptionRegistry};
use shared_types::{
    message_id, BroadcastTag, DeliveryOptions, Envelope, ErrorCode, OutgoingMessage,
    SourceIdentity,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// State shared between a service and its subscription handles.
pub(crate) struct ServiceCore<T>
where
    T: Clone + Send + Sync + 'static,
{
    config: EventServiceConfig,
    source: SourceIdentity,
    module_id: Arc<str>,
    bridge: RwLock<Option<Weak<dyn Bridge<T>>>>,
    queue: ReplayQueue<T>,
    registry: SubscriptionRegistry<T>,
    counters: Arc<PerformanceCounters>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<T> ServiceCore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn bridge(&self) -> Result<Arc<dyn Bridge<T>>, EventServiceError> {
        self.bridge
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| EventServiceError::ServiceUnavailable {
                module_id: self.module_id.to_string(),
            })
    }

    fn record_failure(&self, code: ErrorCode) {
        self.counters.record_error();
        self.metrics.record_error(&self.module_id, code);
    }

    pub(crate) fn is_registered(&self, callback: &MessageCallback<T>) -> bool {
        self.registry.contains(&self.module_id, callback)
    }

    async fn send(
        &self,
        target: &str,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
        broadcast: Option<BroadcastTag>,
    ) -> Result<Arc<Envelope<T>>, EventServiceError> {
        let bridge = self.bridge()?;

        if target.trim().is_empty() {
            warn!(module_id = %self.module_id, "Rejected send with empty target");
            return Err(EventServiceError::InvalidTarget(target.to_string()));
        }
        validate_message(&message).map_err(|error| {
            warn!(module_id = %self.module_id, target_module = target, %error, "Rejected message");
            EventServiceError::InvalidMessage(error)
        })?;

        let envelope = Arc::new(Envelope::stamp(
            message_id(),
            self.source.clone(),
            target,
            message,
            options,
            broadcast,
            Utc::now(),
        ));

        let started = Instant::now();
        let delegated = bridge.send_message(target, &envelope, &options).await;
        let latency = started.elapsed();

        if let Err(source) = delegated {
            self.record_failure(ErrorCode::SendFailed);
            error!(
                module_id = %self.module_id,
                target_module = target,
                message_id = %envelope.id,
                error = %source,
                "Bridge send failed"
            );
            return Err(EventServiceError::SendFailed {
                target: target.to_string(),
                source,
            });
        }

        if options.persist {
            let evicted = self.queue.enqueue(target, Arc::clone(&envelope));
            if evicted > 0 {
                self.metrics.record_eviction(target, evicted);
                trace!(channel = target, evicted, "Replay queue full, oldest dropped");
            }
        }

        self.counters.record_send(latency);
        self.metrics.record_send(target, latency);
        debug!(
            module_id = %self.module_id,
            target_module = target,
            message_id = %envelope.id,
            message_type = %envelope.message_type,
            persist = options.persist,
            remote = options.remote,
            latency_us = latency.as_micros() as u64,
            "Message sent"
        );
        Ok(envelope)
    }

    async fn subscribe(
        self: &Arc<Self>,
        callback: MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<SubscriptionHandle<T>, EventServiceError> {
        let bridge = self.bridge()?;
        if !callback.is_invocable() {
            warn!(module_id = %self.module_id, callback = ?callback.id(), "Rejected non-invocable callback");
            return Err(EventServiceError::InvalidCallback);
        }

        let module_id = Arc::clone(&self.module_id);
        if self.registry.contains(&module_id, &callback) {
            debug!(module_id = %module_id, callback = ?callback.id(), "Callback already subscribed");
            return Ok(SubscriptionHandle::borrowed(
                Arc::downgrade(self),
                callback,
                options,
            ));
        }

        let active = Arc::new(AtomicBool::new(true));
        let gate = Arc::new(ReplayGate::new());
        let deliverer = delivery::deliverer(
            Arc::clone(&module_id),
            callback.clone(),
            Arc::clone(&self.counters),
            Arc::clone(&self.metrics),
        );
        let listener = delivery::listener(
            Arc::clone(&module_id),
            deliverer.clone(),
            Arc::clone(&gate),
            Arc::clone(&active),
        );

        let registration = Registration::with_listener(
            callback.clone(),
            listener.clone(),
            options,
            Arc::clone(&active),
        );
        if !self.registry.register(&module_id, registration) {
            return Ok(SubscriptionHandle::borrowed(
                Arc::downgrade(self),
                callback,
                options,
            ));
        }

        let replay = options.persist && self.config.replay_on_subscribe;
        if replay {
            gate.close();
        }

        if let Err(source) = bridge
            .subscribe_to_messages(&module_id, listener, &options)
            .await
        {
            self.registry.unregister(&module_id, &callback);
            gate.abandon();
            self.record_failure(ErrorCode::SubscribeFailed);
            error!(module_id = %module_id, error = %source, "Bridge subscribe failed");
            return Err(EventServiceError::SubscribeFailed {
                module_id: module_id.to_string(),
                source,
            });
        }

        if replay {
            let backlog = self.queue.snapshot(&module_id);
            let (outcome, replayed) =
                delivery::replay_backlog(&module_id, &backlog, &deliverer, &active);
            let caught_up = gate.drain(&replayed, &deliverer, &active, &module_id);
            self.metrics.record_replay(&module_id, outcome.delivered);
            debug!(
                module_id = %module_id,
                replayed = outcome.delivered,
                failed = outcome.failed,
                caught_up,
                "Backlog replayed"
            );
        }

        debug!(
            module_id = %module_id,
            callback = ?callback.id(),
            persist = options.persist,
            subscriptions = self.registry.count(Some(&module_id)),
            "Subscribed"
        );
        Ok(SubscriptionHandle::owning(
            Arc::downgrade(self),
            callback,
            options,
        ))
    }

    pub(crate) async fn unsubscribe(
        &self,
        callback: &MessageCallback<T>,
        options: Option<DeliveryOptions>,
    ) -> Result<bool, EventServiceError> {
        let Some(removed) = self.registry.unregister(&self.module_id, callback) else {
            return Ok(false);
        };
        let bridge = self.bridge()?;
        let options = options.unwrap_or(removed.options);

        bridge
            .unsubscribe_from_messages(&self.module_id, &removed.listener, &options)
            .await
            .map_err(|source| {
                self.record_failure(ErrorCode::UnsubscribeFailed);
                error!(module_id = %self.module_id, error = %source, "Bridge unsubscribe failed");
                EventServiceError::UnsubscribeFailed {
                    module_id: self.module_id.to_string(),
                    source,
                }
            })?;

        debug!(module_id = %self.module_id, callback = ?callback.id(), "Unsubscribed");
        Ok(true)
    }

    /// Deactivate a registration now and remove it from the bridge in the
    /// background.
    pub(crate) fn release(&self, callback: &MessageCallback<T>) {
        if let Some(removed) = self.registry.unregister(&self.module_id, callback) {
            self.release_in_background(vec![removed]);
        }
    }

    fn release_in_background(&self, removed: Vec<Registration<T>>) {
        let Ok(bridge) = self.bridge() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(
                module_id = %self.module_id,
                released = removed.len(),
                "No runtime, bridge listeners left deactivated"
            );
            return;
        };

        let module_id = self.module_id.to_string();
        runtime.spawn(async move {
            for registration in removed {
                if let Err(error) = bridge
                    .unsubscribe_from_messages(&module_id, &registration.listener, &registration.options)
                    .await
                {
                    warn!(module_id = %module_id, %error, "Background unsubscribe failed");
                }
            }
        });
    }
}

/// Typed local event bus for one module.
///
/// Owns its replay queue and subscription registry; shares only the bridge.
pub struct EventService<T>
where
    T: Clone + Send + Sync + 'static,
{
    core: Arc<ServiceCore<T>>,
}

impl<T> EventService<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an unconnected service.
    pub fn new(config: EventServiceConfig) -> Result<Self, ConfigError> {
        Self::with_metrics(config, Arc::new(NoOpMetrics))
    }

    /// Create an unconnected service reporting to `metrics`.
    pub fn with_metrics(
        config: EventServiceConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let core = ServiceCore {
            source: SourceIdentity::new(config.plugin_id.clone(), config.module_id.clone()),
            module_id: Arc::from(config.module_id.as_str()),
            bridge: RwLock::new(None),
            queue: ReplayQueue::with_capacity(config.max_queue_size),
            registry: SubscriptionRegistry::new(),
            counters: Arc::new(PerformanceCounters::new()),
            metrics,
            config,
        };
        debug!(
            plugin_id = %core.source.plugin_id,
            module_id = %core.module_id,
            max_queue_size = core.config.max_queue_size,
            "Event service created"
        );
        Ok(Self {
            core: Arc::new(core),
        })
    }

    /// Connect to the host bridge.
    ///
    /// Only a weak reference is kept; the host owns the bridge.
    pub fn set_bridge(&self, bridge: Arc<dyn Bridge<T>>) {
        let previous = self.core.bridge.write().replace(Arc::downgrade(&bridge));
        if previous.is_some() {
            info!(module_id = %self.core.module_id, "Bridge replaced");
        } else {
            info!(module_id = %self.core.module_id, "Bridge connected");
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.core.bridge.read().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Uninitialized
        }
    }

    /// Whether a live bridge is attached.
    pub fn is_connected(&self) -> bool {
        self.core.bridge().is_ok()
    }

    pub fn module_id(&self) -> &str {
        &self.core.module_id
    }

    pub fn plugin_id(&self) -> &str {
        &self.core.source.plugin_id
    }

    pub fn config(&self) -> &EventServiceConfig {
        &self.core.config
    }

    /// Stamp `message` and deliver it to `target` through the bridge.
    ///
    /// With `options.persist`, the envelope is kept for replay once the
    /// bridge accepted it.
    pub async fn send_message(
        &self,
        target: &str,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
    ) -> Result<Arc<Envelope<T>>, EventServiceError> {
        self.core.send(target, message, options, None).await
    }

    /// Subscribe `callback` to messages addressed to this module.
    ///
    /// With `options.persist`, the buffered backlog is delivered to the
    /// callback, oldest first, before this returns. Subscribing an already
    /// subscribed callback does nothing and returns a non-owning handle.
    pub async fn subscribe_to_messages(
        &self,
        callback: MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<SubscriptionHandle<T>, EventServiceError> {
        self.core.subscribe(callback, options).await
    }

    /// Subscribe with a stream instead of a callback.
    pub async fn subscribe_stream(
        &self,
        options: DeliveryOptions,
    ) -> Result<(SubscriptionHandle<T>, EnvelopeStream<T>), EventServiceError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = self
            .core
            .subscribe(MessageCallback::channel(sender), options)
            .await?;
        Ok((handle, EnvelopeStream::new(receiver)))
    }

    /// Remove `callback`. Unknown callbacks are not an error.
    ///
    /// Returns whether a subscription was removed.
    pub async fn unsubscribe_from_messages(
        &self,
        callback: &MessageCallback<T>,
        options: DeliveryOptions,
    ) -> Result<bool, EventServiceError> {
        self.core.unsubscribe(callback, Some(options)).await
    }

    /// Remove every subscription of this instance from the bridge.
    ///
    /// Every removal is attempted; the first bridge failure is returned.
    /// A second call is a no-op returning `Ok(0)`.
    pub async fn unsubscribe_all(&self) -> Result<usize, EventServiceError> {
        let removed = self.core.registry.unregister_all();
        if removed.is_empty() {
            return Ok(0);
        }
        let bridge = self.core.bridge()?;

        let mut first_error = None;
        for (channel, registration) in &removed {
            if let Err(source) = bridge
                .unsubscribe_from_messages(channel, &registration.listener, &registration.options)
                .await
            {
                self.core.record_failure(ErrorCode::UnsubscribeFailed);
                error!(module_id = %channel, error = %source, "Bridge unsubscribe failed");
                first_error.get_or_insert(EventServiceError::UnsubscribeFailed {
                    module_id: channel.clone(),
                    source,
                });
            }
        }

        info!(module_id = %self.core.module_id, released = removed.len(), "All subscriptions released");
        match first_error {
            Some(error) => Err(error),
            None => Ok(removed.len()),
        }
    }

    /// Send one message to every target under a shared broadcast id.
    ///
    /// Each target is attempted independently, in order. The report says
    /// which targets were fulfilled and which were rejected.
    pub async fn broadcast_message<I, S>(
        &self,
        targets: I,
        message: OutgoingMessage<T>,
        options: DeliveryOptions,
    ) -> Result<BroadcastReport, EventServiceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core.bridge()?;
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            return Err(EventServiceError::InvalidTarget(String::new()));
        }
        validate_message(&message).map_err(EventServiceError::InvalidMessage)?;

        let broadcast_id = shared_types::broadcast_id();
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in &targets {
            let tag = BroadcastTag {
                broadcast_id: broadcast_id.clone(),
                targets: targets.clone(),
                current_target: target.clone(),
            };
            let status = match self.core.send(target, message.clone(), options, Some(tag)).await {
                Ok(envelope) => DeliveryStatus::Fulfilled {
                    message_id: envelope.id.clone(),
                },
                Err(error) => DeliveryStatus::rejected(&error),
            };
            outcomes.push(TargetOutcome {
                target: target.clone(),
                status,
            });
        }

        let report = BroadcastReport {
            broadcast_id,
            outcomes,
        };
        debug!(
            module_id = %self.core.module_id,
            broadcast_id = %report.broadcast_id,
            fulfilled = report.fulfilled().len(),
            rejected = report.rejected().len(),
            "Broadcast settled"
        );
        Ok(report)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.core.counters.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.core.counters.reset();
        debug!(module_id = %self.core.module_id, "Metrics reset");
    }

    pub fn service_stats(&self) -> ServiceStats {
        ServiceStats {
            plugin_id: self.core.source.plugin_id.clone(),
            module_id: self.core.module_id.to_string(),
            state: self.connection_state(),
            bridge_available: self.is_connected(),
            subscriptions: self.core.registry.count(None),
            queued: self.core.queue.channel_sizes(),
            max_queue_size: self.core.queue.max_queue_size(),
            performance: self.core.counters.snapshot(),
        }
    }

    /// Active subscriptions of this instance.
    pub fn subscription_count(&self) -> usize {
        self.core.registry.count(None)
    }

    /// Buffered envelopes of `channel`, oldest first.
    pub fn queue_snapshot(&self, channel: &str) -> Vec<Arc<Envelope<T>>> {
        self.core.queue.snapshot(channel)
    }

    pub fn queue_len(&self, channel: &str) -> usize {
        self.core.queue.len(channel)
    }

    /// Drop buffered envelopes of one channel, or of all channels.
    pub fn clear_queue(&self, channel: Option<&str>) -> usize {
        let cleared = self.core.queue.clear(channel);
        debug!(module_id = %self.core.module_id, channel = ?channel, cleared, "Replay queue cleared");
        cleared
    }

    /// Release every subscription and empty the replay queue.
    pub async fn dispose(&self) -> Result<usize, EventServiceError> {
        let released = self.unsubscribe_all().await;
        let cleared = self.core.queue.clear(None);
        let totals = self.core.counters.snapshot();
        info!(
            module_id = %self.core.module_id,
            messages_sent = totals.messages_sent,
            messages_received = totals.messages_received,
            error_count = totals.error_count,
            cleared,
            "Event service disposed"
        );
        released
    }
}

impl EventService<Value> {
    /// Send an untyped message.
    ///
    /// `message` must be an object with a non-empty string `type`; reserved
    /// envelope fields inside it are ignored. `options` may be `null`.
    pub async fn send_json(
        &self,
        target: &str,
        message: &Value,
        options: &Value,
    ) -> Result<Arc<Envelope<Value>>, EventServiceError> {
        self.core.bridge()?;
        if target.trim().is_empty() {
            return Err(EventServiceError::InvalidTarget(target.to_string()));
        }
        let message = validate_message_value(message).map_err(|error| {
            warn!(module_id = %self.core.module_id, %error, "Rejected message");
            EventServiceError::InvalidMessage(error)
        })?;
        let options = validate_options_value(options).map_err(|error| {
            warn!(module_id = %self.core.module_id, %error, "Rejected delivery options");
            EventServiceError::InvalidOptions(error)
        })?;
        self.core.send(target, message, options, None).await
    }

    /// Subscribe with untyped options.
    pub async fn subscribe_json(
        &self,
        callback: MessageCallback<Value>,
        options: &Value,
    ) -> Result<SubscriptionHandle<Value>, EventServiceError> {
        self.core.bridge()?;
        let options = validate_options_value(options).map_err(|error| {
            warn!(module_id = %self.core.module_id, %error, "Rejected delivery options");
            EventServiceError::InvalidOptions(error)
        })?;
        self.core.subscribe(callback, options).await
    }
}

impl<T> Drop for EventService<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let removed = self.core.registry.unregister_all();
        if removed.is_empty() {
            return;
        }
        debug!(module_id = %self.core.module_id, released = removed.len(), "Releasing subscriptions on drop");
        self.core
            .release_in_background(removed.into_iter().map(|(_, registration)| registration).collect());
    }
}

/// Build an unconnected service for `channel_id`, owned by `owner_id`.
///
/// There is no shared default instance: each module constructs and wires
/// its own.
pub fn create_event_service<T>(
    owner_id: impl Into<String>,
    channel_id: impl Into<String>,
) -> Result<EventService<T>, ConfigError>
where
    T: Clone + Send + Sync + 'static,
{
    EventService::new(EventServiceConfig::new(owner_id, channel_id)?)
}
