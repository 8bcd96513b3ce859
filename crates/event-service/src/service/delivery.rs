//! Subscriber-side delivery
//!
//! Every subscriber callback is wrapped twice before it reaches the bridge:
//!
//! 1. `deliverer`: counts the message, times the callback, and lets a panic
//!    propagate so the caller decides how to isolate it.
//! 2. `listener`: what the bridge actually holds. It drops deliveries once
//!    the registration is deactivated, parks them while a replay is running,
//!    and isolates callback panics.
//!
//! ## Replay ordering
//!
//! While the backlog is being replayed, live deliveries are parked in the
//! gate. After the backlog, parked envelopes are drained in arrival order,
//! skipping those the backlog already contained. A subscriber therefore sees
//! the full backlog first and never sees the same envelope twice.

use crate::metrics::{MetricsRecorder, PerformanceCounters};
use parking_lot::Mutex;
use shared_bus::{replay_snapshot_while, MessageCallback, ReplayOutcome};
use shared_types::Envelope;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

struct GateState<T> {
    replaying: bool,
    parked: Vec<Envelope<T>>,
}

/// Holds live deliveries back while a backlog replay is in progress.
pub(crate) struct ReplayGate<T> {
    state: Mutex<GateState<T>>,
}

impl<T: Clone> ReplayGate<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                replaying: false,
                parked: Vec::new(),
            }),
        }
    }

    /// Start parking live deliveries.
    pub(crate) fn close(&self) {
        self.state.lock().replaying = true;
    }

    /// Park `envelope` if a replay is running. Returns whether it was parked.
    fn park(&self, envelope: &Envelope<T>) -> bool {
        let mut state = self.state.lock();
        if state.replaying {
            state.parked.push(envelope.clone());
            true
        } else {
            false
        }
    }

    /// Deliver parked envelopes not in `replayed`, then reopen the gate.
    ///
    /// Envelopes parked while draining are picked up by the next round; the
    /// gate only reopens once a round finds nothing parked.
    pub(crate) fn drain(
        &self,
        replayed: &HashSet<String>,
        deliverer: &MessageCallback<T>,
        active: &AtomicBool,
        module_id: &str,
    ) -> usize {
        let mut delivered = 0;
        loop {
            let batch = {
                let mut state = self.state.lock();
                if state.parked.is_empty() {
                    state.replaying = false;
                    return delivered;
                }
                std::mem::take(&mut state.parked)
            };

            for envelope in batch {
                if replayed.contains(&envelope.id) || !active.load(Ordering::Acquire) {
                    continue;
                }
                if let Err(panic) = deliverer.try_invoke(&envelope) {
                    warn!(module_id, message_id = %envelope.id, error = %panic, "Subscriber panicked");
                } else {
                    delivered += 1;
                }
            }
        }
    }

    /// Reopen without delivering anything parked.
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock();
        state.replaying = false;
        state.parked.clear();
    }
}

/// Wrap the user callback with receive accounting.
pub(crate) fn deliverer<T>(
    module_id: Arc<str>,
    callback: MessageCallback<T>,
    counters: Arc<PerformanceCounters>,
    metrics: Arc<dyn MetricsRecorder>,
) -> MessageCallback<T>
where
    T: Send + Sync + 'static,
{
    MessageCallback::new(move |envelope: &Envelope<T>| {
        counters.record_receive();
        metrics.record_receive(&module_id);

        let started = Instant::now();
        callback.invoke(envelope);
        trace!(
            module_id = %module_id,
            message_id = %envelope.id,
            message_type = %envelope.message_type,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Message processed"
        );
    })
}

/// The listener handed to the bridge.
pub(crate) fn listener<T>(
    module_id: Arc<str>,
    deliverer: MessageCallback<T>,
    gate: Arc<ReplayGate<T>>,
    active: Arc<AtomicBool>,
) -> MessageCallback<T>
where
    T: Clone + Send + Sync + 'static,
{
    MessageCallback::new(move |envelope: &Envelope<T>| {
        if !active.load(Ordering::Acquire) {
            return;
        }
        if gate.park(envelope) {
            trace!(module_id = %module_id, message_id = %envelope.id, "Delivery parked behind replay");
            return;
        }
        if let Err(panic) = deliverer.try_invoke(envelope) {
            warn!(module_id = %module_id, message_id = %envelope.id, error = %panic, "Subscriber panicked");
        }
    })
}

/// Replay a backlog snapshot through the deliverer, stopping as soon as the
/// registration is deactivated.
///
/// Returns the outcome and the ids of the backlog envelopes.
pub(crate) fn replay_backlog<T>(
    module_id: &str,
    backlog: &[Arc<Envelope<T>>],
    deliverer: &MessageCallback<T>,
    active: &AtomicBool,
) -> (ReplayOutcome, HashSet<String>) {
    let replayed = backlog.iter().map(|envelope| envelope.id.clone()).collect();
    let outcome = replay_snapshot_while(module_id, backlog, deliverer, || {
        active.load(Ordering::Acquire)
    });
    (outcome, replayed)
}
