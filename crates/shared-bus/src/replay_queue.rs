//! # Bounded Replay Queue
//!
//! In-memory history that lets a late subscriber catch up on what was sent
//! to its channel while it was absent.
//!
//! ## Rules
//!
//! - One FIFO per channel, each bounded by `max_queue_size`.
//! - Overflow evicts the oldest entries (drop-oldest). `enqueue` never fails.
//! - Replay delivers a snapshot oldest-first and never mutates the queue.
//! - A panicking callback is isolated per envelope: the failure is logged and
//!   replay continues with the next envelope.

use crate::callback::MessageCallback;
use crate::DEFAULT_MAX_QUEUE_SIZE;
use parking_lot::Mutex;
use shared_types::Envelope;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Result of replaying a channel's backlog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Envelopes handed to the callback without a panic.
    pub delivered: usize,
    /// Envelopes during which the callback panicked.
    pub failed: usize,
}

impl ReplayOutcome {
    #[must_use]
    pub fn total(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Per-channel bounded FIFO of stamped envelopes.
pub struct ReplayQueue<T> {
    channels: Mutex<HashMap<String, VecDeque<Arc<Envelope<T>>>>>,
    max_queue_size: usize,
}

impl<T> ReplayQueue<T> {
    /// Create a queue with the default bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_QUEUE_SIZE)
    }

    /// Create a queue holding at most `max_queue_size` envelopes per channel.
    ///
    /// A bound of zero is raised to one.
    #[must_use]
    pub fn with_capacity(max_queue_size: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            max_queue_size: max_queue_size.max(1),
        }
    }

    /// Append an envelope to a channel.
    ///
    /// Returns the number of envelopes evicted to stay within bound.
    pub fn enqueue(&self, channel: &str, envelope: Arc<Envelope<T>>) -> usize {
        let mut channels = self.channels.lock();
        let queue = channels.entry(channel.to_string()).or_default();
        queue.push_back(envelope);

        let mut evicted = 0;
        while queue.len() > self.max_queue_size {
            queue.pop_front();
            evicted += 1;
        }

        trace!(channel, queued = queue.len(), evicted, "Envelope enqueued");
        evicted
    }

    /// Copy of a channel's backlog, oldest first.
    #[must_use]
    pub fn snapshot(&self, channel: &str) -> Vec<Arc<Envelope<T>>> {
        self.channels
            .lock()
            .get(channel)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver a channel's backlog to `callback`, oldest first, synchronously.
    ///
    /// The backlog is snapshotted before the first invocation, so the callback
    /// may itself send to the channel without affecting this replay.
    pub fn replay_to(&self, channel: &str, callback: &MessageCallback<T>) -> ReplayOutcome {
        let backlog = self.snapshot(channel);
        replay_snapshot(channel, &backlog, callback)
    }

    /// Empty one channel, or every channel when `channel` is `None`.
    ///
    /// Returns the number of envelopes removed.
    pub fn clear(&self, channel: Option<&str>) -> usize {
        let mut channels = self.channels.lock();
        match channel {
            Some(channel) => channels.remove(channel).map_or(0, |queue| queue.len()),
            None => channels.drain().map(|(_, queue)| queue.len()).sum(),
        }
    }

    /// Number of envelopes buffered for a channel.
    #[must_use]
    pub fn len(&self, channel: &str) -> usize {
        self.channels.lock().get(channel).map_or(0, VecDeque::len)
    }

    /// Number of envelopes buffered across all channels.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.channels.lock().values().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// Buffered envelope count per channel, sorted by channel.
    #[must_use]
    pub fn channel_sizes(&self) -> BTreeMap<String, usize> {
        self.channels
            .lock()
            .iter()
            .map(|(channel, queue)| (channel.clone(), queue.len()))
            .collect()
    }

    #[must_use]
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }
}

/// Deliver an already-taken snapshot to `callback`, isolating panics.
pub fn replay_snapshot<T>(
    channel: &str,
    backlog: &[Arc<Envelope<T>>],
    callback: &MessageCallback<T>,
) -> ReplayOutcome {
    replay_snapshot_while(channel, backlog, callback, || true)
}

/// Like `replay_snapshot`, but stops before the next envelope once
/// `keep_going` returns `false`.
pub fn replay_snapshot_while<T, F>(
    channel: &str,
    backlog: &[Arc<Envelope<T>>],
    callback: &MessageCallback<T>,
    keep_going: F,
) -> ReplayOutcome
where
    F: Fn() -> bool,
{
    let mut outcome = ReplayOutcome::default();
    for envelope in backlog {
        if !keep_going() {
            trace!(channel, remaining = backlog.len() - outcome.total(), "Replay stopped early");
            break;
        }
        match callback.try_invoke(envelope) {
            Ok(()) => outcome.delivered += 1,
            Err(panic) => {
                outcome.failed += 1;
                warn!(
                    channel,
                    message_id = %envelope.id,
                    error = %panic,
                    "Callback failed during replay, continuing"
                );
            }
        }
    }
    outcome
}

impl<T> Default for ReplayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ReplayQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayQueue")
            .field("max_queue_size", &self.max_queue_size)
            .field("channels", &self.channel_sizes())
            .finish()
    }
}
