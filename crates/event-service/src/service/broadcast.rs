//! Broadcast results and confirmation tracking
//!
//! A broadcast attempts every target independently. `BroadcastReport` is
//! the per-target settlement (fulfilled or rejected), never an early error.
//!
//! `ConfirmationTracker` is an application-level layer: receivers
//! acknowledge a broadcast out of band, and `wait` resolves once every
//! fulfilled target acknowledged or the timeout expires.

use crate::error::EventServiceError;
use parking_lot::Mutex;
use serde::Serialize;
use shared_types::ErrorCode;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Settlement of one broadcast target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Fulfilled { message_id: String },
    Rejected { code: ErrorCode, reason: String },
}

impl DeliveryStatus {
    pub(crate) fn rejected(error: &EventServiceError) -> Self {
        Self::Rejected {
            code: error.code(),
            reason: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled { .. })
    }
}

/// One target's outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Aggregate result of `broadcast_message`, in target order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub broadcast_id: String,
    pub outcomes: Vec<TargetOutcome>,
}

impl BroadcastReport {
    /// Targets the bridge accepted.
    pub fn fulfilled(&self) -> Vec<&str> {
        self.targets_where(true)
    }

    /// Targets that failed.
    pub fn rejected(&self) -> Vec<&str> {
        self.targets_where(false)
    }

    pub fn status(&self, target: &str) -> Option<&DeliveryStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.target == target)
            .map(|outcome| &outcome.status)
    }

    #[must_use]
    pub fn all_fulfilled(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.status.is_fulfilled())
    }

    fn targets_where(&self, fulfilled: bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status.is_fulfilled() == fulfilled)
            .map(|outcome| outcome.target.as_str())
            .collect()
    }
}

/// Outcome of waiting on a tracked broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmationSummary {
    pub confirmed: Vec<String>,
    pub timed_out: Vec<String>,
}

impl ConfirmationSummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty()
    }
}

/// Fully acknowledged broadcasts nobody was waiting on, kept so a late
/// `wait` still resolves.
const SETTLED_CAPACITY: usize = 256;

struct Tracked {
    expected: Vec<String>,
    remaining: watch::Sender<BTreeSet<String>>,
}

#[derive(Default)]
struct TrackerState {
    tracked: HashMap<String, Tracked>,
    settled: VecDeque<(String, Vec<String>)>,
}

impl TrackerState {
    fn settle(&mut self, broadcast_id: String, confirmed: Vec<String>) {
        if self.settled.len() == SETTLED_CAPACITY {
            self.settled.pop_front();
        }
        self.settled.push_back((broadcast_id, confirmed));
    }

    fn take_settled(&mut self, broadcast_id: &str) -> Option<ConfirmationSummary> {
        let index = self.settled.iter().position(|(id, _)| id == broadcast_id)?;
        let (_, confirmed) = self.settled.remove(index)?;
        Some(ConfirmationSummary {
            confirmed,
            timed_out: Vec::new(),
        })
    }
}

/// Correlates broadcast acknowledgments with the targets that were sent to.
///
/// A broadcast stays tracked until it is awaited or fully acknowledged.
/// Fully acknowledged broadcasts without a waiter move to a bounded list of
/// recently settled ones.
#[derive(Default)]
pub struct ConfirmationTracker {
    state: Mutex<TrackerState>,
}

impl ConfirmationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking the fulfilled targets of `report`.
    ///
    /// Rejected targets can never confirm and are not tracked.
    pub fn track(&self, report: &BroadcastReport) {
        let expected: Vec<String> = report.fulfilled().into_iter().map(String::from).collect();
        debug!(broadcast_id = %report.broadcast_id, targets = expected.len(), "Tracking broadcast");

        let mut state = self.state.lock();
        if expected.is_empty() {
            state.settle(report.broadcast_id.clone(), expected);
            return;
        }
        let (remaining, _) = watch::channel(expected.iter().cloned().collect());
        state.tracked.insert(
            report.broadcast_id.clone(),
            Tracked {
                expected,
                remaining,
            },
        );
    }

    /// Record that `target` confirmed `broadcast_id`.
    ///
    /// Returns `false` for unknown broadcasts, untracked targets and repeated
    /// acknowledgments.
    pub fn acknowledge(&self, broadcast_id: &str, target: &str) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.tracked.get(broadcast_id) else {
            return false;
        };
        let acknowledged = entry.remaining.send_if_modified(|remaining| remaining.remove(target));

        // A waiter removes the entry itself once woken.
        let settled = entry.remaining.borrow().is_empty() && entry.remaining.receiver_count() == 0;
        if acknowledged && settled {
            if let Some(entry) = state.tracked.remove(broadcast_id) {
                debug!(broadcast_id, confirmed = entry.expected.len(), "Broadcast fully confirmed");
                state.settle(broadcast_id.to_string(), entry.expected);
            }
        }
        acknowledged
    }

    /// Targets of `broadcast_id` still awaiting acknowledgment.
    pub fn pending(&self, broadcast_id: &str) -> Option<Vec<String>> {
        let state = self.state.lock();
        if let Some(entry) = state.tracked.get(broadcast_id) {
            return Some(entry.remaining.borrow().iter().cloned().collect());
        }
        state
            .settled
            .iter()
            .any(|(id, _)| id == broadcast_id)
            .then(Vec::new)
    }

    /// Wait until every tracked target acknowledged, or `timeout` elapses.
    ///
    /// Stops tracking `broadcast_id`. Returns `None` if it was not tracked.
    pub async fn wait(&self, broadcast_id: &str, timeout: Duration) -> Option<ConfirmationSummary> {
        let mut receiver = {
            let mut state = self.state.lock();
            match state.tracked.get(broadcast_id) {
                Some(entry) => entry.remaining.subscribe(),
                None => return state.take_settled(broadcast_id),
            }
        };

        // The sender lives in the map until removal below, so the only
        // non-timeout exit is every target confirming.
        let _ = tokio::time::timeout(timeout, receiver.wait_for(BTreeSet::is_empty)).await;

        let entry = {
            let mut state = self.state.lock();
            match state.tracked.remove(broadcast_id) {
                Some(entry) => entry,
                // Settled by an acknowledgment racing our timeout.
                None => return state.take_settled(broadcast_id),
            }
        };
        let remaining = entry.remaining.borrow().clone();
        let (timed_out, confirmed): (Vec<String>, Vec<String>) = entry
            .expected
            .into_iter()
            .partition(|target| remaining.contains(target));

        debug!(
            broadcast_id,
            confirmed = confirmed.len(),
            timed_out = timed_out.len(),
            "Broadcast confirmation settled"
        );
        Some(ConfirmationSummary {
            confirmed,
            timed_out,
        })
    }

    /// Broadcasts still awaiting acknowledgments or a waiter.
    pub fn tracked_count(&self) -> usize {
        self.state.lock().tracked.len()
    }
}
