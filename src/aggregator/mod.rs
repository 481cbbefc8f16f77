//! Progress aggregation for a setup session.
//!
//! The aggregator is the single consumer of all operation events. It owns
//! every `OperationState`, folds each ingested `LogEntry` into a freshly
//! published immutable `AggregatedState`, keeps the bounded console buffer
//! and the append-only export history, and drives throttled subscriber
//! notifications.
//!
//! ## Single-writer discipline
//!
//! `ingest` must be called from one logical thread of control (the session's
//! event loop). Producers never touch state; they enqueue events. Readers
//! (`snapshot`, `watch_snapshots`) only ever observe the last fully-computed
//! snapshot.

mod buffer;
mod throttle;

pub use buffer::ConsoleBuffer;
pub use throttle::{PendingProgress, ProgressThrottle};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::warn;

use crate::events::{ConsoleLine, LogEntry};
use crate::plan::{Operation, OperationKind};
use crate::state::{OpPhase, OperationState};

/// Tuning knobs for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Minimum spacing between progress notifications per operation
    pub throttle_interval: Duration,
    /// Console buffer capacity in lines
    pub console_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            throttle_interval: Duration::from_millis(100),
            console_capacity: 1000,
        }
    }
}

/// Observer callbacks. Handlers must return promptly; delivery is ordered
/// per operation and a slow handler stalls further delivery for that
/// operation.
pub trait Subscriber: Send {
    fn on_start(&mut self, _op: &Operation) {}
    fn on_progress(&mut self, _op: &Operation, _percent: u8, _message: Option<&str>) {}
    fn on_complete(&mut self, _op: &Operation, _success: bool, _message: Option<&str>) {}
    fn on_error(&mut self, _op: &Operation, _message: &str, _recoverable: bool) {}
}

/// Handle returned by [`ProgressAggregator::subscribe`]; pass it back to
/// [`ProgressAggregator::unsubscribe`] to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

/// Immutable per-operation view inside an [`AggregatedState`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSnapshot {
    pub id: String,
    pub kind: OperationKind,
    pub name: String,
    pub weight: u32,
    pub state: OperationState,
}

/// Derived state, recomputed and republished on every ingested event.
#[derive(Debug, Clone)]
pub struct AggregatedState {
    /// Weighted mean over all operations, 0-100
    pub overall_percent: u8,
    /// First non-terminal operation in dependency order
    pub current: Option<String>,
    /// All operations in dependency order
    pub operations: Vec<OperationSnapshot>,
    /// Most recent console lines, oldest first
    pub console: Vec<ConsoleLine>,
    /// Count of rejected (illegal) phase transitions observed so far; any
    /// non-zero value signals a runner or session bug
    pub consistency_errors: u64,
}

impl AggregatedState {
    fn empty() -> Self {
        Self {
            overall_percent: 0,
            current: None,
            operations: Vec::new(),
            console: Vec::new(),
            consistency_errors: 0,
        }
    }

    pub fn operation(&self, id: &str) -> Option<&OperationSnapshot> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// True once every operation is in a terminal phase.
    pub fn all_terminal(&self) -> bool {
        self.operations.iter().all(|op| op.state.phase.is_terminal())
    }
}

/// Single consumer of all operation events for one session.
pub struct ProgressAggregator {
    /// Operations in dependency (topological) order
    operations: Vec<Operation>,
    index: HashMap<String, usize>,
    states: Vec<OperationState>,
    throttles: Vec<ProgressThrottle>,
    console: ConsoleBuffer,
    history: Vec<LogEntry>,
    subscribers: Vec<(u64, Box<dyn Subscriber>)>,
    next_subscription: u64,
    consistency_errors: u64,
    snapshot_tx: watch::Sender<Arc<AggregatedState>>,
}

impl ProgressAggregator {
    /// Create an aggregator over `operations`, which must already be in
    /// dependency order (see `OperationGraph::operations_in_topo_order`).
    pub fn new(operations: Vec<Operation>, config: AggregatorConfig) -> Self {
        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.id.clone(), i))
            .collect();
        let states = vec![OperationState::default(); operations.len()];
        let throttles = operations
            .iter()
            .map(|_| ProgressThrottle::new(config.throttle_interval))
            .collect();
        let (snapshot_tx, _) = watch::channel(Arc::new(AggregatedState::empty()));

        let mut aggregator = Self {
            operations,
            index,
            states,
            throttles,
            console: ConsoleBuffer::new(config.console_capacity),
            history: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
            consistency_errors: 0,
            snapshot_tx,
        };
        aggregator.publish();
        aggregator
    }

    /// Register a subscriber; returns the handle needed to unsubscribe.
    pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber>) -> SubscriptionHandle {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, subscriber));
        SubscriptionHandle(id)
    }

    /// Deregister; unknown handles are a no-op.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.subscribers.retain(|(id, _)| *id != handle.0);
    }

    /// Last published immutable snapshot.
    pub fn snapshot(&self) -> Arc<AggregatedState> {
        self.snapshot_tx.borrow().clone()
    }

    /// Channel delivering every published snapshot; useful for frontends
    /// that poll rather than subscribe.
    pub fn watch_snapshots(&self) -> watch::Receiver<Arc<AggregatedState>> {
        self.snapshot_tx.subscribe()
    }

    /// Append-only history of every ingested event.
    pub fn history(&self) -> &[LogEntry] {
        &self.history
    }

    /// Registered operations in dependency order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Current phase of one operation.
    pub fn phase_of(&self, id: &str) -> Option<OpPhase> {
        self.index.get(id).map(|&i| self.states[i].phase)
    }

    /// Fold one event into the aggregate. Never fails for well-formed
    /// events: unknown operations and illegal transitions are recorded as
    /// consistency errors, not surfaced as `Err`.
    pub fn ingest(&mut self, entry: LogEntry) {
        self.ingest_at(entry, Instant::now());
    }

    /// `ingest` with an explicit clock, for deterministic throttle tests.
    pub fn ingest_at(&mut self, entry: LogEntry, now: Instant) {
        self.history.push(entry.clone());

        let Some(&idx) = self.index.get(entry.operation_id()) else {
            warn!(operation = entry.operation_id(), "event for unknown operation");
            self.consistency_errors += 1;
            self.publish();
            return;
        };

        match entry {
            LogEntry::Console { line } => {
                self.console.push(line);
            }
            LogEntry::Started { timestamp, .. } => {
                if self.transition(idx, OpPhase::InProgress) {
                    self.states[idx].started_at = Some(timestamp);
                    self.throttles[idx].mark_boundary();
                    self.notify(idx, |sub, op| sub.on_start(op));
                }
            }
            LogEntry::Progress {
                percent, message, ..
            } => {
                let phase = self.states[idx].phase;
                if matches!(phase, OpPhase::InProgress | OpPhase::Completing) {
                    // monotonic within an attempt: regressions clamp to the
                    // high-water mark
                    let clamped = percent.min(100).max(self.states[idx].percent);
                    self.states[idx].percent = clamped;
                    if message.is_some() {
                        self.states[idx].message = message.clone();
                    }
                    if let Some(update) = self.throttles[idx].offer(clamped, message, now) {
                        self.notify(idx, |sub, op| {
                            sub.on_progress(op, update.percent, update.message.as_deref())
                        });
                    }
                } else {
                    warn!(
                        operation = %self.operations[idx].id,
                        ?phase,
                        "progress event outside a running phase, ignored"
                    );
                }
            }
            LogEntry::Completing { .. } => {
                if self.transition(idx, OpPhase::Completing) {
                    self.flush_pending(idx);
                    self.throttles[idx].mark_boundary();
                }
            }
            LogEntry::Completed {
                timestamp, message, ..
            } => {
                if self.transition(idx, OpPhase::Complete) {
                    self.states[idx].percent = 100;
                    self.states[idx].finished_at = Some(timestamp);
                    if message.is_some() {
                        self.states[idx].message = message.clone();
                    }
                    self.flush_pending(idx);
                    self.notify(idx, |sub, op| sub.on_complete(op, true, message.as_deref()));
                }
            }
            LogEntry::Failed {
                timestamp, error, ..
            } => {
                if self.transition(idx, OpPhase::Failed) {
                    self.states[idx].finished_at = Some(timestamp);
                    self.states[idx].error = Some(error.clone());
                    self.flush_pending(idx);
                    self.notify(idx, |sub, op| {
                        sub.on_error(op, &error.message, error.recoverable)
                    });
                }
            }
            LogEntry::Cancelled {
                timestamp, skipped, ..
            } => {
                if self.transition(idx, OpPhase::Cancelled) {
                    self.states[idx].finished_at = Some(timestamp);
                    self.states[idx].skipped = skipped;
                    self.flush_pending(idx);
                    let label = if skipped { "skipped" } else { "cancelled" };
                    self.notify(idx, |sub, op| sub.on_complete(op, false, Some(label)));
                }
            }
            LogEntry::Retried { .. } => {
                if self.states[idx].phase == OpPhase::Failed {
                    self.states[idx].rewind_for_retry();
                    self.throttles[idx].reset();
                } else {
                    self.reject_transition(idx, OpPhase::Initializing);
                }
            }
        }

        self.publish();
    }

    /// Apply a phase transition if legal; otherwise record a consistency
    /// error and leave state untouched.
    fn transition(&mut self, idx: usize, to: OpPhase) -> bool {
        let from = self.states[idx].phase;
        if from.can_transition(to) {
            self.states[idx].phase = to;
            true
        } else {
            self.reject_transition(idx, to);
            false
        }
    }

    fn reject_transition(&mut self, idx: usize, to: OpPhase) {
        let from = self.states[idx].phase;
        warn!(
            operation = %self.operations[idx].id,
            ?from,
            ?to,
            "illegal phase transition rejected"
        );
        self.consistency_errors += 1;
    }

    /// Deliver a coalesced progress update, if one is waiting. Runs before
    /// every terminal notification so the final value always lands.
    fn flush_pending(&mut self, idx: usize) {
        if let Some(update) = self.throttles[idx].take_pending() {
            self.notify(idx, |sub, op| {
                sub.on_progress(op, update.percent, update.message.as_deref())
            });
        }
    }

    fn notify(&mut self, idx: usize, mut call: impl FnMut(&mut dyn Subscriber, &Operation)) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        for (_, subscriber) in &mut subscribers {
            call(subscriber.as_mut(), &self.operations[idx]);
        }
        self.subscribers = subscribers;
    }

    fn publish(&mut self) {
        let snapshot = Arc::new(self.compute_snapshot());
        // send_replace never fails even with zero receivers
        self.snapshot_tx.send_replace(snapshot);
    }

    fn compute_snapshot(&self) -> AggregatedState {
        let operations: Vec<OperationSnapshot> = self
            .operations
            .iter()
            .zip(&self.states)
            .map(|(op, state)| OperationSnapshot {
                id: op.id.clone(),
                kind: op.kind,
                name: op.name.clone(),
                weight: op.effective_weight(),
                state: state.clone(),
            })
            .collect();

        let total_weight: u64 = operations.iter().map(|op| u64::from(op.weight)).sum();
        let overall_percent = if total_weight == 0 {
            100
        } else {
            let weighted: u64 = operations
                .iter()
                .map(|op| u64::from(op.weight) * u64::from(op.state.contribution()))
                .sum();
            (weighted as f64 / total_weight as f64).round() as u8
        };

        let current = operations
            .iter()
            .find(|op| !op.state.phase.is_terminal())
            .map(|op| op.id.clone());

        AggregatedState {
            overall_percent,
            current,
            operations,
            console: self.console.to_vec(),
            consistency_errors: self.consistency_errors,
        }
    }
}
