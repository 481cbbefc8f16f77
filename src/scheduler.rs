//! Launch scheduling over the operation graph.
//!
//! The scheduler decides *which* operation may launch next: dependencies
//! satisfied, FIFO among equally-eligible operations, bounded by the
//! session's concurrency limit. It owns the graph and its own launch
//! bookkeeping; operation state proper lives in the aggregator and is only
//! ever changed through ingested events.

use std::collections::HashSet;

use crate::graph::{OpIndex, OperationGraph};
use crate::plan::Operation;

/// Scheduler-side view of one operation's launch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchState {
    /// Waiting to launch (dependencies may or may not be satisfied)
    #[default]
    Queued,
    /// Launched, process not yet terminal
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished unsuccessfully; blocks dependents
    Failed,
    /// Skipped by user decision or transitively
    Skipped,
    /// Cancelled before or during execution
    Cancelled,
}

impl LaunchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }
}

/// Tracks launch eligibility over a validated graph.
#[derive(Debug)]
pub struct Scheduler {
    graph: OperationGraph,
    states: Vec<LaunchState>,
    succeeded: HashSet<OpIndex>,
    /// When true, dependents of a skipped operation may still launch
    proceed_past_skipped: bool,
    cancelled: bool,
}

impl Scheduler {
    pub fn new(graph: OperationGraph, proceed_past_skipped: bool) -> Self {
        let states = vec![LaunchState::default(); graph.len()];
        Self {
            graph,
            states,
            succeeded: HashSet::new(),
            proceed_past_skipped,
            cancelled: false,
        }
    }

    pub fn graph(&self) -> &OperationGraph {
        &self.graph
    }

    fn satisfied_set(&self) -> HashSet<OpIndex> {
        if self.proceed_past_skipped {
            // skipped dependencies count as met (soft dependencies)
            self.states
                .iter()
                .enumerate()
                .filter(|(_, s)| matches!(s, LaunchState::Succeeded | LaunchState::Skipped))
                .map(|(i, _)| i)
                .collect()
        } else {
            self.succeeded.clone()
        }
    }

    /// Operations eligible to launch right now, in FIFO (dependency) order.
    /// Empty once cancellation has been issued.
    pub fn ready_operations(&self) -> Vec<&Operation> {
        if self.cancelled {
            return Vec::new();
        }
        let satisfied = self.satisfied_set();
        self.graph
            .topo_order()
            .iter()
            .filter(|&&idx| {
                self.states[idx] == LaunchState::Queued
                    && self.graph.dependencies_satisfied(idx, &satisfied)
            })
            .map(|&idx| &self.graph.operations()[idx])
            .collect()
    }

    pub fn mark_running(&mut self, id: &str) {
        if let Some(idx) = self.graph.index_of(id) {
            self.states[idx] = LaunchState::Running;
        }
    }

    pub fn mark_succeeded(&mut self, id: &str) {
        if let Some(idx) = self.graph.index_of(id) {
            self.states[idx] = LaunchState::Succeeded;
            self.succeeded.insert(idx);
        }
    }

    pub fn mark_failed(&mut self, id: &str) {
        if let Some(idx) = self.graph.index_of(id) {
            self.states[idx] = LaunchState::Failed;
        }
    }

    /// Rewind a failed operation for relaunch. Dependents that have not
    /// started remain queued; completed dependents are untouched.
    pub fn mark_retrying(&mut self, id: &str) {
        if let Some(idx) = self.graph.index_of(id) {
            if self.states[idx] == LaunchState::Failed {
                self.states[idx] = LaunchState::Queued;
            }
        }
    }

    /// Skip an operation. Returns the ids of *dependent* operations that were
    /// transitively skipped as a consequence (empty when the session policy
    /// allows running with an unmet soft dependency).
    pub fn mark_skipped(&mut self, id: &str) -> Vec<String> {
        let Some(idx) = self.graph.index_of(id) else {
            return Vec::new();
        };
        self.states[idx] = LaunchState::Skipped;

        let mut cascade = Vec::new();
        if !self.proceed_past_skipped {
            self.skip_dependents(idx, &mut cascade);
        }
        cascade
    }

    fn skip_dependents(&mut self, idx: OpIndex, cascade: &mut Vec<String>) {
        let dependents: Vec<OpIndex> = self.graph.dependents(idx).to_vec();
        for dep_idx in dependents {
            if self.states[dep_idx] == LaunchState::Queued {
                self.states[dep_idx] = LaunchState::Skipped;
                cascade.push(self.graph.operations()[dep_idx].id.clone());
                self.skip_dependents(dep_idx, cascade);
            }
        }
    }

    /// Stop issuing launches and mark every queued operation cancelled.
    /// Returns the ids of operations cancelled before they ever started.
    /// Idempotent: a second call returns an empty list.
    pub fn cancel(&mut self) -> Vec<String> {
        self.cancelled = true;
        let mut cancelled_ids = Vec::new();
        for (idx, state) in self.states.iter_mut().enumerate() {
            if *state == LaunchState::Queued {
                *state = LaunchState::Cancelled;
                cancelled_ids.push(self.graph.operations()[idx].id.clone());
            }
        }
        cancelled_ids
    }

    /// Mark a running operation cancelled once its process is gone.
    pub fn mark_cancelled(&mut self, id: &str) {
        if let Some(idx) = self.graph.index_of(id) {
            self.states[idx] = LaunchState::Cancelled;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn launch_state(&self, id: &str) -> Option<LaunchState> {
        self.graph.index_of(id).map(|idx| self.states[idx])
    }

    pub fn running_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, LaunchState::Running))
            .count()
    }

    pub fn all_terminal(&self) -> bool {
        self.states.iter().all(|s| s.is_terminal())
    }

    /// True when nothing is running and nothing can become eligible anymore
    /// (queued operations blocked behind failures).
    pub fn stalled(&self) -> bool {
        self.running_count() == 0 && self.ready_operations().is_empty() && !self.all_terminal()
    }

    /// Ids of queued operations that can never launch because a dependency
    /// failed. Used to close out the run after a terminal failure.
    pub fn blocked_operations(&self) -> Vec<String> {
        let satisfied = self.satisfied_set();
        self.graph
            .topo_order()
            .iter()
            .filter(|&&idx| {
                self.states[idx] == LaunchState::Queued
                    && !self.graph.dependencies_satisfied(idx, &satisfied)
            })
            .map(|&idx| self.graph.operations()[idx].id.clone())
            .collect()
    }
}
