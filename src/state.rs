//! Per-operation phase state machine and mutable state snapshot.
//!
//! The legal-transition table is the single authority on phase changes; the
//! aggregator consults it for every lifecycle event and rejects anything
//! outside the table as an internal consistency error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::ErrorRecord;

/// Position of an operation in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpPhase {
    /// Registered, not yet launched
    #[default]
    Initializing,
    /// Process running, progress flowing
    InProgress,
    /// Process exited successfully, finalization pending
    Completing,
    /// Terminal success
    Complete,
    /// Terminal unless retried
    Failed,
    /// Terminal; covers both user cancellation and skip
    Cancelled,
}

impl OpPhase {
    /// Terminal phases. `Failed` counts as terminal until a retry rewinds it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Terminal success only.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether moving to `next` is a legal transition.
    ///
    /// `Failed -> Initializing` is the retry rewind; it is legal here and the
    /// once-per-retry bookkeeping lives on [`OperationState::retries`].
    pub fn can_transition(self, next: OpPhase) -> bool {
        use OpPhase::*;
        match (self, next) {
            (Initializing, InProgress) => true,
            (InProgress, Completing) => true,
            (Completing, Complete) => true,
            // Failure is reachable from any non-terminal phase
            (Initializing | InProgress | Completing, Failed) => true,
            // Cancellation is reachable from any non-terminal phase, and from
            // Failed (skip is a terminal variant of failure)
            (Initializing | InProgress | Completing | Failed, Cancelled) => true,
            // Retry rewind
            (Failed, Initializing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OpPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::InProgress => "in-progress",
            Self::Completing => "completing",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Mutable per-operation snapshot, owned exclusively by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OperationState {
    pub phase: OpPhase,
    /// 0-100; non-decreasing within a single attempt
    pub percent: u8,
    /// Most recent progress message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error accumulated by the current attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    /// Number of retries consumed (attempt number minus one)
    pub retries: u32,
    /// Set when the operation reached `Cancelled` via skip
    pub skipped: bool,
}

impl OperationState {
    /// Contribution of this operation to the weighted overall percent.
    ///
    /// Cancelled and skipped operations count as 100 so the average never
    /// stalls on work that will not happen.
    pub fn contribution(&self) -> u8 {
        match self.phase {
            OpPhase::Initializing => 0,
            OpPhase::InProgress | OpPhase::Completing => self.percent,
            OpPhase::Complete | OpPhase::Cancelled => 100,
            OpPhase::Failed => self.percent,
        }
    }

    /// Rewind for a retry: back to `Initializing`, percent 0, error cleared,
    /// retry count incremented. The caller must verify the transition is
    /// legal (i.e. the current phase is `Failed`).
    pub fn rewind_for_retry(&mut self) {
        self.phase = OpPhase::Initializing;
        self.percent = 0;
        self.message = None;
        self.started_at = None;
        self.finished_at = None;
        self.error = None;
        self.retries += 1;
        self.skipped = false;
    }
}
