//! User-directed failure recovery.
//!
//! When an operation fails, the controller derives the set of legal actions
//! from the error record and asks a decider to pick one. Cancellation never
//! reaches this module: a `Cancelled` lifecycle event is not a failure.

use crate::events::ErrorRecord;
use tracing::warn;

/// Action chosen for a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Rewind the failed operation and re-launch only it
    Retry,
    /// Mark the operation skipped; dependents follow the session's
    /// soft-dependency policy
    Skip,
    /// Cancel every non-terminal operation and stop launching
    CancelAll,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::CancelAll => "cancel-all",
        };
        f.write_str(s)
    }
}

/// A failure awaiting a decision.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub operation_id: String,
    pub operation_name: String,
    pub error: ErrorRecord,
    /// Retries already consumed by this operation
    pub retries: u32,
    /// Legal actions, most preferred first
    pub options: Vec<RecoveryAction>,
}

/// Picks a recovery action for a failure. Implemented by the interactive CLI
/// prompt and by [`AutoDecider`] for unattended runs.
pub trait RecoveryDecider: Send {
    fn decide(&mut self, report: &FailureReport) -> RecoveryAction;
}

/// Derives option sets and validates decisions.
#[derive(Debug, Default)]
pub struct RecoveryController;

impl RecoveryController {
    /// Legal actions for an error: recoverable failures offer the full set,
    /// non-recoverable ones offer cancel-all only.
    pub fn options_for(error: &ErrorRecord) -> Vec<RecoveryAction> {
        if error.recoverable {
            vec![
                RecoveryAction::Retry,
                RecoveryAction::Skip,
                RecoveryAction::CancelAll,
            ]
        } else {
            vec![RecoveryAction::CancelAll]
        }
    }

    /// Build a report for a failed operation.
    pub fn report(
        operation_id: &str,
        operation_name: &str,
        error: &ErrorRecord,
        retries: u32,
    ) -> FailureReport {
        FailureReport {
            operation_id: operation_id.to_string(),
            operation_name: operation_name.to_string(),
            error: error.clone(),
            retries,
            options: Self::options_for(error),
        }
    }

    /// Ask the decider, clamping out-of-set answers to cancel-all. A decider
    /// returning an action it was not offered is a bug in the frontend, not
    /// a reason to violate the recovery contract.
    pub fn resolve(
        decider: &mut dyn RecoveryDecider,
        report: &FailureReport,
    ) -> RecoveryAction {
        let chosen = decider.decide(report);
        if report.options.contains(&chosen) {
            chosen
        } else {
            warn!(
                operation = report.operation_id,
                ?chosen,
                "decider chose an action outside the offered set; cancelling"
            );
            RecoveryAction::CancelAll
        }
    }
}

/// Non-interactive decision policy: retry up to `max_retries`, then fall
/// back to `then`.
#[derive(Debug, Clone)]
pub struct AutoDecider {
    pub max_retries: u32,
    pub then: RecoveryAction,
}

impl Default for AutoDecider {
    fn default() -> Self {
        Self {
            max_retries: 1,
            then: RecoveryAction::Skip,
        }
    }
}

impl RecoveryDecider for AutoDecider {
    fn decide(&mut self, report: &FailureReport) -> RecoveryAction {
        if !report.error.recoverable {
            return RecoveryAction::CancelAll;
        }
        if report.retries < self.max_retries {
            RecoveryAction::Retry
        } else {
            self.then
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FailureKind;

    fn recoverable_error() -> ErrorRecord {
        ErrorRecord::new(FailureKind::ProcessExit { code: Some(1) }, "exit status 1")
    }

    fn structural_error() -> ErrorRecord {
        ErrorRecord::new(FailureKind::ProcessExit { code: None }, "docker not found").structural()
    }

    #[test]
    fn test_recoverable_offers_full_action_set() {
        let options = RecoveryController::options_for(&recoverable_error());
        assert_eq!(
            options,
            vec![
                RecoveryAction::Retry,
                RecoveryAction::Skip,
                RecoveryAction::CancelAll
            ]
        );
    }

    #[test]
    fn test_non_recoverable_offers_cancel_all_only() {
        let options = RecoveryController::options_for(&structural_error());
        assert_eq!(options, vec![RecoveryAction::CancelAll]);
    }

    #[test]
    fn test_auto_decider_retries_then_falls_back() {
        let mut decider = AutoDecider {
            max_retries: 2,
            then: RecoveryAction::Skip,
        };

        let mut report = RecoveryController::report("install", "Install", &recoverable_error(), 0);
        assert_eq!(decider.decide(&report), RecoveryAction::Retry);

        report.retries = 1;
        assert_eq!(decider.decide(&report), RecoveryAction::Retry);

        report.retries = 2;
        assert_eq!(decider.decide(&report), RecoveryAction::Skip);
    }

    #[test]
    fn test_auto_decider_cancels_on_structural_failure() {
        let mut decider = AutoDecider::default();
        let report = RecoveryController::report("install", "Install", &structural_error(), 0);
        assert_eq!(decider.decide(&report), RecoveryAction::CancelAll);
    }

    #[test]
    fn test_resolve_clamps_illegal_choice() {
        struct AlwaysRetry;
        impl RecoveryDecider for AlwaysRetry {
            fn decide(&mut self, _report: &FailureReport) -> RecoveryAction {
                RecoveryAction::Retry
            }
        }

        let report = RecoveryController::report("install", "Install", &structural_error(), 0);
        let action = RecoveryController::resolve(&mut AlwaysRetry, &report);
        assert_eq!(action, RecoveryAction::CancelAll);
    }
}
