//! Orchestration session: one guided setup run.
//!
//! A `SetupSession` owns the validated graph, the launch scheduler, the
//! aggregator, and a process runner. `run` drives the whole flow: launch
//! eligible operations up to the concurrency limit, funnel every event from
//! every operation task into the single ingest loop, and consult the
//! recovery decider whenever something fails.
//!
//! Sessions are per-run values; independent runs never share state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{AggregatorConfig, ProgressAggregator};
use crate::errors::EngineError;
use crate::events::{ConsoleLine, ErrorRecord, FailureKind, LogEntry};
use crate::graph::OperationGraph;
use crate::plan::{Operation, SetupPlan};
use crate::recovery::{RecoveryAction, RecoveryController, RecoveryDecider};
use crate::runner::scan::ProgressScanner;
use crate::runner::{classify_spawn_error, CommandSpec, ProcessRunner, RunnerEvent};
use crate::scheduler::Scheduler;
use crate::state::OpPhase;

/// Session tuning. Defaults follow the engine contract: sequential launches,
/// 5 s kill grace, 100 ms notification throttle, 1000-line console.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_parallel: usize,
    pub kill_grace: Duration,
    pub throttle_interval: Duration,
    pub console_capacity: usize,
    /// When true, dependents of a skipped operation still launch
    pub proceed_past_skipped: bool,
    /// Base working directory for operations that do not set their own
    pub working_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            kill_grace: Duration::from_secs(5),
            throttle_interval: Duration::from_millis(100),
            console_capacity: 1000,
            proceed_past_skipped: false,
            working_dir: None,
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub overall_percent: u8,
    pub duration: Duration,
}

impl RunSummary {
    /// True when every operation reached terminal success.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// One orchestration run over a validated plan.
pub struct SetupSession {
    id: Uuid,
    config: SessionConfig,
    scheduler: Scheduler,
    aggregator: ProgressAggregator,
    runner: Arc<dyn ProcessRunner>,
    cancel: CancellationToken,
}

impl SetupSession {
    /// Validate the plan and build a session. Configuration errors (empty
    /// plan, duplicate ids, unknown dependencies, cycles, bad patterns) are
    /// rejected here, before anything launches.
    pub fn new(
        plan: SetupPlan,
        runner: Arc<dyn ProcessRunner>,
        config: SessionConfig,
    ) -> Result<Self, EngineError> {
        plan.validate()?;
        let graph = OperationGraph::build(plan.operations)?;
        let ordered: Vec<Operation> = graph
            .operations_in_topo_order()
            .into_iter()
            .cloned()
            .collect();
        let aggregator = ProgressAggregator::new(
            ordered,
            AggregatorConfig {
                throttle_interval: config.throttle_interval,
                console_capacity: config.console_capacity,
            },
        );
        let scheduler = Scheduler::new(graph, config.proceed_past_skipped);

        Ok(Self {
            id: Uuid::new_v4(),
            config,
            scheduler,
            aggregator,
            runner,
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token that cancels the whole run when triggered; hand a clone to
    /// signal handlers. Cancellation is cooperative and idempotent.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn aggregator(&self) -> &ProgressAggregator {
        &self.aggregator
    }

    /// Mutable aggregator access, for subscribing frontends before `run`.
    pub fn aggregator_mut(&mut self) -> &mut ProgressAggregator {
        &mut self.aggregator
    }

    /// Drive the run to completion. The decider is consulted on every
    /// failure carrying a recoverable error; non-recoverable failures offer
    /// cancel-all only.
    pub async fn run(
        &mut self,
        decider: &mut dyn RecoveryDecider,
    ) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        let (event_tx, mut event_rx) = mpsc::channel::<LogEntry>(256);
        let cancel = self.cancel.clone();
        let mut cancel_handled = false;

        info!(session = %self.id, operations = self.scheduler.graph().len(), "setup run starting");

        loop {
            self.launch_ready(&event_tx);

            if self.scheduler.all_terminal() {
                break;
            }

            if self.scheduler.stalled() {
                // Queued operations blocked behind a terminal failure with no
                // pending decision; close them out as cancelled.
                warn!(session = %self.id, "run stalled; cancelling blocked operations");
                self.cancel_all(&mut cancel_handled);
                continue;
            }

            let entry = if cancel_handled {
                event_rx.recv().await
            } else {
                tokio::select! {
                    entry = event_rx.recv() => entry,
                    _ = cancel.cancelled() => {
                        self.cancel_all(&mut cancel_handled);
                        continue;
                    }
                }
            };

            let Some(entry) = entry else {
                return Err(EngineError::EventChannelClosed);
            };
            self.handle_event(entry, decider, &mut cancel_handled);
        }

        let summary = self.summarize(started.elapsed());
        info!(
            session = %self.id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "setup run finished"
        );
        Ok(summary)
    }

    /// Launch eligible operations until the concurrency limit is reached.
    fn launch_ready(&mut self, event_tx: &mpsc::Sender<LogEntry>) {
        loop {
            if self.scheduler.running_count() >= self.config.max_parallel {
                return;
            }
            let Some(op) = self.scheduler.ready_operations().into_iter().next().cloned()
            else {
                return;
            };

            let retries = self
                .aggregator
                .snapshot()
                .operation(&op.id)
                .map_or(0, |snapshot| snapshot.state.retries);
            let attempt = retries + 1;

            debug!(operation = %op.id, attempt, "launching operation");
            self.scheduler.mark_running(&op.id);

            let runner = self.runner.clone();
            let tx = event_tx.clone();
            let token = self.cancel.child_token();
            let grace = self.config.kill_grace;
            let working_dir = op
                .working_dir
                .clone()
                .or_else(|| self.config.working_dir.clone());

            tokio::spawn(async move {
                run_operation(op, attempt, runner, tx, token, grace, working_dir).await;
            });
        }
    }

    /// Fold one event into the aggregate and react to terminal outcomes.
    fn handle_event(
        &mut self,
        entry: LogEntry,
        decider: &mut dyn RecoveryDecider,
        cancel_handled: &mut bool,
    ) {
        let operation_id = entry.operation_id().to_string();
        let failure = match &entry {
            LogEntry::Failed { error, .. } => Some(error.clone()),
            _ => None,
        };
        let outcome = match &entry {
            LogEntry::Completed { .. } => Some(OpPhase::Complete),
            LogEntry::Failed { .. } => Some(OpPhase::Failed),
            LogEntry::Cancelled { .. } => Some(OpPhase::Cancelled),
            _ => None,
        };

        self.aggregator.ingest(entry);

        match outcome {
            Some(OpPhase::Complete) => self.scheduler.mark_succeeded(&operation_id),
            Some(OpPhase::Cancelled) => self.scheduler.mark_cancelled(&operation_id),
            Some(OpPhase::Failed) => {
                self.scheduler.mark_failed(&operation_id);
                if let Some(error) = failure {
                    self.recover(&operation_id, &error, decider, cancel_handled);
                }
            }
            _ => {}
        }
    }

    /// Consult the decider and apply its choice.
    fn recover(
        &mut self,
        operation_id: &str,
        error: &ErrorRecord,
        decider: &mut dyn RecoveryDecider,
        cancel_handled: &mut bool,
    ) {
        // A cancelled run needs no decisions; failures that race the sweep
        // are already terminal.
        if self.scheduler.is_cancelled() {
            return;
        }

        let snapshot = self.aggregator.snapshot();
        let Some(op) = snapshot.operation(operation_id) else {
            warn!(operation = operation_id, "failure for unregistered operation");
            return;
        };
        let report =
            RecoveryController::report(operation_id, &op.name, error, op.state.retries);
        let action = RecoveryController::resolve(decider, &report);
        info!(operation = operation_id, action = %action, "recovery decision");

        match action {
            RecoveryAction::Retry => {
                self.aggregator.ingest(LogEntry::Retried {
                    operation_id: operation_id.to_string(),
                    timestamp: Utc::now(),
                    attempt: op.state.retries + 2,
                });
                self.scheduler.mark_retrying(operation_id);
            }
            RecoveryAction::Skip => {
                self.aggregator.ingest(LogEntry::Cancelled {
                    operation_id: operation_id.to_string(),
                    timestamp: Utc::now(),
                    skipped: true,
                });
                for dependent in self.scheduler.mark_skipped(operation_id) {
                    self.aggregator.ingest(LogEntry::Cancelled {
                        operation_id: dependent,
                        timestamp: Utc::now(),
                        skipped: true,
                    });
                }
            }
            RecoveryAction::CancelAll => {
                self.cancel_all(cancel_handled);
            }
        }
    }

    /// Stop launching, cancel queued operations immediately, and signal
    /// running ones to die. Safe to call more than once.
    fn cancel_all(&mut self, cancel_handled: &mut bool) {
        *cancel_handled = true;
        self.cancel.cancel();
        for operation_id in self.scheduler.cancel() {
            self.aggregator.ingest(LogEntry::Cancelled {
                operation_id,
                timestamp: Utc::now(),
                skipped: false,
            });
        }
    }

    fn summarize(&self, duration: Duration) -> RunSummary {
        let snapshot = self.aggregator.snapshot();
        let mut summary = RunSummary {
            total: snapshot.operations.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            overall_percent: snapshot.overall_percent,
            duration,
        };
        for op in &snapshot.operations {
            match op.state.phase {
                OpPhase::Complete => summary.succeeded += 1,
                OpPhase::Failed => summary.failed += 1,
                OpPhase::Cancelled if op.state.skipped => summary.skipped += 1,
                OpPhase::Cancelled => summary.cancelled += 1,
                // non-terminal phases cannot appear after run() returns
                _ => {}
            }
        }
        summary
    }
}

/// Body of one operation task: spawn the process, relay its output, and
/// always finish with exactly one terminal event.
async fn run_operation(
    op: Operation,
    attempt: u32,
    runner: Arc<dyn ProcessRunner>,
    tx: mpsc::Sender<LogEntry>,
    token: CancellationToken,
    grace: Duration,
    working_dir: Option<PathBuf>,
) {
    let send = |entry: LogEntry| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(entry).await;
        }
    };

    send(LogEntry::Started {
        operation_id: op.id.clone(),
        timestamp: Utc::now(),
        attempt,
    })
    .await;

    let mut spec = CommandSpec::new(&op.command, op.args.clone());
    if let Some(dir) = working_dir {
        spec = spec.with_working_dir(dir);
    }

    let mut handle = match runner.spawn(&spec).await {
        Ok(handle) => handle,
        Err(err) => {
            let record = match &err {
                crate::errors::RunnerError::SpawnFailed { program, source } => {
                    classify_spawn_error(program, source)
                }
                other => ErrorRecord::new(FailureKind::TransientIo, other.to_string()),
            };
            send(LogEntry::Failed {
                operation_id: op.id.clone(),
                timestamp: Utc::now(),
                error: record,
            })
            .await;
            return;
        }
    };

    let scanner = ProgressScanner::for_operation(&op);
    let deadline = op
        .timeout_secs
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    loop {
        let deadline_sleep = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = handle.next_event() => match event {
                Some(RunnerEvent::Line { stream, text }) => {
                    if let Some(percent) = scanner.as_ref().and_then(|s| s.scan(&text)) {
                        send(LogEntry::Progress {
                            operation_id: op.id.clone(),
                            timestamp: Utc::now(),
                            percent,
                            message: None,
                        })
                        .await;
                    }
                    send(LogEntry::Console {
                        line: ConsoleLine {
                            operation_id: op.id.clone(),
                            timestamp: Utc::now(),
                            stream,
                            content: text,
                        },
                    })
                    .await;
                }
                Some(RunnerEvent::Exited { code, success }) => {
                    if success {
                        send(LogEntry::Completing {
                            operation_id: op.id.clone(),
                            timestamp: Utc::now(),
                        })
                        .await;
                        send(LogEntry::Completed {
                            operation_id: op.id.clone(),
                            timestamp: Utc::now(),
                            message: Some("exit status 0".to_string()),
                        })
                        .await;
                    } else if token.is_cancelled() {
                        send(LogEntry::Cancelled {
                            operation_id: op.id.clone(),
                            timestamp: Utc::now(),
                            skipped: false,
                        })
                        .await;
                    } else {
                        let message = match code {
                            Some(code) => format!("exit status {}", code),
                            None => "terminated by signal".to_string(),
                        };
                        send(LogEntry::Failed {
                            operation_id: op.id.clone(),
                            timestamp: Utc::now(),
                            error: ErrorRecord::new(FailureKind::ProcessExit { code }, message),
                        })
                        .await;
                    }
                    return;
                }
                // the contract makes Exited the final event and we return on
                // it, so a closed stream here means the runner lost the
                // process
                None => {
                    send(LogEntry::Failed {
                        operation_id: op.id.clone(),
                        timestamp: Utc::now(),
                        error: ErrorRecord::new(
                            FailureKind::TransientIo,
                            "output stream closed before exit status",
                        ),
                    })
                    .await;
                    return;
                }
            },
            _ = token.cancelled() => {
                kill_with_grace(handle.as_mut(), grace).await;
                send(LogEntry::Cancelled {
                    operation_id: op.id.clone(),
                    timestamp: Utc::now(),
                    skipped: false,
                })
                .await;
                return;
            }
            _ = deadline_sleep => {
                kill_with_grace(handle.as_mut(), grace).await;
                send(LogEntry::Failed {
                    operation_id: op.id.clone(),
                    timestamp: Utc::now(),
                    error: ErrorRecord::new(
                        FailureKind::Timeout,
                        format!(
                            "deadline of {}s exceeded",
                            op.timeout_secs.unwrap_or_default()
                        ),
                    ),
                })
                .await;
                return;
            }
        }
    }
}

/// Kill the process and wait up to `grace` for its exit event; after that
/// the kill is considered complete regardless of process response.
async fn kill_with_grace(handle: &mut dyn crate::runner::ProcessHandle, grace: Duration) {
    handle.kill().await;
    let drain = async {
        loop {
            match handle.next_event().await {
                Some(RunnerEvent::Exited { .. }) | None => break,
                Some(RunnerEvent::Line { .. }) => {}
            }
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!("process ignored kill for the whole grace period");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OperationKind;
    use crate::recovery::AutoDecider;
    use crate::runner::CommandRunner;

    fn shell_op(id: &str, script: &str, deps: Vec<&str>) -> Operation {
        Operation::new(
            id,
            OperationKind::CustomScript,
            id,
            deps.into_iter().map(String::from).collect(),
        )
        .with_command("/bin/sh", vec!["-c".into(), script.into()])
    }

    fn session(operations: Vec<Operation>, config: SessionConfig) -> SetupSession {
        SetupSession::new(
            SetupPlan { operations },
            Arc::new(CommandRunner),
            config,
        )
        .unwrap()
    }

    fn quick_config() -> SessionConfig {
        SessionConfig {
            kill_grace: Duration::from_secs(2),
            throttle_interval: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_linear_run_succeeds() {
        let mut session = session(
            vec![
                shell_op("a", "echo a-done", vec![]),
                shell_op("b", "echo b-done", vec!["a"]),
                shell_op("c", "echo c-done", vec!["b"]),
            ],
            quick_config(),
        );

        let summary = session.run(&mut AutoDecider::default()).await.unwrap();
        assert!(summary.all_succeeded());
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.overall_percent, 100);

        let snapshot = session.aggregator().snapshot();
        for id in ["a", "b", "c"] {
            assert_eq!(snapshot.operation(id).unwrap().state.phase, OpPhase::Complete);
        }
    }

    #[tokio::test]
    async fn test_sequential_launch_order_respects_dependencies() {
        let mut session = session(
            vec![
                shell_op("a", "echo a", vec![]),
                shell_op("b", "echo b", vec!["a"]),
            ],
            quick_config(),
        );
        session.run(&mut AutoDecider::default()).await.unwrap();

        let history = session.aggregator().history();
        let a_completed = history
            .iter()
            .position(|e| matches!(e, LogEntry::Completed { operation_id, .. } if operation_id == "a"))
            .unwrap();
        let b_started = history
            .iter()
            .position(|e| matches!(e, LogEntry::Started { operation_id, .. } if operation_id == "b"))
            .unwrap();
        assert!(a_completed < b_started, "b launched before a completed");
    }

    #[tokio::test]
    async fn test_console_lines_are_captured() {
        let mut session = session(
            vec![shell_op("a", "echo out-line; echo err-line 1>&2", vec![])],
            quick_config(),
        );
        session.run(&mut AutoDecider::default()).await.unwrap();

        let snapshot = session.aggregator().snapshot();
        let contents: Vec<&str> = snapshot
            .console
            .iter()
            .map(|line| line.content.as_str())
            .collect();
        assert!(contents.contains(&"out-line"));
        assert!(contents.contains(&"err-line"));
    }

    #[tokio::test]
    async fn test_progress_scanned_from_output() {
        let mut session = session(
            vec![shell_op("a", "echo 'working 40%'; echo 'working 80%'", vec![])],
            quick_config(),
        );
        session.run(&mut AutoDecider::default()).await.unwrap();

        let saw_progress = session.aggregator().history().iter().any(|entry| {
            matches!(entry, LogEntry::Progress { percent, .. } if *percent == 80)
        });
        assert!(saw_progress);
    }

    #[tokio::test]
    async fn test_retry_reruns_failed_operation_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("attempted");
        // first attempt fails, the retry finds the flag file and succeeds
        let script = format!(
            "if [ -f {flag} ]; then exit 0; else touch {flag}; exit 1; fi",
            flag = flag.display()
        );

        let mut session = session(
            vec![
                shell_op("a", "echo ok", vec![]),
                shell_op("b", &script, vec!["a"]),
                shell_op("c", "echo ok", vec!["b"]),
            ],
            quick_config(),
        );

        let mut decider = AutoDecider {
            max_retries: 1,
            then: RecoveryAction::CancelAll,
        };
        let summary = session.run(&mut decider).await.unwrap();

        assert!(summary.all_succeeded());
        assert_eq!(summary.overall_percent, 100);
        let snapshot = session.aggregator().snapshot();
        assert_eq!(snapshot.operation("b").unwrap().state.retries, 1);

        let retried = session
            .aggregator()
            .history()
            .iter()
            .any(|e| matches!(e, LogEntry::Retried { operation_id, .. } if operation_id == "b"));
        assert!(retried);
    }

    #[tokio::test]
    async fn test_non_recoverable_failure_never_launches_dependents() {
        let mut session = session(
            vec![
                // missing tool: structural, non-recoverable
                Operation::new("a", OperationKind::ContainerImageBuild, "a", vec![])
                    .with_command("rigup-test-no-such-tool", vec![]),
                shell_op("b", "echo ok", vec!["a"]),
                shell_op("c", "echo ok", vec!["b"]),
            ],
            quick_config(),
        );

        let summary = session.run(&mut AutoDecider::default()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 2);

        let history = session.aggregator().history();
        for id in ["b", "c"] {
            let launched = history
                .iter()
                .any(|e| matches!(e, LogEntry::Started { operation_id, .. } if operation_id == id));
            assert!(!launched, "{} must never launch", id);
        }

        let failure = history.iter().find_map(|e| match e {
            LogEntry::Failed { error, .. } => Some(error.clone()),
            _ => None,
        });
        assert!(!failure.unwrap().recoverable);
    }

    #[tokio::test]
    async fn test_skip_cascades_to_dependents_but_not_siblings() {
        let mut session = session(
            vec![
                shell_op("a", "exit 1", vec![]),
                shell_op("b", "echo ok", vec!["a"]),
                shell_op("d", "echo ok", vec![]),
            ],
            quick_config(),
        );

        let mut decider = AutoDecider {
            max_retries: 0,
            then: RecoveryAction::Skip,
        };
        let summary = session.run(&mut decider).await.unwrap();

        let snapshot = session.aggregator().snapshot();
        let a = snapshot.operation("a").unwrap();
        assert_eq!(a.state.phase, OpPhase::Cancelled);
        assert!(a.state.skipped);
        let b = snapshot.operation("b").unwrap();
        assert_eq!(b.state.phase, OpPhase::Cancelled);
        assert!(b.state.skipped);
        assert_eq!(snapshot.operation("d").unwrap().state.phase, OpPhase::Complete);

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.succeeded, 1);
        // skipped operations count 100 toward the denominator
        assert_eq!(summary.overall_percent, 100);
    }

    #[tokio::test]
    async fn test_cancel_all_reaches_running_and_queued_operations() {
        let mut session = session(
            vec![
                shell_op("a", "sleep 30", vec![]),
                shell_op("b", "echo never", vec!["a"]),
            ],
            quick_config(),
        );

        let token = session.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });

        let started = Instant::now();
        let summary = session.run(&mut AutoDecider::default()).await.unwrap();
        // well within the 2 s grace configured for tests
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(summary.cancelled, 2);
        let snapshot = session.aggregator().snapshot();
        assert_eq!(snapshot.operation("a").unwrap().state.phase, OpPhase::Cancelled);
        assert_eq!(snapshot.operation("b").unwrap().state.phase, OpPhase::Cancelled);

        let b_launched = session
            .aggregator()
            .history()
            .iter()
            .any(|e| matches!(e, LogEntry::Started { operation_id, .. } if operation_id == "b"));
        assert!(!b_launched);
    }

    #[tokio::test]
    async fn test_timeout_fails_the_operation() {
        let mut op = shell_op("slow", "sleep 30", vec![]);
        op.timeout_secs = Some(1);

        let mut session = session(vec![op], quick_config());
        let mut decider = AutoDecider {
            max_retries: 0,
            then: RecoveryAction::Skip,
        };
        session.run(&mut decider).await.unwrap();

        let history = session.aggregator().history();
        let timed_out = history.iter().any(|e| {
            matches!(
                e,
                LogEntry::Failed { error, .. } if matches!(error.kind, FailureKind::Timeout)
            )
        });
        assert!(timed_out);
    }

    #[tokio::test]
    async fn test_parallel_limit_allows_concurrent_roots() {
        let config = SessionConfig {
            max_parallel: 2,
            ..quick_config()
        };
        let mut session = session(
            vec![
                shell_op("a", "sleep 0.3; echo a", vec![]),
                shell_op("b", "sleep 0.3; echo b", vec![]),
            ],
            config,
        );

        let started = Instant::now();
        let summary = session.run(&mut AutoDecider::default()).await.unwrap();
        assert!(summary.all_succeeded());
        // both ran together: well under the 0.6 s a sequential run needs
        assert!(started.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_before_launch() {
        let result = SetupSession::new(
            SetupPlan {
                operations: vec![
                    shell_op("a", "echo", vec!["b"]),
                    shell_op("b", "echo", vec!["a"]),
                ],
            },
            Arc::new(CommandRunner),
            SessionConfig::default(),
        );
        assert!(result.is_err());
    }
}
