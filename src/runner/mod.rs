//! Process runner boundary.
//!
//! The engine treats every operation as an opaque process that emits tagged
//! output lines and one terminal exit status. `ProcessRunner`/`ProcessHandle`
//! are that contract; `CommandRunner` is the tokio-backed implementation.
//! The terminal `Exited` event is guaranteed to be the last event a handle
//! yields.

pub mod scan;

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::errors::RunnerError;
use crate::events::{ErrorRecord, FailureKind, StdStream};

/// Everything needed to launch one operation's process.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            working_dir: None,
            envs: Vec::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}

/// Raw event from a running process.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Line { stream: StdStream, text: String },
    /// Always the final event. `code` is `None` when the process was killed
    /// by a signal.
    Exited { code: Option<i32>, success: bool },
}

/// Handle on one spawned process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Next event in production order; `None` once `Exited` was delivered.
    async fn next_event(&mut self) -> Option<RunnerEvent>;

    /// Ask the process to die. Idempotent; the caller still drains
    /// `next_event` until `Exited` (or gives up after its grace period).
    async fn kill(&mut self);
}

/// Spawns processes for operations.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>, RunnerError>;
}

/// Classify a spawn failure: a missing or unusable tool is structural, other
/// I/O errors are transient.
pub fn classify_spawn_error(program: &str, err: &std::io::Error) -> ErrorRecord {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => ErrorRecord::new(
            FailureKind::ProcessExit { code: None },
            format!("failed to launch '{}': {}", program, err),
        )
        .structural(),
        _ => ErrorRecord::new(
            FailureKind::TransientIo,
            format!("failed to launch '{}': {}", program, err),
        ),
    }
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct CommandRunner;

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>, RunnerError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::SpawnFailed {
            program: spec.program.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::StreamCaptureFailed {
                program: spec.program.clone(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::StreamCaptureFailed {
                program: spec.program.clone(),
            })?;

        let (tx, rx) = mpsc::channel::<(StdStream, String)>(256);

        let out_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if out_tx.send((StdStream::Stdout, line)).await.is_err() {
                    break;
                }
            }
        });

        let err_tx = tx;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if err_tx.send((StdStream::Stderr, line)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ChildHandle {
            child,
            lines: rx,
            exited: false,
        }))
    }
}

struct ChildHandle {
    child: Child,
    lines: mpsc::Receiver<(StdStream, String)>,
    exited: bool,
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    async fn next_event(&mut self) -> Option<RunnerEvent> {
        if self.exited {
            return None;
        }
        match self.lines.recv().await {
            Some((stream, text)) => Some(RunnerEvent::Line { stream, text }),
            // Both reader tasks are done, so every produced line has been
            // delivered; the exit status is the last event.
            None => {
                self.exited = true;
                match self.child.wait().await {
                    Ok(status) => Some(RunnerEvent::Exited {
                        code: status.code(),
                        success: status.success(),
                    }),
                    Err(_) => Some(RunnerEvent::Exited {
                        code: None,
                        success: false,
                    }),
                }
            }
        }
    }

    async fn kill(&mut self) {
        // start_kill on an already-dead child is fine; cooperative callers
        // keep draining next_event afterwards
        let _ = self.child.start_kill();
    }
}
