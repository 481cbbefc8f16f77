//! Immutable event facts ingested by the aggregator.
//!
//! `LogEntry` is both the single ingestion type and the append-only history
//! entry type: everything the engine ever learns about an operation arrives
//! as one of these, and exports are derived from the retained sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which standard stream a console line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdStream {
    Stdout,
    Stderr,
}

/// One raw output line from an operation's process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLine {
    #[serde(rename = "operationId")]
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub stream: StdStream,
    pub content: String,
}

/// Failure taxonomy. The runner boundary decides the kind; the recovery
/// controller only ever reads the `recoverable` flag on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or I/O hiccup mid-operation
    TransientIo,
    /// Non-zero exit; `code` is absent when the process never launched
    ProcessExit { code: Option<i32> },
    /// Per-operation deadline exceeded
    Timeout,
    /// Bad configuration discovered at launch
    Validation,
}

impl FailureKind {
    /// Default recoverability for the kind. The runner may override (e.g. a
    /// structural exit such as a missing required tool is not recoverable).
    pub fn default_recoverable(&self) -> bool {
        match self {
            Self::TransientIo | Self::ProcessExit { .. } | Self::Timeout => true,
            Self::Validation => false,
        }
    }
}

/// Immutable record of one failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: FailureKind,
    pub message: String,
    pub recoverable: bool,
}

impl ErrorRecord {
    /// Record with the kind's default recoverability.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let recoverable = kind.default_recoverable();
        Self {
            kind,
            message: message.into(),
            recoverable,
        }
    }

    /// Mark the failure structural regardless of kind defaults.
    pub fn structural(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

/// Severity used by export filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Union of console output and structured lifecycle events.
///
/// Serialization is the export wire format: one object per entry, tagged by
/// `kind`, operation id under `operationId`. Deserialization round-trips
/// losslessly (see exporter tests).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    Console {
        #[serde(flatten)]
        line: ConsoleLine,
    },
    Started {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
        /// 1-based attempt number; 2 and up mean retries
        attempt: u32,
    },
    Progress {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Completing {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
    },
    Completed {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Failed {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
        error: ErrorRecord,
    },
    Cancelled {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
        /// True when this cancellation is a user-directed skip
        skipped: bool,
    },
    Retried {
        #[serde(rename = "operationId")]
        operation_id: String,
        timestamp: DateTime<Utc>,
        /// Attempt number the retry opens
        attempt: u32,
    },
}

impl LogEntry {
    pub fn operation_id(&self) -> &str {
        match self {
            Self::Console { line } => &line.operation_id,
            Self::Started { operation_id, .. }
            | Self::Progress { operation_id, .. }
            | Self::Completing { operation_id, .. }
            | Self::Completed { operation_id, .. }
            | Self::Failed { operation_id, .. }
            | Self::Cancelled { operation_id, .. }
            | Self::Retried { operation_id, .. } => operation_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Console { line } => line.timestamp,
            Self::Started { timestamp, .. }
            | Self::Progress { timestamp, .. }
            | Self::Completing { timestamp, .. }
            | Self::Completed { timestamp, .. }
            | Self::Failed { timestamp, .. }
            | Self::Cancelled { timestamp, .. }
            | Self::Retried { timestamp, .. } => *timestamp,
        }
    }

    /// Severity for export filtering: failures are errors, stderr output is a
    /// warning, everything else informational. Cancellation never displays as
    /// an error.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Failed { .. } => Severity::Error,
            Self::Console { line } if line.stream == StdStream::Stderr => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Human-readable one-line rendering used by the plain-text and HTML
    /// exports.
    pub fn display_message(&self) -> String {
        match self {
            Self::Console { line } => line.content.clone(),
            Self::Started { attempt, .. } => {
                if *attempt > 1 {
                    format!("started (attempt {})", attempt)
                } else {
                    "started".to_string()
                }
            }
            Self::Progress {
                percent, message, ..
            } => match message {
                Some(msg) => format!("{}% - {}", percent, msg),
                None => format!("{}%", percent),
            },
            Self::Completing { .. } => "finalizing".to_string(),
            Self::Completed { message, .. } => match message {
                Some(msg) => format!("completed - {}", msg),
                None => "completed".to_string(),
            },
            Self::Failed { error, .. } => format!("failed: {}", error.message),
            Self::Cancelled { skipped, .. } => {
                if *skipped {
                    "skipped".to_string()
                } else {
                    "cancelled".to_string()
                }
            }
            Self::Retried { attempt, .. } => format!("retrying (attempt {})", attempt),
        }
    }
}
