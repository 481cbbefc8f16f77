//! Typed error hierarchy for the rigup engine.
//!
//! Three top-level enums cover the three subsystems:
//! - `PlanError` — setup-plan validation failures, rejected before any launch
//! - `RunnerError` — process spawn and stream failures
//! - `EngineError` — session-level failures

use std::path::PathBuf;
use thiserror::Error;

use crate::state::OpPhase;

/// Errors detected while loading or registering a setup plan.
///
/// All of these are configuration errors: they are reported synchronously to
/// the caller and the run never starts.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Failed to read plan file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse plan file at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Plan contains no operations")]
    Empty,

    #[error("Duplicate operation id: {id}")]
    DuplicateId { id: String },

    #[error("Operation '{operation}' depends on unknown operation '{dependency}'")]
    UnknownDependency {
        operation: String,
        dependency: String,
    },

    #[error("Dependency cycle detected. Involved operations: {0:?}")]
    Cycle(Vec<String>),

    #[error("Invalid progress pattern on operation '{operation}': {source}")]
    BadProgressPattern {
        operation: String,
        #[source]
        source: regex::Error,
    },

    #[error("Operation '{operation}' has an empty command")]
    EmptyCommand { operation: String },
}

/// Errors from the process runner boundary.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture output streams of '{program}'")]
    StreamCaptureFailed { program: String },
}

/// Session-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Invalid phase transition {from:?} -> {to:?} for operation '{operation}'")]
    InvalidTransition {
        operation: String,
        from: OpPhase,
        to: OpPhase,
    },

    #[error("Event channel closed before all operations reached a terminal phase")]
    EventChannelClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
