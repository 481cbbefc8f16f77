//! Setup-plan definition and JSON loading.
//!
//! A setup run is declared as a list of operations in a `setup-plan.json`
//! file. Each operation names an external command, the operations it depends
//! on, and optional tuning (weight, deadline, progress pattern). Plans are
//! validated on load; a bad plan never reaches the scheduler.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::PlanError;

/// The closed set of operation kinds a setup flow is built from.
///
/// Kind drives default behavior (weight, progress pattern); every such site
/// matches exhaustively so adding a kind is a compile-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    RepositoryClone,
    DependencyInstall,
    ProjectBuild,
    ContainerImageBuild,
    Download,
    EnvironmentSetup,
    CustomScript,
}

impl OperationKind {
    /// All kinds, in display order.
    pub const ALL: [OperationKind; 7] = [
        Self::RepositoryClone,
        Self::DependencyInstall,
        Self::ProjectBuild,
        Self::ContainerImageBuild,
        Self::Download,
        Self::EnvironmentSetup,
        Self::CustomScript,
    ];

    /// Weight used for overall-percent averaging when the plan does not set one.
    pub fn default_weight(self) -> u32 {
        match self {
            Self::RepositoryClone
            | Self::DependencyInstall
            | Self::ProjectBuild
            | Self::ContainerImageBuild
            | Self::Download
            | Self::EnvironmentSetup
            | Self::CustomScript => 1,
        }
    }

    /// Kebab-case name as it appears in plan files and exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepositoryClone => "repository-clone",
            Self::DependencyInstall => "dependency-install",
            Self::ProjectBuild => "project-build",
            Self::ContainerImageBuild => "container-image-build",
            Self::Download => "download",
            Self::EnvironmentSetup => "environment-setup",
            Self::CustomScript => "custom-script",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external, independently-launched unit of work.
///
/// Immutable once the run plan is built; all mutable state lives in the
/// aggregator's [`crate::state::OperationState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    /// Unique id (e.g. "clone", "install")
    pub id: String,
    /// Operation kind from the closed set
    pub kind: OperationKind,
    /// Human-readable name shown in progress output
    pub name: String,
    /// Program to execute
    pub command: String,
    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; defaults to the session's working directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Ids of operations that must complete before this one launches
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Weight for overall-percent averaging; kind default when unset
    #[serde(default)]
    pub weight: Option<u32>,
    /// Per-operation deadline in seconds; no deadline when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Regex with one capture group extracting a 0-100 percent from output
    /// lines; kind default when unset
    #[serde(default)]
    pub progress_pattern: Option<String>,
}

impl Operation {
    /// Create an operation with the fields that matter to the engine.
    pub fn new(id: &str, kind: OperationKind, name: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            name: name.to_string(),
            command: String::new(),
            args: Vec::new(),
            working_dir: None,
            depends_on,
            weight: None,
            timeout_secs: None,
            progress_pattern: None,
        }
    }

    /// Set the command and arguments.
    pub fn with_command(mut self, command: &str, args: Vec<String>) -> Self {
        self.command = command.to_string();
        self.args = args;
        self
    }

    /// Set an explicit weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set a per-operation deadline.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Effective weight: explicit value, else the kind default.
    pub fn effective_weight(&self) -> u32 {
        self.weight.unwrap_or_else(|| self.kind.default_weight())
    }
}

/// Full `setup-plan.json` format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupPlan {
    pub operations: Vec<Operation>,
}

impl SetupPlan {
    /// Validate plan-local invariants (ids, commands, patterns).
    ///
    /// Graph-shape validation (unknown dependencies, cycles) happens in
    /// [`crate::graph::OperationGraph::build`], which every session runs
    /// before launching anything.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.operations.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut seen = std::collections::HashSet::new();
        for op in &self.operations {
            if !seen.insert(op.id.as_str()) {
                return Err(PlanError::DuplicateId { id: op.id.clone() });
            }
            if op.command.trim().is_empty() {
                return Err(PlanError::EmptyCommand {
                    operation: op.id.clone(),
                });
            }
            if let Some(pattern) = &op.progress_pattern {
                regex::Regex::new(pattern).map_err(|source| PlanError::BadProgressPattern {
                    operation: op.id.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

/// Load and validate a plan file.
pub fn load_plan(path: &Path) -> Result<SetupPlan, PlanError> {
    let content = std::fs::read_to_string(path).map_err(|source| PlanError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let plan: SetupPlan =
        serde_json::from_str(&content).map_err(|source| PlanError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;

    plan.validate()?;
    Ok(plan)
}
