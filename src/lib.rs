//! rigup — guided-setup orchestration engine.
//!
//! A setup flow is a DAG of long-running external operations (repository
//! clone, dependency install, project build, container image build). The
//! engine launches them per the dependency graph, merges their uneven
//! progress signals into one monotonic aggregated view, and offers
//! user-directed recovery (retry / skip / cancel-all) when something fails.
//!
//! Entry point: build a [`session::SetupSession`] from a [`plan::SetupPlan`]
//! and a [`runner::ProcessRunner`], subscribe frontends on its aggregator,
//! and `run` it.

pub mod aggregator;
pub mod errors;
pub mod events;
pub mod export;
pub mod graph;
pub mod plan;
pub mod recovery;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod ui;
