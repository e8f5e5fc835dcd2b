//! Team orchestration for Cohort.
//!
//! Resolves task dependencies, routes each task to an AI provider, pairs
//! ready tasks with idle teammates, drives the team lifecycle and executes
//! tasks with retries and provider failover.
//!
//! # Main types
//!
//! - [`DependencyResolver`]: Topological ordering, cycle detection and readiness.
//! - [`ProviderRouter`]: Content-based provider choice and failover targets.
//! - [`TaskManager`]: Assignment of ready tasks to idle teammates.
//! - [`TeamCoordinator`]: Team start/pause, scheduling and terminal bookkeeping.
//! - [`TaskExecutionRuntime`]: Runs one task through its provider with retries.
//! - [`Orchestrator`]: Wires the above over one store and runs a team to idle.

/// Round-robin, least-busy and skill-match teammate selection.
pub mod allocator;
/// TOML configuration for the whole orchestrator.
pub mod config;
/// Team lifecycle and task terminal transitions.
pub mod coordinator;
/// Dependency graph ordering and readiness checks.
pub mod dependency;
/// Component wiring and the wave-based team driver.
pub mod engine;
/// Provider routing and failover.
pub mod router;
/// Task execution with retries and failover.
pub mod runtime;
/// Task assignment.
pub mod task_manager;

pub use allocator::TaskAllocator;
pub use config::OrchestratorConfig;
pub use coordinator::{TaskOutcome, TeamCoordinator};
pub use dependency::{DependencyGraph, DependencyResolver};
pub use engine::{Orchestrator, RunSummary};
pub use router::{ProviderRouter, ProviderSelection, ProviderSpec, Route, RouterConfig};
pub use runtime::{ExecutionResult, RuntimeConfig, TaskExecutionRuntime};
pub use task_manager::{Assignment, TaskManager};
