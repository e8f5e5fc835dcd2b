//! Core types and error definitions for the Cohort team orchestrator.
//!
//! This crate provides the foundational types shared across all Cohort crates:
//! the error taxonomy, the Team/Teammate/Task data model with its typed
//! patches, and the lifecycle messages published while teams run.
//!
//! # Main types
//!
//! - [`CohortError`]: Unified error enum for all Cohort subsystems.
//! - [`CohortResult`]: Convenience alias for `Result<T, CohortError>`.
//! - [`Team`], [`Teammate`], [`Task`]: Records owned by the persistence gateway.
//! - [`TaskPatch`], [`TeamPatch`], [`TeammatePatch`]: Partial updates.
//! - [`LifecycleMessage`]: A notification emitted on task/team transitions.
//! - [`MessageBroker`]: Sink for lifecycle notifications.

/// Lifecycle messages and the broker interface.
pub mod message;
/// Team, teammate and task records.
pub mod model;

pub use message::{InMemoryBroker, LifecycleMessage, MessageBroker, MessageKind, TracingBroker};
pub use model::{
    AllocationStrategy, Task, TaskDependencies, TaskPatch, TaskStatus, Team, TeamPatch, TeamStatus,
    Teammate, TeammatePatch, TeammateStats, TeammateStatus,
};

// --- Error types ---

/// Top-level error type for the Cohort orchestrator.
///
/// Provider failures inside a task execution never surface through this type;
/// the runtime folds them into a structured execution result instead.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// A team, teammate, task or session id did not resolve.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A task was started before all of its prerequisites completed.
    #[error("Dependencies not satisfied for task {task_id}: waiting on {pending}")]
    DependencyNotSatisfied {
        /// The task that was asked to start.
        task_id: String,
        /// Comma-separated ids of prerequisites that are not completed.
        pending: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Circular dependency detected among: {0}")]
    CircularDependency(String),

    /// A provider client failed or reported an unsuccessful run.
    #[error("Provider execution error ({provider}): {message}")]
    ProviderExecution {
        /// Provider identifier the attempt ran against.
        provider: String,
        /// Failure text reported by the client.
        message: String,
    },

    /// An operation was requested from a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An error related to execution session bookkeeping.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised by the persistence gateway.
    #[error("Store error: {0}")]
    Store(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CohortError {
    /// Shorthand for a [`CohortError::NotFound`] naming the entity kind.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        CohortError::NotFound(format!("{kind} {id}"))
    }
}

/// A convenience `Result` alias using [`CohortError`].
pub type CohortResult<T> = Result<T, CohortError>;
