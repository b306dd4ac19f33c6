//! Error types for all tabflow-engine trait operations.

use thiserror::Error;

/// Errors from [`RunsStore`](super::traits::RunsStore).
#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("run {run_id} has schema version {found}, expected {expected}")]
    SchemaVersion {
        run_id: String,
        found: u16,
        expected: u16,
    },
    #[error("run store error: {message}")]
    Store { message: String },
}

/// Errors from [`EventsStore`](super::traits::EventsStore).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Append targeted a run that does not exist.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },
    /// The run's `next_seq` is corrupt. This is a data-corruption signal:
    /// silently coercing it would risk sequence collisions, so it always
    /// fails loudly.
    #[error("run {run_id} violates the sequence invariant: next_seq = {next_seq}")]
    SeqInvariant { run_id: String, next_seq: i64 },
    #[error("event store error: {message}")]
    Store { message: String },
}

/// Errors from [`TriggersStore`](super::traits::TriggersStore).
#[derive(Debug, Error)]
pub enum TriggerStoreError {
    #[error("trigger not found: {id}")]
    NotFound { id: String },
    #[error("trigger store error: {message}")]
    Store { message: String },
}

/// Errors from [`FlowsStore`](super::traits::FlowsStore).
#[derive(Debug, Error)]
pub enum FlowStoreError {
    #[error("flow not found: {id}")]
    NotFound { id: String },
    #[error("flow store error: {message}")]
    Store { message: String },
}

/// Errors from the external platform surface ([`platform`](super::platform)).
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform unavailable: {message}")]
    Unavailable { message: String },
    #[error("tab {tab_id} unreachable: {message}")]
    Tab { tab_id: i64, message: String },
}

/// Errors from [`TriggerHandler`](super::traits::TriggerHandler)
/// implementations.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The trigger spec is malformed. Raised at install time; the trigger is
    /// never partially installed.
    #[error("trigger config error: {message}")]
    Config { message: String },
    #[error("unknown trigger: {id}")]
    Unknown { id: String },
    #[error("platform error: {message}")]
    Platform { message: String },
    /// Firing the shared callback failed downstream of the handler.
    #[error("trigger fire failed: {message}")]
    Fire { message: String },
    #[error("trigger store error: {message}")]
    Store { message: String },
}

impl From<PlatformError> for TriggerError {
    fn from(e: PlatformError) -> Self {
        TriggerError::Platform {
            message: e.to_string(),
        }
    }
}

impl From<TriggerStoreError> for TriggerError {
    fn from(e: TriggerStoreError) -> Self {
        TriggerError::Store {
            message: e.to_string(),
        }
    }
}

/// Errors from the external [`FlowRunner`](super::traits::FlowRunner)
/// collaborator.
#[derive(Debug, Error)]
pub enum FlowRunnerError {
    #[error("flow runner error: {message}")]
    Runner { message: String },
}

/// Errors from the [`Scheduler`](super::scheduler::Scheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },
    #[error(transparent)]
    Runs(#[from] RunStoreError),
    #[error(transparent)]
    Events(#[from] EventStoreError),
    #[error(transparent)]
    Flows(#[from] FlowStoreError),
    #[error(transparent)]
    Triggers(#[from] TriggerStoreError),
}
