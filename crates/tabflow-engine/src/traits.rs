//! Trait seams for every pluggable component.
//!
//! Storage contracts, the shared trigger-handler shape, and the external
//! flow-runner collaborator are all defined as async traits. Default
//! implementations live in [`stores`](crate::stores) and
//! [`triggers`](crate::triggers).

use async_trait::async_trait;

use super::errors::{
    EventStoreError, FlowRunnerError, FlowStoreError, RunStoreError, TriggerError,
    TriggerStoreError,
};
use super::types::{
    Flow, RunEvent, RunEventInput, RunOptions, RunRecord, RunResult, TriggerFireContext,
    TriggerKind, TriggerSpec,
};

// ---------------------------------------------------------------------------
// RunsStore
// ---------------------------------------------------------------------------

/// Durable run-record ledger keyed by run id.
///
/// `save` is an upsert. No other mutation primitives exist at this layer:
/// `next_seq` moves only through [`EventsStore::append`], status only through
/// the scheduler.
#[async_trait]
pub trait RunsStore: Send + Sync {
    /// Upsert by `record.id`. For an existing run the stored `next_seq` is
    /// authoritative and preserved: a caller holding a stale copy can never
    /// roll the sequence back past events that were appended concurrently.
    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError>;

    /// Returns `None` for unknown ids. Records with a mismatched
    /// `schema_version` are rejected, not silently migrated.
    async fn get(&self, id: &str) -> Result<Option<RunRecord>, RunStoreError>;

    /// All run records, in deterministic (id) order.
    async fn list_runs(&self) -> Result<Vec<RunRecord>, RunStoreError>;
}

// ---------------------------------------------------------------------------
// EventsStore
// ---------------------------------------------------------------------------

/// Pagination window for [`EventsStore::list`]. `from_seq` is inclusive;
/// `limit: Some(0)` yields an empty list; both absent yield everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListQuery {
    pub from_seq: Option<u64>,
    pub limit: Option<usize>,
}

/// Durable, append-only per-run event log with atomic sequence allocation.
#[async_trait]
pub trait EventsStore: Send + Sync {
    /// Allocate `seq = run.next_seq`, persist the event, and advance the
    /// run's `next_seq` to `seq + 1` — atomically with respect to concurrent
    /// appends for the same run. No two events of one run ever share a seq,
    /// and a failed append never advances `next_seq`.
    ///
    /// Fails with [`EventStoreError::RunNotFound`] if the run does not exist
    /// and [`EventStoreError::SeqInvariant`] if `next_seq` is corrupt.
    async fn append(&self, input: RunEventInput) -> Result<RunEvent, EventStoreError>;

    /// Events for `run_id` only, ascending by seq regardless of physical
    /// insertion order.
    async fn list(&self, run_id: &str, query: ListQuery) -> Result<Vec<RunEvent>, EventStoreError>;
}

// ---------------------------------------------------------------------------
// TriggersStore / FlowsStore
// ---------------------------------------------------------------------------

/// Durable CRUD for trigger specifications, one record per trigger.
#[async_trait]
pub trait TriggersStore: Send + Sync {
    /// Upsert keyed by `spec.id`.
    async fn save(&self, spec: &TriggerSpec) -> Result<(), TriggerStoreError>;
    async fn get(&self, id: &str) -> Result<Option<TriggerSpec>, TriggerStoreError>;
    async fn list(&self) -> Result<Vec<TriggerSpec>, TriggerStoreError>;
    async fn delete(&self, id: &str) -> Result<(), TriggerStoreError>;
}

/// Durable CRUD for flows. The flow graph is opaque to this crate.
#[async_trait]
pub trait FlowsStore: Send + Sync {
    async fn save(&self, flow: &Flow) -> Result<(), FlowStoreError>;
    async fn get(&self, id: &str) -> Result<Option<Flow>, FlowStoreError>;
    async fn list(&self) -> Result<Vec<Flow>, FlowStoreError>;
    async fn delete(&self, id: &str) -> Result<(), FlowStoreError>;
}

// ---------------------------------------------------------------------------
// FlowRunner (external collaborator)
// ---------------------------------------------------------------------------

/// The step/action execution engine. Consumed when a queued run is dequeued;
/// step execution itself is out of scope here.
#[async_trait]
pub trait FlowRunner: Send + Sync {
    async fn run_flow(&self, flow: &Flow, options: RunOptions)
        -> Result<RunResult, FlowRunnerError>;
}

// ---------------------------------------------------------------------------
// Trigger handler family
// ---------------------------------------------------------------------------

/// The shared callback every handler invokes when its condition is met.
#[async_trait]
pub trait FireHandler: Send + Sync {
    async fn on_fire(&self, trigger_id: &str, ctx: TriggerFireContext) -> Result<(), TriggerError>;
}

/// Collaborator used by the once-handler to disable a trigger after it has
/// fired, so it can never fire twice.
#[async_trait]
pub trait TriggerDisabler: Send + Sync {
    async fn disable(&self, trigger_id: &str) -> Result<(), TriggerStoreError>;
}

/// One handler per trigger kind, each a small state machine over its
/// installed-trigger set.
///
/// Shared invariant: the underlying platform listener is registered exactly
/// once per handler instance, lazily on the 0→1 transition of the installed
/// set, and deregistered exactly once on the 1→0 transition (via `uninstall`
/// draining to zero or `uninstall_all`). Re-installing after a full drain
/// re-registers it. `uninstall` of a never-installed id and `uninstall_all`
/// on an empty set are no-ops, not errors.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    fn kind(&self) -> TriggerKind;

    /// Validates the spec (rejecting mismatched kinds and malformed fields
    /// with a descriptive [`TriggerError::Config`]) and registers its
    /// platform hooks. Never leaves a partial install behind on failure.
    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError>;

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError>;

    async fn uninstall_all(&self) -> Result<(), TriggerError>;

    async fn installed_ids(&self) -> Vec<String>;
}
