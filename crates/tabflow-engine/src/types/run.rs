//! Run records: one per execution attempt of a flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted schema version carried on every [`RunRecord`]. Readers reject
/// records with a mismatched version.
pub const RUN_SCHEMA_VERSION: u16 = 3;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Paused,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    /// Terminal states are never left again by the scheduler.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// One execution attempt of a flow.
///
/// Created when a trigger fires or a manual run is requested; mutated by the
/// scheduler as execution proceeds. Never deleted automatically — runs are
/// retained for audit and history.
///
/// `next_seq` is the next sequence number to be assigned to an event of this
/// run. It is advanced only by
/// [`EventsStore::append`](crate::traits::EventsStore::append) and must
/// always be an integer ≥ 1; any other value is an unrecoverable invariant
/// violation (see
/// [`EventStoreError::SeqInvariant`](crate::errors::EventStoreError)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunRecord {
    pub id: String,
    /// Foreign key only — the flow's lifecycle is owned elsewhere.
    pub flow_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Zero-based retry counter.
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_seq: i64,
    pub schema_version: u16,
}

impl RunRecord {
    /// Create a fresh queued run for `flow_id` with a random UUID v4 id.
    pub fn new(flow_id: &str, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            flow_id: flow_id.to_string(),
            status: RunStatus::Queued,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            attempt: 0,
            max_attempts,
            next_seq: 1,
            schema_version: RUN_SCHEMA_VERSION,
        }
    }
}
