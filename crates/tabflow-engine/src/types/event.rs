//! The per-run event log entries: append-only, immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow::RunSummary;

/// What happened, tagged on the wire as `type` with dotted names
/// (`run.queued`, `node.started`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[non_exhaustive]
pub enum RunEventKind {
    #[serde(rename = "run.queued")]
    RunQueued {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trigger_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<serde_json::Value>,
    },
    #[serde(rename = "run.started")]
    RunStarted { attempt: u32 },
    #[serde(rename = "run.paused")]
    RunPaused,
    #[serde(rename = "run.resumed")]
    RunResumed,
    #[serde(rename = "run.succeeded")]
    RunSucceeded { summary: RunSummary },
    #[serde(rename = "run.failed")]
    RunFailed { error: String, will_retry: bool },
    #[serde(rename = "run.canceled")]
    RunCanceled,
    /// The run was found mid-flight after a process restart and re-queued.
    #[serde(rename = "run.recovered")]
    RunRecovered,
    #[serde(rename = "node.started")]
    NodeStarted { node_id: String },
    #[serde(rename = "node.succeeded")]
    NodeSucceeded {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        took_ms: Option<u64>,
    },
    #[serde(rename = "node.failed")]
    NodeFailed { node_id: String, error: String },
}

/// One recorded occurrence within a run's lifetime.
///
/// `seq` is unique per run and assigned atomically from the parent
/// [`RunRecord::next_seq`](super::RunRecord): for a given run the set of
/// seq values is exactly `{1, 2, ..., next_seq - 1}` with no gaps or
/// duplicates, regardless of the physical insertion order of concurrent
/// appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

/// Input to [`EventsStore::append`](crate::traits::EventsStore::append).
/// The store allocates `seq`; the timestamp defaults to now.
#[derive(Debug, Clone)]
pub struct RunEventInput {
    pub run_id: String,
    pub kind: RunEventKind,
    pub ts: Option<DateTime<Utc>>,
}

impl RunEventInput {
    pub fn new(run_id: impl Into<String>, kind: RunEventKind) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            ts: None,
        }
    }
}
