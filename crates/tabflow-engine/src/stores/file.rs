//! File-system backed stores using JSONL event files.
//!
//! Layout:
//! ```text
//! {base_dir}/runs/{run_id}/record.json
//! {base_dir}/runs/{run_id}/events.jsonl
//! {base_dir}/triggers/{trigger_id}.json
//! ```
//!
//! Each events line is one JSON-serialized [`RunEvent`]. All writes are
//! all-or-nothing via temp-file-then-rename with fsync.
//!
//! `events.jsonl` is the commit point for sequence allocation: on load,
//! `record.next_seq` is reconciled upward to `max(record.next_seq,
//! last event seq + 1)`, so a crash between the event write and the record
//! write can never cause seq reuse after restart.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::errors::{EventStoreError, RunStoreError, TriggerStoreError};
use crate::traits::{EventsStore, ListQuery, RunsStore, TriggersStore};
use crate::types::{RunEvent, RunEventInput, RunRecord, TriggerSpec, RUN_SCHEMA_VERSION};

/// Serialize `value` to `path` atomically: temp file, fsync, rename.
fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp).map_err(|e| format!("create temp file: {e}"))?;
    let body = serde_json::to_vec(value).map_err(|e| format!("serialize: {e}"))?;
    file.write_all(&body).map_err(|e| format!("write: {e}"))?;
    file.sync_all().map_err(|e| format!("fsync: {e}"))?;
    drop(file);
    std::fs::rename(&tmp, path).map_err(|e| format!("rename: {e}"))
}

// ---------------------------------------------------------------------------
// FileLedger
// ---------------------------------------------------------------------------

/// File-system backed run + event ledger.
///
/// A single append lock serializes the read-modify-write against the
/// filesystem, giving the same atomic sequence allocation as
/// [`MemoryLedger`](super::MemoryLedger) while surviving process restarts.
pub struct FileLedger {
    base_dir: PathBuf,
    append_lock: Mutex<()>,
}

impl FileLedger {
    /// Create a ledger rooted at `base_dir`, creating `{base_dir}/runs/` if
    /// needed.
    pub fn new(base_dir: PathBuf) -> Result<Self, RunStoreError> {
        std::fs::create_dir_all(base_dir.join("runs")).map_err(|e| RunStoreError::Store {
            message: format!("failed to create runs directory: {e}"),
        })?;
        Ok(Self {
            base_dir,
            append_lock: Mutex::new(()),
        })
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_dir.join("runs").join(run_id)
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("record.json")
    }

    fn events_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("events.jsonl")
    }

    /// Read all events for a run, ordered by seq. A malformed line is an
    /// error, not a silent skip.
    fn read_events(&self, run_id: &str) -> Result<Vec<RunEvent>, EventStoreError> {
        let path = self.events_path(run_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| EventStoreError::Store {
            message: format!("failed to read events file: {e}"),
        })?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent =
                serde_json::from_str(line).map_err(|e| EventStoreError::Store {
                    message: format!("failed to deserialize event: {e}"),
                })?;
            events.push(event);
        }
        events.sort_by_key(|e| e.seq);
        Ok(events)
    }

    /// Load a run record, enforcing the schema version and reconciling
    /// `next_seq` against the committed event log.
    fn load_record(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        let path = self.record_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| RunStoreError::Store {
            message: format!("failed to read run record: {e}"),
        })?;
        let mut record: RunRecord =
            serde_json::from_str(&content).map_err(|e| RunStoreError::Store {
                message: format!("failed to deserialize run record: {e}"),
            })?;
        if record.schema_version != RUN_SCHEMA_VERSION {
            return Err(RunStoreError::SchemaVersion {
                run_id: run_id.to_string(),
                found: record.schema_version,
                expected: RUN_SCHEMA_VERSION,
            });
        }
        let events = self.read_events(run_id).map_err(|e| RunStoreError::Store {
            message: e.to_string(),
        })?;
        if let Some(last) = events.last() {
            record.next_seq = record.next_seq.max(last.seq as i64 + 1);
        }
        Ok(Some(record))
    }

    fn write_record(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        let dir = self.run_dir(&record.id);
        std::fs::create_dir_all(&dir).map_err(|e| RunStoreError::Store {
            message: format!("failed to create run directory: {e}"),
        })?;
        write_json_atomic(&self.record_path(&record.id), record)
            .map_err(|message| RunStoreError::Store { message })
    }

    /// Rewrite the events file atomically with `events` (already sorted).
    fn write_events(&self, run_id: &str, events: &[RunEvent]) -> Result<(), EventStoreError> {
        let path = self.events_path(run_id);
        let tmp = path.with_extension("jsonl.tmp");
        let mut file = std::fs::File::create(&tmp).map_err(|e| EventStoreError::Store {
            message: format!("failed to create temp file: {e}"),
        })?;
        for event in events {
            let line = serde_json::to_string(event).map_err(|e| EventStoreError::Store {
                message: format!("failed to serialize event: {e}"),
            })?;
            writeln!(file, "{line}").map_err(|e| EventStoreError::Store {
                message: format!("failed to write event: {e}"),
            })?;
        }
        file.sync_all().map_err(|e| EventStoreError::Store {
            message: format!("failed to fsync: {e}"),
        })?;
        drop(file);
        std::fs::rename(&tmp, &path).map_err(|e| EventStoreError::Store {
            message: format!("failed to rename temp file: {e}"),
        })
    }
}

#[async_trait]
impl RunsStore for FileLedger {
    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        let _guard = self.append_lock.lock().await;
        let mut record = record.clone();
        // The committed event log is authoritative for next_seq; a stale
        // caller copy must not roll it back.
        if let Some(existing) = self.load_record(&record.id)? {
            record.next_seq = record.next_seq.max(existing.next_seq);
        }
        self.write_record(&record)
    }

    async fn get(&self, id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        self.load_record(id)
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        let runs_dir = self.base_dir.join("runs");
        let entries = std::fs::read_dir(&runs_dir).map_err(|e| RunStoreError::Store {
            message: format!("failed to read runs directory: {e}"),
        })?;
        // BTreeMap gives deterministic id order.
        let mut runs = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| RunStoreError::Store {
                message: format!("failed to read dir entry: {e}"),
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            if let Some(record) = self.load_record(&run_id)? {
                runs.insert(run_id, record);
            }
        }
        Ok(runs.into_values().collect())
    }
}

#[async_trait]
impl EventsStore for FileLedger {
    async fn append(&self, input: RunEventInput) -> Result<RunEvent, EventStoreError> {
        let _guard = self.append_lock.lock().await;

        let mut run = self
            .load_record(&input.run_id)
            .map_err(|e| EventStoreError::Store {
                message: e.to_string(),
            })?
            .ok_or_else(|| EventStoreError::RunNotFound {
                run_id: input.run_id.clone(),
            })?;

        if run.next_seq < 1 {
            return Err(EventStoreError::SeqInvariant {
                run_id: input.run_id.clone(),
                next_seq: run.next_seq,
            });
        }

        let seq = run.next_seq as u64;
        let event = RunEvent {
            run_id: input.run_id.clone(),
            seq,
            ts: input.ts.unwrap_or_else(Utc::now),
            kind: input.kind,
        };

        let mut events = self.read_events(&input.run_id)?;
        events.push(event.clone());
        // Commit point: once the event file lands, the seq is taken.
        self.write_events(&input.run_id, &events)?;

        run.next_seq = seq as i64 + 1;
        run.updated_at = Utc::now();
        self.write_record(&run).map_err(|e| EventStoreError::Store {
            message: e.to_string(),
        })?;

        Ok(event)
    }

    async fn list(&self, run_id: &str, query: ListQuery) -> Result<Vec<RunEvent>, EventStoreError> {
        let events = self.read_events(run_id)?;
        let from = query.from_seq.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(events
            .into_iter()
            .filter(|e| e.seq >= from)
            .take(limit)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FileTriggersStore
// ---------------------------------------------------------------------------

/// File-system backed [`TriggersStore`], one JSON file per trigger.
pub struct FileTriggersStore {
    base_dir: PathBuf,
}

impl FileTriggersStore {
    pub fn new(base_dir: PathBuf) -> Result<Self, TriggerStoreError> {
        std::fs::create_dir_all(base_dir.join("triggers")).map_err(|e| {
            TriggerStoreError::Store {
                message: format!("failed to create triggers directory: {e}"),
            }
        })?;
        Ok(Self { base_dir })
    }

    fn spec_path(&self, id: &str) -> PathBuf {
        self.base_dir.join("triggers").join(format!("{id}.json"))
    }
}

#[async_trait]
impl TriggersStore for FileTriggersStore {
    async fn save(&self, spec: &TriggerSpec) -> Result<(), TriggerStoreError> {
        write_json_atomic(&self.spec_path(&spec.id), spec)
            .map_err(|message| TriggerStoreError::Store { message })
    }

    async fn get(&self, id: &str) -> Result<Option<TriggerSpec>, TriggerStoreError> {
        let path = self.spec_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| TriggerStoreError::Store {
            message: format!("failed to read trigger: {e}"),
        })?;
        let spec = serde_json::from_str(&content).map_err(|e| TriggerStoreError::Store {
            message: format!("failed to deserialize trigger: {e}"),
        })?;
        Ok(Some(spec))
    }

    async fn list(&self) -> Result<Vec<TriggerSpec>, TriggerStoreError> {
        let dir = self.base_dir.join("triggers");
        let entries = std::fs::read_dir(&dir).map_err(|e| TriggerStoreError::Store {
            message: format!("failed to read triggers directory: {e}"),
        })?;
        let mut specs = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| TriggerStoreError::Store {
                message: format!("failed to read dir entry: {e}"),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| TriggerStoreError::Store {
                message: format!("failed to read trigger: {e}"),
            })?;
            let spec: TriggerSpec =
                serde_json::from_str(&content).map_err(|e| TriggerStoreError::Store {
                    message: format!("failed to deserialize trigger: {e}"),
                })?;
            specs.insert(spec.id.clone(), spec);
        }
        Ok(specs.into_values().collect())
    }

    async fn delete(&self, id: &str) -> Result<(), TriggerStoreError> {
        let path = self.spec_path(id);
        if !path.exists() {
            return Err(TriggerStoreError::NotFound { id: id.to_string() });
        }
        std::fs::remove_file(&path).map_err(|e| TriggerStoreError::Store {
            message: format!("failed to delete trigger: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
