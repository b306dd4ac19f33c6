//! In-memory stores for testing and lightweight usage.
//!
//! Uses `BTreeMap` for deterministic iteration order (project convention).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::errors::{EventStoreError, FlowStoreError, RunStoreError, TriggerStoreError};
use crate::traits::{EventsStore, FlowsStore, ListQuery, RunsStore, TriggersStore};
use crate::types::{Flow, RunEvent, RunEventInput, RunRecord, TriggerSpec, RUN_SCHEMA_VERSION};

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerInner {
    runs: BTreeMap<String, RunRecord>,
    events: BTreeMap<String, Vec<RunEvent>>,
}

/// In-memory run + event ledger.
///
/// Both tables live behind one async mutex, so the "read `next_seq`, write
/// event at `seq`, write `next_seq = seq + 1`" sequence in
/// [`append`](EventsStore::append) is atomic with respect to concurrent
/// appends.
pub struct MemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner::default()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn check_schema(record: &RunRecord) -> Result<(), RunStoreError> {
    if record.schema_version != RUN_SCHEMA_VERSION {
        return Err(RunStoreError::SchemaVersion {
            run_id: record.id.clone(),
            found: record.schema_version,
            expected: RUN_SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Slice `events` (already run-isolated, unsorted) into query order.
fn page_events(mut events: Vec<RunEvent>, query: ListQuery) -> Vec<RunEvent> {
    events.sort_by_key(|e| e.seq);
    let from = query.from_seq.unwrap_or(0);
    let limit = query.limit.unwrap_or(usize::MAX);
    events
        .into_iter()
        .filter(|e| e.seq >= from)
        .take(limit)
        .collect()
}

#[async_trait]
impl RunsStore for MemoryLedger {
    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        let mut inner = self.inner.lock().await;
        let mut record = record.clone();
        // The stored next_seq only moves through append; a stale caller
        // copy must not roll it back.
        if let Some(existing) = inner.runs.get(&record.id) {
            record.next_seq = existing.next_seq;
        }
        inner.runs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        let inner = self.inner.lock().await;
        match inner.runs.get(id) {
            Some(record) => {
                check_schema(record)?;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.runs.values().cloned().collect())
    }
}

#[async_trait]
impl EventsStore for MemoryLedger {
    async fn append(&self, input: RunEventInput) -> Result<RunEvent, EventStoreError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let run = inner
            .runs
            .get_mut(&input.run_id)
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

        run.next_seq = seq as i64 + 1;
        run.updated_at = Utc::now();
        inner
            .events
            .entry(input.run_id)
            .or_default()
            .push(event.clone());

        Ok(event)
    }

    async fn list(&self, run_id: &str, query: ListQuery) -> Result<Vec<RunEvent>, EventStoreError> {
        let inner = self.inner.lock().await;
        let events = inner.events.get(run_id).cloned().unwrap_or_default();
        Ok(page_events(events, query))
    }
}

// ---------------------------------------------------------------------------
// MemoryTriggersStore / MemoryFlowsStore
// ---------------------------------------------------------------------------

/// In-memory [`TriggersStore`].
#[derive(Default)]
pub struct MemoryTriggersStore {
    specs: RwLock<BTreeMap<String, TriggerSpec>>,
}

impl MemoryTriggersStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggersStore for MemoryTriggersStore {
    async fn save(&self, spec: &TriggerSpec) -> Result<(), TriggerStoreError> {
        self.specs
            .write()
            .await
            .insert(spec.id.clone(), spec.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<TriggerSpec>, TriggerStoreError> {
        Ok(self.specs.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<TriggerSpec>, TriggerStoreError> {
        Ok(self.specs.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<(), TriggerStoreError> {
        match self.specs.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(TriggerStoreError::NotFound { id: id.to_string() }),
        }
    }
}

/// In-memory [`FlowsStore`].
#[derive(Default)]
pub struct MemoryFlowsStore {
    flows: RwLock<BTreeMap<String, Flow>>,
}

impl MemoryFlowsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowsStore for MemoryFlowsStore {
    async fn save(&self, flow: &Flow) -> Result<(), FlowStoreError> {
        self.flows
            .write()
            .await
            .insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Flow>, FlowStoreError> {
        Ok(self.flows.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Flow>, FlowStoreError> {
        Ok(self.flows.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<(), FlowStoreError> {
        match self.flows.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(FlowStoreError::NotFound { id: id.to_string() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
