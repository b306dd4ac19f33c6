//! Thin method facade for the embedding UI.
//!
//! Wraps the stores and the scheduler into one surface so the embedder wires
//! a single object into its message router. Each method maps 1:1 to a UI
//! request; no business logic lives here beyond the uninstall-then-delete
//! ordering for triggers.

use std::sync::Arc;

use tracing::warn;

use crate::errors::{
    EventStoreError, FlowStoreError, RunStoreError, SchedulerError, TriggerError,
};
use crate::scheduler::{EnqueuedRun, Scheduler};
use crate::traits::{EventsStore, FlowsStore, ListQuery, RunsStore, TriggersStore};
use crate::triggers::HandlerRegistry;
use crate::types::{Flow, RunEvent, RunOptions, RunRecord, TriggerSpec};

pub struct EngineApi {
    runs: Arc<dyn RunsStore>,
    events: Arc<dyn EventsStore>,
    flows: Arc<dyn FlowsStore>,
    triggers: Arc<dyn TriggersStore>,
    registry: Arc<HandlerRegistry>,
    scheduler: Arc<Scheduler>,
}

impl EngineApi {
    pub fn new(
        runs: Arc<dyn RunsStore>,
        events: Arc<dyn EventsStore>,
        flows: Arc<dyn FlowsStore>,
        triggers: Arc<dyn TriggersStore>,
        registry: Arc<HandlerRegistry>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            runs,
            events,
            flows,
            triggers,
            registry,
            scheduler,
        }
    }

    // ---- flows ----

    pub async fn list_flows(&self) -> Result<Vec<Flow>, FlowStoreError> {
        self.flows.list().await
    }

    pub async fn delete_flow(&self, id: &str) -> Result<(), FlowStoreError> {
        self.flows.delete(id).await
    }

    // ---- runs ----

    pub async fn list_runs(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        self.runs.list_runs().await
    }

    pub async fn get_events(
        &self,
        run_id: &str,
        query: ListQuery,
    ) -> Result<Vec<RunEvent>, EventStoreError> {
        self.events.list(run_id, query).await
    }

    pub async fn enqueue_run(
        &self,
        flow_id: &str,
        options: RunOptions,
    ) -> Result<EnqueuedRun, SchedulerError> {
        self.scheduler.enqueue_run(flow_id, None, options).await
    }

    pub async fn cancel_run(&self, run_id: &str) -> Result<(), SchedulerError> {
        self.scheduler.cancel(run_id).await
    }

    // ---- triggers ----

    pub async fn list_triggers(&self) -> Result<Vec<TriggerSpec>, TriggerError> {
        Ok(self.triggers.list().await?)
    }

    /// Persist `spec` and reconcile the live handler: install when enabled,
    /// uninstall when disabled.
    pub async fn save_trigger(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let handler = self
            .registry
            .get(spec.kind())
            .ok_or_else(|| TriggerError::Config {
                message: format!("no handler for trigger kind {}", spec.kind()),
            })?;
        // Validate by installing first so a malformed spec is never stored.
        if spec.enabled {
            handler.install(spec).await?;
        } else {
            handler.uninstall(&spec.id).await?;
        }
        if let Err(e) = self.triggers.save(spec).await {
            // Keep handler and store consistent on a failed write.
            if spec.enabled {
                if let Err(error) = handler.uninstall(&spec.id).await {
                    warn!(trigger_id = %spec.id, %error, "rollback uninstall failed");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Uninstall from the live handler, then delete from the store. The
    /// handler uninstall happens even for disabled triggers.
    pub async fn delete_trigger(&self, id: &str) -> Result<(), TriggerError> {
        let spec = self
            .triggers
            .get(id)
            .await?
            .ok_or_else(|| TriggerError::Unknown { id: id.to_string() })?;
        if let Some(handler) = self.registry.get(spec.kind()) {
            handler.uninstall(id).await?;
        }
        self.triggers.delete(id).await?;
        Ok(())
    }
}
