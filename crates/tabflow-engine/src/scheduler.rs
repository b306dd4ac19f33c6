//! Run scheduler.
//!
//! Owns the run lifecycle: queues runs (from trigger fires or explicit
//! requests), executes them one at a time through the external
//! [`FlowRunner`], applies the retry policy, and records every transition on
//! the event bus. The persisted [`RunRecord`] is authoritative: before a
//! final status is written the record is reloaded, so a cancel that landed
//! while the runner was busy always wins.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::EventsBus;
use crate::errors::{FlowStoreError, SchedulerError, TriggerError};
use crate::traits::{FireHandler, FlowRunner, FlowsStore, RunsStore, TriggersStore};
use crate::types::{
    RunEventInput, RunEventKind, RunOptions, RunRecord, RunStatus, TriggerFireContext,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Attempts per run, including the first. 1 disables retries.
    pub default_max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 1,
        }
    }
}

/// Receipt for an accepted run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedRun {
    pub run_id: String,
    /// Zero-based position in the queue at enqueue time.
    pub position: usize,
}

struct QueuedJob {
    run_id: String,
    flow_id: String,
    options: RunOptions,
}

pub struct Scheduler {
    runs: Arc<dyn RunsStore>,
    bus: Arc<EventsBus>,
    flows: Arc<dyn FlowsStore>,
    triggers: Arc<dyn TriggersStore>,
    runner: Arc<dyn FlowRunner>,
    config: SchedulerConfig,
    queue: Mutex<VecDeque<QueuedJob>>,
    notify: Notify,
}

/// Handle to a spawned scheduler worker. [`SchedulerHandle::shutdown`]
/// stops the worker after the in-flight run, if any, finishes; queued jobs
/// are left in the queue for a later worker (or recovery) to pick up.
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(error) = self.join.await {
            warn!(%error, "scheduler worker panicked");
        }
    }
}

impl Scheduler {
    pub fn new(
        runs: Arc<dyn RunsStore>,
        bus: Arc<EventsBus>,
        flows: Arc<dyn FlowsStore>,
        triggers: Arc<dyn TriggersStore>,
        runner: Arc<dyn FlowRunner>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            runs,
            bus,
            flows,
            triggers,
            runner,
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Create, persist, and queue a run for `flow_id`. The `run.queued`
    /// event is durable before this returns.
    pub async fn enqueue_run(
        &self,
        flow_id: &str,
        trigger_id: Option<&str>,
        options: RunOptions,
    ) -> Result<EnqueuedRun, SchedulerError> {
        self.flows
            .get(flow_id)
            .await?
            .ok_or_else(|| FlowStoreError::NotFound {
                id: flow_id.to_string(),
            })?;

        let run = RunRecord::new(flow_id, self.config.default_max_attempts);
        self.runs.save(&run).await?;

        let args = if options.args.is_null() {
            None
        } else {
            Some(options.args.clone())
        };
        self.bus
            .append(RunEventInput::new(
                &run.id,
                RunEventKind::RunQueued {
                    trigger_id: trigger_id.map(str::to_string),
                    args,
                },
            ))
            .await?;

        let position = {
            let mut queue = self.queue.lock().await;
            queue.push_back(QueuedJob {
                run_id: run.id.clone(),
                flow_id: flow_id.to_string(),
                options,
            });
            queue.len() - 1
        };
        self.notify.notify_one();

        info!(run_id = %run.id, flow_id = %flow_id, position, "run queued");
        Ok(EnqueuedRun {
            run_id: run.id,
            position,
        })
    }

    /// Cancel a run. A no-op for runs already in a terminal state; for a
    /// queued run the job is dropped before it can start, and for a running
    /// run the terminal write loses to the cancel on completion.
    pub async fn cancel(&self, run_id: &str) -> Result<(), SchedulerError> {
        let mut run = self
            .runs
            .get(run_id)
            .await?
            .ok_or_else(|| SchedulerError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        if run.status.is_terminal() {
            debug!(run_id = %run_id, status = ?run.status, "cancel of terminal run ignored");
            return Ok(());
        }

        self.queue.lock().await.retain(|job| job.run_id != run_id);

        run.status = RunStatus::Canceled;
        run.finished_at = Some(Utc::now());
        run.updated_at = Utc::now();
        self.runs.save(&run).await?;
        self.bus
            .append(RunEventInput::new(run_id, RunEventKind::RunCanceled))
            .await?;
        info!(run_id = %run_id, "run canceled");
        Ok(())
    }

    /// Re-queue runs left non-terminal by a previous process. Runs found
    /// `Running` get a `run.recovered` event; queued runs are silently put
    /// back (their `run.queued` event already exists). Returns the number of
    /// runs re-queued.
    pub async fn recover_interrupted(&self) -> Result<usize, SchedulerError> {
        let mut recovered = 0;
        for mut run in self.runs.list_runs().await? {
            match run.status {
                RunStatus::Running => {
                    run.status = RunStatus::Queued;
                    run.updated_at = Utc::now();
                    self.runs.save(&run).await?;
                    self.bus
                        .append(RunEventInput::new(&run.id, RunEventKind::RunRecovered))
                        .await?;
                }
                RunStatus::Queued => {}
                _ => continue,
            }
            self.queue.lock().await.push_back(QueuedJob {
                run_id: run.id.clone(),
                flow_id: run.flow_id.clone(),
                options: RunOptions::default(),
            });
            recovered += 1;
        }
        if recovered > 0 {
            self.notify.notify_one();
            info!(count = recovered, "re-queued interrupted runs");
        }
        Ok(recovered)
    }

    /// Spawn the worker loop. One job executes at a time.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let scheduler = Arc::clone(&self);
        let join = tokio::spawn(async move {
            loop {
                // Checked between jobs so shutdown never waits on the queue
                // draining first.
                match shutdown_rx.try_recv() {
                    Ok(()) | Err(oneshot::error::TryRecvError::Closed) => break,
                    Err(oneshot::error::TryRecvError::Empty) => {}
                }
                let job = scheduler.queue.lock().await.pop_front();
                match job {
                    Some(job) => scheduler.execute(job).await,
                    None => {
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            _ = scheduler.notify.notified() => {}
                        }
                    }
                }
            }
            debug!("scheduler worker stopped");
        });
        SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    async fn execute(&self, job: QueuedJob) {
        if let Err(e) = self.execute_inner(&job).await {
            error!(run_id = %job.run_id, error = %e, "run execution bookkeeping failed");
        }
    }

    async fn execute_inner(&self, job: &QueuedJob) -> Result<(), SchedulerError> {
        let mut run = match self.runs.get(&job.run_id).await? {
            Some(run) => run,
            None => {
                warn!(run_id = %job.run_id, "queued run vanished from the store");
                return Ok(());
            }
        };
        if run.status.is_terminal() {
            debug!(run_id = %run.id, status = ?run.status, "skipping terminal queued run");
            return Ok(());
        }

        run.status = RunStatus::Running;
        if run.started_at.is_none() {
            run.started_at = Some(Utc::now());
        }
        run.updated_at = Utc::now();
        self.runs.save(&run).await?;
        self.bus
            .append(RunEventInput::new(
                &run.id,
                RunEventKind::RunStarted {
                    attempt: run.attempt,
                },
            ))
            .await?;

        let flow = match self.flows.get(&job.flow_id).await? {
            Some(flow) => flow,
            None => {
                return self
                    .finish_failure(&job.run_id, job, format!("flow not found: {}", job.flow_id))
                    .await;
            }
        };

        match self.runner.run_flow(&flow, job.options.clone()).await {
            Ok(result) if result.success => self.finish_success(&job.run_id, result.summary).await,
            Ok(result) => {
                self.finish_failure(
                    &job.run_id,
                    job,
                    format!(
                        "{} of {} steps failed",
                        result.summary.failed, result.summary.total
                    ),
                )
                .await
            }
            Err(e) => self.finish_failure(&job.run_id, job, e.to_string()).await,
        }
    }

    async fn finish_success(
        &self,
        run_id: &str,
        summary: crate::types::RunSummary,
    ) -> Result<(), SchedulerError> {
        // Reload: a cancel while the runner was busy is final.
        let mut run = match self.runs.get(run_id).await? {
            Some(run) if !run.status.is_terminal() => run,
            _ => return Ok(()),
        };
        run.status = RunStatus::Succeeded;
        run.finished_at = Some(Utc::now());
        run.updated_at = Utc::now();
        self.runs.save(&run).await?;
        self.bus
            .append(RunEventInput::new(
                run_id,
                RunEventKind::RunSucceeded { summary },
            ))
            .await?;
        info!(run_id = %run_id, "run succeeded");
        Ok(())
    }

    async fn finish_failure(
        &self,
        run_id: &str,
        job: &QueuedJob,
        error_message: String,
    ) -> Result<(), SchedulerError> {
        let mut run = match self.runs.get(run_id).await? {
            Some(run) if !run.status.is_terminal() => run,
            _ => return Ok(()),
        };

        let will_retry = run.attempt + 1 < run.max_attempts;
        if will_retry {
            run.attempt += 1;
            run.status = RunStatus::Queued;
        } else {
            run.status = RunStatus::Failed;
            run.finished_at = Some(Utc::now());
        }
        run.updated_at = Utc::now();
        self.runs.save(&run).await?;
        self.bus
            .append(RunEventInput::new(
                run_id,
                RunEventKind::RunFailed {
                    error: error_message.clone(),
                    will_retry,
                },
            ))
            .await?;

        if will_retry {
            warn!(run_id = %run_id, attempt = run.attempt, error = %error_message, "run failed, retrying");
            self.queue.lock().await.push_back(QueuedJob {
                run_id: run_id.to_string(),
                flow_id: job.flow_id.clone(),
                options: job.options.clone(),
            });
            self.notify.notify_one();
        } else {
            warn!(run_id = %run_id, error = %error_message, "run failed permanently");
        }
        Ok(())
    }
}

/// Trigger fires flow into the scheduler: the shared
/// [`FireHandler`] every handler is wired to.
#[async_trait]
impl FireHandler for Scheduler {
    async fn on_fire(&self, trigger_id: &str, ctx: TriggerFireContext) -> Result<(), TriggerError> {
        let spec = match self.triggers.get(trigger_id).await {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                warn!(trigger_id = %trigger_id, "fired trigger not in store, skipping");
                return Ok(());
            }
            Err(e) => {
                return Err(TriggerError::Fire {
                    message: e.to_string(),
                })
            }
        };
        if !spec.enabled {
            debug!(trigger_id = %trigger_id, "fired trigger is disabled, skipping");
            return Ok(());
        }

        let options = RunOptions {
            tab_target: ctx.source_tab_id.map(|id| id.to_string()),
            start_url: ctx.source_url,
            timeout_ms: None,
            args: spec.args.clone().unwrap_or(serde_json::Value::Null),
        };
        self.enqueue_run(&spec.flow_id, Some(trigger_id), options)
            .await
            .map_err(|e| TriggerError::Fire {
                message: e.to_string(),
            })?;
        Ok(())
    }
}
