//! Recurring cron-schedule trigger.
//!
//! Each installed trigger arms a platform alarm for its next scheduled
//! occurrence. When the alarm fires the trigger fires and re-arms itself for
//! the occurrence after that, so the alarm chain keeps the schedule alive
//! without a resident timer task.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{cron_alarm_name, parse_alarm_name, AlarmKind};
use crate::errors::TriggerError;
use crate::platform::AlarmApi;
use crate::traits::{FireHandler, TriggerHandler};
use crate::types::{TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec};

/// Convert a 5- or 6-field cron expression to the 7-field format the `cron`
/// crate expects.
///
/// Standard cron: `min hour day month weekday`
/// Cron crate:    `sec min hour day month weekday year`
fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => format!("0 {expr} *"),
        6 => format!("0 {expr}"),
        _ => expr.to_string(),
    }
}

struct InstalledCron {
    schedule: Schedule,
    timezone: Tz,
}

impl InstalledCron {
    fn next_occurrence(&self) -> Option<DateTime<Utc>> {
        self.schedule
            .upcoming(self.timezone)
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

pub struct CronTriggerHandler {
    alarms: Arc<dyn AlarmApi>,
    fire: Arc<dyn FireHandler>,
    installed: Mutex<BTreeMap<String, InstalledCron>>,
}

impl CronTriggerHandler {
    pub fn new(alarms: Arc<dyn AlarmApi>, fire: Arc<dyn FireHandler>) -> Self {
        Self {
            alarms,
            fire,
            installed: Mutex::new(BTreeMap::new()),
        }
    }

    fn parse_config(spec: &TriggerSpec) -> Result<InstalledCron, TriggerError> {
        let (cron, timezone) = match &spec.config {
            TriggerConfig::Cron { cron, timezone } => (cron, timezone),
            other => {
                return Err(TriggerError::Config {
                    message: format!("expected cron config, got {}", other.kind()),
                })
            }
        };

        let normalized = normalize_cron_expression(cron);
        let schedule = Schedule::from_str(&normalized).map_err(|e| TriggerError::Config {
            message: format!("invalid cron expression '{cron}': {e}"),
        })?;

        let timezone = match timezone {
            Some(name) => Tz::from_str(name).map_err(|_| TriggerError::Config {
                message: format!("unknown timezone: {name}"),
            })?,
            None => Tz::UTC,
        };

        Ok(InstalledCron { schedule, timezone })
    }

    /// Entry point for a fired platform alarm. Fires the trigger and re-arms
    /// the alarm for the next occurrence.
    pub async fn handle_alarm(&self, alarm_name: &str) -> Result<(), TriggerError> {
        let trigger_id = match parse_alarm_name(alarm_name) {
            AlarmKind::Cron { trigger_id } => trigger_id,
            _ => return Ok(()),
        };

        let next = {
            let installed = self.installed.lock().await;
            match installed.get(&trigger_id) {
                Some(entry) => entry.next_occurrence(),
                None => {
                    debug!(trigger_id = %trigger_id, "alarm for uninstalled cron trigger, ignoring");
                    return Ok(());
                }
            }
        };

        if let Err(error) = self
            .fire
            .on_fire(&trigger_id, TriggerFireContext::default())
            .await
        {
            warn!(trigger_id = %trigger_id, %error, "cron trigger fire failed");
        }

        // Re-arm even if the fire failed so the schedule keeps running.
        match next {
            Some(when) => {
                self.alarms
                    .create(&cron_alarm_name(&trigger_id), when)
                    .await?;
            }
            None => {
                warn!(trigger_id = %trigger_id, "cron schedule has no upcoming occurrences");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for CronTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Cron
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let entry = Self::parse_config(spec)?;
        let when = entry.next_occurrence().ok_or_else(|| TriggerError::Config {
            message: "cron schedule has no upcoming occurrences".into(),
        })?;

        let mut installed = self.installed.lock().await;
        let first = installed.is_empty();
        if first {
            self.alarms.add_fired_listener();
        }
        if let Err(e) = self.alarms.create(&cron_alarm_name(&spec.id), when).await {
            if first {
                self.alarms.remove_fired_listener();
            }
            return Err(e.into());
        }
        installed.insert(spec.id.clone(), entry);
        debug!(trigger_id = %spec.id, next = %when, "cron trigger armed");
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if installed.remove(id).is_none() {
            return Ok(());
        }
        self.alarms.clear(&cron_alarm_name(id)).await?;
        if installed.is_empty() {
            self.alarms.remove_fired_listener();
        }
        Ok(())
    }

    async fn uninstall_all(&self) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if installed.is_empty() {
            return Ok(());
        }
        for id in installed.keys() {
            self.alarms.clear(&cron_alarm_name(id)).await?;
        }
        installed.clear();
        self.alarms.remove_fired_listener();
        Ok(())
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.keys().cloned().collect()
    }
}
