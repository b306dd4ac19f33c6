//! One-shot scheduled trigger.
//!
//! Arms a platform alarm at an absolute epoch-millis instant. When the alarm
//! fires the trigger fires exactly once, disables itself in the store, and
//! uninstalls its platform state. A duplicate alarm delivery finds no
//! installed entry and is ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{once_alarm_name, parse_alarm_name, AlarmKind};
use crate::errors::TriggerError;
use crate::platform::AlarmApi;
use crate::traits::{FireHandler, TriggerDisabler, TriggerHandler};
use crate::types::{TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec};

pub struct OnceTriggerHandler {
    alarms: Arc<dyn AlarmApi>,
    fire: Arc<dyn FireHandler>,
    disabler: Arc<dyn TriggerDisabler>,
    installed: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl OnceTriggerHandler {
    pub fn new(
        alarms: Arc<dyn AlarmApi>,
        fire: Arc<dyn FireHandler>,
        disabler: Arc<dyn TriggerDisabler>,
    ) -> Self {
        Self {
            alarms,
            fire,
            disabler,
            installed: Mutex::new(BTreeMap::new()),
        }
    }

    fn parse_when(spec: &TriggerSpec) -> Result<DateTime<Utc>, TriggerError> {
        let when_ms = match &spec.config {
            TriggerConfig::Once { when_ms } => *when_ms,
            other => {
                return Err(TriggerError::Config {
                    message: format!("expected once config, got {}", other.kind()),
                })
            }
        };
        if !when_ms.is_finite() {
            return Err(TriggerError::Config {
                message: "whenMs must be a finite number".into(),
            });
        }
        DateTime::from_timestamp_millis(when_ms.floor() as i64).ok_or_else(|| {
            TriggerError::Config {
                message: format!("whenMs out of range: {when_ms}"),
            }
        })
    }

    /// Entry point for a fired platform alarm. Foreign alarm names and
    /// alarms of uninstalled triggers are ignored.
    pub async fn handle_alarm(&self, alarm_name: &str) -> Result<(), TriggerError> {
        let trigger_id = match parse_alarm_name(alarm_name) {
            AlarmKind::Once { trigger_id } => trigger_id,
            _ => return Ok(()),
        };

        // Remove the entry before firing so a duplicate delivery is a no-op.
        let was_installed = {
            let mut installed = self.installed.lock().await;
            let removed = installed.remove(&trigger_id).is_some();
            if removed && installed.is_empty() {
                self.alarms.remove_fired_listener();
            }
            removed
        };
        if !was_installed {
            debug!(trigger_id = %trigger_id, "alarm for uninstalled once trigger, ignoring");
            return Ok(());
        }

        if let Err(error) = self
            .fire
            .on_fire(&trigger_id, TriggerFireContext::default())
            .await
        {
            warn!(trigger_id = %trigger_id, %error, "once trigger fire failed");
        }

        // Disable regardless of fire outcome: a one-shot never re-arms.
        if let Err(error) = self.disabler.disable(&trigger_id).await {
            warn!(trigger_id = %trigger_id, %error, "failed to disable fired once trigger");
        }
        self.alarms.clear(&once_alarm_name(&trigger_id)).await?;
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for OnceTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Once
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let when = Self::parse_when(spec)?;

        let mut installed = self.installed.lock().await;
        let first = installed.is_empty();
        if first {
            self.alarms.add_fired_listener();
        }
        if let Err(e) = self.alarms.create(&once_alarm_name(&spec.id), when).await {
            // Roll the listener registration back so a failed install leaves
            // no trace.
            if first {
                self.alarms.remove_fired_listener();
            }
            return Err(e.into());
        }
        installed.insert(spec.id.clone(), when);
        debug!(trigger_id = %spec.id, when = %when, "once trigger armed");
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if installed.remove(id).is_none() {
            return Ok(());
        }
        self.alarms.clear(&once_alarm_name(id)).await?;
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
            self.alarms.clear(&once_alarm_name(id)).await?;
        }
        installed.clear();
        self.alarms.remove_fired_listener();
        Ok(())
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TriggerStoreError;
    use crate::triggers::testing::{MockAlarmApi, RecordingFireHandler};
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct RecordingDisabler {
        disabled: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl TriggerDisabler for RecordingDisabler {
        async fn disable(&self, trigger_id: &str) -> Result<(), TriggerStoreError> {
            self.disabled.lock().push(trigger_id.to_string());
            Ok(())
        }
    }

    fn once_spec(id: &str, when_ms: f64) -> TriggerSpec {
        TriggerSpec {
            id: id.into(),
            enabled: true,
            flow_id: "flow-1".into(),
            args: None,
            config: TriggerConfig::Once { when_ms },
        }
    }

    fn handler() -> (
        OnceTriggerHandler,
        Arc<MockAlarmApi>,
        Arc<RecordingFireHandler>,
        Arc<RecordingDisabler>,
    ) {
        let alarms = Arc::new(MockAlarmApi::default());
        let fire = Arc::new(RecordingFireHandler::default());
        let disabler = Arc::new(RecordingDisabler::default());
        let handler = OnceTriggerHandler::new(
            Arc::clone(&alarms) as Arc<dyn AlarmApi>,
            Arc::clone(&fire) as Arc<dyn FireHandler>,
            Arc::clone(&disabler) as Arc<dyn TriggerDisabler>,
        );
        (handler, alarms, fire, disabler)
    }

    #[tokio::test]
    async fn install_creates_named_alarm() {
        let (handler, alarms, _, _) = handler();
        handler
            .install(&once_spec("t-1", 1_900_000_000_000.0))
            .await
            .unwrap();
        assert!(alarms.alarms.lock().contains_key("rr_v3_once_t-1"));
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_finite_when_ms_is_rejected() {
        let (handler, alarms, _, _) = handler();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = handler.install(&once_spec("t-1", bad)).await.unwrap_err();
            match err {
                TriggerError::Config { message } => {
                    assert_eq!(message, "whenMs must be a finite number");
                }
                other => panic!("expected config error, got {other:?}"),
            }
        }
        assert!(handler.installed_ids().await.is_empty());
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_alarm_create_rolls_back_listener() {
        let (handler, alarms, _, _) = handler();
        alarms.fail_create.lock().insert("rr_v3_once_t-1".into());

        let err = handler
            .install(&once_spec("t-1", 1_900_000_000_000.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::Platform { .. }));
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 0);
        assert!(handler.installed_ids().await.is_empty());
    }

    #[tokio::test]
    async fn fires_exactly_once_then_disables() {
        let (handler, alarms, fire, disabler) = handler();
        handler
            .install(&once_spec("t-1", 1_900_000_000_000.0))
            .await
            .unwrap();

        handler.handle_alarm("rr_v3_once_t-1").await.unwrap();
        // Duplicate delivery of the same alarm.
        handler.handle_alarm("rr_v3_once_t-1").await.unwrap();

        assert_eq!(fire.fired_ids(), vec!["t-1"]);
        assert_eq!(*disabler.disabled.lock(), vec!["t-1"]);
        assert!(handler.installed_ids().await.is_empty());
        assert!(alarms.alarms.lock().is_empty());
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disables_even_when_fire_fails() {
        let (handler, _, fire, disabler) = handler();
        fire.fail_ids.lock().insert("t-1".into());
        handler
            .install(&once_spec("t-1", 1_900_000_000_000.0))
            .await
            .unwrap();

        handler.handle_alarm("rr_v3_once_t-1").await.unwrap();
        assert!(fire.fired_ids().is_empty());
        assert_eq!(*disabler.disabled.lock(), vec!["t-1"]);
    }

    #[tokio::test]
    async fn foreign_alarms_are_ignored() {
        let (handler, _, fire, _) = handler();
        handler
            .install(&once_spec("t-1", 1_900_000_000_000.0))
            .await
            .unwrap();
        handler.handle_alarm("rr_v3_interval_t-1").await.unwrap();
        handler.handle_alarm("unrelated").await.unwrap();
        assert!(fire.fired_ids().is_empty());
        assert_eq!(handler.installed_ids().await, vec!["t-1"]);
    }

    #[tokio::test]
    async fn listener_refcount_across_installs() {
        let (handler, alarms, _, _) = handler();
        handler
            .install(&once_spec("t-1", 1_900_000_000_000.0))
            .await
            .unwrap();
        handler
            .install(&once_spec("t-2", 1_900_000_000_001.0))
            .await
            .unwrap();
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 1);

        handler.uninstall("t-1").await.unwrap();
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 1);
        handler.uninstall("t-2").await.unwrap();
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 0);

        // Reinstall after full drain re-registers.
        handler
            .install(&once_spec("t-3", 1_900_000_000_002.0))
            .await
            .unwrap();
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uninstall_unknown_is_noop() {
        let (handler, alarms, _, _) = handler();
        handler.uninstall("ghost").await.unwrap();
        handler.uninstall_all().await.unwrap();
        assert_eq!(alarms.listener_count.load(Ordering::SeqCst), 0);
    }
}
