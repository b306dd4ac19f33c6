//! Manual trigger: fired on explicit request, no platform hooks.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::errors::TriggerError;
use crate::traits::{FireHandler, TriggerHandler};
use crate::types::{TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec};

pub struct ManualTriggerHandler {
    fire: Arc<dyn FireHandler>,
    installed: Mutex<BTreeSet<String>>,
}

impl ManualTriggerHandler {
    pub fn new(fire: Arc<dyn FireHandler>) -> Self {
        Self {
            fire,
            installed: Mutex::new(BTreeSet::new()),
        }
    }

    /// Fire an installed manual trigger. Unlike platform-signal entry points,
    /// an unknown id here is a caller error.
    pub async fn fire(&self, trigger_id: &str) -> Result<(), TriggerError> {
        if !self.installed.lock().await.contains(trigger_id) {
            return Err(TriggerError::Unknown {
                id: trigger_id.to_string(),
            });
        }
        self.fire
            .on_fire(trigger_id, TriggerFireContext::default())
            .await
    }
}

#[async_trait]
impl TriggerHandler for ManualTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Manual
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        if !matches!(spec.config, TriggerConfig::Manual) {
            return Err(TriggerError::Config {
                message: format!("expected manual config, got {}", spec.kind()),
            });
        }
        self.installed.lock().await.insert(spec.id.clone());
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        self.installed.lock().await.remove(id);
        Ok(())
    }

    async fn uninstall_all(&self) -> Result<(), TriggerError> {
        self.installed.lock().await.clear();
        Ok(())
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.iter().cloned().collect()
    }
}
