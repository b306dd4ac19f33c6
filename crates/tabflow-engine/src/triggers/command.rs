//! Keyboard-command trigger.
//!
//! Maps extension command keys to triggers. Several triggers may share one
//! command key; a key press fires all of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::TriggerError;
use crate::platform::CommandApi;
use crate::traits::{FireHandler, TriggerHandler};
use crate::types::{TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec};

pub struct CommandTriggerHandler {
    commands: Arc<dyn CommandApi>,
    fire: Arc<dyn FireHandler>,
    /// trigger id → command key.
    installed: Mutex<BTreeMap<String, String>>,
}

impl CommandTriggerHandler {
    pub fn new(commands: Arc<dyn CommandApi>, fire: Arc<dyn FireHandler>) -> Self {
        Self {
            commands,
            fire,
            installed: Mutex::new(BTreeMap::new()),
        }
    }

    /// Entry point for a pressed command key. Unknown keys are ignored.
    pub async fn handle_command(&self, command_key: &str) -> Result<(), TriggerError> {
        let matching: Vec<String> = {
            let installed = self.installed.lock().await;
            installed
                .iter()
                .filter(|(_, key)| key.as_str() == command_key)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for trigger_id in matching {
            if let Err(error) = self
                .fire
                .on_fire(&trigger_id, TriggerFireContext::default())
                .await
            {
                warn!(trigger_id = %trigger_id, %error, "command trigger fire failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for CommandTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Command
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let command_key = match &spec.config {
            TriggerConfig::Command { command_key } => command_key,
            other => {
                return Err(TriggerError::Config {
                    message: format!("expected command config, got {}", other.kind()),
                })
            }
        };
        if command_key.trim().is_empty() {
            return Err(TriggerError::Config {
                message: "command_key must not be empty".into(),
            });
        }

        let mut installed = self.installed.lock().await;
        if installed.is_empty() {
            self.commands.add_command_listener();
        }
        installed.insert(spec.id.clone(), command_key.clone());
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if installed.remove(id).is_some() && installed.is_empty() {
            self.commands.remove_command_listener();
        }
        Ok(())
    }

    async fn uninstall_all(&self) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if !installed.is_empty() {
            installed.clear();
            self.commands.remove_command_listener();
        }
        Ok(())
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::testing::{MockCommandApi, RecordingFireHandler};
    use std::sync::atomic::Ordering;

    fn command_spec(id: &str, key: &str) -> TriggerSpec {
        TriggerSpec {
            id: id.into(),
            enabled: true,
            flow_id: "flow-1".into(),
            args: None,
            config: TriggerConfig::Command {
                command_key: key.into(),
            },
        }
    }

    fn handler() -> (
        CommandTriggerHandler,
        Arc<MockCommandApi>,
        Arc<RecordingFireHandler>,
    ) {
        let commands = Arc::new(MockCommandApi::default());
        let fire = Arc::new(RecordingFireHandler::default());
        let handler = CommandTriggerHandler::new(
            Arc::clone(&commands) as Arc<dyn CommandApi>,
            Arc::clone(&fire) as Arc<dyn FireHandler>,
        );
        (handler, commands, fire)
    }

    #[tokio::test]
    async fn command_fires_matching_triggers_only() {
        let (handler, _, fire) = handler();
        handler.install(&command_spec("t-1", "run-checkout")).await.unwrap();
        handler.install(&command_spec("t-2", "run-checkout")).await.unwrap();
        handler.install(&command_spec("t-3", "run-other")).await.unwrap();

        handler.handle_command("run-checkout").await.unwrap();
        let mut fired = fire.fired_ids();
        fired.sort();
        assert_eq!(fired, vec!["t-1", "t-2"]);

        handler.handle_command("unbound-key").await.unwrap();
        assert_eq!(fire.fired_ids().len(), 2);
    }

    #[tokio::test]
    async fn listener_registered_once_across_installs() {
        let (handler, commands, _) = handler();
        handler.install(&command_spec("t-1", "a")).await.unwrap();
        handler.install(&command_spec("t-2", "b")).await.unwrap();
        assert_eq!(commands.listener_count.load(Ordering::SeqCst), 1);

        handler.uninstall("t-1").await.unwrap();
        handler.uninstall("t-2").await.unwrap();
        assert_eq!(commands.listener_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_command_key_rejected() {
        let (handler, commands, _) = handler();
        let err = handler.install(&command_spec("t-1", "")).await.unwrap_err();
        assert!(matches!(err, TriggerError::Config { .. }));
        assert_eq!(commands.listener_count.load(Ordering::SeqCst), 0);
    }
}
