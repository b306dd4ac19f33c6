//! DOM-condition trigger.
//!
//! Watches for elements appearing or disappearing in page content. The
//! engine keeps a content-side observer injected into every injectable tab
//! and pushes it the full installed dom-trigger set after every change and
//! every top-frame navigation. Fire messages travel back through
//! [`DomTriggerHandler::handle_dom_fired`].
//!
//! Tab synchronization is best-effort per tab: a tab that cannot be reached
//! is logged and skipped, never failing the install.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::TriggerError;
use crate::platform::{is_injectable_url, TabsApi};
use crate::traits::{FireHandler, TriggerHandler};
use crate::types::{DomTriggerSync, TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec};

pub struct DomTriggerHandler {
    tabs: Arc<dyn TabsApi>,
    fire: Arc<dyn FireHandler>,
    installed: Mutex<BTreeMap<String, DomTriggerSync>>,
}

impl DomTriggerHandler {
    pub fn new(tabs: Arc<dyn TabsApi>, fire: Arc<dyn FireHandler>) -> Self {
        Self {
            tabs,
            fire,
            installed: Mutex::new(BTreeMap::new()),
        }
    }

    fn to_sync(spec: &TriggerSpec) -> Result<DomTriggerSync, TriggerError> {
        let (selector, appear, once, debounce_ms) = match &spec.config {
            TriggerConfig::Dom {
                selector,
                appear,
                once,
                debounce_ms,
            } => (selector, *appear, *once, *debounce_ms),
            other => {
                return Err(TriggerError::Config {
                    message: format!("expected dom config, got {}", other.kind()),
                })
            }
        };
        if selector.trim().is_empty() {
            return Err(TriggerError::Config {
                message: "dom selector must not be empty".into(),
            });
        }
        Ok(DomTriggerSync {
            id: spec.id.clone(),
            selector: selector.clone(),
            appear,
            once,
            debounce_ms,
        })
    }

    /// Push `set` to one tab: ping the observer, inject it if absent, then
    /// send the full trigger set.
    async fn sync_tab(&self, tab_id: i64, set: &[DomTriggerSync]) -> Result<(), TriggerError> {
        let ready = self.tabs.ping_observer(tab_id).await?;
        if !ready {
            self.tabs.inject_observer(tab_id).await?;
        }
        self.tabs.set_dom_triggers(tab_id, set).await?;
        Ok(())
    }

    /// Resync every injectable open tab with the current trigger set.
    /// Failures here are logged and skipped, never surfaced to the caller:
    /// the trigger stays installed and the next navigation resyncs the tab.
    async fn sync_all_tabs(&self, set: &[DomTriggerSync]) -> Result<(), TriggerError> {
        let tabs = match self.tabs.list_tabs().await {
            Ok(tabs) => tabs,
            Err(error) => {
                warn!(%error, "failed to enumerate tabs for dom trigger sync");
                return Ok(());
            }
        };
        for tab in tabs {
            if !is_injectable_url(&tab.url) {
                continue;
            }
            if let Err(error) = self.sync_tab(tab.id, set).await {
                warn!(tab_id = tab.id, %error, "failed to sync dom triggers to tab");
            }
        }
        Ok(())
    }

    async fn current_set(&self) -> Vec<DomTriggerSync> {
        self.installed.lock().await.values().cloned().collect()
    }

    /// Entry point for a committed top-frame navigation: the fresh document
    /// needs the observer and trigger set again. Sub-frames and
    /// non-injectable URLs are ignored.
    pub async fn handle_navigation(
        &self,
        tab_id: i64,
        url: &str,
        frame_id: i64,
    ) -> Result<(), TriggerError> {
        if frame_id != 0 || !is_injectable_url(url) {
            return Ok(());
        }
        let set = self.current_set().await;
        if set.is_empty() {
            return Ok(());
        }
        if let Err(error) = self.sync_tab(tab_id, &set).await {
            warn!(tab_id, %error, "failed to resync dom triggers after navigation");
        }
        Ok(())
    }

    /// Entry point for a `dom_trigger_fired` message from the content-side
    /// observer. Fires with the reporting tab as context. A message for an
    /// id that is no longer installed is stale and ignored.
    pub async fn handle_dom_fired(
        &self,
        trigger_id: &str,
        tab_id: i64,
        url: Option<&str>,
    ) -> Result<(), TriggerError> {
        if !self.installed.lock().await.contains_key(trigger_id) {
            debug!(trigger_id = %trigger_id, "dom fire for uninstalled trigger, ignoring");
            return Ok(());
        }
        let ctx = TriggerFireContext {
            source_tab_id: Some(tab_id),
            source_url: url.map(str::to_string),
        };
        if let Err(error) = self.fire.on_fire(trigger_id, ctx).await {
            warn!(trigger_id = %trigger_id, %error, "dom trigger fire failed");
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for DomTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Dom
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let sync = Self::to_sync(spec)?;

        let set = {
            let mut installed = self.installed.lock().await;
            if installed.is_empty() {
                self.tabs.add_message_listener();
                self.tabs.add_navigation_listener();
            }
            installed.insert(spec.id.clone(), sync);
            installed.values().cloned().collect::<Vec<_>>()
        };
        self.sync_all_tabs(&set).await
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        let set = {
            let mut installed = self.installed.lock().await;
            if installed.remove(id).is_none() {
                return Ok(());
            }
            if installed.is_empty() {
                self.tabs.remove_message_listener();
                self.tabs.remove_navigation_listener();
            }
            installed.values().cloned().collect::<Vec<_>>()
        };
        // Push the shrunken set so tabs stop watching the removed selector.
        self.sync_all_tabs(&set).await
    }

    async fn uninstall_all(&self) -> Result<(), TriggerError> {
        {
            let mut installed = self.installed.lock().await;
            if installed.is_empty() {
                return Ok(());
            }
            installed.clear();
            self.tabs.remove_message_listener();
            self.tabs.remove_navigation_listener();
        }
        self.sync_all_tabs(&[]).await
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.keys().cloned().collect()
    }
}
