//! Trigger handlers: one small state machine per trigger kind.
//!
//! All handlers implement [`TriggerHandler`](crate::traits::TriggerHandler)
//! and share the lazy-listener invariant: the platform listener is registered
//! on the first install and deregistered when the installed set drains to
//! zero.

mod command;
mod context_menu;
mod cron;
mod dom;
mod manual;
mod once;
mod url;

pub use command::CommandTriggerHandler;
pub use context_menu::ContextMenuTriggerHandler;
pub use cron::CronTriggerHandler;
pub use dom::DomTriggerHandler;
pub use manual::ManualTriggerHandler;
pub use once::OnceTriggerHandler;
pub use url::UrlTriggerHandler;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TriggerStoreError;
use crate::traits::{TriggerDisabler, TriggerHandler, TriggersStore};
use crate::types::TriggerKind;

// ---------------------------------------------------------------------------
// Platform naming scheme
// ---------------------------------------------------------------------------

/// Alarm-name prefix for one-shot (`once`) triggers.
pub const ONCE_ALARM_PREFIX: &str = "rr_v3_once_";
/// Alarm-name prefix for recurring (`cron`) triggers.
pub const CRON_ALARM_PREFIX: &str = "rr_v3_interval_";
/// Menu-item id prefix for context-menu triggers.
pub const MENU_ID_PREFIX: &str = "rr_v3_";

pub(crate) fn once_alarm_name(trigger_id: &str) -> String {
    format!("{ONCE_ALARM_PREFIX}{trigger_id}")
}

pub(crate) fn cron_alarm_name(trigger_id: &str) -> String {
    format!("{CRON_ALARM_PREFIX}{trigger_id}")
}

pub(crate) fn menu_item_id(trigger_id: &str) -> String {
    format!("{MENU_ID_PREFIX}{trigger_id}")
}

/// Which trigger, if any, a fired platform alarm belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmKind {
    Once { trigger_id: String },
    Cron { trigger_id: String },
    /// Not one of ours; ignore.
    Foreign,
}

pub fn parse_alarm_name(name: &str) -> AlarmKind {
    if let Some(id) = name.strip_prefix(ONCE_ALARM_PREFIX) {
        AlarmKind::Once {
            trigger_id: id.to_string(),
        }
    } else if let Some(id) = name.strip_prefix(CRON_ALARM_PREFIX) {
        AlarmKind::Cron {
            trigger_id: id.to_string(),
        }
    } else {
        AlarmKind::Foreign
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Immutable kind → handler map built once at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<TriggerKind, Arc<dyn TriggerHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under its own [`TriggerHandler::kind`]. Replaces
    /// any previous handler for that kind.
    pub fn register(mut self, handler: Arc<dyn TriggerHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn get(&self, kind: TriggerKind) -> Option<&Arc<dyn TriggerHandler>> {
        self.handlers.get(&kind)
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn TriggerHandler>> {
        self.handlers.values()
    }
}

// ---------------------------------------------------------------------------
// StoreTriggerDisabler
// ---------------------------------------------------------------------------

/// [`TriggerDisabler`] that flips `enabled = false` in the backing store.
pub struct StoreTriggerDisabler {
    store: Arc<dyn TriggersStore>,
}

impl StoreTriggerDisabler {
    pub fn new(store: Arc<dyn TriggersStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TriggerDisabler for StoreTriggerDisabler {
    async fn disable(&self, trigger_id: &str) -> Result<(), TriggerStoreError> {
        let mut spec = self
            .store
            .get(trigger_id)
            .await?
            .ok_or_else(|| TriggerStoreError::NotFound {
                id: trigger_id.to_string(),
            })?;
        if spec.enabled {
            spec.enabled = false;
            self.store.save(&spec).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared test doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use crate::errors::{PlatformError, TriggerError};
    use crate::platform::{AlarmApi, CommandApi, MenuApi, TabInfo, TabsApi};
    use crate::traits::FireHandler;
    use crate::types::{DomTriggerSync, TriggerFireContext};

    /// Records every fire with its context.
    #[derive(Default)]
    pub struct RecordingFireHandler {
        pub fires: Mutex<Vec<(String, TriggerFireContext)>>,
        /// When set, `on_fire` fails for trigger ids in this set.
        pub fail_ids: Mutex<BTreeSet<String>>,
    }

    impl RecordingFireHandler {
        pub fn fired_ids(&self) -> Vec<String> {
            self.fires.lock().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl FireHandler for RecordingFireHandler {
        async fn on_fire(
            &self,
            trigger_id: &str,
            ctx: TriggerFireContext,
        ) -> Result<(), TriggerError> {
            if self.fail_ids.lock().contains(trigger_id) {
                return Err(TriggerError::Fire {
                    message: format!("injected failure for {trigger_id}"),
                });
            }
            self.fires.lock().push((trigger_id.to_string(), ctx));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockAlarmApi {
        pub alarms: Mutex<BTreeMap<String, DateTime<Utc>>>,
        pub listener_count: AtomicU32,
        pub fail_create: Mutex<BTreeSet<String>>,
    }

    #[async_trait]
    impl AlarmApi for MockAlarmApi {
        async fn create(&self, name: &str, when: DateTime<Utc>) -> Result<(), PlatformError> {
            if self.fail_create.lock().contains(name) {
                return Err(PlatformError::Unavailable {
                    message: format!("injected create failure for {name}"),
                });
            }
            self.alarms.lock().insert(name.to_string(), when);
            Ok(())
        }

        async fn clear(&self, name: &str) -> Result<bool, PlatformError> {
            Ok(self.alarms.lock().remove(name).is_some())
        }

        async fn clear_all(&self) -> Result<(), PlatformError> {
            self.alarms.lock().clear();
            Ok(())
        }

        fn add_fired_listener(&self) {
            self.listener_count.fetch_add(1, Ordering::SeqCst);
        }

        fn remove_fired_listener(&self) {
            self.listener_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub struct MockMenuApi {
        pub items: Mutex<BTreeMap<String, (String, Vec<String>)>>,
        pub listener_count: AtomicU32,
    }

    #[async_trait]
    impl MenuApi for MockMenuApi {
        async fn create_item(
            &self,
            id: &str,
            title: &str,
            contexts: &[String],
        ) -> Result<(), PlatformError> {
            self.items
                .lock()
                .insert(id.to_string(), (title.to_string(), contexts.to_vec()));
            Ok(())
        }

        async fn remove_item(&self, id: &str) -> Result<(), PlatformError> {
            self.items.lock().remove(id);
            Ok(())
        }

        async fn remove_all(&self) -> Result<(), PlatformError> {
            self.items.lock().clear();
            Ok(())
        }

        fn add_click_listener(&self) {
            self.listener_count.fetch_add(1, Ordering::SeqCst);
        }

        fn remove_click_listener(&self) {
            self.listener_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub struct MockTabsApi {
        pub tabs: Mutex<Vec<TabInfo>>,
        /// Tab ids whose observer answers the ping.
        pub observer_ready: Mutex<BTreeSet<i64>>,
        pub injected: Mutex<Vec<i64>>,
        /// Last dom-trigger set pushed per tab.
        pub synced: Mutex<BTreeMap<i64, Vec<DomTriggerSync>>>,
        /// Tab ids that fail every call.
        pub broken_tabs: Mutex<BTreeSet<i64>>,
        /// When set, `list_tabs` itself fails.
        pub fail_list: Mutex<bool>,
        pub message_listener_count: AtomicU32,
        pub navigation_listener_count: AtomicU32,
    }

    impl MockTabsApi {
        pub fn with_tabs(tabs: Vec<TabInfo>) -> Arc<Self> {
            let api = Self::default();
            *api.tabs.lock() = tabs;
            Arc::new(api)
        }

        fn check_tab(&self, tab_id: i64) -> Result<(), PlatformError> {
            if self.broken_tabs.lock().contains(&tab_id) {
                return Err(PlatformError::Tab {
                    tab_id,
                    message: "injected tab failure".into(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TabsApi for MockTabsApi {
        async fn list_tabs(&self) -> Result<Vec<TabInfo>, PlatformError> {
            if *self.fail_list.lock() {
                return Err(PlatformError::Tab {
                    tab_id: -1,
                    message: "injected tab query failure".into(),
                });
            }
            Ok(self.tabs.lock().clone())
        }

        async fn ping_observer(&self, tab_id: i64) -> Result<bool, PlatformError> {
            self.check_tab(tab_id)?;
            Ok(self.observer_ready.lock().contains(&tab_id))
        }

        async fn inject_observer(&self, tab_id: i64) -> Result<(), PlatformError> {
            self.check_tab(tab_id)?;
            self.injected.lock().push(tab_id);
            self.observer_ready.lock().insert(tab_id);
            Ok(())
        }

        async fn set_dom_triggers(
            &self,
            tab_id: i64,
            triggers: &[DomTriggerSync],
        ) -> Result<(), PlatformError> {
            self.check_tab(tab_id)?;
            self.synced.lock().insert(tab_id, triggers.to_vec());
            Ok(())
        }

        fn add_message_listener(&self) {
            self.message_listener_count.fetch_add(1, Ordering::SeqCst);
        }

        fn remove_message_listener(&self) {
            self.message_listener_count.fetch_sub(1, Ordering::SeqCst);
        }

        fn add_navigation_listener(&self) {
            self.navigation_listener_count.fetch_add(1, Ordering::SeqCst);
        }

        fn remove_navigation_listener(&self) {
            self.navigation_listener_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub struct MockCommandApi {
        pub listener_count: AtomicU32,
    }

    impl CommandApi for MockCommandApi {
        fn add_command_listener(&self) {
            self.listener_count.fetch_add(1, Ordering::SeqCst);
        }

        fn remove_command_listener(&self) {
            self.listener_count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
