//! Context-menu trigger.
//!
//! Each installed trigger owns one menu item. A click fires the trigger with
//! the clicked tab and page URL as context; the page URL reported by the
//! click takes priority over the tab's own URL.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{menu_item_id, MENU_ID_PREFIX};
use crate::errors::TriggerError;
use crate::platform::{MenuApi, TabInfo};
use crate::traits::{FireHandler, TriggerHandler};
use crate::types::{TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec};

pub struct ContextMenuTriggerHandler {
    menus: Arc<dyn MenuApi>,
    fire: Arc<dyn FireHandler>,
    installed: Mutex<BTreeMap<String, String>>,
}

impl ContextMenuTriggerHandler {
    pub fn new(menus: Arc<dyn MenuApi>, fire: Arc<dyn FireHandler>) -> Self {
        Self {
            menus,
            fire,
            installed: Mutex::new(BTreeMap::new()),
        }
    }

    /// Entry point for a menu click. `menu_item_id` is the platform item id;
    /// items not carrying our prefix are ignored.
    pub async fn handle_menu_click(
        &self,
        menu_item_id: &str,
        tab: Option<&TabInfo>,
        page_url: Option<&str>,
    ) -> Result<(), TriggerError> {
        let trigger_id = match menu_item_id.strip_prefix(MENU_ID_PREFIX) {
            Some(id) => id.to_string(),
            None => return Ok(()),
        };
        if !self.installed.lock().await.contains_key(&trigger_id) {
            debug!(trigger_id = %trigger_id, "click for uninstalled menu trigger, ignoring");
            return Ok(());
        }

        let ctx = TriggerFireContext {
            source_tab_id: tab.map(|t| t.id),
            source_url: page_url
                .map(str::to_string)
                .or_else(|| tab.map(|t| t.url.clone())),
        };
        if let Err(error) = self.fire.on_fire(&trigger_id, ctx).await {
            warn!(trigger_id = %trigger_id, %error, "context menu trigger fire failed");
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for ContextMenuTriggerHandler {
    fn kind(&self) -> TriggerKind {
        TriggerKind::ContextMenu
    }

    async fn install(&self, spec: &TriggerSpec) -> Result<(), TriggerError> {
        let (title, contexts) = match &spec.config {
            TriggerConfig::ContextMenu { title, contexts } => (title, contexts),
            other => {
                return Err(TriggerError::Config {
                    message: format!("expected context_menu config, got {}", other.kind()),
                })
            }
        };
        if title.trim().is_empty() {
            return Err(TriggerError::Config {
                message: "menu title must not be empty".into(),
            });
        }

        let item_id = menu_item_id(&spec.id);
        let mut installed = self.installed.lock().await;
        let first = installed.is_empty();
        if first {
            self.menus.add_click_listener();
        }
        if let Err(e) = self.menus.create_item(&item_id, title, contexts).await {
            if first {
                self.menus.remove_click_listener();
            }
            return Err(e.into());
        }
        installed.insert(spec.id.clone(), item_id);
        Ok(())
    }

    async fn uninstall(&self, id: &str) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        let item_id = match installed.remove(id) {
            Some(item_id) => item_id,
            None => return Ok(()),
        };
        self.menus.remove_item(&item_id).await?;
        if installed.is_empty() {
            self.menus.remove_click_listener();
        }
        Ok(())
    }

    async fn uninstall_all(&self) -> Result<(), TriggerError> {
        let mut installed = self.installed.lock().await;
        if installed.is_empty() {
            return Ok(());
        }
        for item_id in installed.values() {
            self.menus.remove_item(item_id).await?;
        }
        installed.clear();
        self.menus.remove_click_listener();
        Ok(())
    }

    async fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::testing::{MockMenuApi, RecordingFireHandler};
    use std::sync::atomic::Ordering;

    fn menu_spec(id: &str, title: &str) -> TriggerSpec {
        TriggerSpec {
            id: id.into(),
            enabled: true,
            flow_id: "flow-1".into(),
            args: None,
            config: TriggerConfig::ContextMenu {
                title: title.into(),
                contexts: vec!["page".into()],
            },
        }
    }

    fn handler() -> (
        ContextMenuTriggerHandler,
        Arc<MockMenuApi>,
        Arc<RecordingFireHandler>,
    ) {
        let menus = Arc::new(MockMenuApi::default());
        let fire = Arc::new(RecordingFireHandler::default());
        let handler = ContextMenuTriggerHandler::new(
            Arc::clone(&menus) as Arc<dyn MenuApi>,
            Arc::clone(&fire) as Arc<dyn FireHandler>,
        );
        (handler, menus, fire)
    }

    #[tokio::test]
    async fn install_creates_prefixed_item() {
        let (handler, menus, _) = handler();
        handler.install(&menu_spec("t-1", "Run flow")).await.unwrap();

        let items = menus.items.lock();
        let (title, contexts) = items.get("rr_v3_t-1").unwrap();
        assert_eq!(title, "Run flow");
        assert_eq!(contexts, &vec!["page".to_string()]);
        assert_eq!(menus.listener_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let (handler, menus, _) = handler();
        let err = handler.install(&menu_spec("t-1", "   ")).await.unwrap_err();
        assert!(matches!(err, TriggerError::Config { .. }));
        assert!(menus.items.lock().is_empty());
        assert_eq!(menus.listener_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn click_fires_with_page_url_priority() {
        let (handler, _, fire) = handler();
        handler.install(&menu_spec("t-1", "Run flow")).await.unwrap();

        let tab = TabInfo {
            id: 7,
            url: "https://example.com/tab".into(),
        };
        handler
            .handle_menu_click("rr_v3_t-1", Some(&tab), Some("https://example.com/frame"))
            .await
            .unwrap();

        let fires = fire.fires.lock();
        let (id, ctx) = &fires[0];
        assert_eq!(id, "t-1");
        assert_eq!(ctx.source_tab_id, Some(7));
        assert_eq!(ctx.source_url.as_deref(), Some("https://example.com/frame"));
    }

    #[tokio::test]
    async fn click_falls_back_to_tab_url() {
        let (handler, _, fire) = handler();
        handler.install(&menu_spec("t-1", "Run flow")).await.unwrap();

        let tab = TabInfo {
            id: 7,
            url: "https://example.com/tab".into(),
        };
        handler
            .handle_menu_click("rr_v3_t-1", Some(&tab), None)
            .await
            .unwrap();

        let fires = fire.fires.lock();
        assert_eq!(fires[0].1.source_url.as_deref(), Some("https://example.com/tab"));
    }

    #[tokio::test]
    async fn foreign_and_uninstalled_clicks_are_ignored() {
        let (handler, _, fire) = handler();
        handler.install(&menu_spec("t-1", "Run flow")).await.unwrap();

        handler
            .handle_menu_click("other_extension_item", None, None)
            .await
            .unwrap();
        handler
            .handle_menu_click("rr_v3_ghost", None, None)
            .await
            .unwrap();
        assert!(fire.fired_ids().is_empty());
    }

    #[tokio::test]
    async fn uninstall_all_removes_items_and_listener() {
        let (handler, menus, _) = handler();
        handler.install(&menu_spec("t-1", "A")).await.unwrap();
        handler.install(&menu_spec("t-2", "B")).await.unwrap();
        assert_eq!(menus.listener_count.load(Ordering::SeqCst), 1);

        handler.uninstall_all().await.unwrap();
        assert!(menus.items.lock().is_empty());
        assert_eq!(menus.listener_count.load(Ordering::SeqCst), 0);
        assert!(handler.installed_ids().await.is_empty());
    }
}
