//! The externally supplied browser platform surface.
//!
//! Alarms, context menus, tabs/content messaging, and extension commands are
//! low-level browser bindings owned by the embedding extension; the engine
//! consumes them through these traits. Incoming platform signals travel the
//! other way: the embedder wires the real listeners to the handlers'
//! `handle_*` entry points.
//!
//! The `add_*_listener` / `remove_*_listener` methods reflect a handler's
//! registration intent to the platform so double-registration (which would
//! cause duplicate firing) stays observable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::PlatformError;
use super::types::DomTriggerSync;

/// An open browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: i64,
    pub url: String,
}

/// Whether a content script can be injected into `url`. Restricted schemes
/// (`chrome://`, `about:`, extension pages, ...) are not injectable.
pub fn is_injectable_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// One-shot platform alarms (`chrome.alarms`-shaped).
#[async_trait]
pub trait AlarmApi: Send + Sync {
    /// Create or replace the alarm `name`, scheduled at `when`.
    async fn create(&self, name: &str, when: DateTime<Utc>) -> Result<(), PlatformError>;

    /// Clear the alarm `name`. Returns whether it existed.
    async fn clear(&self, name: &str) -> Result<bool, PlatformError>;

    /// Clear every alarm. Used by the startup bootstrap to drop stale
    /// registrations left behind by a crashed process.
    async fn clear_all(&self) -> Result<(), PlatformError>;

    fn add_fired_listener(&self);
    fn remove_fired_listener(&self);
}

/// Context-menu items (`chrome.contextMenus`-shaped).
#[async_trait]
pub trait MenuApi: Send + Sync {
    async fn create_item(
        &self,
        id: &str,
        title: &str,
        contexts: &[String],
    ) -> Result<(), PlatformError>;

    async fn remove_item(&self, id: &str) -> Result<(), PlatformError>;

    /// Remove every menu item. Used by the startup bootstrap.
    async fn remove_all(&self) -> Result<(), PlatformError>;

    fn add_click_listener(&self);
    fn remove_click_listener(&self);
}

/// Tabs, content-script messaging, and navigation events.
#[async_trait]
pub trait TabsApi: Send + Sync {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, PlatformError>;

    /// Ping the content-side DOM observer in `tab_id`. `Ok(false)` means the
    /// tab is reachable but the observer is not injected yet.
    async fn ping_observer(&self, tab_id: i64) -> Result<bool, PlatformError>;

    async fn inject_observer(&self, tab_id: i64) -> Result<(), PlatformError>;

    /// Push the full dom-trigger set to `tab_id` (the `SET_DOM_TRIGGERS`
    /// message).
    async fn set_dom_triggers(
        &self,
        tab_id: i64,
        triggers: &[DomTriggerSync],
    ) -> Result<(), PlatformError>;

    fn add_message_listener(&self);
    fn remove_message_listener(&self);

    fn add_navigation_listener(&self);
    fn remove_navigation_listener(&self);
}

/// Extension command keybindings (`chrome.commands`-shaped).
pub trait CommandApi: Send + Sync {
    fn add_command_listener(&self);
    fn remove_command_listener(&self);
}
