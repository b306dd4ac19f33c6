//! Trigger specifications: how flow runs are requested.

use serde::{Deserialize, Serialize};

/// Discriminant for the trigger kinds. Each kind has exactly one
/// [`TriggerHandler`](crate::traits::TriggerHandler) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Dom,
    Url,
    Cron,
    Once,
    Command,
    ContextMenu,
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Dom => "dom",
            Self::Url => "url",
            Self::Cron => "cron",
            Self::Once => "once",
            Self::Command => "command",
            Self::ContextMenu => "context_menu",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// How a URL pattern is compared against a navigated-to URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlPatternKind {
    /// Exact host, or any subdomain of it.
    Domain,
    /// Path prefix.
    Path,
    /// Full URL prefix.
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UrlPattern {
    pub kind: UrlPatternKind,
    pub value: String,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    800
}

fn default_contexts() -> Vec<String> {
    vec!["page".to_string()]
}

/// Per-kind trigger configuration, tagged on the wire as `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TriggerConfig {
    Dom {
        selector: String,
        #[serde(default = "default_true")]
        appear: bool,
        #[serde(default = "default_true")]
        once: bool,
        #[serde(default = "default_debounce_ms")]
        debounce_ms: u64,
    },
    Url {
        patterns: Vec<UrlPattern>,
    },
    Cron {
        cron: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    Once {
        /// Epoch millis. Must be a finite number; validated at install.
        when_ms: f64,
    },
    Command {
        command_key: String,
    },
    ContextMenu {
        title: String,
        #[serde(default = "default_contexts")]
        contexts: Vec<String>,
    },
    Manual,
}

impl TriggerConfig {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Dom { .. } => TriggerKind::Dom,
            Self::Url { .. } => TriggerKind::Url,
            Self::Cron { .. } => TriggerKind::Cron,
            Self::Once { .. } => TriggerKind::Once,
            Self::Command { .. } => TriggerKind::Command,
            Self::ContextMenu { .. } => TriggerKind::ContextMenu,
            Self::Manual => TriggerKind::Manual,
        }
    }
}

/// One configured trigger. Persisted via
/// [`TriggersStore::save`](crate::traits::TriggersStore::save) (upsert by
/// `id`); installed into a running handler explicitly and uninstalled
/// independently of store deletion — a disabled trigger must still be
/// removable from its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub id: String,
    pub enabled: bool,
    /// The flow to run when this trigger fires.
    pub flow_id: String,
    /// Arbitrary JSON merged into run variables at fire time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(flatten)]
    pub config: TriggerConfig,
}

impl TriggerSpec {
    pub fn kind(&self) -> TriggerKind {
        self.config.kind()
    }
}

/// Ephemeral value passed to `on_fire`. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerFireContext {
    pub source_tab_id: Option<i64>,
    pub source_url: Option<String>,
}

/// One entry of the `SET_DOM_TRIGGERS` payload pushed to the content-side
/// DOM observer. Each push is a full resync of the installed dom-trigger
/// set, not an incremental diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DomTriggerSync {
    pub id: String,
    pub selector: String,
    pub appear: bool,
    pub once: bool,
    pub debounce_ms: u64,
}
