//! Flow records and the consumed flow-runner contract.
//!
//! The step/action execution engine is an external collaborator — this crate
//! only hands it a [`Flow`] plus [`RunOptions`] and consumes the
//! [`RunResult`]. The flow graph itself is opaque here.

use serde::{Deserialize, Serialize};

/// A declarative flow of steps. The graph contents are owned and interpreted
/// by the external runner; this crate treats them as a blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Flow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub graph: serde_json::Value,
}

/// Options passed to [`FlowRunner::run_flow`](crate::traits::FlowRunner::run_flow).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Trigger `args` merged into run variables.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Aggregate step counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunSummary {
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub took_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScreenshotPolicy {
    pub on_failure: bool,
}

/// What the external runner reports back for one run attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunResult {
    pub run_id: String,
    pub success: bool,
    pub summary: RunSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
    #[serde(default)]
    pub screenshots: ScreenshotPolicy,
}
