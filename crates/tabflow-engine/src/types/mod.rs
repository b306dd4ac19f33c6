//! Core data model: run records, run events, trigger specs, and the
//! consumed flow-runner contract.

mod event;
mod flow;
mod run;
mod trigger;

pub use event::{RunEvent, RunEventInput, RunEventKind};
pub use flow::{Flow, RunOptions, RunResult, RunSummary, ScreenshotPolicy};
pub use run::{RunRecord, RunStatus, RUN_SCHEMA_VERSION};
pub use trigger::{
    DomTriggerSync, TriggerConfig, TriggerFireContext, TriggerKind, TriggerSpec, UrlPattern,
    UrlPatternKind,
};
