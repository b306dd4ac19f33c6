//! TabFlow Engine — durable run ledger and trigger machinery for
//! browser-automation flows.
//!
//! This crate provides the record-and-replay core: an append-only per-run
//! event ledger with atomic sequence allocation, a persist-before-broadcast
//! event bus, seven trigger-handler state machines over an abstract browser
//! platform surface, and a scheduler that drives an external `FlowRunner`
//! through the run lifecycle. The run history is authoritative and
//! reconstructible from the ledger alone.
//!
//! The engine is designed to be embedded: the browser bindings (alarms,
//! menus, tabs, commands) and the step executor are supplied by the host
//! through traits.

pub mod api;
pub mod bootstrap;
pub mod bus;
pub mod errors;
pub mod platform;
pub mod scheduler;
pub mod stores;
pub mod traits;
pub mod triggers;
pub mod types;

// Re-export public types at the crate level.

// api
pub use api::EngineApi;

// bootstrap
pub use bootstrap::reinstall_enabled_triggers;

// bus
pub use bus::{EventsBus, Subscription};

// errors
pub use errors::{
    EventStoreError, FlowRunnerError, FlowStoreError, PlatformError, RunStoreError,
    SchedulerError, TriggerError, TriggerStoreError,
};

// platform
pub use platform::{is_injectable_url, AlarmApi, CommandApi, MenuApi, TabInfo, TabsApi};

// scheduler
pub use scheduler::{EnqueuedRun, Scheduler, SchedulerConfig, SchedulerHandle};

// stores
pub use stores::{
    FileLedger, FileTriggersStore, MemoryFlowsStore, MemoryLedger, MemoryTriggersStore,
};

// traits
pub use traits::{
    EventsStore, FireHandler, FlowRunner, FlowsStore, ListQuery, RunsStore, TriggerDisabler,
    TriggerHandler, TriggersStore,
};

// triggers
pub use triggers::{
    parse_alarm_name, AlarmKind, CommandTriggerHandler, ContextMenuTriggerHandler,
    CronTriggerHandler, DomTriggerHandler, HandlerRegistry, ManualTriggerHandler,
    OnceTriggerHandler, StoreTriggerDisabler, UrlTriggerHandler, CRON_ALARM_PREFIX,
    MENU_ID_PREFIX, ONCE_ALARM_PREFIX,
};

// types
pub use types::{
    DomTriggerSync, Flow, RunEvent, RunEventInput, RunEventKind, RunOptions, RunRecord,
    RunResult, RunStatus, RunSummary, ScreenshotPolicy, TriggerConfig, TriggerFireContext,
    TriggerKind, TriggerSpec, UrlPattern, UrlPatternKind, RUN_SCHEMA_VERSION,
};
