//! Default store implementations.
//!
//! [`MemoryLedger`] backs tests and short-lived sessions; [`FileLedger`]
//! provides the durable, crash-recoverable variant. Both implement
//! [`RunsStore`](crate::traits::RunsStore) and
//! [`EventsStore`](crate::traits::EventsStore) on one type so sequence
//! allocation can cover the run record and the event log in a single
//! transaction scope.

mod file;
mod memory;

pub use file::{FileLedger, FileTriggersStore};
pub use memory::{MemoryFlowsStore, MemoryLedger, MemoryTriggersStore};
