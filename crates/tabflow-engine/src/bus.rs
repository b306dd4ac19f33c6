//! Persist-before-broadcast event bus.
//!
//! Every event goes through [`EventsBus::append`]: it is durably written via
//! the wrapped [`EventsStore`] first, and only after the write succeeds is it
//! fanned out to subscribers. A subscriber therefore never observes an event
//! the store could lose, and a failed append broadcasts nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::errors::EventStoreError;
use crate::traits::EventsStore;
use crate::types::{RunEvent, RunEventInput};

type Callback = Arc<dyn Fn(&RunEvent) + Send + Sync>;

struct SubscriberEntry {
    /// `Some(run_id)` restricts delivery to that run's events.
    filter: Option<String>,
    callback: Callback,
}

type SubscriberMap = Mutex<HashMap<u64, SubscriberEntry>>;

/// Handle returned by [`EventsBus::subscribe`]. Dropping it does NOT
/// unsubscribe; call [`Subscription::unsubscribe`] explicitly. Unsubscribing
/// twice is a no-op.
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberMap>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().remove(&self.id);
        }
    }
}

/// Event fan-out layered over an [`EventsStore`].
pub struct EventsBus {
    store: Arc<dyn EventsStore>,
    subscribers: Arc<SubscriberMap>,
    next_id: AtomicU64,
}

impl EventsBus {
    pub fn new(store: Arc<dyn EventsStore>) -> Self {
        Self {
            store,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Persist `input` and broadcast the stored event. Returns the event with
    /// its allocated seq. On store failure the error propagates and no
    /// subscriber is invoked.
    pub async fn append(&self, input: RunEventInput) -> Result<RunEvent, EventStoreError> {
        let event = self.store.append(input).await?;

        // Snapshot the matching callbacks so subscriber code runs outside the
        // lock and can itself subscribe/unsubscribe.
        let callbacks: Vec<Callback> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .values()
                .filter(|entry| match &entry.filter {
                    Some(run_id) => *run_id == event.run_id,
                    None => true,
                })
                .map(|entry| Arc::clone(&entry.callback))
                .collect()
        };
        for callback in callbacks {
            callback(&event);
        }

        Ok(event)
    }

    /// Subscribe to events, optionally filtered to a single run.
    pub fn subscribe<F>(&self, run_id: Option<&str>, callback: F) -> Subscription
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(
            id,
            SubscriberEntry {
                filter: run_id.map(str::to_string),
                callback: Arc::new(callback),
            },
        );
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Read back persisted events; see [`EventsStore::list`].
    pub async fn list(
        &self,
        run_id: &str,
        query: crate::traits::ListQuery,
    ) -> Result<Vec<RunEvent>, EventStoreError> {
        self.store.list(run_id, query).await
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryLedger;
    use crate::traits::RunsStore;
    use crate::types::{RunEventKind, RunRecord};

    fn queued(run_id: &str) -> RunEventInput {
        RunEventInput::new(
            run_id,
            RunEventKind::RunQueued {
                trigger_id: None,
                args: None,
            },
        )
    }

    async fn bus_with_run(run_id: &str) -> (EventsBus, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let mut run = RunRecord::new("flow-1", 1);
        run.id = run_id.to_string();
        ledger.save(&run).await.unwrap();
        (EventsBus::new(Arc::clone(&ledger) as Arc<dyn EventsStore>), ledger)
    }

    #[tokio::test]
    async fn subscriber_sees_already_persisted_event() {
        let (bus, ledger) = bus_with_run("run-1").await;

        // The callback reads the store synchronously via a side channel: it
        // records the seq it was handed, and the test then verifies that seq
        // was durable before the broadcast by checking the returned event.
        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(None, move |event| {
            seen_clone.lock().push(event.seq);
        });

        let event = bus.append(queued("run-1")).await.unwrap();
        assert_eq!(event.seq, 1);
        assert_eq!(*seen.lock(), vec![1]);

        // Persisted copy matches what the subscriber saw.
        let stored = ledger
            .list("run-1", crate::traits::ListQuery::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].seq, 1);
    }

    #[tokio::test]
    async fn failed_append_broadcasts_nothing() {
        let (bus, _ledger) = bus_with_run("run-1").await;

        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(None, move |event| {
            seen_clone.lock().push(event.seq);
        });

        let err = bus.append(queued("no-such-run")).await.unwrap_err();
        assert!(matches!(err, EventStoreError::RunNotFound { .. }));
        assert!(seen.lock().is_empty(), "failed append must stay silent");
    }

    #[tokio::test]
    async fn run_filter_isolates_subscribers() {
        let ledger = Arc::new(MemoryLedger::new());
        for run_id in ["run-a", "run-b"] {
            let mut run = RunRecord::new("flow-1", 1);
            run.id = run_id.to_string();
            ledger.save(&run).await.unwrap();
        }
        let bus = EventsBus::new(Arc::clone(&ledger) as Arc<dyn EventsStore>);

        let a_events = Arc::new(Mutex::new(Vec::<String>::new()));
        let all_events = Arc::new(Mutex::new(Vec::<String>::new()));
        let a_clone = Arc::clone(&a_events);
        let all_clone = Arc::clone(&all_events);
        let _sub_a = bus.subscribe(Some("run-a"), move |event| {
            a_clone.lock().push(event.run_id.clone());
        });
        let _sub_all = bus.subscribe(None, move |event| {
            all_clone.lock().push(event.run_id.clone());
        });

        bus.append(queued("run-a")).await.unwrap();
        bus.append(queued("run-b")).await.unwrap();

        assert_eq!(*a_events.lock(), vec!["run-a"]);
        assert_eq!(*all_events.lock(), vec!["run-a", "run-b"]);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (bus, _ledger) = bus_with_run("run-1").await;

        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        let sub = bus.subscribe(None, move |_| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);

        bus.append(queued("run-1")).await.unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
