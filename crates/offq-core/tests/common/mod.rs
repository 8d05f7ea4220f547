#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use offq_core::config::DEFAULT_STORAGE_KEY;
use offq_core::impls::{ManualConnectivity, MemoryStore};
use offq_core::ports::{ManualClock, Subscription};
use offq_core::{HandlerError, MutationQueue, NewMutation, QueueConfig, QueueEvent, QueuedMutation};
use serde_json::json;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Queue wired to in-memory collaborators the test can poke at.
pub struct Harness {
    pub queue: MutationQueue,
    pub store: Arc<MemoryStore>,
    pub net: Arc<ManualConnectivity>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(store: MemoryStore, net: ManualConnectivity, config: QueueConfig) -> Self {
        let store = Arc::new(store);
        let net = Arc::new(net);
        let clock = Arc::new(ManualClock::new(t0()));
        let queue = MutationQueue::builder()
            .config(config)
            .store(Arc::clone(&store))
            .connectivity(Arc::clone(&net))
            .clock(Arc::clone(&clock))
            .build()
            .unwrap();
        Self {
            queue,
            store,
            net,
            clock,
        }
    }

    pub fn offline() -> Self {
        Self::new(MemoryStore::new(), ManualConnectivity::offline(), QueueConfig::default())
    }

    pub fn online() -> Self {
        Self::new(MemoryStore::new(), ManualConnectivity::online(), QueueConfig::default())
    }

    /// Enqueue `id` under `action` and move the clock one second forward.
    pub async fn push(&self, id: &str, action: &str) {
        self.queue
            .enqueue(NewMutation::new(id, action, json!({ "id": id })))
            .await
            .unwrap();
        self.clock.advance(Duration::seconds(1));
    }

    pub fn stored(&self) -> Vec<QueuedMutation> {
        stored(&self.store)
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.queue
            .get_pending_mutations()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect()
    }
}

pub fn stored(store: &MemoryStore) -> Vec<QueuedMutation> {
    let bytes = store.get(DEFAULT_STORAGE_KEY).expect("queue was persisted");
    serde_json::from_slice(&bytes).unwrap()
}

/// Collects every event emitted while attached.
pub struct Recorder {
    events: Arc<Mutex<Vec<QueueEvent>>>,
    _subscription: Subscription,
}

impl Recorder {
    pub fn attach(queue: &MutationQueue) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let events = Arc::clone(&events);
            queue.add_event_listener(move |e: &QueueEvent| events.lock().unwrap().push(e.clone()))
        };
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(QueueEvent::name).collect()
    }
}

/// Handler log shared by `record_ok` / `record_err` handlers.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Register a handler for `action` that logs the payload id and succeeds.
pub fn record_ok(queue: &MutationQueue, action: &str, log: &CallLog) {
    let log = Arc::clone(log);
    queue.register_fn(action, move |payload| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(payload["id"].as_str().unwrap_or_default().to_string());
            Ok(())
        }
    });
}

/// Register a handler for `action` that logs the payload id and rejects.
pub fn record_err(queue: &MutationQueue, action: &str, log: &CallLog) {
    let log = Arc::clone(log);
    queue.register_fn(action, move |payload| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(payload["id"].as_str().unwrap_or_default().to_string());
            Err(HandlerError::new("backend said no"))
        }
    });
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
