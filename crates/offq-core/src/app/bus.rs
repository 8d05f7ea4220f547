//! EventBus - 同期的な multi-listener 通知
//!
//! # 設計
//! - `emit` は登録順に全 listener を同期的に呼ぶ（バッファしない）
//! - listener の panic は捕まえてログに出し、残りの listener への配信を続ける
//! - emit 中の subscribe/unsubscribe に備えてスナップショットを回す

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::QueueEvent;
use crate::ports::Subscription;

/// Observer callback.
pub type EventListener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Vec<(u64, EventListener)>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, EventListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Multi-listener notifier for [`QueueEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; the returned handle removes it again.
    pub fn subscribe(&self, listener: impl Fn(&QueueEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, Arc::new(listener)));

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners().retain(|(other, _)| *other != id);
            }
        })
    }

    /// Deliver `event` to every listener, in registration order.
    pub fn emit(&self, event: &QueueEvent) {
        let snapshot: Vec<EventListener> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                tracing::error!(
                    event = event.name(),
                    panic = panic_message(panic.as_ref()),
                    "queue event listener panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MutationId;

    fn started(id: &str) -> QueueEvent {
        QueueEvent::ReplayStarted {
            id: MutationId::new(id),
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let _first = {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push("first"))
        };
        let _second = {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push("second"))
        };

        bus.emit(&started("a1"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _bad = bus.subscribe(|_| panic!("observer bug"));
        let _good = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |e: &QueueEvent| seen.lock().unwrap().push(e.clone()))
        };

        bus.emit(&started("a1"));
        bus.emit(&started("a2"));

        assert_eq!(*seen.lock().unwrap(), vec![started("a1"), started("a2")]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));

        let sub = {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| *seen.lock().unwrap() += 1)
        };
        bus.emit(&started("a1"));
        sub.unsubscribe();
        bus.emit(&started("a2"));

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_emit() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0));

        let sub = {
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            bus.subscribe(move |_| {
                *calls.lock().unwrap() += 1;
                if let Some(sub) = slot.lock().unwrap().take() {
                    sub.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(sub);

        bus.emit(&started("a1"));
        bus.emit(&started("a2"));

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
