//! ManualConnectivity - 手動で切り替える ConnectivityMonitor
//!
//! テストとデモ CLI 用。`set_reachable` を呼ぶと、登録済みの listener を
//! 呼び出し元のスレッドで同期的に呼ぶ。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{ConnectivityListener, ConnectivityMonitor, Reachability, Subscription};

type Listeners = Arc<Mutex<Vec<(u64, ConnectivityListener)>>>;

/// Connectivity driven by the caller.
#[derive(Default)]
pub struct ManualConnectivity {
    reachability: Mutex<Reachability>,
    listeners: Listeners,
    next_id: AtomicU64,
}

impl ManualConnectivity {
    pub fn new(reachability: Reachability) -> Self {
        Self {
            reachability: Mutex::new(reachability),
            listeners: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn online() -> Self {
        Self::new(Some(true))
    }

    pub fn offline() -> Self {
        Self::new(Some(false))
    }

    /// Update reachability and notify every listener, even if the value did
    /// not change (platforms re-deliver the same state too).
    pub fn set_reachable(&self, reachability: Reachability) {
        *self
            .reachability
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reachability;

        // listener の中で subscribe/unsubscribe されてもいいようにスナップショットを取る
        let snapshot: Vec<ConnectivityListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(reachability);
        }
    }

    pub fn go_online(&self) {
        self.set_reachable(Some(true));
    }

    pub fn go_offline(&self) {
        self.set_reachable(Some(false));
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

fn lock(listeners: &Listeners) -> MutexGuard<'_, Vec<(u64, ConnectivityListener)>> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ConnectivityMonitor for ManualConnectivity {
    async fn fetch_once(&self) -> Reachability {
        *self
            .reachability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, listener: ConnectivityListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, listener));

        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                lock(&listeners).retain(|(other, _)| *other != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_once_reads_current_value() {
        let net = ManualConnectivity::offline();
        assert_eq!(net.fetch_once().await, Some(false));

        net.set_reachable(None);
        assert_eq!(net.fetch_once().await, None);

        net.go_online();
        assert_eq!(net.fetch_once().await, Some(true));
    }

    #[test]
    fn listeners_receive_changes_until_unsubscribed() {
        let net = ManualConnectivity::offline();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sub = {
            let seen = Arc::clone(&seen);
            net.subscribe(Arc::new(move |r: Reachability| seen.lock().unwrap().push(r)))
        };
        assert_eq!(net.listener_count(), 1);

        net.go_online();
        net.set_reachable(None);
        sub.unsubscribe();
        net.go_offline();

        assert_eq!(*seen.lock().unwrap(), vec![Some(true), None]);
        assert_eq!(net.listener_count(), 0);
    }
}
