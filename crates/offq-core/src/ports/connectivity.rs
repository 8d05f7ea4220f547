//! ConnectivityMonitor port - 到達性の通知
//!
//! 検出の仕組み自体はこのクレートの外側の責務。キューは「今つながっているか」
//! の 1 回読みと、変化の通知だけを必要とする。

use std::sync::Arc;

use async_trait::async_trait;

use super::Subscription;

/// Reachability as reported by the platform: `Some(true)` reachable,
/// `Some(false)` unreachable, `None` unknown.
pub type Reachability = Option<bool>;

/// Only a definite `Some(true)` counts as online.
pub fn is_reachable(reachability: Reachability) -> bool {
    reachability == Some(true)
}

/// Callback invoked on every reachability change.
pub type ConnectivityListener = Arc<dyn Fn(Reachability) + Send + Sync>;

/// ConnectivityMonitor は到達性を提供する
///
/// # 設計原則
/// - `fetch_once` は現在値を 1 回だけ読む
/// - `subscribe` は変化のたびに listener を同期的に呼ぶ
/// - 返された `Subscription` で購読を解除する
#[async_trait]
pub trait ConnectivityMonitor: Send + Sync {
    /// Read the current reachability once.
    async fn fetch_once(&self) -> Reachability;

    /// Register `listener` for reachability changes.
    fn subscribe(&self, listener: ConnectivityListener) -> Subscription;
}

#[async_trait]
impl<T: ConnectivityMonitor + ?Sized> ConnectivityMonitor for Arc<T> {
    async fn fetch_once(&self) -> Reachability {
        (**self).fetch_once().await
    }

    fn subscribe(&self, listener: ConnectivityListener) -> Subscription {
        (**self).subscribe(listener)
    }
}
