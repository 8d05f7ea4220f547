//! Ports - 抽象化レイヤー
//!
//! キューが外部に求めるインターフェースを定義します。
//! 実装は `impls`（開発・テスト用）か、アプリ側が提供します。
//!
//! # 外部コラボレータ
//! - PersistentStore: キューのスナップショットの保存先
//! - ConnectivityMonitor: オンライン/オフラインの通知元
//! - Clock: `queued_at` の時刻源

pub mod clock;
pub mod connectivity;
pub mod store;
pub mod subscription;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::connectivity::{ConnectivityListener, ConnectivityMonitor, Reachability, is_reachable};
pub use self::store::{PersistentStore, StoreError};
pub use self::subscription::Subscription;
