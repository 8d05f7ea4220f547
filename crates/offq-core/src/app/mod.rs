//! App - アプリケーション層
//!
//! ports と typed を組み合わせてキュー本体を実装します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: 構築とワイヤリング（起動時検証）
//! - **MutationQueue**: enqueue / 永続化 / replay / イベント
//! - **EventBus**: listener への同期配信
//! - **QueueStatus**: UI 向けの状態スナップショット

pub mod builder;
pub mod bus;
pub mod manager;
pub mod status;

pub use self::builder::{BuildError, QueueBuilder};
pub use self::bus::{EventBus, EventListener};
pub use self::manager::{Enqueued, MutationQueue, ReplayOutcome, ReplaySummary, SkipReason};
pub use self::status::QueueStatus;
