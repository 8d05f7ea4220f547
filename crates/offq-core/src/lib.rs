//! offq-core
//!
//! Durable offline mutation queue: writes made while offline are persisted,
//! then replayed in order once connectivity returns.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, mutation, events, errors）
//! - **ports**: 抽象化レイヤー（PersistentStore, ConnectivityMonitor, Clock）
//! - **typed**: 型付き Mutation API（Mutation trait, Handler trait, HandlerRegistry）
//! - **app**: キュー本体（QueueBuilder, MutationQueue, EventBus）
//! - **impls**: 実装（MemoryStore, FileStore, ManualConnectivity）
//! - **config**: QueueConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{
    BuildError, Enqueued, MutationQueue, QueueBuilder, QueueStatus, ReplayOutcome, ReplaySummary,
    SkipReason,
};
pub use config::QueueConfig;
pub use domain::{
    ActionType, HandlerError, MutationId, MutationStatus, NewMutation, QueueError, QueueEvent,
    QueuedMutation,
};
