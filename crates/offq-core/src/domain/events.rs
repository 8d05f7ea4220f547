//! Events - キューの状態変化の通知
//!
//! Closed set of events published on the queue's event bus. Observers match
//! on the enum, so adding a variant is a compile error for every exhaustive
//! consumer.

use serde::{Deserialize, Serialize};

use super::ids::MutationId;

/// QueueEvent はキューで発生したイベント
///
/// JSON では `{"type": "replay-started", "id": "a1"}` の形になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum QueueEvent {
    /// The set of pending/failed mutations changed.
    QueueChanged { pending_count: usize },

    /// The effective online flag flipped.
    ConnectivityChanged { is_online: bool },

    /// A handler is about to run for `id`.
    ReplayStarted { id: MutationId },

    /// The handler for `id` succeeded.
    ReplayCompleted { id: MutationId },

    /// The attempt for `id` failed (handler error or no handler).
    ReplayFailed { id: MutationId, error: String },

    /// A replay pass finished.
    ReplayAllCompleted {
        success_count: usize,
        fail_count: usize,
    },
}

impl QueueEvent {
    /// Event name as it appears in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::QueueChanged { .. } => "queue-changed",
            QueueEvent::ConnectivityChanged { .. } => "connectivity-changed",
            QueueEvent::ReplayStarted { .. } => "replay-started",
            QueueEvent::ReplayCompleted { .. } => "replay-completed",
            QueueEvent::ReplayFailed { .. } => "replay-failed",
            QueueEvent::ReplayAllCompleted { .. } => "replay-all-completed",
        }
    }
}
