//! Queued mutation record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ActionType, MutationId};

/// Mutation status.
///
/// State transitions:
/// - Pending -> Replaying -> Completed
/// - Pending/Failed -> Replaying -> Failed (eligible again on the next pass)
/// - Pending/Failed -> Failed (no handler registered; never enters Replaying)
///
/// `Replaying` found on reload is normalized back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    /// Waiting for a replay pass.
    Pending,

    /// Handler is currently running.
    Replaying,

    /// Handler succeeded; pruned at the end of the pass.
    Completed,

    /// Last attempt failed; retried on the next pass.
    Failed,
}

impl MutationStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, MutationStatus::Completed)
    }

    /// Is this mutation eligible for a replay pass?
    pub fn is_eligible(self) -> bool {
        matches!(self, MutationStatus::Pending | MutationStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::Replaying => "replaying",
            MutationStatus::Completed => "completed",
            MutationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to `enqueue`: everything the caller decides about a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
    pub id: MutationId,
    pub action: ActionType,
    pub payload: serde_json::Value,
    pub description: String,
}

impl NewMutation {
    pub fn new(
        id: impl Into<MutationId>,
        action: impl Into<ActionType>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            payload,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A mutation waiting in (or moving through) the offline queue.
///
/// This is also the persisted shape: a JSON array of these records, camelCase
/// keys, `lastError` omitted until the first failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub id: MutationId,
    pub queued_at: DateTime<Utc>,
    pub action: ActionType,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub description: String,
    pub status: MutationStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedMutation {
    pub fn new(mutation: NewMutation, queued_at: DateTime<Utc>) -> Self {
        Self {
            id: mutation.id,
            queued_at,
            action: mutation.action,
            payload: mutation.payload,
            description: mutation.description,
            status: MutationStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.status.is_eligible()
    }

    /// Eligible and still under the optional retry ceiling.
    pub fn is_replayable(&self, max_retries: Option<u32>) -> bool {
        self.is_eligible() && max_retries.is_none_or(|max| self.retry_count < max)
    }

    /// Mark as replaying (handler about to run).
    pub fn start_replay(&mut self) {
        self.status = MutationStatus::Replaying;
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self) {
        self.status = MutationStatus::Completed;
    }

    /// Record a failed attempt.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = MutationStatus::Failed;
        self.retry_count += 1;
        self.last_error = Some(error.into());
    }

    /// Normalize a record loaded from storage. Returns true if it was left
    /// in `Replaying` (the process died mid-handler).
    pub fn recover(&mut self) -> bool {
        if self.status == MutationStatus::Replaying {
            self.status = MutationStatus::Pending;
            true
        } else {
            false
        }
    }
}
