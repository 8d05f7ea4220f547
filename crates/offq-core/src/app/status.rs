//! Status - キューの状態スナップショット（UI のインジケータ用）

use serde::{Deserialize, Serialize};

use crate::domain::{MutationStatus, QueuedMutation};

/// Counts per status plus the manager flags, taken at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub pending: usize,
    pub replaying: usize,
    pub failed: usize,
    /// Failed entries that hit the configured retry ceiling.
    pub exhausted: usize,
    pub is_online: bool,
    pub is_replaying: bool,
}

impl QueueStatus {
    pub(crate) fn collect<'a>(
        mutations: impl IntoIterator<Item = &'a QueuedMutation>,
        max_retries: Option<u32>,
    ) -> Self {
        let mut status = QueueStatus::default();
        for m in mutations {
            match m.status {
                MutationStatus::Pending => status.pending += 1,
                MutationStatus::Replaying => status.replaying += 1,
                MutationStatus::Failed => {
                    status.failed += 1;
                    if !m.is_replayable(max_retries) {
                        status.exhausted += 1;
                    }
                }
                MutationStatus::Completed => {}
            }
        }
        status
    }

    /// Entries still waiting for a successful replay (`pending` + `failed`).
    pub fn pending_count(&self) -> usize {
        self.pending + self.failed
    }
}
