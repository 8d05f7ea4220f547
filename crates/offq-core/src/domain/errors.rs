//! Errors - エラー型と分類
//!
//! 分類:
//! - DuplicateEnqueue: エラーではない（`Enqueued::Duplicate` を返してログのみ）
//! - MissingHandler / HandlerRejection: `HandlerError` としてエントリに記録
//! - PersistenceFailure: `QueueError::Persistence`（メモリ上のキューが正）
//! - 接続断: エラーではない（残りは次のパスへ）

use thiserror::Error;

use super::ids::ActionType;
use crate::ports::StoreError;

/// Errors surfaced by queue operations.
///
/// None of these are fatal: the in-memory queue stays authoritative and the
/// caller may keep going.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to persist offline queue: {0}")]
    Persistence(#[from] StoreError),

    #[error("failed to encode mutation: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure reported by (or on behalf of) a mutation handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The "no handler" error recorded when replay finds no handler for an
    /// action.
    pub fn missing(action: &ActionType) -> Self {
        Self::new(format!("no handler registered for action '{action}'"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("payload decode: {e}"))
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_handler_message_names_the_action() {
        let err = HandlerError::missing(&ActionType::new("createX"));
        assert_eq!(err.to_string(), "no handler registered for action 'createX'");
    }

    #[test]
    fn decode_errors_convert() {
        let e = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err: HandlerError = e.into();
        assert!(err.message().starts_with("payload decode:"));
    }

    #[test]
    fn persistence_error_wraps_store_error() {
        let err: QueueError = StoreError::Unavailable("disk full".to_string()).into();
        assert!(matches!(err, QueueError::Persistence(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
