//! Queue configuration.

use serde::{Deserialize, Serialize};

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "offline_mutation_queue";

/// Settings for a [`crate::app::MutationQueue`].
///
/// Deserializable so hosts can keep it in their own config file; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Key under which the queue snapshot is stored.
    pub storage_key: String,

    /// Optional retry ceiling. `None` (the default) retries forever.
    /// Entries that reach the ceiling stay `failed` and listed, but are no
    /// longer replayed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_retries: None,
        }
    }
}

impl QueueConfig {
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unbounded() {
        let config = QueueConfig::default();
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.max_retries, None);
    }

    #[test]
    fn partial_input_keeps_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.max_retries, Some(5));
    }
}
