//! Domain identifiers (strongly-typed newtypes).
//!
//! # 設計
//! - `MutationId` は呼び出し側が決める ID（dedup のキー）
//! - `ActionType` は handler を選ぶためのキー
//!
//! Both wrap a `String` and serialize transparently, so the persisted JSON
//! stays a plain string. The newtypes exist so the two cannot be mixed up at
//! call sites.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of a queued mutation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(String);

impl MutationId {
    const PREFIX: &'static str = "mut-";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh ULID-based id (`mut-<ulid>`) for callers without
    /// their own id scheme.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Same as [`MutationId::generate`], with the timestamp part taken from
    /// `now` (lets a test clock drive sortable ids).
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let timestamp_ms = now.timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        Self(format!("{}{}", Self::PREFIX, ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for MutationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MutationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Action identifier selecting which registered handler applies.
///
/// Any string is accepted; typed mutations derive theirs from
/// [`crate::typed::Mutation::ACTION`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(String);

impl ActionType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = MutationId::new("a1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"a1\"");

        let action: ActionType = serde_json::from_str("\"createX\"").unwrap();
        assert_eq!(action.as_str(), "createX");
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let id1 = MutationId::generate();
        let id2 = MutationId::generate();

        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("mut-"));
    }

    #[test]
    fn generated_ids_sort_by_timestamp() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 1).unwrap();

        let id1 = MutationId::generate_at(earlier);
        let id2 = MutationId::generate_at(later);

        // ULID の先頭は timestamp なので文字列比較でも時刻順になる
        assert!(id1 < id2);
    }
}
