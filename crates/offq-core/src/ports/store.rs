//! PersistentStore port - キューの永続化先（key/value の byte store）
//!
//! # 実装
//! - **MemoryStore**: テスト用
//! - **FileStore**: 1 key = 1 file（atomic rename）

use std::sync::Arc;

use async_trait::async_trait;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// PersistentStore は 1 つの blob を key ごとに保存・読み込みする
///
/// # 設計原則
/// - キューは毎回スナップショット全体を書き込む（追記ではない）
/// - `save` が `Ok` を返したら、その内容は再起動後も `load` で読めること
/// - 1 つの key を 1 つの MutationQueue が専有する
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Load the blob stored under `key`, `None` if nothing was ever saved.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the blob stored under `key`.
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: PersistentStore + ?Sized> PersistentStore for Arc<T> {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).load(key).await
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        (**self).save(key, bytes).await
    }
}
