//! FileStore - 1 key = 1 file の PersistentStore
//!
//! 書き込みは `<key>.json.tmp` に書いて fsync してから rename する。
//! 途中でプロセスが落ちても、前回のスナップショットか今回のスナップショットの
//! どちらかが残る。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::ports::{PersistentStore, StoreError};

/// Directory-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Characters outside `[A-Za-z0-9._-]` become `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl PersistentStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.load("queue").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_survives_new_instance() {
        let dir = tempdir().unwrap();

        FileStore::new(dir.path())
            .save("queue", b"[{\"id\":\"a1\"}]".to_vec())
            .await
            .unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(
            reopened.load("queue").await.unwrap(),
            Some(b"[{\"id\":\"a1\"}]".to_vec())
        );
    }

    #[tokio::test]
    async fn save_replaces_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save("queue", b"[1]".to_vec()).await.unwrap();
        store.save("queue", b"[]".to_vec()).await.unwrap();

        assert_eq!(store.load("queue").await.unwrap(), Some(b"[]".to_vec()));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["queue.json".to_string()]);
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("state"));

        store.save("queue", b"[]".to_vec()).await.unwrap();
        assert!(store.path_for("queue").exists());
    }

    #[test]
    fn keys_are_sanitized() {
        let store = FileStore::new("/tmp/offq");
        assert_eq!(
            store.path_for("../user/queue v1"),
            PathBuf::from("/tmp/offq/.._user_queue_v1.json")
        );
    }
}
