use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;

use crate::error::AppError;

/// Local key-value persistence for the delivery cache.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn put(&self, key: &str, value: String) -> Result<(), AppError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), AppError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Persistence(format!("invalid store key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Persistence(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).await.map_err(|err| {
            AppError::Persistence(format!("failed to create {}: {err}", self.dir.display()))
        })?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).await.map_err(|err| {
            AppError::Persistence(format!("failed to write {}: {err}", staging.display()))
        })?;
        fs::rename(&staging, &path).await.map_err(|err| {
            AppError::Persistence(format!("failed to replace {}: {err}", path.display()))
        })
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AppError::Persistence(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_and_removes() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("deliveries").await.unwrap(), None);

        store.put("deliveries", "[]".to_string()).await.unwrap();
        assert_eq!(store.get("deliveries").await.unwrap().as_deref(), Some("[]"));

        store.remove("deliveries").await.unwrap();
        store.remove("deliveries").await.unwrap();
        assert_eq!(store.get("deliveries").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("courier-gateway-{}", Uuid::new_v4()));

        FileStore::new(&dir)
            .put("deliveries", r#"[{"a":1}]"#.to_string())
            .await
            .unwrap();

        let reopened = FileStore::new(&dir);
        assert_eq!(
            reopened.get("deliveries").await.unwrap().as_deref(),
            Some(r#"[{"a":1}]"#)
        );

        reopened.remove("deliveries").await.unwrap();
        reopened.remove("deliveries").await.unwrap();
        assert_eq!(reopened.get("deliveries").await.unwrap(), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let store = FileStore::new(std::env::temp_dir());
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(AppError::Persistence(_))
        ));
    }
}
