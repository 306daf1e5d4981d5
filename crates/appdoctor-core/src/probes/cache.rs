//! Cache store adapters for the `file` and `array` stores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use super::CacheStore;
use crate::error::Result;

/// Directory-backed store. Each entry is one file whose first line holds
/// the expiry as unix seconds.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(name)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        tokio::fs::write(self.entry_path(key), format!("{}\n{}", expires, value)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (expiry, value) = raw.split_once('\n').unwrap_or((raw.as_str(), ""));
        let expired = expiry
            .trim()
            .parse::<i64>()
            .map(|at| at <= Utc::now().timestamp())
            .unwrap_or(true);
        if expired {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(value.to_string()))
    }

    async fn forget(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, the equivalent of the framework's `array` driver.
#[derive(Debug, Default)]
pub struct ArrayCacheStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl ArrayCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for ArrayCacheStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path().join("cache"));

        store
            .put("appdoctor_test_1", "ok", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("appdoctor_test_1").await.unwrap().as_deref(),
            Some("ok")
        );

        store.forget("appdoctor_test_1").await.unwrap();
        assert!(store.get("appdoctor_test_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_expired_entry_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        std::fs::write(dir.path().join("stale"), "1\nold").unwrap();
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(!dir.path().join("stale").exists());
    }

    #[tokio::test]
    async fn test_forget_missing_key_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.forget("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_array_store_round_trip() {
        let store = ArrayCacheStore::new();
        store.put("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.forget("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
