//! InMemoryKeyValueStore - 開発用・テスト用のストア

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::StoreError;
use crate::ports::KeyValueStore;

/// Clone は同じ中身を共有する（テスト側から書き込みを覗ける）。
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek for assertions.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn clones_share_entries() {
        let store = InMemoryKeyValueStore::new();
        let other = store.clone();

        store.set("a", json!({"n": 1})).await.unwrap();
        assert_eq!(other.get("a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(other.keys().await.unwrap(), vec!["a".to_string()]);

        other.remove("a").await.unwrap();
        assert!(store.snapshot("a").is_none());
    }
}
