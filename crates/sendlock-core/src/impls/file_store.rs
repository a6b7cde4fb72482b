//! JsonFileStore - 単一 JSON ファイルに全キーを保存するストア
//!
//! 書き込みは tmp ファイル + rename で原子的に行う。
//! 読み込み時にファイルが無い・空なら空のストアとして扱う。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::StoreError;
use crate::ports::KeyValueStore;

pub struct JsonFileStore {
    path: PathBuf,
    /// read-modify-write をプロセス内で直列化する
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let value: Value = serde_json::from_str(&content)?;
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(StoreError::Corrupt(format!(
                "expected a JSON object at top level, found {}",
                json_kind(&other)
            ))),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        f(&mut entries);
        self.write_all(&entries).await
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let key = key.to_string();
        self.update(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_all().await?.into_keys().collect())
    }
}
