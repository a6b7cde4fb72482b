//! KeyValueStore port - プロセス共通の永続ストア
//!
//! ブラウザ拡張の storage 領域に相当する。値は JSON。
//! どのコンテキストから書いても同じキー空間を共有する。

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::StoreError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
