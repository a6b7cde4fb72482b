//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryKeyValueStore** / **JsonFileStore**: 永続ストア
//! - **GmailPipeline**: Gmail REST の送信パイプライン
//! - **ScriptedPipeline** / **StaticLocator**: デモ用・テスト用

pub mod file_store;
pub mod gmail;
pub mod inmem_store;
pub mod scripted_pipeline;
pub mod static_locator;

pub use self::file_store::JsonFileStore;
pub use self::gmail::{
    GMAIL_API_BASE, GmailPipeline, OutgoingMessage, StaticTokenProvider, build_mime_message,
    encode_raw,
};
pub use self::inmem_store::InMemoryKeyValueStore;
pub use self::scripted_pipeline::ScriptedPipeline;
pub use self::static_locator::StaticLocator;
