//! sendlock-core
//!
//! Deferred "undo send" for a webmail composer: intercept the send gesture,
//! hold it for a configurable delay, then commit the saved draft.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, state, payload, events, errors）
//! - **ports**: 抽象化レイヤー（Clock, KeyValueStore, SendPipeline, ElementLocator, など）
//! - **interceptor**: 送信操作の横取りと SendPayload の抽出
//! - **scheduler**: TaskSet を所有する期限ベースのスケジューラ
//! - **persistence**: TaskSet の永続化ブリッジ
//! - **app**: イベントループ（SchedulerRuntime）と公開ハンドル
//! - **impls**: ports の実装（Gmail, JSON ファイル, テスト用）
//! - **config**: `sendlock.toml`

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod interceptor;
pub mod persistence;
pub mod ports;
pub mod scheduler;

pub use app::{RuntimeError, SchedulerHandle, SchedulerRuntime, TaskCounts};
pub use config::{ConfigError, SendLockConfig};
pub use interceptor::Interceptor;
pub use persistence::PersistenceBridge;
pub use scheduler::{Attachment, Creation, Scheduler, SchedulerSettings};
