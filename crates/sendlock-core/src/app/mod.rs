//! App - アプリケーション層
//!
//! ports と scheduler を組み合わせて動かす。
//!
//! # 主要コンポーネント
//! - **SchedulerRuntime**: scheduler を所有するイベントループ
//! - **SchedulerHandle**: presentation / interceptor からの入口
//! - **TaskCounts**: 状態別のタスク数

pub mod runtime;
pub mod status;

pub use self::runtime::{RuntimeError, SchedulerHandle, SchedulerRuntime};
pub use self::status::TaskCounts;
