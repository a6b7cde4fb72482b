//! Errors - 境界ごとのエラー型
//!
//! # 分類
//! - **SchedulerError**: 状態が合わない操作（cancel after expiry など）。no-op として呼び出し元に返す
//! - **ExtractionError**: host UI から compose context を取れない。intent は出さない
//! - **PipelineError**: backend 送信の失敗。Task は Failed になる（リトライしない）
//! - **StoreError**: 永続化の失敗。load は空集合、save はログのみ

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ids::TaskId;
use super::refs::HostSessionRef;
use super::state::TaskState;

/// Scheduling conflicts and lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The task already left the state the operation requires.
    /// Expected when a user cancel races the expiry.
    #[error("cannot {operation} {task_id}: task is {state}")]
    Rejected {
        task_id: TaskId,
        state: TaskState,
        operation: &'static str,
    },

    #[error("too many deferred sends in flight (limit {0})")]
    CapacityExceeded(usize),

    #[error("cannot schedule a send at {0}: too far ahead")]
    SendAtOutOfRange(DateTime<Utc>),
}

impl SchedulerError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, SchedulerError::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("control {0} is not attached to a compose surface")]
    DetachedControl(String),

    #[error("compose surface is ambiguous: {0}")]
    Ambiguous(String),

    #[error("field lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("could not obtain bearer token: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no draft found for compose session {0}")]
    NoDraft(HostSessionRef),

    #[error("unexpected backend response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store is corrupt: {0}")]
    Corrupt(String),
}
