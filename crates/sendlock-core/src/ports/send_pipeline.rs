//! SendPipeline port - backend 送信の抽象化
//!
//! Scheduler は期限切れのタスクについて
//! 1. draft_ref が無ければ `resolve_draft` で探す
//! 2. `send_draft` で送る
//! の順に呼ぶ。失敗はリトライせず Failed になる。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DraftRef, HostSessionRef, PipelineError};

/// Backend acknowledgement of a sent draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait SendPipeline: Send + Sync {
    /// Find the saved draft behind a compose session.
    async fn resolve_draft(&self, session: &HostSessionRef) -> Result<DraftRef, PipelineError>;

    /// Send a saved draft. Sending the same draft id twice is a backend no-op.
    async fn send_draft(&self, draft: &DraftRef) -> Result<SentMessage, PipelineError>;
}
