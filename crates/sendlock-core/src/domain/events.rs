//! Events - ドメインイベント
//!
//! Scheduler が状態遷移ごとに積み、runtime が broadcast で配る。
//! 購読者がいなくても scheduler の動作には影響しない。

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::refs::{DraftRef, HostSessionRef};

/// DomainEvent はドメインで発生したイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated {
        task_id: TaskId,
        delay_seconds: u32,
    },
    /// Two tasks turned out to be the same draft; `discarded` is gone.
    TaskMerged {
        survivor: TaskId,
        discarded: TaskId,
    },
    /// Delay elapsed, the send pipeline is about to run.
    TaskDispatched {
        task_id: TaskId,
    },
    TaskSent {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draft_ref: Option<DraftRef>,
    },
    TaskFailed {
        task_id: TaskId,
        reason: String,
    },
    TaskCanceled {
        task_id: TaskId,
    },
    /// The host should reopen this compose session.
    EditRequested {
        task_id: TaskId,
        host_session_ref: HostSessionRef,
    },
    /// Terminal task dropped after the retention window.
    TaskPruned {
        task_id: TaskId,
    },
}

impl DomainEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            DomainEvent::TaskCreated { task_id, .. }
            | DomainEvent::TaskDispatched { task_id }
            | DomainEvent::TaskSent { task_id, .. }
            | DomainEvent::TaskFailed { task_id, .. }
            | DomainEvent::TaskCanceled { task_id }
            | DomainEvent::EditRequested { task_id, .. }
            | DomainEvent::TaskPruned { task_id } => *task_id,
            DomainEvent::TaskMerged { survivor, .. } => *survivor,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "task_created",
            DomainEvent::TaskMerged { .. } => "task_merged",
            DomainEvent::TaskDispatched { .. } => "task_dispatched",
            DomainEvent::TaskSent { .. } => "task_sent",
            DomainEvent::TaskFailed { .. } => "task_failed",
            DomainEvent::TaskCanceled { .. } => "task_canceled",
            DomainEvent::EditRequested { .. } => "edit_requested",
            DomainEvent::TaskPruned { .. } => "task_pruned",
        }
    }
}
