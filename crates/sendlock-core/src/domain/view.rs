//! Read-only task projection for presentation layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::payload::DisplayMeta;
use super::state::TaskState;
use super::task::Task;

/// Snapshot of one task, with remaining time computed at `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub state: TaskState,
    pub remaining_ms: u64,
    pub remaining_seconds: u64,
    pub display_meta: DisplayMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TaskView {
    pub fn of(task: &Task, now: DateTime<Utc>) -> Self {
        let (remaining_ms, remaining_seconds) = if task.state() == TaskState::Pending {
            let remaining = task.remaining(now);
            (
                u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                task.remaining_seconds(now),
            )
        } else {
            (0, 0)
        };
        Self {
            task_id: task.id(),
            state: task.state(),
            remaining_ms,
            remaining_seconds,
            display_meta: task.display_meta().clone(),
            failure: task.failure().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::SendPayload;
    use crate::domain::refs::HostSessionRef;
    use ulid::Ulid;

    #[test]
    fn only_pending_tasks_show_a_countdown() {
        let now = Utc::now();
        let payload = SendPayload::new(vec![], "hi", "", HostSessionRef::new("c"));
        let mut task = Task::new(TaskId::from_ulid(Ulid::new()), &payload, 10, now);

        let view = TaskView::of(&task, now + chrono::Duration::milliseconds(2_500));
        assert_eq!(view.remaining_ms, 7_500);
        assert_eq!(view.remaining_seconds, 8);

        task.begin_resolving().unwrap();
        let view = TaskView::of(&task, now);
        assert_eq!(view.state, TaskState::Resolving);
        assert_eq!(view.remaining_ms, 0);
    }
}
