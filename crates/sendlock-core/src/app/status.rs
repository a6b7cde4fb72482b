//! Status - タスク数の集計

use serde::{Deserialize, Serialize};

use crate::domain::{TaskSet, TaskState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub resolving: usize,
    pub sent: usize,
    pub canceled: usize,
    pub edited: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn of(tasks: &TaskSet) -> Self {
        let mut counts = Self::default();
        for task in tasks.iter() {
            match task.state() {
                TaskState::Pending => counts.pending += 1,
                TaskState::Resolving => counts.resolving += 1,
                TaskState::Sent => counts.sent += 1,
                TaskState::Canceled => counts.canceled += 1,
                TaskState::Edited => counts.edited += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn live(&self) -> usize {
        self.pending + self.resolving
    }

    pub fn total(&self) -> usize {
        self.live() + self.sent + self.canceled + self.edited + self.failed
    }
}
