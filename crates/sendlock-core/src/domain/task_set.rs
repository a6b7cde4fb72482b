//! TaskSet: the scheduler-owned collection of tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::refs::{DraftRef, HostSessionRef};
use super::state::TaskState;
use super::task::Task;

/// All tasks known to the scheduler, ordered by id (ULIDs sort by creation).
///
/// Serialized as a plain list so the persisted form does not depend on the
/// map layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Task>", into = "Vec<Task>")]
pub struct TaskSet {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn live(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(|t| t.state().is_live())
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn find_live_by_session(&self, session: &HostSessionRef) -> Option<&Task> {
        self.live().find(|t| t.host_session_ref() == session)
    }

    /// Task that owns `draft`: live, or already sent. Canceled, edited and
    /// failed tasks release their draft.
    pub fn find_claiming_draft(&self, draft: &DraftRef, except: Option<TaskId>) -> Option<&Task> {
        self.tasks
            .values()
            .filter(|t| Some(t.id()) != except)
            .filter(|t| t.state().is_live() || t.state() == TaskState::Sent)
            .find(|t| t.draft_ref() == Some(draft))
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub(crate) fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    pub(crate) fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id(), task);
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }
}

impl From<Vec<Task>> for TaskSet {
    fn from(tasks: Vec<Task>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id(), t)).collect(),
        }
    }
}

impl From<TaskSet> for Vec<Task> {
    fn from(set: TaskSet) -> Self {
        set.tasks.into_values().collect()
    }
}
