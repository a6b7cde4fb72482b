//! Task state machine for deferred sends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deferred-send state.
///
/// State transitions:
/// - Pending -> Canceled (user cancel before expiry)
/// - Pending -> Edited (user edit before expiry)
/// - Pending -> Resolving -> Sent
/// - Pending -> Resolving -> Failed
///
/// Nothing ever moves back to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Counting down; can still be canceled or edited.
    Pending,

    /// Delay elapsed, the send pipeline has been invoked.
    Resolving,

    /// Backend accepted the send.
    Sent,

    /// Canceled by the user.
    Canceled,

    /// User asked to keep editing.
    Edited,

    /// Backend or draft resolution failed.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Sent | TaskState::Canceled | TaskState::Edited | TaskState::Failed
        )
    }

    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Pending, Canceled)
                | (Pending, Edited)
                | (Resolving, Sent)
                | (Resolving, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Resolving => "resolving",
            TaskState::Sent => "sent",
            TaskState::Canceled => "canceled",
            TaskState::Edited => "edited",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
