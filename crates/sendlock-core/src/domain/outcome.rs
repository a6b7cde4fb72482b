//! Result of running the send pipeline for one task.

use serde::{Deserialize, Serialize};

use super::errors::PipelineError;

/// What the pipeline reported back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendOutcome {
    Sent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Failed {
        reason: String,
    },
}

impl SendOutcome {
    pub fn sent(message_id: impl Into<String>) -> Self {
        SendOutcome::Sent {
            message_id: Some(message_id.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        SendOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

impl From<PipelineError> for SendOutcome {
    fn from(err: PipelineError) -> Self {
        SendOutcome::failed(err.to_string())
    }
}
