//! Task: one deferred send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::SchedulerError;
use super::ids::TaskId;
use super::payload::{DisplayMeta, SendPayload};
use super::refs::{DraftRef, HostSessionRef};
use super::state::TaskState;

/// A deferred send.
///
/// Design:
/// - Timing is deadline based: only `started_at` and `delay_seconds` are stored,
///   remaining time is always derived from the clock.
/// - State transitions go through methods that check `TaskState::can_transition_to`.
/// - Fields are read through accessors; only the scheduler mutates tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    delay_seconds: u32,
    started_at: DateTime<Utc>,
    state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draft_ref: Option<DraftRef>,
    host_session_ref: HostSessionRef,
    display_meta: DisplayMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resolved_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: TaskId,
        payload: &SendPayload,
        delay_seconds: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            delay_seconds,
            started_at,
            state: TaskState::Pending,
            draft_ref: payload.host_session_ref.draft_hint(),
            host_session_ref: payload.host_session_ref.clone(),
            display_meta: DisplayMeta::from_payload(payload),
            failure: None,
            resolved_at: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn delay_seconds(&self) -> u32 {
        self.delay_seconds
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn draft_ref(&self) -> Option<&DraftRef> {
        self.draft_ref.as_ref()
    }

    pub fn host_session_ref(&self) -> &HostSessionRef {
        &self.host_session_ref
    }

    pub fn display_meta(&self) -> &DisplayMeta {
        &self.display_meta
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `None` when `started_at + delay` is past the representable range
    /// (only possible with a tampered store); such a task never comes due.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .checked_add_signed(chrono::Duration::seconds(i64::from(self.delay_seconds)))
    }

    /// `max(0, delay - (now - started_at))`.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.deadline() {
            Some(deadline) => (deadline - now).to_std().unwrap_or(Duration::ZERO),
            None => Duration::MAX,
        }
    }

    /// Whole seconds left, rounded up so the countdown never shows 0 early.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        let remaining = self.remaining(now);
        let whole = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            whole.saturating_add(1)
        } else {
            whole
        }
    }

    /// Expiry check in integer milliseconds (`elapsed >= delay`).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = (now - self.started_at).num_milliseconds();
        elapsed_ms >= i64::from(self.delay_seconds) * 1000
    }

    pub(crate) fn begin_resolving(&mut self) -> Result<(), SchedulerError> {
        self.transition(TaskState::Resolving, "resolve")
    }

    pub(crate) fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.transition(TaskState::Sent, "mark sent")?;
        self.resolved_at = Some(now);
        Ok(())
    }

    pub(crate) fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.transition(TaskState::Failed, "mark failed")?;
        self.failure = Some(reason.into());
        self.resolved_at = Some(now);
        Ok(())
    }

    pub(crate) fn mark_canceled(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.transition(TaskState::Canceled, "cancel")?;
        self.resolved_at = Some(now);
        Ok(())
    }

    pub(crate) fn mark_edited(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        self.transition(TaskState::Edited, "edit")?;
        self.resolved_at = Some(now);
        Ok(())
    }

    pub(crate) fn set_draft_ref(&mut self, draft: DraftRef) {
        self.draft_ref = Some(draft);
    }

    /// Absorb a duplicate of the same draft: keep the earlier start.
    pub(crate) fn absorb(&mut self, duplicate: &Task) {
        if duplicate.started_at < self.started_at {
            self.started_at = duplicate.started_at;
        }
        if self.draft_ref.is_none() {
            self.draft_ref = duplicate.draft_ref.clone();
        }
    }

    fn transition(&mut self, next: TaskState, operation: &'static str) -> Result<(), SchedulerError> {
        if !self.state.can_transition_to(next) {
            return Err(SchedulerError::Rejected {
                task_id: self.id,
                state: self.state,
                operation,
            });
        }
        self.state = next;
        Ok(())
    }
}
