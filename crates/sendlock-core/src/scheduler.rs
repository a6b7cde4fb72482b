//! Deferred task scheduler.
//!
//! Owns the [`TaskSet`] and is the only place tasks change state. Every
//! operation runs to completion against the current clock reading; the
//! runtime serializes calls, so there is no locking here.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::app::status::TaskCounts;
use crate::config::SendLockConfig;
use crate::domain::{
    DomainEvent, DraftRef, HostSessionRef, SchedulerError, SendOutcome, SendPayload, Task, TaskId,
    TaskSet, TaskState, TaskView,
};
use crate::ports::{Clock, IdGenerator};

/// Settings read when a task is created (and for pruning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub delay_seconds: u32,
    pub delay_enabled: bool,
    pub retention: std::time::Duration,
    pub max_live_tasks: usize,
}

impl SchedulerSettings {
    pub fn effective_delay_seconds(&self) -> u32 {
        if self.delay_enabled {
            self.delay_seconds
        } else {
            0
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SendLockConfig::default())
    }
}

impl From<&SendLockConfig> for SchedulerSettings {
    fn from(cfg: &SendLockConfig) -> Self {
        Self {
            delay_seconds: cfg.delay_seconds,
            delay_enabled: cfg.delay_enabled,
            retention: cfg.retention(),
            max_live_tasks: cfg.max_live_tasks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created(TaskId),
    /// Folded into the task already holding this compose session or draft.
    Merged(TaskId),
}

impl Creation {
    pub fn task_id(&self) -> TaskId {
        match self {
            Creation::Created(id) | Creation::Merged(id) => *id,
        }
    }
}

/// A task whose delay elapsed and must now go through the send pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task_id: TaskId,
    pub host_session_ref: HostSessionRef,
    pub draft_ref: Option<DraftRef>,
}

impl Dispatch {
    fn of(task: &Task) -> Self {
        Self {
            task_id: task.id(),
            host_session_ref: task.host_session_ref().clone(),
            draft_ref: task.draft_ref().cloned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Attached,
    AlreadyAttached,
    Merged { survivor: TaskId, discarded: TaskId },
}

pub struct Scheduler {
    tasks: TaskSet,
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    /// Bumped on every mutation; the runtime persists when it changes.
    revision: u64,
    events: Vec<DomainEvent>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            tasks: TaskSet::new(),
            settings,
            clock,
            ids,
            revision: 0,
            events: Vec::new(),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Affects tasks created from now on; existing tasks keep their delay.
    pub fn update_settings(&mut self, settings: SchedulerSettings) {
        info!(
            delay_seconds = settings.delay_seconds,
            delay_enabled = settings.delay_enabled,
            "scheduler settings updated"
        );
        self.settings = settings;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn views(&self) -> Vec<TaskView> {
        let now = self.now();
        self.tasks.iter().map(|t| TaskView::of(t, now)).collect()
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts::of(&self.tasks)
    }

    fn changed(&mut self, event: DomainEvent) {
        self.revision += 1;
        self.events.push(event);
    }

    /// Create with the configured delay.
    pub fn request_send(&mut self, payload: &SendPayload) -> Result<Creation, SchedulerError> {
        self.create(payload, self.settings.effective_delay_seconds())
    }

    pub fn create(
        &mut self,
        payload: &SendPayload,
        delay_seconds: u32,
    ) -> Result<Creation, SchedulerError> {
        let now = self.now();
        self.create_with(payload, delay_seconds, now)
    }

    /// Schedule a send for an absolute time.
    ///
    /// The deadline lands exactly on `send_at`: the delay is rounded up to
    /// whole seconds and `started_at` is moved back by the same amount. A
    /// `send_at` in the past gives a zero delay (due on the next tick).
    pub fn create_at(
        &mut self,
        payload: &SendPayload,
        send_at: DateTime<Utc>,
    ) -> Result<Creation, SchedulerError> {
        let now = self.now();
        let lead_ms = (send_at - now).num_milliseconds();
        if lead_ms <= 0 {
            return self.create_with(payload, 0, now);
        }
        let delay_seconds = u32::try_from((lead_ms + 999) / 1000)
            .map_err(|_| SchedulerError::SendAtOutOfRange(send_at))?;
        let started_at = send_at - chrono::Duration::seconds(i64::from(delay_seconds));
        self.create_with(payload, delay_seconds, started_at)
    }

    fn create_with(
        &mut self,
        payload: &SendPayload,
        delay_seconds: u32,
        started_at: DateTime<Utc>,
    ) -> Result<Creation, SchedulerError> {
        let session = &payload.host_session_ref;
        if let Some(existing) = self.tasks.find_live_by_session(session) {
            info!(task_id = %existing.id(), session = %session, "send request merged into live task");
            return Ok(Creation::Merged(existing.id()));
        }
        if let Some(draft) = session.draft_hint()
            && let Some(existing) = self.tasks.find_claiming_draft(&draft, None)
        {
            info!(task_id = %existing.id(), draft = %draft, "send request merged by draft");
            return Ok(Creation::Merged(existing.id()));
        }

        let live = self.tasks.live_count();
        if live >= self.settings.max_live_tasks {
            warn!(live, limit = self.settings.max_live_tasks, "refusing new deferred send");
            return Err(SchedulerError::CapacityExceeded(self.settings.max_live_tasks));
        }

        let task = Task::new(self.ids.generate_task_id(), payload, delay_seconds, started_at);
        let task_id = task.id();
        info!(
            task_id = %task_id,
            delay_seconds,
            session = %session,
            "deferred send created"
        );
        self.tasks.insert(task);
        self.changed(DomainEvent::TaskCreated {
            task_id,
            delay_seconds,
        });
        Ok(Creation::Created(task_id))
    }

    /// Move every due Pending task to Resolving and prune old terminal tasks.
    ///
    /// Returns the tasks that must be handed to the send pipeline. A task is
    /// returned by exactly one call, however often `tick` runs.
    pub fn tick(&mut self) -> Vec<Dispatch> {
        let now = self.now();
        let mut dispatches = Vec::new();

        for id in self.tasks.ids() {
            let Some(task) = self.tasks.get_mut(id) else {
                continue;
            };
            if task.state() != TaskState::Pending || !task.is_due(now) {
                continue;
            }
            if let Err(err) = task.begin_resolving() {
                warn!(task_id = %id, error = %err, "could not start resolving");
                continue;
            }
            let dispatch = Dispatch::of(task);
            debug!(task_id = %id, "delay elapsed, dispatching");
            self.changed(DomainEvent::TaskDispatched { task_id: id });
            dispatches.push(dispatch);
        }

        self.prune(now);
        dispatches
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let Ok(retention) = chrono::Duration::from_std(self.settings.retention) else {
            return;
        };
        let expired: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.resolved_at().is_some_and(|at| now - at >= retention))
            .map(Task::id)
            .collect();
        for task_id in expired {
            self.tasks.remove(task_id);
            debug!(task_id = %task_id, "pruned finished task");
            self.changed(DomainEvent::TaskPruned { task_id });
        }
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, SchedulerError> {
        self.tasks.get_mut(id).ok_or(SchedulerError::TaskNotFound(id))
    }

    /// Pending -> Canceled. Rejected once the task left Pending.
    pub fn cancel(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        let now = self.now();
        self.task_mut(id)?.mark_canceled(now)?;
        info!(task_id = %id, "deferred send canceled");
        self.changed(DomainEvent::TaskCanceled { task_id: id });
        Ok(())
    }

    /// Pending -> Edited, and signal the host to reopen the compose session.
    pub fn edit(&mut self, id: TaskId) -> Result<HostSessionRef, SchedulerError> {
        let now = self.now();
        let task = self.task_mut(id)?;
        task.mark_edited(now)?;
        let host_session_ref = task.host_session_ref().clone();
        info!(task_id = %id, session = %host_session_ref, "deferred send returned to editing");
        self.changed(DomainEvent::EditRequested {
            task_id: id,
            host_session_ref: host_session_ref.clone(),
        });
        Ok(host_session_ref)
    }

    /// Resolving -> Sent | Failed.
    ///
    /// Returns `Ok(false)` when the task already reached a terminal state
    /// (duplicate report). Reporting for a Pending task is rejected.
    pub fn resolve_outcome(
        &mut self,
        id: TaskId,
        outcome: SendOutcome,
    ) -> Result<bool, SchedulerError> {
        let now = self.now();
        let task = self.task_mut(id)?;
        if task.is_terminal() {
            debug!(task_id = %id, state = %task.state(), "outcome for finished task ignored");
            return Ok(false);
        }

        let event = match outcome {
            SendOutcome::Sent { message_id } => {
                task.mark_sent(now)?;
                info!(task_id = %id, message_id = ?message_id, "deferred send delivered");
                DomainEvent::TaskSent {
                    task_id: id,
                    draft_ref: task.draft_ref().cloned(),
                }
            }
            SendOutcome::Failed { reason } => {
                task.mark_failed(reason.clone(), now)?;
                warn!(task_id = %id, reason = %reason, "deferred send failed");
                DomainEvent::TaskFailed { task_id: id, reason }
            }
        };
        self.changed(event);
        Ok(true)
    }

    /// Record the backend draft behind a task, merging with any other task
    /// that already claims the same draft (live, or already sent).
    ///
    /// The survivor is the task that already sent the draft, then the one
    /// Resolving, otherwise the one that started first (ties go to the
    /// smaller id). A live survivor keeps the earlier `started_at`; the other
    /// task is removed.
    pub fn attach_draft(&mut self, id: TaskId, draft: DraftRef) -> Result<Attachment, SchedulerError> {
        let task = self.tasks.get(id).ok_or(SchedulerError::TaskNotFound(id))?;
        if task.draft_ref() == Some(&draft) {
            return Ok(Attachment::AlreadyAttached);
        }

        let other = if task.is_terminal() {
            None
        } else {
            self.tasks.find_claiming_draft(&draft, Some(id)).map(Task::id)
        };

        let Some(other) = other else {
            self.task_mut(id)?.set_draft_ref(draft.clone());
            self.revision += 1;
            debug!(task_id = %id, draft = %draft, "draft attached");
            return Ok(Attachment::Attached);
        };

        let (survivor, discarded) = self.pick_survivor(id, other)?;
        let discarded_task = self
            .tasks
            .remove(discarded)
            .ok_or(SchedulerError::TaskNotFound(discarded))?;
        let kept = self.task_mut(survivor)?;
        if !kept.is_terminal() {
            kept.absorb(&discarded_task);
            kept.set_draft_ref(draft.clone());
        }

        info!(
            survivor = %survivor,
            discarded = %discarded,
            draft = %draft,
            "tasks for the same draft merged"
        );
        self.changed(DomainEvent::TaskMerged {
            survivor,
            discarded,
        });
        Ok(Attachment::Merged {
            survivor,
            discarded,
        })
    }

    fn pick_survivor(&self, a: TaskId, b: TaskId) -> Result<(TaskId, TaskId), SchedulerError> {
        let ta = self.tasks.get(a).ok_or(SchedulerError::TaskNotFound(a))?;
        let tb = self.tasks.get(b).ok_or(SchedulerError::TaskNotFound(b))?;

        let rank = |state: TaskState| match state {
            TaskState::Sent => 2,
            TaskState::Resolving => 1,
            _ => 0,
        };
        let a_wins = match rank(ta.state()).cmp(&rank(tb.state())) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => (ta.started_at(), a) <= (tb.started_at(), b),
        };
        Ok(if a_wins { (a, b) } else { (b, a) })
    }

    /// Drop a terminal task the presentation layer has dismissed.
    pub fn acknowledge(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        let task = self.tasks.get(id).ok_or(SchedulerError::TaskNotFound(id))?;
        if !task.is_terminal() {
            return Err(SchedulerError::Rejected {
                task_id: id,
                state: task.state(),
                operation: "acknowledge",
            });
        }
        self.tasks.remove(id);
        self.changed(DomainEvent::TaskPruned { task_id: id });
        Ok(())
    }

    /// Adopt a previously persisted task set.
    ///
    /// Tasks that were Resolving when the process stopped are dispatched
    /// again (sending a draft by id does not duplicate the message), then a
    /// tick drives overdue Pending tasks through expiry.
    pub fn restore(&mut self, restored: TaskSet) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();
        for task in Vec::<Task>::from(restored) {
            if self.tasks.get(task.id()).is_some() {
                continue;
            }
            if task.state() == TaskState::Resolving {
                dispatches.push(Dispatch::of(&task));
            }
            self.tasks.insert(task);
        }
        if !self.tasks.is_empty() {
            info!(
                tasks = self.tasks.len(),
                in_flight = dispatches.len(),
                "restored persisted tasks"
            );
            self.revision += 1;
        }
        for d in &dispatches {
            self.events.push(DomainEvent::TaskDispatched { task_id: d.task_id });
        }
        dispatches.extend(self.tick());
        dispatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Scheduler, FixedClock) {
        let clock = FixedClock::new(t0());
        let scheduler = Scheduler::new(
            SchedulerSettings::default(),
            Arc::new(clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
        );
        (scheduler, clock)
    }

    fn payload(session: &str) -> SendPayload {
        SendPayload::new(
            vec!["ann@example.com".into()],
            "Quarterly report",
            "numbers attached",
            HostSessionRef::new(session),
        )
    }

    fn create(s: &mut Scheduler, session: &str, delay: u32) -> TaskId {
        match s.create(&payload(session), delay).unwrap() {
            Creation::Created(id) => id,
            other => panic!("expected a new task, got {other:?}"),
        }
    }

    #[test]
    fn tick_before_deadline_does_nothing() {
        let (mut s, clock) = setup();
        let id = create(&mut s, "c1", 30);

        clock.advance_secs(29);
        assert!(s.tick().is_empty());
        assert_eq!(s.get(id).unwrap().state(), TaskState::Pending);
    }

    #[test]
    fn due_task_is_dispatched_exactly_once() {
        let (mut s, clock) = setup();
        let id = create(&mut s, "c1", 30);

        clock.advance_secs(30);
        let first = s.tick();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].task_id, id);
        assert!(s.tick().is_empty());
        assert!(s.tick().is_empty());
        assert_eq!(s.get(id).unwrap().state(), TaskState::Resolving);
    }

    #[test]
    fn skipped_ticks_catch_up_in_one_call() {
        let (mut s, clock) = setup();
        let a = create(&mut s, "c1", 5);
        let b = create(&mut s, "c2", 10);

        clock.advance_secs(300);
        let ids: Vec<_> = s.tick().into_iter().map(|d| d.task_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    #[test]
    fn zero_delay_dispatches_on_next_tick() {
        let (mut s, _clock) = setup();
        s.update_settings(SchedulerSettings {
            delay_enabled: false,
            ..SchedulerSettings::default()
        });
        let id = s.request_send(&payload("c1")).unwrap().task_id();
        assert_eq!(s.get(id).unwrap().delay_seconds(), 0);
        assert_eq!(s.tick().len(), 1);
    }

    #[test]
    fn settings_change_leaves_existing_tasks_alone() {
        let (mut s, _clock) = setup();
        let before = s.request_send(&payload("c1")).unwrap().task_id();
        s.update_settings(SchedulerSettings {
            delay_seconds: 5,
            ..SchedulerSettings::default()
        });
        let after = s.request_send(&payload("c2")).unwrap().task_id();

        assert_eq!(s.get(before).unwrap().delay_seconds(), 30);
        assert_eq!(s.get(after).unwrap().delay_seconds(), 5);
    }

    #[test]
    fn scheduled_send_is_due_exactly_at_send_at() {
        let (mut s, clock) = setup();
        let send_at = t0() + chrono::Duration::milliseconds(90_500);
        let id = s.create_at(&payload("c1"), send_at).unwrap().task_id();

        let task = s.get(id).unwrap();
        assert_eq!(task.delay_seconds(), 91);
        assert_eq!(task.deadline(), Some(send_at));
        assert_eq!(s.views()[0].remaining_ms, 90_500);
        assert_eq!(s.views()[0].remaining_seconds, 91);

        clock.advance_secs(90);
        assert!(s.tick().is_empty());
        clock.advance(chrono::Duration::milliseconds(500));
        assert_eq!(s.tick().len(), 1);
    }

    #[test]
    fn scheduled_send_in_the_past_is_due_on_next_tick() {
        let (mut s, _clock) = setup();
        let id = s
            .create_at(&payload("c1"), t0() - chrono::Duration::minutes(5))
            .unwrap()
            .task_id();
        assert_eq!(s.get(id).unwrap().delay_seconds(), 0);
        assert_eq!(s.tick()[0].task_id, id);
    }

    #[test]
    fn scheduled_send_can_still_be_canceled() {
        let (mut s, clock) = setup();
        let id = s
            .create_at(&payload("c1"), t0() + chrono::Duration::hours(2))
            .unwrap()
            .task_id();
        clock.advance_secs(3600);
        s.cancel(id).unwrap();
        clock.advance_secs(7200);
        assert!(s.tick().is_empty());
    }

    #[test]
    fn send_at_beyond_the_delay_range_is_refused() {
        let (mut s, _clock) = setup();
        let send_at = t0() + chrono::Duration::seconds(i64::from(u32::MAX) + 10);
        assert_eq!(
            s.create_at(&payload("c1"), send_at),
            Err(SchedulerError::SendAtOutOfRange(send_at))
        );
        assert!(s.tasks().is_empty());
    }

    #[test]
    fn cancel_after_dispatch_is_rejected() {
        let (mut s, clock) = setup();
        let id = create(&mut s, "c1", 30);
        clock.advance_secs(30);
        s.tick();

        let err = s.cancel(id).unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(s.get(id).unwrap().state(), TaskState::Resolving);
    }

    #[test]
    fn cancel_wins_over_later_expiry() {
        let (mut s, clock) = setup();
        let id = create(&mut s, "c1", 30);
        clock.advance_secs(29);
        s.cancel(id).unwrap();

        clock.advance_secs(10);
        assert!(s.tick().is_empty());
        assert_eq!(s.get(id).unwrap().state(), TaskState::Canceled);
    }

    #[test]
    fn edit_reports_the_session_to_reopen() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 30);
        assert_eq!(s.edit(id).unwrap(), HostSessionRef::new("c1"));

        let events = s.drain_events();
        assert!(matches!(events.last(), Some(DomainEvent::EditRequested { .. })));
        assert!(s.cancel(id).unwrap_err().is_rejection());
    }

    #[test]
    fn unknown_task_is_not_found() {
        let (mut s, _clock) = setup();
        let ghost = TaskId::from_ulid(ulid::Ulid::new());
        assert_eq!(s.cancel(ghost), Err(SchedulerError::TaskNotFound(ghost)));
    }

    #[rstest]
    #[case::sent(SendOutcome::sent("m-1"), TaskState::Sent)]
    #[case::failed(SendOutcome::failed("503"), TaskState::Failed)]
    fn outcome_resolves_and_later_reports_are_ignored(
        #[case] outcome: SendOutcome,
        #[case] expected: TaskState,
    ) {
        let (mut s, clock) = setup();
        let id = create(&mut s, "c1", 1);
        clock.advance_secs(1);
        s.tick();

        assert!(s.resolve_outcome(id, outcome).unwrap());
        assert_eq!(s.get(id).unwrap().state(), expected);

        assert!(!s.resolve_outcome(id, SendOutcome::sent("m-2")).unwrap());
        assert_eq!(s.get(id).unwrap().state(), expected);
    }

    #[test]
    fn outcome_for_pending_task_is_rejected() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 30);
        assert!(s.resolve_outcome(id, SendOutcome::sent("m")).unwrap_err().is_rejection());
    }

    #[test]
    fn same_session_merges_while_live() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 30);

        assert_eq!(s.create(&payload("c1"), 30).unwrap(), Creation::Merged(id));
        assert_eq!(s.tasks().len(), 1);

        s.cancel(id).unwrap();
        assert!(matches!(s.create(&payload("c1"), 30).unwrap(), Creation::Created(_)));
    }

    #[test]
    fn known_draft_merges_at_creation() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 30);
        s.attach_draft(id, DraftRef::new("r-1")).unwrap();

        let hinted = SendPayload::new(
            vec![],
            "",
            "",
            HostSessionRef::for_draft(&DraftRef::new("r-1")),
        );
        assert_eq!(s.create(&hinted, 30).unwrap(), Creation::Merged(id));
    }

    #[test]
    fn draft_merge_keeps_earlier_start() {
        let (mut s, clock) = setup();
        let first = create(&mut s, "c1", 30);
        clock.advance_secs(5);
        let second = create(&mut s, "c2", 30);

        s.attach_draft(second, DraftRef::new("r-1")).unwrap();
        let merged = s.attach_draft(first, DraftRef::new("r-1")).unwrap();

        assert_eq!(
            merged,
            Attachment::Merged {
                survivor: first,
                discarded: second
            }
        );
        assert_eq!(s.tasks().len(), 1);
        assert_eq!(s.get(first).unwrap().started_at(), t0());
        assert_eq!(s.get(first).unwrap().draft_ref(), Some(&DraftRef::new("r-1")));
    }

    #[test]
    fn resolving_task_survives_a_merge() {
        let (mut s, clock) = setup();
        let early = create(&mut s, "c1", 30);
        clock.advance_secs(1);
        let resolving = create(&mut s, "c2", 0);
        s.tick();
        assert_eq!(s.get(resolving).unwrap().state(), TaskState::Resolving);

        s.attach_draft(resolving, DraftRef::new("r-1")).unwrap();
        let merged = s.attach_draft(early, DraftRef::new("r-1")).unwrap();

        assert_eq!(
            merged,
            Attachment::Merged {
                survivor: resolving,
                discarded: early
            }
        );
        assert_eq!(s.get(resolving).unwrap().started_at(), t0());
        assert!(s.get(early).is_none());
    }

    #[test]
    fn late_resolution_folds_into_the_task_that_already_sent() {
        let (mut s, clock) = setup();
        let popout = create(&mut s, "popout", 30);
        clock.advance_secs(2);
        let inline = create(&mut s, "inline", 30);

        clock.advance_secs(28);
        assert_eq!(s.tick().len(), 1);
        s.attach_draft(popout, DraftRef::new("r-1")).unwrap();
        s.resolve_outcome(popout, SendOutcome::sent("m-1")).unwrap();

        clock.advance_secs(2);
        assert_eq!(s.tick()[0].task_id, inline);
        let merged = s.attach_draft(inline, DraftRef::new("r-1")).unwrap();

        assert_eq!(
            merged,
            Attachment::Merged {
                survivor: popout,
                discarded: inline
            }
        );
        assert_eq!(s.tasks().len(), 1);
        assert_eq!(s.get(popout).unwrap().state(), TaskState::Sent);
        assert_eq!(s.get(popout).unwrap().started_at(), t0());
        assert!(matches!(
            s.drain_events().last(),
            Some(DomainEvent::TaskMerged { .. })
        ));
    }

    #[test]
    fn failed_task_releases_its_draft() {
        let (mut s, clock) = setup();
        let first = create(&mut s, "c1", 0);
        s.tick();
        s.attach_draft(first, DraftRef::new("r-1")).unwrap();
        s.resolve_outcome(first, SendOutcome::failed("503")).unwrap();

        clock.advance_secs(1);
        let retry = create(&mut s, "c2", 30);
        assert_eq!(
            s.attach_draft(retry, DraftRef::new("r-1")).unwrap(),
            Attachment::Attached
        );
        assert_eq!(s.tasks().len(), 2);
    }

    #[test]
    fn draft_hint_for_a_sent_draft_merges_at_creation() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 0);
        s.tick();
        s.attach_draft(id, DraftRef::new("r-1")).unwrap();
        s.resolve_outcome(id, SendOutcome::sent("m-1")).unwrap();

        let hinted = SendPayload::new(
            vec![],
            "",
            "",
            HostSessionRef::for_draft(&DraftRef::new("r-1")),
        );
        assert_eq!(s.create(&hinted, 30).unwrap(), Creation::Merged(id));
    }

    #[test]
    fn attaching_the_same_draft_twice_is_a_no_op() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 30);
        assert_eq!(s.attach_draft(id, DraftRef::new("r-1")).unwrap(), Attachment::Attached);
        let revision = s.revision();
        assert_eq!(
            s.attach_draft(id, DraftRef::new("r-1")).unwrap(),
            Attachment::AlreadyAttached
        );
        assert_eq!(s.revision(), revision);
    }

    #[test]
    fn capacity_limit_applies_to_live_tasks() {
        let (mut s, _clock) = setup();
        s.update_settings(SchedulerSettings {
            max_live_tasks: 1,
            ..SchedulerSettings::default()
        });
        let id = create(&mut s, "c1", 30);
        assert_eq!(
            s.create(&payload("c2"), 30),
            Err(SchedulerError::CapacityExceeded(1))
        );
        s.cancel(id).unwrap();
        assert!(s.create(&payload("c2"), 30).is_ok());
    }

    #[test]
    fn finished_tasks_are_pruned_after_retention() {
        let (mut s, clock) = setup();
        let id = create(&mut s, "c1", 30);
        s.cancel(id).unwrap();

        clock.advance_secs(3599);
        s.tick();
        assert!(s.get(id).is_some());

        clock.advance_secs(1);
        s.tick();
        assert!(s.get(id).is_none());
    }

    #[test]
    fn acknowledge_only_removes_finished_tasks() {
        let (mut s, _clock) = setup();
        let id = create(&mut s, "c1", 30);
        assert!(s.acknowledge(id).unwrap_err().is_rejection());

        s.cancel(id).unwrap();
        s.acknowledge(id).unwrap();
        assert!(s.tasks().is_empty());
    }

    #[test]
    fn restore_redispatches_in_flight_and_overdue_tasks() {
        let (mut old, clock) = setup();
        let overdue = create(&mut old, "c1", 10);
        let in_flight = create(&mut old, "c2", 0);
        let waiting = create(&mut old, "c3", 600);
        let done = create(&mut old, "c4", 600);
        old.tick();
        old.cancel(done).unwrap();
        let persisted = old.tasks().clone();

        clock.advance_secs(60);
        let mut fresh = Scheduler::new(
            SchedulerSettings::default(),
            Arc::new(clock.clone()),
            Arc::new(UlidGenerator::new(clock.clone())),
        );
        let ids: Vec<_> = fresh.restore(persisted).into_iter().map(|d| d.task_id).collect();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&overdue) && ids.contains(&in_flight));
        assert_eq!(fresh.get(waiting).unwrap().state(), TaskState::Pending);
        assert_eq!(fresh.get(done).unwrap().state(), TaskState::Canceled);
        assert_eq!(
            fresh.views().iter().find(|v| v.task_id == waiting).unwrap().remaining_seconds,
            540
        );
    }

    #[test]
    fn restored_task_with_an_unreachable_deadline_stays_pending() {
        let (mut s, _clock) = setup();
        let near_max = DateTime::<Utc>::MAX_UTC - chrono::Duration::seconds(5);
        let tampered = Task::new(TaskId::from_ulid(ulid::Ulid::new()), &payload("c1"), 30, near_max);
        let id = tampered.id();

        assert!(s.restore(TaskSet::from(vec![tampered])).is_empty());
        let views = s.views();
        assert_eq!(views[0].task_id, id);
        assert_eq!(views[0].state, TaskState::Pending);
        assert_eq!(views[0].remaining_ms, u64::MAX);
        assert!(s.cancel(id).is_ok());
    }

    #[test]
    fn every_mutation_bumps_the_revision() {
        let (mut s, clock) = setup();
        let r0 = s.revision();
        let id = create(&mut s, "c1", 1);
        let r1 = s.revision();
        clock.advance_secs(1);
        s.tick();
        let r2 = s.revision();
        s.resolve_outcome(id, SendOutcome::sent("m")).unwrap();

        assert!(r0 < r1 && r1 < r2 && r2 < s.revision());
        assert_eq!(s.counts().sent, 1);
    }
}
