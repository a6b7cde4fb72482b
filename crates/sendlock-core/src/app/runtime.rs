//! SchedulerRuntime - scheduler を所有するイベントループ
//!
//! # フロー
//! 1. 起動時に PersistenceBridge から TaskSet を読み込み、restore する
//! 2. command channel と tick interval を select! で待つ
//! 3. 期限切れタスクは pipeline worker に spawn し、結果は command で戻す
//! 4. 各イテレーションの後に snapshot / event / 永続化を publish する
//!
//! scheduler に触るのはこのループだけ。外からは SchedulerHandle 経由。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::app::status::TaskCounts;
use crate::domain::{
    DomainEvent, DraftRef, HostSessionRef, SchedulerError, SendOutcome, SendPayload, TaskId,
    TaskView,
};
use crate::persistence::PersistenceBridge;
use crate::ports::SendPipeline;
use crate::scheduler::{Attachment, Creation, Dispatch, Scheduler, SchedulerSettings};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("scheduler runtime stopped")]
    Stopped,
}

type Reply<T> = oneshot::Sender<Result<T, SchedulerError>>;

enum Command {
    SendRequested {
        payload: SendPayload,
        reply: Reply<Creation>,
    },
    ScheduleSend {
        payload: SendPayload,
        send_at: DateTime<Utc>,
        reply: Reply<Creation>,
    },
    AttachDraft {
        task_id: TaskId,
        draft: DraftRef,
        reply: Option<Reply<Attachment>>,
    },
    Cancel {
        task_id: TaskId,
        reply: Reply<()>,
    },
    Edit {
        task_id: TaskId,
        reply: Reply<HostSessionRef>,
    },
    Acknowledge {
        task_id: TaskId,
        reply: Reply<()>,
    },
    ResolveOutcome {
        task_id: TaskId,
        outcome: SendOutcome,
    },
    UpdateSettings {
        settings: SchedulerSettings,
    },
    Tick {
        reply: oneshot::Sender<()>,
    },
    Counts {
        reply: oneshot::Sender<TaskCounts>,
    },
    Shutdown,
}

/// Cloneable front door to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    views: watch::Receiver<Vec<TaskView>>,
    events: broadcast::Sender<DomainEvent>,
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn send_requested(&self, payload: SendPayload) -> Result<Creation, RuntimeError> {
        Ok(self
            .request(|reply| Command::SendRequested { payload, reply })
            .await??)
    }

    /// Hold a send until `send_at` instead of the configured delay.
    pub async fn schedule_send(
        &self,
        payload: SendPayload,
        send_at: DateTime<Utc>,
    ) -> Result<Creation, RuntimeError> {
        Ok(self
            .request(|reply| Command::ScheduleSend {
                payload,
                send_at,
                reply,
            })
            .await??)
    }

    pub async fn attach_draft(
        &self,
        task_id: TaskId,
        draft: DraftRef,
    ) -> Result<Attachment, RuntimeError> {
        Ok(self
            .request(|reply| Command::AttachDraft {
                task_id,
                draft,
                reply: Some(reply),
            })
            .await??)
    }

    pub async fn cancel(&self, task_id: TaskId) -> Result<(), RuntimeError> {
        Ok(self.request(|reply| Command::Cancel { task_id, reply }).await??)
    }

    /// Returns the compose session the host should reopen.
    pub async fn edit(&self, task_id: TaskId) -> Result<HostSessionRef, RuntimeError> {
        Ok(self.request(|reply| Command::Edit { task_id, reply }).await??)
    }

    pub async fn acknowledge(&self, task_id: TaskId) -> Result<(), RuntimeError> {
        Ok(self
            .request(|reply| Command::Acknowledge { task_id, reply })
            .await??)
    }

    pub async fn update_settings(&self, settings: SchedulerSettings) -> Result<(), RuntimeError> {
        self.tx
            .send(Command::UpdateSettings { settings })
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Run one tick right away and wait until its snapshot is published.
    pub async fn tick_now(&self) -> Result<(), RuntimeError> {
        self.request(|reply| Command::Tick { reply }).await
    }

    pub async fn counts(&self) -> Result<TaskCounts, RuntimeError> {
        self.request(|reply| Command::Counts { reply }).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Vec<TaskView> {
        self.views.borrow().clone()
    }

    pub fn subscribe_views(&self) -> watch::Receiver<Vec<TaskView>> {
        self.views.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Stop the loop after the commands already queued. Pending snapshots
    /// are flushed to the store before the loop's task completes.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

pub struct SchedulerRuntime {
    scheduler: Scheduler,
    bridge: PersistenceBridge,
    pipeline: Arc<dyn SendPipeline>,
    loopback: mpsc::WeakSender<Command>,
    views: watch::Sender<Vec<TaskView>>,
    events: broadcast::Sender<DomainEvent>,
    persisted_revision: u64,
}

impl SchedulerRuntime {
    /// Spawn the event loop. Persisted tasks are loaded and restored before
    /// the first command is handled.
    pub fn start(
        scheduler: Scheduler,
        bridge: PersistenceBridge,
        pipeline: Arc<dyn SendPipeline>,
        tick_interval: Duration,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (views_tx, views_rx) = watch::channel(Vec::new());
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        let runtime = SchedulerRuntime {
            persisted_revision: scheduler.revision(),
            scheduler,
            bridge,
            pipeline,
            loopback: tx.downgrade(),
            views: views_tx,
            events: events_tx.clone(),
        };
        let handle = SchedulerHandle {
            tx,
            views: views_rx,
            events: events_tx,
        };
        let join = tokio::spawn(runtime.run(rx, tick_interval));
        (handle, join)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, tick_interval: Duration) {
        let restored = self.bridge.load().await;
        let dispatches = self.scheduler.restore(restored);
        self.dispatch(dispatches);
        self.publish();

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = tick_interval.as_millis() as u64, "scheduler runtime started");

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = ticker.tick() => {
                    let due = self.scheduler.tick();
                    self.dispatch(due);
                }
            }
            self.publish();
        }

        self.publish();
        self.bridge.flush().await;
        info!("scheduler runtime stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::SendRequested { payload, reply } => {
                let result = self.scheduler.request_send(&payload);
                self.respond(reply, result);
            }
            Command::ScheduleSend {
                payload,
                send_at,
                reply,
            } => {
                let result = self.scheduler.create_at(&payload, send_at);
                self.respond(reply, result);
            }
            Command::AttachDraft {
                task_id,
                draft,
                reply,
            } => {
                let result = self.scheduler.attach_draft(task_id, draft);
                if let Err(err) = &result {
                    debug!(task_id = %task_id, error = %err, "draft attach ignored");
                }
                match reply {
                    Some(reply) => self.respond(reply, result),
                    None => self.publish(),
                }
            }
            Command::Cancel { task_id, reply } => {
                let result = self.scheduler.cancel(task_id);
                log_rejection(task_id, "cancel", &result);
                self.respond(reply, result);
            }
            Command::Edit { task_id, reply } => {
                let result = self.scheduler.edit(task_id);
                log_rejection(task_id, "edit", &result);
                self.respond(reply, result);
            }
            Command::Acknowledge { task_id, reply } => {
                let result = self.scheduler.acknowledge(task_id);
                self.respond(reply, result);
            }
            Command::ResolveOutcome { task_id, outcome } => {
                match self.scheduler.resolve_outcome(task_id, outcome) {
                    Ok(_) => {}
                    // merged away while the send was in flight
                    Err(SchedulerError::TaskNotFound(_)) => {
                        debug!(task_id = %task_id, "outcome for discarded task dropped");
                    }
                    Err(err) => warn!(task_id = %task_id, error = %err, "outcome rejected"),
                }
            }
            Command::UpdateSettings { settings } => self.scheduler.update_settings(settings),
            Command::Tick { reply } => {
                let due = self.scheduler.tick();
                self.dispatch(due);
                self.publish();
                let _ = reply.send(());
            }
            Command::Counts { reply } => {
                let _ = reply.send(self.scheduler.counts());
            }
            Command::Shutdown => {}
        }
    }

    /// Publish before replying so callers observe their own change.
    fn respond<T>(&mut self, reply: Reply<T>, result: Result<T, SchedulerError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn publish(&mut self) {
        let revision = self.scheduler.revision();
        if revision != self.persisted_revision {
            self.bridge.save(self.scheduler.tasks(), self.scheduler.now());
            self.persisted_revision = revision;
        }
        for event in self.scheduler.drain_events() {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
        self.views.send_replace(self.scheduler.views());
    }

    fn dispatch(&self, dispatches: Vec<Dispatch>) {
        if dispatches.is_empty() {
            return;
        }
        let Some(tx) = self.loopback.upgrade() else {
            return;
        };
        for dispatch in dispatches {
            info!(task_id = %dispatch.task_id, "handing task to send pipeline");
            tokio::spawn(run_pipeline(self.pipeline.clone(), tx.clone(), dispatch));
        }
    }
}

fn log_rejection<T>(task_id: TaskId, operation: &str, result: &Result<T, SchedulerError>) {
    if let Err(err) = result {
        if err.is_rejection() {
            info!(task_id = %task_id, operation, error = %err, "request lost the race");
        } else {
            warn!(task_id = %task_id, operation, error = %err, "request failed");
        }
    }
}

/// Resolve (if needed) and send one task's draft, reporting back through
/// the command channel.
async fn run_pipeline(pipeline: Arc<dyn SendPipeline>, tx: mpsc::Sender<Command>, dispatch: Dispatch) {
    let task_id = dispatch.task_id;
    let draft = match dispatch.draft_ref {
        Some(draft) => draft,
        None => match pipeline.resolve_draft(&dispatch.host_session_ref).await {
            Ok(draft) => {
                let (reply, rx) = oneshot::channel();
                let cmd = Command::AttachDraft {
                    task_id,
                    draft: draft.clone(),
                    reply: Some(reply),
                };
                if tx.send(cmd).await.is_err() {
                    return;
                }
                match rx.await {
                    Ok(Ok(Attachment::Merged { survivor, .. })) if survivor != task_id => {
                        debug!(task_id = %task_id, survivor = %survivor, "merged into another task, not sending");
                        return;
                    }
                    Ok(Err(err)) => {
                        debug!(task_id = %task_id, error = %err, "task gone before send");
                        return;
                    }
                    Err(_) => return,
                    Ok(Ok(_)) => draft,
                }
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "draft resolution failed");
                let _ = tx
                    .send(Command::ResolveOutcome {
                        task_id,
                        outcome: err.into(),
                    })
                    .await;
                return;
            }
        },
    };

    let outcome = match pipeline.send_draft(&draft).await {
        Ok(sent) => SendOutcome::Sent {
            message_id: Some(sent.message_id),
        },
        Err(err) => err.into(),
    };
    if tx
        .send(Command::ResolveOutcome { task_id, outcome })
        .await
        .is_err()
    {
        debug!(task_id = %task_id, "runtime stopped before outcome was recorded");
    }
}
