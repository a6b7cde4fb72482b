//! Persistence bridge.
//!
//! Mirrors the scheduler's [`TaskSet`] into a process-wide key-value store.
//! Saves are queued to a background writer and never block the scheduler;
//! consecutive saves collapse into the newest one. Load never fails: missing
//! or unreadable data comes back as an empty set.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{StoreError, TaskSet};
use crate::ports::KeyValueStore;

pub const TASKS_KEY: &str = "sendlock.tasks";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTaskSet {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub tasks: TaskSet,
}

enum WriterCommand {
    Save(PersistedTaskSet),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn KeyValueStore>,
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl PersistenceBridge {
    /// Start the background writer. It stops once every bridge clone is dropped.
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_loop(store.clone(), rx));
        (Self { store, tx }, handle)
    }

    pub async fn load(&self) -> TaskSet {
        match self.try_load().await {
            Ok(Some(persisted)) => {
                info!(
                    tasks = persisted.tasks.len(),
                    saved_at = %persisted.saved_at,
                    "loaded persisted tasks"
                );
                persisted.tasks
            }
            Ok(None) => TaskSet::new(),
            Err(err) => {
                warn!(error = %err, "persisted tasks unreadable, starting empty");
                TaskSet::new()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<PersistedTaskSet>, StoreError> {
        let Some(value) = self.store.get(TASKS_KEY).await? else {
            return Ok(None);
        };
        let persisted: PersistedTaskSet = serde_json::from_value(value)?;
        if persisted.version != SCHEMA_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported schema version {} (expected {SCHEMA_VERSION})",
                persisted.version
            )));
        }
        Ok(Some(persisted))
    }

    /// Queue a snapshot for writing.
    pub fn save(&self, tasks: &TaskSet, now: DateTime<Utc>) {
        let snapshot = PersistedTaskSet {
            version: SCHEMA_VERSION,
            saved_at: now,
            tasks: tasks.clone(),
        };
        if self.tx.send(WriterCommand::Save(snapshot)).is_err() {
            warn!("persistence writer stopped, snapshot dropped");
        }
    }

    /// Wait until every snapshot queued so far has been written.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }
}

async fn writer_loop(store: Arc<dyn KeyValueStore>, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(cmd);

        // Drain whatever is already queued; only the newest snapshot matters.
        while let Some(cmd) = next {
            match cmd {
                WriterCommand::Save(snapshot) => latest = Some(snapshot),
                WriterCommand::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(snapshot) = latest {
            write(store.as_ref(), &snapshot).await;
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
    debug!("persistence writer stopped");
}

async fn write(store: &dyn KeyValueStore, snapshot: &PersistedTaskSet) {
    let value = match serde_json::to_value(snapshot) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "could not encode task snapshot");
            return;
        }
    };
    match store.set(TASKS_KEY, value).await {
        Ok(()) => debug!(tasks = snapshot.tasks.len(), "task snapshot saved"),
        Err(err) => warn!(error = %err, "task snapshot not saved"),
    }
}
