//! ScriptedPipeline - 開発用・テスト用の送信パイプライン
//!
//! backend を呼ばずに draft 解決と送信を再現する。
//! `hold()` 中は送信が止まるので、in-flight 中の cancel などを再現できる。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{DraftRef, HostSessionRef, PipelineError};
use crate::ports::{SendPipeline, SentMessage};

#[derive(Debug, Default)]
struct Script {
    drafts: HashMap<HostSessionRef, DraftRef>,
    resolve_failure: Option<PipelineError>,
    send_failures: HashMap<DraftRef, PipelineError>,
    /// draft -> message id; a draft is only ever sent once
    delivered: Vec<(DraftRef, String)>,
    resolve_calls: usize,
    send_calls: usize,
}

#[derive(Clone)]
pub struct ScriptedPipeline {
    script: Arc<Mutex<Script>>,
    held: Arc<watch::Sender<bool>>,
}

impl Default for ScriptedPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            held: Arc::new(held),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `session` resolve to `draft`.
    pub fn register_draft(&self, session: HostSessionRef, draft: DraftRef) {
        self.lock().drafts.insert(session, draft);
    }

    pub fn fail_resolve(&self, err: PipelineError) {
        self.lock().resolve_failure = Some(err);
    }

    pub fn fail_send(&self, draft: DraftRef, err: PipelineError) {
        self.lock().send_failures.insert(draft, err);
    }

    /// Block `send_draft` calls until `release()`.
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Drafts that produced a message, in send order.
    pub fn delivered(&self) -> Vec<DraftRef> {
        self.lock().delivered.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn resolve_calls(&self) -> usize {
        self.lock().resolve_calls
    }

    pub fn send_calls(&self) -> usize {
        self.lock().send_calls
    }
}

#[async_trait]
impl SendPipeline for ScriptedPipeline {
    async fn resolve_draft(&self, session: &HostSessionRef) -> Result<DraftRef, PipelineError> {
        let mut script = self.lock();
        script.resolve_calls += 1;
        if let Some(err) = script.resolve_failure.clone() {
            return Err(err);
        }
        if let Some(draft) = session.draft_hint() {
            return Ok(draft);
        }
        script
            .drafts
            .get(session)
            .cloned()
            .ok_or_else(|| PipelineError::NoDraft(session.clone()))
    }

    async fn send_draft(&self, draft: &DraftRef) -> Result<SentMessage, PipelineError> {
        let mut held = self.held.subscribe();
        // The sender lives in self, so this only errs if it is dropped mid-call.
        let _ = held.wait_for(|held| !*held).await;

        let mut script = self.lock();
        script.send_calls += 1;
        if let Some(err) = script.send_failures.get(draft).cloned() {
            return Err(err);
        }
        if let Some((_, id)) = script.delivered.iter().find(|(d, _)| d == draft) {
            return Ok(SentMessage {
                message_id: id.clone(),
                thread_id: None,
            });
        }
        let message_id = format!("msg-{}", script.delivered.len() + 1);
        script.delivered.push((draft.clone(), message_id.clone()));
        Ok(SentMessage {
            message_id,
            thread_id: None,
        })
    }
}
