use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sendlock_core::domain::{
    ComposeFields, ControlHandle, ControlId, DomainEvent, DraftRef, HostSessionRef, TaskId,
    TaskView,
};
use sendlock_core::impls::{InMemoryKeyValueStore, JsonFileStore, ScriptedPipeline, StaticLocator};
use sendlock_core::interceptor::UiEvent;
use sendlock_core::ports::{Clock, KeyValueStore, SystemClock, UlidGenerator};
use sendlock_core::{
    Interceptor, PersistenceBridge, Scheduler, SchedulerRuntime, SchedulerSettings, SendLockConfig,
};

#[derive(Parser)]
#[command(name = "sendlock", version)]
struct Cli {
    /// Path to sendlock.toml (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tasks held in a persisted store
    Inspect {
        #[arg(long)]
        store: Option<PathBuf>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run one intercepted send end to end against a scripted backend
    Demo {
        /// Override the configured delay
        #[arg(long)]
        delay: Option<u32>,
        /// Cancel halfway through the countdown
        #[arg(long)]
        cancel: bool,
        /// Persist to this file instead of memory
        #[arg(long)]
        store: Option<PathBuf>,
        /// Send at this RFC 3339 time instead of after the delay
        #[arg(long, conflicts_with = "delay")]
        send_at: Option<DateTime<Utc>>,
    },

    /// Write the effective configuration to a file
    InitConfig {
        #[arg(long, default_value = "sendlock.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SendLockConfig::load_from(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => SendLockConfig::default(),
    };

    match cli.cmd {
        Command::Inspect { store, json } => {
            let path = store
                .or_else(|| config.store_path.clone())
                .context("no store given (use --store or store_path in the config)")?;
            inspect(&path, json).await
        }
        Command::Demo {
            delay,
            cancel,
            store,
            send_at,
        } => {
            let mut config = config;
            if let Some(delay) = delay {
                config.delay_seconds = delay;
                config.delay_enabled = true;
            }
            if store.is_some() {
                config.store_path = store;
            }
            config.validate()?;
            demo(&config, cancel, send_at).await
        }
        Command::InitConfig { path } => {
            config.save_to(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

async fn inspect(path: &Path, json: bool) -> Result<()> {
    if !path.exists() {
        bail!("store {} does not exist", path.display());
    }
    let (bridge, _writer) = PersistenceBridge::spawn(Arc::new(JsonFileStore::new(path)));
    let tasks = bridge.load().await;
    let now = SystemClock.now();
    let views: Vec<TaskView> = tasks.iter().map(|t| TaskView::of(t, now)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("Tasks: {}", views.len());
    for v in &views {
        let remaining = if v.remaining_seconds > 0 {
            format!(" {}s left", v.remaining_seconds)
        } else {
            String::new()
        };
        let failure = v
            .failure
            .as_deref()
            .map(|f| format!(" ({f})"))
            .unwrap_or_default();
        println!(
            "- {} [{}]{} {}{}",
            v.task_id,
            v.state,
            remaining,
            v.display_meta.headline(),
            failure
        );
    }
    Ok(())
}

async fn demo(
    config: &SendLockConfig,
    cancel: bool,
    send_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let store: Arc<dyn KeyValueStore> = match &config.store_path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(InMemoryKeyValueStore::new()),
    };

    let session = HostSessionRef::new("demo-compose");
    let pipeline = ScriptedPipeline::new();
    pipeline.register_draft(session.clone(), DraftRef::new("demo-draft"));

    let locator = StaticLocator::new();
    locator.add_control(
        ControlHandle::send_button("demo-send"),
        ComposeFields {
            recipients: vec!["ann@example.com; bob@example.com".into()],
            subject: "Quarterly report".into(),
            body: "Numbers are attached.".into(),
            host_session_ref: session,
            label: None,
        },
    );
    let mut interceptor = Interceptor::new(locator, config.dedup_window());
    interceptor.scan();

    let clock = SystemClock;
    let scheduler = Scheduler::new(
        SchedulerSettings::from(config),
        Arc::new(clock),
        Arc::new(UlidGenerator::new(clock)),
    );
    let (bridge, writer) = PersistenceBridge::spawn(store);
    let (handle, runtime) = SchedulerRuntime::start(
        scheduler,
        bridge,
        Arc::new(pipeline.clone()),
        config.tick_interval(),
    );
    let mut events = handle.subscribe_events();

    let interception = interceptor.handle(&UiEvent::pointer(ControlId::new("demo-send"), Utc::now()));
    let payload = interception
        .intent
        .context("click on the send button produced no intent")?;
    let (task_id, hold_seconds) = match send_at {
        Some(send_at) => {
            let task_id = handle.schedule_send(payload, send_at).await?.task_id();
            let lead = (send_at - Utc::now()).num_seconds().max(0);
            (task_id, u64::try_from(lead).unwrap_or_default())
        }
        None => {
            let task_id = handle.send_requested(payload).await?.task_id();
            (task_id, u64::from(config.effective_delay_seconds()))
        }
    };
    println!("Intercepted send: {task_id}");

    let cancel_after = Duration::from_millis(hold_seconds * 500);
    let deadline = Duration::from_secs(hold_seconds + 10);

    let outcome = tokio::time::timeout(deadline, async {
        let mut views = handle.subscribe_views();
        let mut last_shown = None;
        let cancel_at = tokio::time::Instant::now() + cancel_after;
        let mut cancel_pending = cancel;
        loop {
            tokio::select! {
                changed = views.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let remaining = views
                        .borrow()
                        .iter()
                        .find(|v| v.task_id == task_id)
                        .map(|v| v.remaining_seconds);
                    if remaining.is_some() && remaining != last_shown {
                        if let Some(secs) = remaining.filter(|s| *s > 0) {
                            println!("  sending in {secs}s ... (undo available)");
                        }
                        last_shown = remaining;
                    }
                }
                _ = tokio::time::sleep_until(cancel_at), if cancel_pending => {
                    cancel_pending = false;
                    match handle.cancel(task_id).await {
                        Ok(()) => println!("  undo requested"),
                        Err(err) => println!("  undo too late: {err}"),
                    }
                }
                event = events.recv() => match event {
                    Ok(event) if is_terminal_for(&event, task_id) => return Some(event),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    })
    .await
    .context("timed out waiting for the deferred send")?;

    match outcome {
        Some(DomainEvent::TaskSent { draft_ref, .. }) => println!(
            "Sent draft {} (delivered: {})",
            draft_ref.map(|d| d.to_string()).unwrap_or_default(),
            pipeline.delivered().len()
        ),
        Some(DomainEvent::TaskCanceled { .. }) => println!("Canceled; nothing was sent"),
        Some(DomainEvent::TaskFailed { reason, .. }) => println!("Failed: {reason}"),
        Some(DomainEvent::EditRequested { host_session_ref, .. }) => {
            println!("Returned to editing ({host_session_ref})")
        }
        _ => println!("Runtime stopped before the task finished"),
    }

    info!(counts = ?handle.counts().await?, "demo finished");
    handle.shutdown().await;
    runtime.await?;
    writer.await?;
    Ok(())
}

fn is_terminal_for(event: &DomainEvent, task_id: TaskId) -> bool {
    event.task_id() == task_id
        && matches!(
            event,
            DomainEvent::TaskSent { .. }
                | DomainEvent::TaskCanceled { .. }
                | DomainEvent::TaskFailed { .. }
                | DomainEvent::EditRequested { .. }
        )
}
