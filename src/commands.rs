use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use quill_core::events::LoopEvent;
use quill_core::ids::CheckpointId;
use quill_engine::{ActionDispatcher, ControlLoop, HistoryContextBuilder, LoopConfig, Session};
use quill_llm::{RetryConfig, RetryingProvider, ScriptedProvider};
use quill_settings::QuillSettings;
use quill_store::vfs::describe_binary;
use quill_store::{Database, EntryKind, Persistence, SnapshotRepo};
use quill_telemetry::{init_telemetry, parse_level, TelemetryConfig, TelemetryGuard};

/// Settings, telemetry and storage resolved once per invocation.
pub struct App {
    settings: QuillSettings,
    repo: Option<Arc<SnapshotRepo>>,
    _telemetry: TelemetryGuard,
}

impl App {
    pub fn load(settings_path: Option<&Path>, ephemeral: bool) -> anyhow::Result<Self> {
        let settings = match settings_path {
            Some(path) => quill_settings::load_settings_from_path(path),
            None => quill_settings::load_settings(),
        }
        .context("loading settings")?;

        let persistent = settings.persistence.enabled && !ephemeral;
        let db_path = settings.persistence.resolved_db_path();

        let log_level = parse_level(&settings.logging.level).unwrap_or(tracing::Level::INFO);
        let telemetry = init_telemetry(TelemetryConfig {
            log_level,
            json: settings.logging.json,
            log_to_sqlite: persistent && settings.logging.persist_warnings,
            log_db_path: db_path.with_file_name("logs.db"),
            ..Default::default()
        });
        if parse_level(&settings.logging.level).is_none() {
            warn!(level = %settings.logging.level, "unknown log level, using info");
        }

        let repo = if persistent {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let db = Database::open(&db_path)
                .with_context(|| format!("opening database {}", db_path.display()))?;
            info!(path = %db_path.display(), "database opened");
            Some(Arc::new(SnapshotRepo::new(db)))
        } else {
            None
        };

        Ok(Self {
            settings,
            repo,
            _telemetry: telemetry,
        })
    }

    fn session(&self) -> anyhow::Result<Session> {
        let quota = self.settings.store.quota_bytes;
        match &self.repo {
            Some(repo) => Session::open(quota, repo.clone()).context("restoring session"),
            None => Ok(Session::new(quota)),
        }
    }

    fn repo(&self) -> anyhow::Result<&SnapshotRepo> {
        match &self.repo {
            Some(repo) => Ok(repo),
            None => bail!("persistence is disabled; checkpoints are unavailable"),
        }
    }

    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_iterations: self.settings.agent.max_iterations,
            turn_delay: Duration::from_millis(self.settings.agent.turn_delay_ms),
        }
    }

    fn retry_config(&self) -> RetryConfig {
        let retry = &self.settings.retry;
        RetryConfig {
            max_retries: retry.max_retries,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
        }
    }
}

pub async fn run(app: &App, transcript: &Path, prompt: Option<&str>) -> anyhow::Result<()> {
    let scripted = ScriptedProvider::from_transcript_file(transcript)
        .with_context(|| format!("reading transcript {}", transcript.display()))?;
    let provider = Arc::new(RetryingProvider::new(scripted, app.retry_config()));

    let mut runner = ControlLoop::new(
        provider,
        Arc::new(ActionDispatcher::with_builtins()),
        app.loop_config(),
    );
    if let Some(prompt) = &app.settings.agent.system_prompt {
        runner = runner.with_context_builder(Arc::new(HistoryContextBuilder::with_prompt(prompt.clone())));
    }

    let mut session = app.session()?;
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let mut events = runner.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Ok(event) = events.recv().await {
            match event {
                LoopEvent::Chunk { delta, .. } => {
                    let _ = write!(stdout, "{delta}");
                    let _ = stdout.flush();
                }
                LoopEvent::ModelTurn { .. } => println!(),
                LoopEvent::ActionExecuted { action, result, .. } => {
                    let status = if result.error { "error" } else { "ok" };
                    println!("  [{action}] {status}: {}", result.ui);
                }
                LoopEvent::Stopped { .. } => break,
                _ => {}
            }
        }
    });

    let outcome = match prompt {
        Some(prompt) => runner.start(&mut session, prompt, &cancel).await,
        None => runner.run(&mut session, &cancel).await,
    };
    let _ = printer.await;

    let outcome = outcome.context("control loop stopped")?;
    println!(
        "stopped: {} after {} iteration(s) ({})",
        outcome.stop, outcome.iterations, outcome.signal
    );
    Ok(())
}

pub fn files(app: &App, prefix: Option<&str>, long: bool) -> anyhow::Result<()> {
    let session = app.session()?;
    let store = session.store();
    if long {
        for entry in store.list_with_metadata(prefix) {
            let kind = match entry.kind {
                EntryKind::File => "file",
                EntryKind::Directory => "dir ",
            };
            println!(
                "{kind} {:>10} {} {}",
                entry.size,
                entry.updated_at.format("%Y-%m-%d %H:%M:%S"),
                entry.path
            );
        }
    } else {
        for path in store.list(prefix) {
            println!("{path}");
        }
    }
    println!(
        "{} of {} bytes used",
        store.total_bytes(),
        store.quota_bytes()
    );
    Ok(())
}

pub fn cat(app: &App, path: &str) -> anyhow::Result<()> {
    let session = app.session()?;
    let entry = session
        .store()
        .read(path)
        .with_context(|| format!("reading {path}"))?;
    match describe_binary(&entry.content) {
        Some(summary) => println!("[binary {}, {} bytes]", summary.mime_type, summary.bytes),
        None => print!("{}", entry.content),
    }
    Ok(())
}

pub fn history(app: &App) -> anyhow::Result<()> {
    let session = app.session()?;
    for turn in session.history().get() {
        println!(
            "--- {} {} ---\n{}\n",
            turn.role.as_str(),
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.text()
        );
    }
    Ok(())
}

pub fn checkpoint_create(app: &App, label: &str) -> anyhow::Result<()> {
    app.repo()?;
    let session = app.session()?;
    match session.create_checkpoint(label)? {
        Some(id) => println!("{id}"),
        None => bail!("session is not persistent"),
    }
    Ok(())
}

pub fn checkpoint_list(app: &App) -> anyhow::Result<()> {
    for info in app.repo()?.list_checkpoints()? {
        println!(
            "{}  {}  {} file(s), {} turn(s)  {}",
            info.id,
            info.created_at.format("%Y-%m-%d %H:%M:%S"),
            info.file_count,
            info.turn_count,
            info.label
        );
    }
    Ok(())
}

pub fn checkpoint_restore(app: &App, id: &str) -> anyhow::Result<()> {
    app.repo()?;
    let mut session = app.session()?;
    let id = CheckpointId::from_raw(id);
    if !session.restore_checkpoint(&id)? {
        bail!("no checkpoint {id}");
    }
    session.save()?;
    println!("restored {id}");
    Ok(())
}

pub fn checkpoint_delete(app: &App, id: &str) -> anyhow::Result<()> {
    let id = CheckpointId::from_raw(id);
    if !app.repo()?.delete_checkpoint(&id)? {
        bail!("no checkpoint {id}");
    }
    println!("deleted {id}");
    Ok(())
}
