use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use pagepush_core::Config;
use pagepush_sync::{pipeline, GitSyncEngine, PipelineHook};

use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path, WATCH_DEBOUNCE};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::scheduler::{PushRunner, PushScheduler};

/// Everything the daemon's tasks share.
pub(crate) struct DaemonState {
    home: PathBuf,
    config: Config,
    scheduler: PushScheduler,
    started_at: DateTime<Utc>,
}

impl DaemonState {
    pub(crate) fn new(home: PathBuf, config: Config, runner: Arc<dyn PushRunner>) -> Self {
        let scheduler = PushScheduler::new(runner, config.push.debounce());
        Self {
            home,
            config,
            scheduler,
            started_at: Utc::now(),
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: Config) -> Result<(), DaemonError> {
    init_tracing("info");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon: publish once, then watch artifact sources and serve the
/// control socket until `stop` or ctrl-c.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    config.validate()?;

    let hook = PipelineHook::new(config.clone());
    let engine = GitSyncEngine::open(&config, Box::new(hook))?;
    let state = Arc::new(DaemonState::new(home, config, Arc::new(engine)));
    tracing::info!(
        repository = %state.config.repository.path.display(),
        artifacts = state.config.artifacts.len(),
        debounce_secs = state.config.push.debounce_secs,
        "daemon starting",
    );

    startup_pass(&state).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = watcher_task(state, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, socket_handle, signal_handle);

    if let Some(attempt) = state.scheduler.flush().await {
        tracing::info!(outcome = attempt.outcome.label(), "pending push flushed on shutdown");
    }

    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Publish whatever the producers wrote while the daemon was down.
async fn startup_pass(state: &Arc<DaemonState>) -> Result<(), DaemonError> {
    let config = state.config.clone();
    let results = tokio::task::spawn_blocking(move || pipeline::run(&config, false))
        .await
        .map_err(|err| DaemonError::Protocol(format!("startup publish join error: {err}")))??;

    let written = results.iter().filter(|result| result.is_written()).count();
    tracing::info!(written, total = results.len(), "startup publish finished");

    if written > 0 {
        let message = pipeline::commit_message_for_written(&state.config, &results);
        state.scheduler.schedule_push(message);
    }
    Ok(())
}

async fn watcher_task(
    state: Arc<DaemonState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let sources = source_index(&state.config);
    if sources.is_empty() {
        tracing::warn!("no artifacts configured; watcher idle");
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    register_source_dirs(&mut watcher, &state.config)?;

    let mut quiet = HashMap::<PathBuf, Instant>::new();

    loop {
        let next_due = quiet.values().min().map(|seen| *seen + WATCH_DEBOUNCE);
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = sleep_until_due(next_due) => {
                for path in due_paths(&mut quiet, Instant::now(), WATCH_DEBOUNCE) {
                    if let Some(source) = sources.get(&path) {
                        publish_and_schedule(&state, source.clone()).await;
                    }
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if sources.contains_key(&path) {
                        quiet.insert(path, Instant::now());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn sleep_until_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn publish_and_schedule(state: &Arc<DaemonState>, source: PathBuf) {
    let config = state.config.clone();
    let changed = source.clone();
    let published =
        tokio::task::spawn_blocking(move || pipeline::publish_changed(&config, &changed)).await;

    match published {
        Ok(Ok(written)) => {
            if written.is_empty() {
                tracing::debug!(source = %source.display(), "artifact unchanged, nothing to push");
            }
            for (_, message) in written {
                state.scheduler.schedule_push(message);
            }
        }
        Ok(Err(err)) => {
            tracing::error!(source = %source.display(), error = %err, "publishing artifact failed");
        }
        Err(err) => {
            tracing::error!(error = %err, "publish task join error");
        }
    }
}

/// Maps the paths notify reports back to configured artifact sources.
///
/// Sources are keyed both as configured and under their canonical parent
/// directory, which is what the watcher is registered on.
fn source_index(config: &Config) -> HashMap<PathBuf, PathBuf> {
    let mut index = HashMap::new();
    for artifact in &config.artifacts {
        let source = artifact.source.clone();
        if let Some(canonical) = canonical_source(&source) {
            index.insert(canonical, source.clone());
        }
        index.insert(source.clone(), source);
    }
    index
}

fn canonical_source(source: &Path) -> Option<PathBuf> {
    let parent = source.parent()?;
    let name = source.file_name()?;
    fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}

/// Watch each distinct source directory. Sources are often replaced by
/// rename, so the directory is watched rather than the file.
fn register_source_dirs(
    watcher: &mut RecommendedWatcher,
    config: &Config,
) -> Result<(), DaemonError> {
    let mut watched = HashSet::new();
    for artifact in &config.artifacts {
        let Some(parent) = artifact.source.parent() else {
            continue;
        };
        let dir = match fs::canonicalize(parent) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    source = %artifact.source.display(),
                    "source directory does not exist; artifact not watched",
                );
                continue;
            }
            Err(err) => return Err(io_err(parent, err)),
        };
        if watched.insert(dir.clone()) {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %dir.display(), "watching artifact directory");
        }
    }
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Paths that have been quiet for at least `threshold`, removed from `quiet`.
fn due_paths(
    quiet: &mut HashMap<PathBuf, Instant>,
    now: Instant,
    threshold: Duration,
) -> Vec<PathBuf> {
    let mut due: Vec<PathBuf> = quiet
        .iter()
        .filter(|(_, seen_at)| now.duration_since(**seen_at) >= threshold)
        .map(|(path, _)| path.clone())
        .collect();
    due.sort();
    for path in &due {
        quiet.remove(path);
    }
    due
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = run_dir(&state.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&state.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = dispatch(&state, request, &shutdown_tx).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    state: &DaemonState,
    request: DaemonRequest,
    shutdown_tx: &broadcast::Sender<()>,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(state)),
        "schedule" => match non_empty_message(request.message) {
            Some(message) => {
                state.scheduler.schedule_push(message.clone());
                DaemonResponse::ok(json!({
                    "scheduled": true,
                    "message": message,
                    "quiet_secs": state.scheduler.quiet_period().as_secs(),
                }))
            }
            None => DaemonResponse::error("schedule requires a non-empty message"),
        },
        "push" => match non_empty_message(request.message) {
            Some(message) => {
                let attempt = state.scheduler.push_now(message).await;
                DaemonResponse::ok(json!(attempt))
            }
            None => DaemonResponse::error("push requires a non-empty message"),
        },
        "stop" => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

fn non_empty_message(message: Option<String>) -> Option<String> {
    message.filter(|m| !m.trim().is_empty())
}

fn build_status_payload(state: &DaemonState) -> Value {
    let artifacts: Vec<Value> = state
        .config
        .artifacts
        .iter()
        .map(|artifact| {
            json!({
                "source": artifact.source.display().to_string(),
                "destination": artifact.destination.display().to_string(),
            })
        })
        .collect();

    json!({
        "running": true,
        "started_at": state.started_at.to_rfc3339(),
        "repository": state.config.repository.path.display().to_string(),
        "socket": socket_path(&state.home).display().to_string(),
        "debounce_secs": state.scheduler.quiet_period().as_secs(),
        "pending_message": state.scheduler.pending_message(),
        "push_in_flight": state.scheduler.is_push_in_flight(),
        "last_attempt": state.scheduler.last_attempt(),
        "artifacts": artifacts,
    })
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the fmt subscriber on stderr. `RUST_LOG` overrides
/// `default_filter`. Records from crates logging through `log` are forwarded
/// as well. A second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pagepush_core::{Artifact, PushAttempt, PushOutcome};
    use tempfile::TempDir;
    use tokio::time::advance;

    use crate::protocol::send_request;

    struct CountingRunner;

    impl PushRunner for CountingRunner {
        fn run_push(&self, message: &str) -> PushAttempt {
            PushAttempt {
                attempt_number: 1,
                commit_message: message.to_string(),
                started_at: Utc::now(),
                outcome: PushOutcome::NoChanges,
            }
        }
    }

    fn state(home: &Path, repo: &Path) -> Arc<DaemonState> {
        let mut config = Config::for_repository(repo.to_path_buf());
        config.artifacts.push(Artifact {
            source: repo.join("out").join("vidiots.html"),
            destination: PathBuf::from("TRMNL/vidiots.html"),
        });
        Arc::new(DaemonState::new(
            home.to_path_buf(),
            config,
            Arc::new(CountingRunner),
        ))
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn rapid_events_on_one_path_publish_once_after_quiet() {
        let mut quiet = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/tmp/vidiots.html");

        for _ in 0..5 {
            quiet.insert(path.clone(), Instant::now());
            assert!(due_paths(&mut quiet, Instant::now(), WATCH_DEBOUNCE).is_empty());
            advance(Duration::from_millis(100)).await;
        }

        advance(WATCH_DEBOUNCE).await;
        assert_eq!(due_paths(&mut quiet, Instant::now(), WATCH_DEBOUNCE), vec![path]);
        assert!(quiet.is_empty());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn quiet_paths_are_tracked_independently() {
        let mut quiet = HashMap::<PathBuf, Instant>::new();
        let early = PathBuf::from("/tmp/espresso.html");
        let late = PathBuf::from("/tmp/vidiots.html");

        quiet.insert(early.clone(), Instant::now());
        advance(Duration::from_millis(400)).await;
        quiet.insert(late.clone(), Instant::now());
        advance(Duration::from_millis(200)).await;

        assert_eq!(due_paths(&mut quiet, Instant::now(), WATCH_DEBOUNCE), vec![early]);
        assert!(quiet.contains_key(&late));
    }

    #[test]
    fn source_index_resolves_canonical_paths() {
        let repo = TempDir::new().expect("repo");
        fs::create_dir_all(repo.path().join("out")).expect("out dir");
        let home = TempDir::new().expect("home");
        let state = state(home.path(), repo.path());

        let index = source_index(&state.config);
        let configured = repo.path().join("out").join("vidiots.html");
        let canonical = fs::canonicalize(repo.path().join("out"))
            .expect("canonical")
            .join("vidiots.html");
        assert_eq!(index.get(&configured), Some(&configured));
        assert_eq!(index.get(&canonical), Some(&configured));
    }

    #[tokio::test]
    async fn startup_pass_schedules_one_push_naming_every_written_artifact() {
        let home = TempDir::new().expect("home");
        let repo = TempDir::new().expect("repo");
        let out = repo.path().join("out");
        fs::create_dir_all(&out).expect("out dir");
        fs::write(out.join("vidiots.html"), "<p>films</p>").expect("source");
        fs::write(out.join("espresso.html"), "<p>coffee</p>").expect("source");

        let mut config = Config::for_repository(repo.path().to_path_buf());
        for name in ["vidiots.html", "espresso.html"] {
            config.artifacts.push(Artifact {
                source: out.join(name),
                destination: PathBuf::from("TRMNL").join(name),
            });
        }
        let state = Arc::new(DaemonState::new(
            home.path().to_path_buf(),
            config,
            Arc::new(CountingRunner),
        ));

        startup_pass(&state).await.expect("startup pass");
        assert_eq!(
            state.scheduler.pending_message().as_deref(),
            Some("Automated update of TRMNL/vidiots.html, TRMNL/espresso.html")
        );
        state.scheduler.cancel();

        startup_pass(&state).await.expect("second pass");
        assert!(state.scheduler.pending_message().is_none(), "nothing new to push");
    }

    #[tokio::test]
    async fn status_payload_reports_scheduler_state() {
        let home = TempDir::new().expect("home");
        let repo = TempDir::new().expect("repo");
        let state = state(home.path(), repo.path());

        let payload = build_status_payload(&state);
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["debounce_secs"], json!(10));
        assert_eq!(payload["pending_message"], Value::Null);
        assert_eq!(payload["last_attempt"], Value::Null);
        assert_eq!(payload["artifacts"][0]["destination"], json!("TRMNL/vidiots.html"));

        state.scheduler.schedule_push("Automated update of TRMNL/vidiots.html");
        let payload = build_status_payload(&state);
        assert_eq!(
            payload["pending_message"],
            json!("Automated update of TRMNL/vidiots.html")
        );
        state.scheduler.cancel();
    }

    #[tokio::test]
    async fn dispatch_rejects_schedule_without_message() {
        let home = TempDir::new().expect("home");
        let repo = TempDir::new().expect("repo");
        let state = state(home.path(), repo.path());
        let (shutdown_tx, _) = broadcast::channel(1);

        let response = dispatch(&state, DaemonRequest::new("schedule"), &shutdown_tx).await;
        assert!(!response.ok);
        let response = dispatch(
            &state,
            DaemonRequest::with_message("push", "   "),
            &shutdown_tx,
        )
        .await;
        assert!(!response.ok);
        let response = dispatch(&state, DaemonRequest::new("reboot"), &shutdown_tx).await;
        assert_eq!(response.error.as_deref(), Some("unknown command 'reboot'"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_serves_status_push_and_stop() {
        let home = TempDir::new().expect("home");
        let repo = TempDir::new().expect("repo");
        let state = state(home.path(), repo.path());

        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let server = {
            let shutdown = shutdown_tx.clone();
            tokio::spawn(socket_server_task(
                state.clone(),
                shutdown.clone(),
                shutdown.subscribe(),
            ))
        };

        let home_path = home.path().to_path_buf();
        let responses = tokio::task::spawn_blocking(move || {
            let socket = socket_path(&home_path);
            for _ in 0..50 {
                if socket.exists() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            let status = send_request(&home_path, &DaemonRequest::new("status"))?;
            let push = send_request(
                &home_path,
                &DaemonRequest::with_message("push", "Automated update of TRMNL/vidiots.html"),
            )?;
            let stop = send_request(&home_path, &DaemonRequest::new("stop"))?;
            Ok::<_, DaemonError>((status, push, stop))
        })
        .await
        .expect("client join")
        .expect("client requests");

        let (status, push, stop) = responses;
        assert!(status.ok);
        assert_eq!(status.data.expect("status data")["running"], json!(true));
        assert!(push.ok);
        assert_eq!(
            push.data.expect("push data")["outcome"],
            json!("no-changes")
        );
        assert!(stop.ok);

        server.await.expect("server join").expect("server result");
        assert!(!socket_path(home.path()).exists(), "socket removed on stop");
        assert_eq!(
            state.scheduler.last_attempt().map(|a| a.commit_message).as_deref(),
            Some("Automated update of TRMNL/vidiots.html")
        );
    }
}
