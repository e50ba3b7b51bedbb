//! Follows the bot log file with a `tail -f` child process and forwards every line.
//!
//! The tailer cycles `Starting -> Streaming -> Backoff -> Starting` until it is stopped.
//! A missing file, a reader that exits or a read error only costs one backoff delay.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    sync::watch,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::{EventForwarder, MatchIdTag};
use crate::MatchId;

/// How long a reader gets to exit after the termination signal before it is killed.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable lifecycle of a [`LogTailer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// Spawning the reader process.
    Starting,
    /// Reader is running, lines are being forwarded.
    Streaming,
    /// Reader died or failed to start, waiting before the next attempt.
    Backoff,
    /// Not running: never started, or stopped.
    Stopped,
}

/// Program used to follow the file. The file path is appended as last argument.
#[derive(Debug, Clone)]
pub struct ReaderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ReaderCommand {
    fn default() -> Self {
        Self {
            program: "tail".to_owned(),
            args: vec!["-f".to_owned()],
        }
    }
}

impl ReaderCommand {
    fn spawn(&self, path: &Path) -> anyhow::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("could not spawn '{}'", self.program))
    }
}

/// Settings handed to the tailing task when it is spawned.
#[derive(Debug, Clone)]
struct TailConfig {
    path: PathBuf,
    reader: ReaderCommand,
    backoff: Duration,
}

struct Shared {
    forwarder: EventForwarder,
    match_id: MatchIdTag,
    state: watch::Sender<TailerState>,
    reader_pid: Mutex<Option<u32>>,
    attempts: AtomicUsize,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum StreamEnd {
    Eof,
    Cancelled,
}

/// Tails one log file and forwards each line, tagged with the current match id.
pub struct LogTailer {
    config: TailConfig,
    shared: Arc<Shared>,
    task: Option<RunningTask>,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>, forwarder: EventForwarder) -> Self {
        let (state, _) = watch::channel(TailerState::Stopped);
        Self {
            config: TailConfig {
                path: path.into(),
                reader: ReaderCommand::default(),
                backoff: Duration::from_secs(5),
            },
            shared: Arc::new(Shared {
                forwarder,
                match_id: MatchIdTag::default(),
                state,
                reader_pid: Mutex::new(None),
                attempts: AtomicUsize::new(0),
            }),
            task: None,
        }
    }

    /// Delay between a reader failure and the next spawn attempt.
    ///
    /// A running tailer picks it up on its next [`start`](Self::start).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Replace the `tail -f` reader. Same rule as [`with_backoff`](Self::with_backoff).
    pub fn with_reader(mut self, reader: ReaderCommand) -> Self {
        self.config.reader = reader;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.config.backoff
    }

    /// Handle through which the scheduler publishes the match in progress.
    pub fn match_id_tag(&self) -> MatchIdTag {
        self.shared.match_id.clone()
    }

    /// Tag all subsequently forwarded lines with `id`.
    pub fn set_current_match_id(&self, id: MatchId) {
        self.shared.match_id.set(id);
    }

    pub fn current_match_id(&self) -> Option<MatchId> {
        self.shared.match_id.get()
    }

    pub fn state(&self) -> TailerState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<TailerState> {
        self.shared.state.subscribe()
    }

    /// Pid of the running reader process, if any.
    pub fn reader_pid(&self) -> Option<u32> {
        self.shared.current_pid()
    }

    /// Number of times a reader was (re)started.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Spawn the tailing task on the current tokio runtime. No-op if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("log tailer already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tail_loop(
            self.shared.clone(),
            self.config.clone(),
            cancel.clone(),
        ));
        self.task = Some(RunningTask { cancel, handle });
    }

    /// Cancel the tailing task, terminate the reader and wait for the task to finish.
    ///
    /// Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            debug!("log tailer not running");
            return;
        };

        info!("stopping log tailer");
        task.cancel.cancel();
        if let Some(pid) = self.shared.current_pid() {
            if let Err(e) = send_terminate(pid) {
                debug!("could not signal reader {pid}: {e:#}");
            }
        }
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                error!("log tailer task failed: {e}");
            }
        }
        self.shared.set_state(TailerState::Stopped);
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            // the reader is killed on drop when the task goes away
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

impl Shared {
    fn set_state(&self, state: TailerState) {
        trace!(?state, "log tailer state");
        self.state.send_replace(state);
    }

    fn current_pid(&self) -> Option<u32> {
        *self.reader_pid.lock().expect("poisoned")
    }

    fn set_pid(&self, pid: Option<u32>) {
        *self.reader_pid.lock().expect("poisoned") = pid;
    }

    async fn stream_once(
        &self,
        config: &TailConfig,
        cancel: &CancellationToken,
    ) -> anyhow::Result<StreamEnd> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let mut child = config.reader.spawn(&config.path)?;
        self.set_pid(child.id());
        self.set_state(TailerState::Streaming);
        info!(pid = ?child.id(), "reader started");

        let result = match child.stdout.take() {
            Some(stdout) => self.pump(stdout, cancel).await,
            None => Err(anyhow::anyhow!("reader has no stdout")),
        };

        self.set_pid(None);
        reap(&mut child).await;
        result
    }

    async fn pump(
        &self,
        stdout: tokio::process::ChildStdout,
        cancel: &CancellationToken,
    ) -> anyhow::Result<StreamEnd> {
        let mut lines = BufReader::new(stdout).split(b'\n');
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                next = lines.next_segment() => next,
            };
            match next.context("could not read from reader")? {
                Some(bytes) => self.dispatch(&String::from_utf8_lossy(&bytes)).await,
                None => return Ok(StreamEnd::Eof),
            }
        }
    }

    async fn dispatch(&self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        trace!("read line: {}", line.chars().take(100).collect::<String>());
        let event = self.forwarder.event(self.match_id.get(), line);
        self.forwarder.forward(&event).await;
    }
}

#[instrument(skip_all, fields(path = ?config.path))]
async fn tail_loop(shared: Arc<Shared>, config: TailConfig, cancel: CancellationToken) {
    info!("starting log monitoring");
    loop {
        shared.set_state(TailerState::Starting);
        match shared.stream_once(&config, &cancel).await {
            Ok(StreamEnd::Cancelled) => break,
            Ok(StreamEnd::Eof) => warn!("reader exited, retrying in {:?}", config.backoff),
            Err(e) => error!("error in log monitoring: {e:#}"),
        }

        shared.set_state(TailerState::Backoff);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.backoff) => {}
        }
    }
    shared.set_state(TailerState::Stopped);
    info!("log monitoring stopped");
}

/// Ask the reader to exit and collect it; kill it if it does not comply in time.
async fn reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Some(pid) = child.id() {
        if let Err(e) = send_terminate(pid) {
            debug!("could not signal reader {pid}: {e:#}");
        }
    }
    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "reader exited"),
        Ok(Err(e)) => warn!("could not wait for reader: {e}"),
        Err(_) => {
            warn!("reader ignored termination signal, killing it");
            if let Err(e) = child.kill().await {
                error!("could not kill reader: {e}");
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> anyhow::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).context("pid out of range")?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).context("failed to send SIGTERM")
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> anyhow::Result<()> {
    // no signals here: `reap` falls back to killing the reader
    Ok(())
}
