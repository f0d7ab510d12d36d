//! Process supervision primitive
//!
//! A [`ProcessHandle`] wraps one spawned OS process. The child itself is owned
//! by a reaper task that publishes the exit status exactly once through a
//! `watch` channel; every other observer (the orchestrator, monitors, the
//! plugin) only reads that channel. Standard output and standard error are
//! pumped line by line into a single shared buffer, bounded to the most recent
//! [`OUTPUT_RETAINED_LINES`], that any number of [`OutputReader`]s replay from.

use std::collections::{BTreeMap, VecDeque};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{OrchestratorError, OrchestratorResult};
use shared::{harness_debug, harness_error, harness_info, Component};

/// Upper bound for the polling interval of a bounded [`ProcessHandle::wait`]
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Polling interval used by a bounded wait: `min(timeout / 1000, 250ms)`
pub fn poll_interval(timeout: Duration) -> Duration {
    (timeout / 1000).min(MAX_POLL_INTERVAL)
}

/// Exit status of a supervised process.
///
/// [`code`](Self::code) follows the shell convention: a process terminated by
/// signal `N` reports `-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
    /// The reaper could not observe the real status
    Unknown,
}

impl ExitStatus {
    /// Negative codes are read as signal deaths
    pub fn from_code(code: i32) -> Self {
        if code < 0 {
            Self::Signaled(-code)
        } else {
            Self::Exited(code)
        }
    }

    /// Exit code, `-N` for signal `N`, `-1` when unknown
    pub fn code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal) => -signal,
            Self::Unknown => -1,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            Self::Signaled(signal) => Some(*signal),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        *self == Self::Exited(0)
    }

    fn from_std(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        Self::Unknown
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            Self::Unknown => f.write_str("unknown exit status"),
        }
    }
}

/// Environment passed to a spawned process.
///
/// Built per spawn; the harness never mutates its own process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<OsString, OsString>,
}

impl Environment {
    /// Snapshot of the environment this process inherited
    pub fn inherited() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OsStr::to_str)
    }

    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Overlay every key of `context` onto this environment
    pub fn overlay(mut self, context: &Map<String, Value>) -> Self {
        for (key, value) in context {
            self.set(key, environ_value(value));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }
}

/// Serialize one context value into an environment string.
///
/// A nested mapping becomes `k=v,k2=v2` in the mapping's own order.
pub fn environ_value(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{key}={}", scalar_string(value)))
            .collect::<Vec<_>>()
            .join(","),
        other => scalar_string(other),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Build the environment for a child process.
///
/// Without a context this is the inherited environment unchanged.
pub fn set_environ(context: Option<&Map<String, Value>>) -> Environment {
    let env = Environment::inherited();
    match context {
        Some(context) => env.overlay(context),
        None => env,
    }
}

/// Most recent output lines kept for readers that have not caught up
pub const OUTPUT_RETAINED_LINES: usize = 10_000;

/// Lines longer than this many bytes are split into several lines
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug)]
struct OutputState {
    lines: VecDeque<String>,
    /// Sequence number of `lines[0]`
    first: usize,
    open_streams: usize,
}

impl OutputState {
    fn push(&mut self, line: String) {
        if self.lines.len() == OUTPUT_RETAINED_LINES {
            self.lines.pop_front();
            self.first += 1;
        }
        self.lines.push_back(line);
    }

    fn get(&self, sequence: usize) -> Option<&String> {
        sequence.checked_sub(self.first).and_then(|index| self.lines.get(index))
    }
}

/// Incremental reader over the merged stdout/stderr of a process.
///
/// A reader that falls more than [`OUTPUT_RETAINED_LINES`] behind skips
/// ahead to the oldest retained line; [`skipped`](Self::skipped) counts the
/// lines it never saw.
#[derive(Debug, Clone)]
pub struct OutputReader {
    rx: watch::Receiver<OutputState>,
    cursor: usize,
    skipped: usize,
}

impl OutputReader {
    /// Next line of output, or `None` once every stream reached end of file
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            {
                let state = self.rx.borrow_and_update();
                if let Some(line) = Self::take(&mut self.cursor, &mut self.skipped, &state) {
                    return Some(line);
                }
                if state.open_streams == 0 {
                    return None;
                }
            }
            if self.rx.changed().await.is_err() {
                let state = self.rx.borrow();
                return Self::take(&mut self.cursor, &mut self.skipped, &state);
            }
        }
    }

    fn take(cursor: &mut usize, skipped: &mut usize, state: &OutputState) -> Option<String> {
        if *cursor < state.first {
            *skipped += state.first - *cursor;
            *cursor = state.first;
        }
        let line = state.get(*cursor).cloned()?;
        *cursor += 1;
        Some(line)
    }

    /// Sequence number of the next line this reader will return
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Lines dropped from the buffer before this reader got to them
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// True once both output streams of the process are closed
    pub fn is_closed(&self) -> bool {
        self.rx.borrow().open_streams == 0
    }
}

/// Handle for one supervised OS process
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    command: Vec<String>,
    status_rx: watch::Receiver<Option<ExitStatus>>,
    kill_tx: mpsc::Sender<()>,
    stop_requested: AtomicBool,
    output_rx: watch::Receiver<OutputState>,
}

impl ProcessHandle {
    /// Spawn `cmd` with stderr merged into stdout.
    ///
    /// `env` replaces the inherited environment when given. On unix the child
    /// gets its own process group, so a terminal interrupt reaches only the
    /// harness and the child dies through [`stop`](Self::stop). Must be
    /// called from within a tokio runtime.
    pub fn open(cmd: &[String], env: Option<Environment>, cwd: Option<&Path>) -> OrchestratorResult<Self> {
        let mut command = build_command(cmd, env.as_ref(), cwd)?;
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| OrchestratorError::Spawn {
            command: cmd.to_vec(),
            source,
        })?;
        let pid = child.id();
        harness_info!(Component::Process(pid.unwrap_or(0)), "Running command: {:?}", cmd);

        let (output_tx, output_rx) = watch::channel(OutputState {
            lines: VecDeque::new(),
            first: 0,
            open_streams: 2,
        });
        let output_tx = Arc::new(output_tx);
        match child.stdout.take() {
            Some(stdout) => pump_lines(stdout, output_tx.clone()),
            None => output_tx.send_modify(|state| state.open_streams -= 1),
        }
        match child.stderr.take() {
            Some(stderr) => pump_lines(stderr, output_tx),
            None => output_tx.send_modify(|state| state.open_streams -= 1),
        }

        let (status_tx, status_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        spawn_reaper(child, pid, status_tx, kill_rx);

        Ok(Self {
            pid,
            command: cmd.to_vec(),
            status_rx,
            kill_tx,
            stop_requested: AtomicBool::new(false),
            output_rx,
        })
    }

    /// Run `cmd` to completion with inherited stdio; a non-zero exit is an error
    pub async fn call(cmd: &[String], env: Option<Environment>, cwd: Option<&Path>) -> OrchestratorResult<ExitStatus> {
        harness_info!(Component::Orchestrator, "Calling command: {:?}", cmd);
        let mut command = build_command(cmd, env.as_ref(), cwd)?;

        let status = command.status().await.map_err(|source| OrchestratorError::Spawn {
            command: cmd.to_vec(),
            source,
        })?;
        let status = ExitStatus::from_std(status);
        if !status.success() {
            return Err(OrchestratorError::CommandFailed {
                command: cmd.to_vec(),
                code: status.code(),
            });
        }
        Ok(status)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn component(&self) -> Component {
        Component::Process(self.pid.unwrap_or(0))
    }

    /// Recorded exit status, without blocking
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.status_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// True once `stop` was called on a running process
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// A new reader over the merged output, starting at the oldest retained line
    pub fn output(&self) -> OutputReader {
        let cursor = self.output_rx.borrow().first;
        OutputReader {
            rx: self.output_rx.clone(),
            cursor,
            skipped: 0,
        }
    }

    /// Number of output lines currently held in memory
    pub fn retained_lines(&self) -> usize {
        self.output_rx.borrow().lines.len()
    }

    /// Wait for the process to exit.
    ///
    /// With no (or a zero) timeout this blocks until exit, as does a timeout too
    /// large to form a deadline. Otherwise the status is polled every
    /// [`poll_interval`] until the deadline, after which the process is stopped
    /// and waited for unconditionally.
    pub async fn wait(&self, timeout: Option<Duration>) -> ExitStatus {
        let timeout = match timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => return self.wait_for_exit().await,
        };

        // A deadline past the clock's range is no deadline at all
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait_for_exit().await;
        };
        let interval = poll_interval(timeout);
        loop {
            if let Some(status) = self.exit_status() {
                return status;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wake = if interval.is_zero() { deadline } else { (now + interval).min(deadline) };
            tokio::time::sleep_until(wake).await;
        }

        harness_info!(self.component(), "⏱️ Timed out after {:?}, stopping process", timeout);
        self.stop();
        self.wait_for_exit().await
    }

    async fn wait_for_exit(&self) -> ExitStatus {
        let mut rx = self.status_rx.clone();
        let status = rx.wait_for(Option::is_some).await.map(|status| *status);
        match status {
            Ok(Some(status)) => status,
            _ => self.exit_status().unwrap_or(ExitStatus::Unknown),
        }
    }

    /// Terminate then kill the process. Best effort: failures are logged only.
    pub fn stop(&self) {
        if !self.is_running() {
            harness_debug!(self.component(), "Stop requested for exited process");
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.terminate() {
            harness_error!(self.component(), "Failed to terminate process: {}", e);
        }
        self.kill();
    }

    #[cfg(unix)]
    fn terminate(&self) -> std::io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> std::io::Result<()> {
        Ok(())
    }

    /// Ask the reaper to kill the child; kill failures are logged there.
    fn kill(&self) {
        // Full: a kill is already queued. Closed: the process is already reaped.
        let _ = self.kill_tx.try_send(());
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_running() {
            self.kill();
        }
    }
}

fn build_command(cmd: &[String], env: Option<&Environment>, cwd: Option<&Path>) -> OrchestratorResult<Command> {
    let (program, args) = cmd.split_first().ok_or_else(|| OrchestratorError::Spawn {
        command: Vec::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;

    let mut command = Command::new(program);
    command.args(args);
    if let Some(env) = env {
        command.env_clear().envs(env.iter());
    }
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    Ok(command)
}

fn pump_lines<R>(reader: R, output: Arc<watch::Sender<OutputState>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match read_bounded_line(&mut reader, &mut buf).await {
                Ok(false) => break,
                Ok(true) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    output.send_modify(|state| state.push(line));
                }
                Err(e) => {
                    tracing::debug!("Output stream read failed: {}", e);
                    break;
                }
            }
        }
        output.send_modify(|state| state.open_streams -= 1);
    });
}

/// Read up to and including the next newline, stopping early at
/// [`MAX_LINE_BYTES`]. Returns `false` at end of stream with nothing read.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (consumed, complete) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(!buf.is_empty());
            }
            let window = &available[..available.len().min(MAX_LINE_BYTES - buf.len())];
            match window.iter().position(|byte| *byte == b'\n') {
                Some(end) => {
                    buf.extend_from_slice(&window[..=end]);
                    (end + 1, true)
                }
                None => {
                    buf.extend_from_slice(window);
                    (window.len(), buf.len() >= MAX_LINE_BYTES)
                }
            }
        };
        reader.consume(consumed);
        if complete {
            return Ok(true);
        }
    }
}

fn spawn_reaper(
    mut child: Child,
    pid: Option<u32>,
    status_tx: watch::Sender<Option<ExitStatus>>,
    mut kill_rx: mpsc::Receiver<()>,
) {
    let component = Component::Process(pid.unwrap_or(0));
    tokio::spawn(async move {
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(()) = kill_rx.recv() => {
                    if let Err(e) = child.start_kill() {
                        harness_error!(component, "Failed to kill process: {}", e);
                    }
                }
            }
        };

        let status = match status {
            Ok(status) => ExitStatus::from_std(status),
            Err(e) => {
                harness_error!(component, "Failed to collect exit status: {}", e);
                ExitStatus::Unknown
            }
        };
        harness_debug!(component, "Process exited: {}", status);
        status_tx.send_replace(Some(status));
    });
}
