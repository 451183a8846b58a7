//! Capture process supervision
//!
//! Owns the child process in a background task. stdout lines are logged as
//! they arrive, stderr lines go to a [`DiagnosticRing`], and quit/kill
//! requests arrive over a channel. When the process exits the ring is
//! drained into an [`ExitReport`] and handed to the exit callback, exactly
//! once per launch.

use super::ffmpeg::CapturePlan;
use super::launcher::CaptureLauncher;
use crate::recorder::ring::DiagnosticRing;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

/// Upper bound on waiting for the output readers after exit. A grandchild
/// holding the pipes open must not stall the exit handler.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive failed reads after which an output pipe is abandoned
const MAX_READ_ERRORS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorCommand {
    /// Write `q` to stdin and close it
    Quit,
    /// Kill the process
    Kill,
}

/// Settings for one supervised process
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Prefix for log lines
    pub label: String,
    pub diagnostic_capacity: usize,
    /// Kill the process if it is still alive this long after a quit
    pub stop_timeout: Option<Duration>,
}

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// `None` for signal deaths and launch failures
    pub exit_code: Option<i32>,
    /// Most recent stderr lines, oldest first
    pub diagnostics: Vec<String>,
    /// Set when the process never started
    pub launch_error: Option<String>,
    /// The process was killed rather than exiting by itself
    pub forced: bool,
}

/// Control handle for a supervised process
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    pid: Option<u32>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the process to finish its current segment and exit.
    /// Returns `false` once the process is gone.
    pub fn request_quit(&self) -> bool {
        self.commands.send(SupervisorCommand::Quit).is_ok()
    }

    /// Kill the process. Returns `false` once the process is gone.
    pub fn kill(&self) -> bool {
        self.commands.send(SupervisorCommand::Kill).is_ok()
    }
}

/// Launch `plan` and supervise it on the current Tokio runtime.
///
/// `on_exit` runs on a runtime task after the process has exited, or right
/// away (still asynchronously) if the launch fails.
pub fn supervise<F>(
    launcher: &dyn CaptureLauncher,
    plan: &CapturePlan,
    options: SupervisorOptions,
    on_exit: F,
) -> ProcessHandle
where
    F: FnOnce(ExitReport) + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let span = tracing::Span::current();

    match launcher.launch(plan) {
        Ok(child) => {
            let pid = child.id();
            tracing::debug!("{} launched {} (pid {:?})", options.label, launcher.id(), pid);

            tokio::spawn(
                async move {
                    let report = run(child, rx, options).await;
                    on_exit(report);
                }
                .instrument(span),
            );

            ProcessHandle { commands: tx, pid }
        }
        Err(e) => {
            tracing::error!("{} failed to launch {}: {}", options.label, launcher.id(), e);
            let launch_error = e.to_string();

            tokio::spawn(
                async move {
                    drop(rx);
                    on_exit(ExitReport {
                        exit_code: None,
                        diagnostics: Vec::new(),
                        launch_error: Some(launch_error),
                        forced: false,
                    });
                }
                .instrument(span),
            );

            ProcessHandle {
                commands: tx,
                pid: None,
            }
        }
    }
}

async fn run(
    mut child: Child,
    mut commands: mpsc::UnboundedReceiver<SupervisorCommand>,
    options: SupervisorOptions,
) -> ExitReport {
    let ring = Arc::new(Mutex::new(DiagnosticRing::new(options.diagnostic_capacity)));

    let stdout_task = child.stdout.take().map(|stdout| {
        let label = options.label.clone();
        spawn_reader(stdout, move |line| {
            tracing::info!("{} output: {}", label, line);
        })
    });

    let stderr_task = child.stderr.take().map(|stderr| {
        let ring = ring.clone();
        spawn_reader(stderr, move |line| ring.lock().push(line))
    });

    let mut stdin = child.stdin.take();
    let mut commands_open = true;
    let mut deadline: Option<Instant> = None;
    let mut forced = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            command = commands.recv(), if commands_open => match command {
                Some(SupervisorCommand::Quit) => {
                    match stdin.take() {
                        Some(mut pipe) => {
                            if let Err(e) = pipe.write_all(b"q").await {
                                tracing::warn!("{} could not send quit: {}", options.label, e);
                            }
                            // Dropping the pipe closes stdin
                        }
                        None => tracing::debug!("{} quit already sent", options.label),
                    }
                    if deadline.is_none() {
                        deadline = options.stop_timeout.map(|timeout| Instant::now() + timeout);
                    }
                }
                Some(SupervisorCommand::Kill) => {
                    forced = true;
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("{} kill failed: {}", options.label, e);
                    }
                }
                None => commands_open = false,
            },
            _ = wait_until(deadline), if deadline.is_some() => {
                tracing::warn!(
                    "{} still running {:?} after quit, killing",
                    options.label,
                    options.stop_timeout.unwrap_or_default()
                );
                deadline = None;
                forced = true;
                if let Err(e) = child.start_kill() {
                    tracing::warn!("{} kill failed: {}", options.label, e);
                }
            }
        }
    };
    drop(stdin);
    drop(commands);

    let exit_code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::error!("{} wait failed: {}", options.label, e);
            None
        }
    };

    for task in [stdout_task, stderr_task].into_iter().flatten() {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, task).await.is_err() {
            tracing::debug!("{} output pipe still open after exit", options.label);
        }
    }

    let diagnostics = ring.lock().drain();
    ExitReport {
        exit_code,
        diagnostics,
        launch_error: None,
        forced,
    }
}

fn spawn_reader<R, F>(pipe: R, mut on_line: F) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    F: FnMut(String) + Send + 'static,
{
    tokio::spawn(
        async move {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            let mut errors = 0;

            // Stream metadata is not always UTF-8; keep the pipe drained either way
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        errors = 0;
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end();
                        if !line.is_empty() {
                            on_line(line.to_string());
                        }
                    }
                    Err(e) => {
                        errors += 1;
                        tracing::debug!("Output read failed: {}", e);
                        if errors >= MAX_READ_ERRORS {
                            break;
                        }
                    }
                }
            }
        }
        .in_current_span(),
    )
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
