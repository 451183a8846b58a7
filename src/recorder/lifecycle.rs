//! Recorder lifecycle
//!
//! A [`Recorder`] owns one capture session: it resolves the output
//! directory, claims it, keeps `fileStatus.json` current and supervises the
//! capture process. When the process exits without a stop request it
//! notifies the scheduler with a [`RecorderEvent::StreamDisconnect`].
//!
//! All state lives behind one mutex, so `start_record`, `stop_record` and
//! the exit handler are serialized per recorder no matter which runtime
//! thread they run on.

use super::path::PathResolver;
use super::state::{CaptureTask, ExitSummary, RecorderEvent, RecorderState};
use super::tables::{DirectoryClaims, UploadStatusTable};
use crate::capture::{
    supervise, CaptureLauncher, CapturePlan, ExitReport, FfmpegLauncher, ProcessHandle,
    SupervisorOptions,
};
use crate::config::RecorderConfig;
use crate::status;
use crate::utils::error::{RecorderError, RecorderResult};
use chrono::Local;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Collaborators shared by every recorder in the process
#[derive(Clone)]
pub struct RecorderContext {
    pub config: Arc<RecorderConfig>,
    pub claims: DirectoryClaims,
    pub uploads: UploadStatusTable,
    pub events: mpsc::UnboundedSender<RecorderEvent>,
    pub launcher: Arc<dyn CaptureLauncher>,
}

impl RecorderContext {
    /// Context launching `config.ffmpeg_path`, with fresh shared tables
    pub fn new(config: RecorderConfig, events: mpsc::UnboundedSender<RecorderEvent>) -> Self {
        let launcher = Arc::new(FfmpegLauncher::new(config.ffmpeg_path.clone()));
        Self {
            config: Arc::new(config),
            claims: DirectoryClaims::new(),
            uploads: UploadStatusTable::new(),
            events,
            launcher,
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn CaptureLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_tables(mut self, claims: DirectoryClaims, uploads: UploadStatusTable) -> Self {
        self.claims = claims;
        self.uploads = uploads;
        self
    }
}

struct Inner {
    task: CaptureTask,
    state: RecorderState,
    save_path: Option<PathBuf>,
    process: Option<ProcessHandle>,
    last_exit: Option<ExitSummary>,
    /// Incremented per launch so a late exit can never touch a newer launch
    launches: u64,
}

/// Handle to one capture session. Clones share the session.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Mutex<Inner>>,
    state_tx: Arc<watch::Sender<RecorderState>>,
    ctx: RecorderContext,
    span: tracing::Span,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Recorder")
            .field("name", &inner.task.name)
            .field("state", &inner.state)
            .field("save_path", &inner.save_path)
            .finish()
    }
}

impl Recorder {
    pub fn new(task: CaptureTask, ctx: RecorderContext) -> Self {
        let span = tracing::info_span!("recorder", name = %task.name);
        let (state_tx, _) = watch::channel(RecorderState::Idle);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                task,
                state: RecorderState::Idle,
                save_path: None,
                process: None,
                last_exit: None,
                launches: 0,
            })),
            state_tx: Arc::new(state_tx),
            ctx,
            span,
        }
    }

    /// Launch capture, optionally from a refreshed stream URL.
    ///
    /// Valid from `Idle` or after the previous process has exited. Errors
    /// from directory or status-file handling are returned and leave the
    /// recorder in its previous state with no claim held.
    pub fn start_record(&self, stream_url: Option<String>) -> RecorderResult<()> {
        let _entered = self.span.enter();
        let mut inner = self.inner.lock();

        if !inner.state.can_start() {
            return Err(RecorderError::AlreadyRunning);
        }
        if let Some(url) = stream_url {
            inner.task.stream_url = url;
        }

        let config = &self.ctx.config;
        tracing::info!(
            "Start recording {}, stream: {}",
            inner.task.name,
            inner.task.stream_url
        );

        let resolver = PathResolver::new(
            &config.save_root,
            &config.video_ext,
            &self.ctx.claims,
            &self.ctx.uploads,
        );
        let resolved = resolver.resolve(
            &inner.task.name,
            &inner.task.session_label,
            Local::now().time(),
        )?;

        self.ctx.claims.claim(&resolved.dir);
        tracing::info!("Recording session info for {} in {:?}", inner.task.name, resolved.dir);
        if let Err(e) = status::write_or_update(
            &resolved.dir,
            &inner.task.name,
            &resolved.session_label,
            &inner.task.owner_info,
        ) {
            self.ctx.claims.release(&resolved.dir);
            return Err(e);
        }
        inner.task.session_label = resolved.session_label;

        let plan = CapturePlan::new(
            config,
            &inner.task.name,
            &inner.task.session_label,
            &inner.task.stream_url,
            &resolved.dir,
            resolved.start_number,
        );

        inner.launches += 1;
        inner.save_path = Some(resolved.dir);
        inner.last_exit = None;
        inner.state = RecorderState::Running;
        self.state_tx.send_replace(RecorderState::Running);

        let launch = inner.launches;
        let recorder = self.clone();
        let options = SupervisorOptions {
            label: inner.task.name.clone(),
            diagnostic_capacity: config.diagnostic_capacity,
            stop_timeout: config.stop_timeout(),
        };
        let handle = supervise(self.ctx.launcher.as_ref(), &plan, options, move |report| {
            recorder.handle_exit(launch, report)
        });
        inner.process = Some(handle);

        Ok(())
    }

    /// Ask the capture process to finish and exit.
    ///
    /// Only acts while `Running`; returns `false` otherwise. The status
    /// file is left to the exit handler, which records `endRecordTime`
    /// once the process has actually gone.
    pub fn stop_record(&self) -> bool {
        let _entered = self.span.enter();
        let mut inner = self.inner.lock();

        if inner.state != RecorderState::Running {
            tracing::debug!("Stop ignored while {}", inner.state);
            return false;
        }

        inner.state = RecorderState::Stopping;
        self.state_tx.send_replace(RecorderState::Stopping);

        tracing::info!("Stop recording {}", inner.task.name);
        if let Some(process) = &inner.process {
            if !process.request_quit() {
                tracing::debug!("Capture process already gone");
            }
        }
        if let Some(dir) = &inner.save_path {
            self.ctx.claims.release(dir);
        }

        true
    }

    /// Kill the capture process regardless of state.
    ///
    /// This is not a stop request: a recorder killed while `Running` ends
    /// up `Disconnected` and notifies the scheduler.
    pub fn terminate(&self) -> bool {
        let _entered = self.span.enter();
        let inner = self.inner.lock();

        match &inner.process {
            Some(process) => {
                tracing::warn!("Killing capture process for {}", inner.task.name);
                process.kill()
            }
            None => false,
        }
    }

    /// True until the exit handler for the last launch has run
    pub fn is_active(&self) -> bool {
        !self.inner.lock().state.is_terminal()
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RecorderState> {
        self.state_tx.subscribe()
    }

    /// Wait until no process is running, returning the settled state
    pub async fn wait_for_exit(&self) -> RecorderState {
        let mut rx = self.subscribe_state();
        let settled = rx
            .wait_for(|state| !matches!(state, RecorderState::Running | RecorderState::Stopping))
            .await
            .map(|state| *state);

        match settled {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().task.name.clone()
    }

    pub fn task(&self) -> CaptureTask {
        self.inner.lock().task.clone()
    }

    pub fn save_path(&self) -> Option<PathBuf> {
        self.inner.lock().save_path.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.lock().process.as_ref().and_then(ProcessHandle::pid)
    }

    pub fn last_exit(&self) -> Option<ExitSummary> {
        self.inner.lock().last_exit.clone()
    }

    fn handle_exit(&self, launch: u64, report: ExitReport) {
        let _entered = self.span.enter();
        let mut inner = self.inner.lock();

        if inner.launches != launch {
            tracing::warn!("Ignoring exit of superseded launch {}", launch);
            return;
        }

        let by_user = inner.state == RecorderState::Stopping;
        tracing::info!(
            "Stream {} exited with code {:?}{}, directory {:?}",
            inner.task.name,
            report.exit_code,
            if report.forced { " (killed)" } else { "" },
            inner.save_path
        );
        if let Some(error) = &report.launch_error {
            tracing::error!("Capture process never started: {}", error);
        }
        if !report.diagnostics.is_empty() {
            tracing::info!("{}", report.diagnostics.join("\n"));
        }

        if let Some(dir) = inner.save_path.clone() {
            if let Err(e) = status::write_or_update(
                &dir,
                &inner.task.name,
                &inner.task.session_label,
                &inner.task.owner_info,
            ) {
                tracing::error!("Failed to update status in {:?}: {}", dir, e);
            }
            self.ctx.claims.release(&dir);
        }

        let state = if by_user {
            RecorderState::StoppedByUser
        } else {
            RecorderState::Disconnected
        };
        inner.state = state;
        inner.process = None;
        inner.last_exit = Some(ExitSummary {
            exit_code: report.exit_code,
            by_user,
            forced: report.forced,
        });

        if !by_user {
            let event = RecorderEvent::StreamDisconnect {
                recorder: self.clone(),
                exit_code: report.exit_code,
            };
            if self.ctx.events.send(event).is_err() {
                tracing::debug!("No scheduler listening for disconnects");
            }
        }

        self.state_tx.send_replace(state);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::capture::supervisor::tests::{BrokenLauncher, ScriptLauncher};
    use crate::recorder::tables::UploadState;
    use crate::status::{read_status, status_path, OwnerInfo};
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const LABEL: &str = "2024-05-01";

    struct Harness {
        root: TempDir,
        ctx: RecorderContext,
        events: mpsc::UnboundedReceiver<RecorderEvent>,
        launcher: Arc<ScriptLauncher>,
    }

    fn harness(script: &str) -> Harness {
        let root = tempdir().unwrap();
        let (tx, events) = mpsc::unbounded_channel();
        let launcher = Arc::new(ScriptLauncher::new(script));
        let ctx = RecorderContext::new(RecorderConfig::with_save_root(root.path()), tx)
            .with_launcher(launcher.clone());
        Harness {
            root,
            ctx,
            events,
            launcher,
        }
    }

    fn task() -> CaptureTask {
        CaptureTask::new("alice", "https://cdn.example.com/live.flv", OwnerInfo::new("room"))
            .with_session_label(LABEL)
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<RecorderEvent>) -> RecorderEvent {
        tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_start_claims_and_creates_status() {
        let h = harness("exec sleep 30");
        let recorder = Recorder::new(task(), h.ctx.clone());

        recorder.start_record(None).unwrap();
        let dir = h.root.path().join("alice").join(LABEL);

        assert_eq!(recorder.state(), RecorderState::Running);
        assert_eq!(recorder.save_path(), Some(dir.clone()));
        assert!(h.ctx.claims.is_claimed(&dir));
        assert_eq!(h.launcher.plans.lock()[0].start_number, 0);

        let status = read_status(&dir).unwrap().unwrap();
        assert!(status.start_record_time.is_some());
        assert!(status.end_record_time.is_none());
        assert!(!status.is_posted);
        assert!(!status.is_failed);

        assert!(matches!(recorder.start_record(None), Err(RecorderError::AlreadyRunning)));
        recorder.terminate();
        recorder.wait_for_exit().await;
    }

    #[tokio::test]
    async fn test_stop_then_exit_is_silent() {
        let mut h = harness("read cmd; exit 0");
        let recorder = Recorder::new(task(), h.ctx.clone());
        recorder.start_record(None).unwrap();
        let dir = recorder.save_path().unwrap();

        assert!(recorder.stop_record());
        assert_eq!(recorder.state(), RecorderState::Stopping);
        assert!(!h.ctx.claims.is_claimed(&dir));
        assert!(recorder.is_active());
        assert!(!recorder.stop_record());

        assert_eq!(recorder.wait_for_exit().await, RecorderState::StoppedByUser);
        assert!(!recorder.is_active());
        assert!(!h.ctx.claims.is_claimed(&dir));
        assert!(h.events.try_recv().is_err());

        let exit = recorder.last_exit().unwrap();
        assert_eq!(exit.exit_code, Some(0));
        assert!(exit.by_user);
        assert!(!exit.forced);

        let status = read_status(&dir).unwrap().unwrap();
        assert!(status.end_record_time.is_some());
        assert!(!recorder.stop_record());
    }

    #[tokio::test]
    async fn test_crash_notifies_once() {
        let mut h = harness("echo 'connection reset' >&2; exit 1");
        let recorder = Recorder::new(task(), h.ctx.clone());
        recorder.start_record(None).unwrap();
        let dir = recorder.save_path().unwrap();

        match next_event(&mut h.events).await {
            RecorderEvent::StreamDisconnect { recorder: r, exit_code } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(r.name(), "alice");
            }
        }
        assert_eq!(recorder.wait_for_exit().await, RecorderState::Disconnected);
        assert!(!h.ctx.claims.is_claimed(&dir));
        assert!(read_status(&dir).unwrap().unwrap().end_record_time.is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_external_kill_notifies() {
        let mut h = harness("exec sleep 30");
        let recorder = Recorder::new(task(), h.ctx.clone());
        recorder.start_record(None).unwrap();

        assert!(recorder.terminate());
        let RecorderEvent::StreamDisconnect { exit_code, .. } = next_event(&mut h.events).await;
        assert_eq!(exit_code, None);
        assert_eq!(recorder.wait_for_exit().await, RecorderState::Disconnected);
        assert!(h.ctx.claims.claimed_paths().is_empty());
        assert!(!recorder.terminate());

        let exit = recorder.last_exit().unwrap();
        assert!(exit.forced);
        assert!(!exit.by_user);
    }

    #[tokio::test]
    async fn test_restart_resumes_segment_numbering() {
        let mut h = harness("exit 1");
        let dir = h.root.path().join("alice").join(LABEL);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("alice-2024-05-01-part-000.mp4"), b"").unwrap();
        fs::write(dir.join("alice-2024-05-01-part-001.mp4"), b"").unwrap();

        let recorder = Recorder::new(task(), h.ctx.clone());
        recorder.start_record(None).unwrap();
        next_event(&mut h.events).await;
        recorder.wait_for_exit().await;

        fs::write(dir.join("alice-2024-05-01-part-002.mp4"), b"").unwrap();
        recorder
            .start_record(Some("https://mirror.example.com/live.flv".to_string()))
            .unwrap();
        next_event(&mut h.events).await;
        recorder.wait_for_exit().await;

        let plans = h.launcher.plans.lock();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].start_number, 2);
        assert_eq!(plans[1].start_number, 3);
        assert_eq!(plans[1].output_dir, dir);
        assert_eq!(plans[1].stream_url, "https://mirror.example.com/live.flv");
        assert_eq!(recorder.task().stream_url, "https://mirror.example.com/live.flv");
    }

    #[tokio::test]
    async fn test_posted_session_gets_new_directory() {
        let h = harness("exec sleep 30");
        let old = h.root.path().join("alice").join(LABEL);
        fs::create_dir_all(&old).unwrap();
        fs::write(status_path(&old), r#"{ "isPost": true }"#).unwrap();
        h.ctx.claims.claim(&old);

        let recorder = Recorder::new(task(), h.ctx.clone());
        recorder.start_record(None).unwrap();

        let dir = recorder.save_path().unwrap();
        let label = recorder.task().session_label;
        assert_ne!(dir, old);
        assert!(label.starts_with("2024-05-01 "));
        assert_eq!(label.len(), "2024-05-01 HH-MM".len());
        assert_eq!(dir, h.root.path().join("alice").join(&label));
        assert!(!h.ctx.claims.is_claimed(&old));
        assert!(h.ctx.claims.is_claimed(&dir));
        assert_eq!(h.launcher.plans.lock()[0].start_number, 0);
        assert_eq!(read_status(&dir).unwrap().unwrap().session_label, label);

        recorder.terminate();
        recorder.wait_for_exit().await;
    }

    #[tokio::test]
    async fn test_uploading_session_gets_new_directory() {
        let h = harness("exec sleep 30");
        let old = h.root.path().join("alice").join(LABEL);
        fs::create_dir_all(&old).unwrap();
        h.ctx.uploads.set(&old, UploadState::Uploading);

        let recorder = Recorder::new(task(), h.ctx.clone());
        recorder.start_record(None).unwrap();
        assert_ne!(recorder.save_path().unwrap(), old);

        recorder.terminate();
        recorder.wait_for_exit().await;
    }

    #[tokio::test]
    async fn test_launch_failure_is_a_disconnect() {
        let root = tempdir().unwrap();
        let (tx, mut events) = mpsc::unbounded_channel();
        let ctx = RecorderContext::new(RecorderConfig::with_save_root(root.path()), tx)
            .with_launcher(Arc::new(BrokenLauncher));
        let recorder = Recorder::new(task(), ctx.clone());

        recorder.start_record(None).unwrap();
        let RecorderEvent::StreamDisconnect { exit_code, .. } = next_event(&mut events).await;
        assert_eq!(exit_code, None);
        assert_eq!(recorder.wait_for_exit().await, RecorderState::Disconnected);
        assert!(ctx.claims.claimed_paths().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_status_fails_start() {
        let h = harness("exit 0");
        let dir = h.root.path().join("alice").join(LABEL);
        fs::create_dir_all(&dir).unwrap();
        fs::write(status_path(&dir), "{").unwrap();

        let recorder = Recorder::new(task(), h.ctx.clone());
        assert!(matches!(
            recorder.start_record(None),
            Err(RecorderError::MalformedStatus { .. })
        ));
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(h.ctx.claims.claimed_paths().is_empty());
        assert!(h.launcher.plans.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_write_keeps_label() {
        let h = harness("exit 0");
        let old = h.root.path().join("alice").join(LABEL);
        fs::create_dir_all(&old).unwrap();
        fs::write(status_path(&old), r#"{ "isPost": true }"#).unwrap();

        // Whichever minute the start lands in, its branch directory holds a broken record
        let now = Local::now();
        for t in [now, now + chrono::Duration::minutes(1)] {
            let branch = h
                .root
                .path()
                .join("alice")
                .join(format!("{} {}", LABEL, t.format("%H-%M")));
            fs::create_dir_all(&branch).unwrap();
            fs::write(status_path(&branch), "[]").unwrap();
        }

        let recorder = Recorder::new(task(), h.ctx.clone());
        assert!(matches!(
            recorder.start_record(None),
            Err(RecorderError::MalformedStatus { .. })
        ));
        assert_eq!(recorder.task().session_label, LABEL);
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.save_path().is_none());
        assert!(h.ctx.claims.claimed_paths().is_empty());
        assert!(h.launcher.plans.lock().is_empty());
    }

    #[tokio::test]
    async fn test_idle_recorder() {
        let h = harness("exit 0");
        let recorder = Recorder::new(task(), h.ctx.clone());

        assert!(recorder.is_active());
        assert!(!recorder.stop_record());
        assert!(!recorder.terminate());
        assert_eq!(recorder.wait_for_exit().await, RecorderState::Idle);
    }
}
