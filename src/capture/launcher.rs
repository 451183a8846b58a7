//! Capture process launchers
//!
//! The supervisor only needs a child with piped stdio; how that child is
//! produced is behind [`CaptureLauncher`].

use super::ffmpeg::CapturePlan;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Starts the external process for a capture plan
///
/// Implementations must pipe stdin, stdout and stderr.
pub trait CaptureLauncher: Send + Sync {
    /// Short name for logs
    fn id(&self) -> &str;

    fn launch(&self, plan: &CapturePlan) -> std::io::Result<Child>;
}

/// Launches the ffmpeg binary with [`CapturePlan::args`]
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl CaptureLauncher for FfmpegLauncher {
    fn id(&self) -> &str {
        "ffmpeg"
    }

    fn launch(&self, plan: &CapturePlan) -> std::io::Result<Child> {
        let args = plan.args();
        tracing::info!("Starting {:?} for {}: {:?}", self.program, plan.name, args);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        command.spawn()
    }
}
