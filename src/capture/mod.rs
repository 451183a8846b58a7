//! External capture process
//!
//! - `ffmpeg`: argument and header construction for a capture plan
//! - `launcher`: the seam that turns a plan into a child process
//! - `supervisor`: output observation, quit/kill, exit reporting

pub mod ffmpeg;
pub mod launcher;
pub mod supervisor;

pub use ffmpeg::CapturePlan;
pub use launcher::{CaptureLauncher, FfmpegLauncher};
pub use supervisor::{supervise, ExitReport, ProcessHandle, SupervisorOptions};
