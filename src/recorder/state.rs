//! Recording state management
//!
//! Defines the recorder state machine, the capture task it works on and the
//! events it emits.

use super::lifecycle::Recorder;
use crate::status::OwnerInfo;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one recorder
///
/// `Idle -> Running -> (Stopping ->) StoppedByUser | Disconnected`.
/// `Stopping` is the user-intent flag: a process that exits while the
/// recorder is `Stopping` was stopped on request, one that exits while
/// `Running` went away on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderState {
    /// Constructed, never started
    Idle,
    /// Capture process launched and not yet exited
    Running,
    /// Stop requested, waiting for the process to exit
    Stopping,
    /// Process exited after a stop request
    StoppedByUser,
    /// Process exited without a stop request
    Disconnected,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RecorderState {
    /// Exit handler has run for the last process
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::StoppedByUser | Self::Disconnected)
    }

    /// A process may be launched from this state
    pub fn can_start(self) -> bool {
        self == Self::Idle || self.is_terminal()
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::StoppedByUser => write!(f, "stopped-by-user"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// What to record and where it belongs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTask {
    /// Stable identifier of the stream owner, also the first path component
    pub name: String,
    /// Source URL; may be replaced on restart
    pub stream_url: String,
    /// Output folder label, `YYYY-MM-DD` plus ` HH-MM` after a collision
    pub session_label: String,
    pub owner_info: OwnerInfo,
}

impl CaptureTask {
    /// Task labelled with today's local date
    pub fn new(
        name: impl Into<String>,
        stream_url: impl Into<String>,
        owner_info: OwnerInfo,
    ) -> Self {
        Self {
            name: name.into(),
            stream_url: stream_url.into(),
            session_label: Local::now().format("%Y-%m-%d").to_string(),
            owner_info,
        }
    }

    pub fn with_session_label(mut self, label: impl Into<String>) -> Self {
        self.session_label = label.into();
        self
    }
}

/// How the last capture process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSummary {
    /// `None` when killed by a signal or never launched
    pub exit_code: Option<i32>,
    pub by_user: bool,
    /// Killed rather than exiting on its own
    pub forced: bool,
}

/// Events emitted to the scheduler
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// The capture process ended without a stop request. Fired exactly once
    /// per such exit; the scheduler decides whether to restart `recorder`.
    StreamDisconnect {
        recorder: Recorder,
        exit_code: Option<i32>,
    },
}
