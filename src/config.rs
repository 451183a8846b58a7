//! Recorder and logging configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file
//! (or no file at all) is valid.

use crate::utils::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Capture settings shared by every recorder in the process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Root under which `<name>/<sessionLabel>` directories are created
    #[serde(default = "default_save_root")]
    pub save_root: PathBuf,
    /// Capture binary to launch
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_segment_duration_secs")]
    pub segment_duration_secs: u64,
    /// Extension of segment files, also used to count segments on resume
    #[serde(default = "default_video_ext")]
    pub video_ext: String,
    /// Number of stderr lines kept for the exit log
    #[serde(default = "default_diagnostic_capacity")]
    pub diagnostic_capacity: usize,
    /// Read timeout handed to the capture process, in microseconds
    #[serde(default = "default_rw_timeout_us")]
    pub rw_timeout_us: u64,
    #[serde(default = "default_reconnect_delay_max_secs")]
    pub reconnect_delay_max_secs: u64,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    #[serde(default = "default_highpass_hz")]
    pub highpass_hz: u32,
    #[serde(default = "default_io_buffer_size")]
    pub io_buffer_size: u64,
    /// Force-kill a process that ignores the quit command for this long.
    /// `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout_secs: Option<u64>,
}

fn default_save_root() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("download")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_segment_duration_secs() -> u64 {
    3600
}

fn default_video_ext() -> String {
    "mp4".to_string()
}

fn default_diagnostic_capacity() -> usize {
    10
}

fn default_rw_timeout_us() -> u64 {
    30_000_000
}

fn default_reconnect_delay_max_secs() -> u64 {
    5
}

fn default_audio_bitrate() -> String {
    "320k".to_string()
}

fn default_highpass_hz() -> u32 {
    30
}

fn default_io_buffer_size() -> u64 {
    8 * 1024 * 1024
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            save_root: default_save_root(),
            ffmpeg_path: default_ffmpeg_path(),
            segment_duration_secs: default_segment_duration_secs(),
            video_ext: default_video_ext(),
            diagnostic_capacity: default_diagnostic_capacity(),
            rw_timeout_us: default_rw_timeout_us(),
            reconnect_delay_max_secs: default_reconnect_delay_max_secs(),
            audio_bitrate: default_audio_bitrate(),
            highpass_hz: default_highpass_hz(),
            io_buffer_size: default_io_buffer_size(),
            stop_timeout_secs: None,
        }
    }
}

impl RecorderConfig {
    /// Config rooted at `save_root`, everything else default
    pub fn with_save_root(save_root: impl Into<PathBuf>) -> Self {
        Self {
            save_root: save_root.into(),
            ..Self::default()
        }
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Lower the default filter from info to debug
    #[serde(default)]
    pub debug: bool,
    /// Append log output to this file in addition to the console
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Size in bytes at which the log file is rolled over
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u64,
    /// Rolled-over files kept next to the log file
    #[serde(default = "default_log_backups")]
    pub log_backups: usize,
}

fn default_max_log_size() -> u64 {
    1024 * 1024
}

fn default_log_backups() -> usize {
    5
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_file: None,
            max_log_size: default_max_log_size(),
            log_backups: default_log_backups(),
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> RecorderResult<Self> {
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| RecorderError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| RecorderError::Config(format!("Failed to parse {:?}: {}", path, e)))?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RecorderResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
