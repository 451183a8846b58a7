//! FFmpeg invocation for live capture
//!
//! Builds the argument list for a segmenting, self-reconnecting stream
//! copy. Audio is re-encoded through a high-pass filter; video is copied
//! with keyframes forced at every segment boundary so each part plays on
//! its own.

use crate::config::RecorderConfig;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Oldest and newest Chrome major version used in the User-Agent header
const CHROME_MAJOR_RANGE: (u32, u32) = (100, 120);

/// Everything needed to launch one capture process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub name: String,
    pub session_label: String,
    pub stream_url: String,
    pub output_dir: PathBuf,
    /// Number of the first segment written by this process
    pub start_number: usize,
    pub segment_duration_secs: u64,
    pub video_ext: String,
    pub rw_timeout_us: u64,
    pub reconnect_delay_max_secs: u64,
    pub audio_bitrate: String,
    pub highpass_hz: u32,
    pub io_buffer_size: u64,
    /// Major version advertised in the User-Agent header
    pub chrome_major: u32,
}

impl CapturePlan {
    pub fn new(
        config: &RecorderConfig,
        name: &str,
        session_label: &str,
        stream_url: &str,
        output_dir: &Path,
        start_number: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            session_label: session_label.to_string(),
            stream_url: stream_url.to_string(),
            output_dir: output_dir.to_path_buf(),
            start_number,
            segment_duration_secs: config.segment_duration_secs,
            video_ext: config.video_ext.clone(),
            rw_timeout_us: config.rw_timeout_us,
            reconnect_delay_max_secs: config.reconnect_delay_max_secs,
            audio_bitrate: config.audio_bitrate.clone(),
            highpass_hz: config.highpass_hz,
            io_buffer_size: config.io_buffer_size,
            chrome_major: random_chrome_major(),
        }
    }

    /// `<dir>/<name>-<label>-part-%03d.<ext>`
    pub fn output_pattern(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{}-part-%03d.{}",
            self.name, self.session_label, self.video_ext
        ))
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-headers".to_string(),
            request_headers(self.chrome_major),
            "-i".to_string(),
            self.stream_url.clone(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            // Cut low-frequency rumble before encoding
            "-af".to_string(),
            format!("highpass=f={}", self.highpass_hz),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ];

        // Segmented output
        args.extend([
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            self.segment_duration_secs.to_string(),
            "-segment_start_number".to_string(),
            self.start_number.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
        ]);

        // Network resilience
        args.extend([
            "-rw_timeout".to_string(),
            self.rw_timeout_us.to_string(),
            "-reconnect".to_string(),
            "1".to_string(),
            "-reconnect_delay_max".to_string(),
            self.reconnect_delay_max_secs.to_string(),
            "-reconnect_on_http_error".to_string(),
            "1".to_string(),
            "-reconnect_on_network_error".to_string(),
            "1".to_string(),
            "-reconnect_streamed".to_string(),
            "1".to_string(),
            "-reconnect_at_eof".to_string(),
            "1".to_string(),
            "-fflags".to_string(),
            "flush_packets+genpts".to_string(),
            "-buffer_size".to_string(),
            self.io_buffer_size.to_string(),
            "-force_key_frames".to_string(),
            "expr:gte(t,n_forced*segment_time)".to_string(),
        ]);

        args.push(self.output_pattern().to_string_lossy().to_string());
        args
    }
}

/// Header block for the outbound request, one CRLF-terminated line each
pub fn request_headers(chrome_major: u32) -> String {
    let headers = [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        ("Accept-Encoding", "gzip, deflate".to_string()),
        (
            "Accept-Language",
            "zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3".to_string(),
        ),
        (
            "User-Agent",
            format!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
                chrome_major
            ),
        ),
    ];

    headers
        .iter()
        .map(|(key, value)| format!("{}: {}\r\n", key, value))
        .collect()
}

/// Uniform pick from [`CHROME_MAJOR_RANGE`]
pub fn random_chrome_major() -> u32 {
    let (low, high) = CHROME_MAJOR_RANGE;
    let bytes = Uuid::new_v4().into_bytes();
    let sample = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    low + sample % (high - low + 1)
}
