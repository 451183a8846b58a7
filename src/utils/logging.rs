//! Tracing subscriber setup
//!
//! Console output always; a size-capped rotating log file when one is
//! configured.

use crate::config::LogConfig;
use crate::utils::error::{RecorderError, RecorderResult};
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub fn default_directive(config: &LogConfig) -> &'static str {
    if config.debug {
        "stream_recorder=debug"
    } else {
        "stream_recorder=info"
    }
}

/// Log file rolled over to `<file>.1 .. <file>.<backups>` once it reaches
/// the size cap. Every write is flushed so nothing is lost on exit.
pub struct RotatingLog {
    appender: BasicRollingFileAppender,
}

impl RotatingLog {
    pub fn open(path: &Path, max_size: u64, backups: usize) -> RecorderResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let condition = RollingConditionBasic::new().max_size(max_size);
        let appender = BasicRollingFileAppender::new(path, condition, backups)?;
        Ok(Self { appender })
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.appender.write(buf)?;
        self.appender.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.appender.flush()
    }
}

/// Initialize the global tracing subscriber
///
/// Fails if a subscriber is already installed or the log file cannot be
/// opened. Callers that may initialize twice can ignore the error.
pub fn init(config: &LogConfig) -> RecorderResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(config).into());

    let file_layer = match &config.log_file {
        Some(path) => {
            let log = RotatingLog::open(path, config.max_log_size, config.log_backups)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(log)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| RecorderError::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!("Logging initialized ({})", default_directive(config));
    Ok(())
}
