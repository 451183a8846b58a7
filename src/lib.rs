//! Stream Recorder - supervised ffmpeg capture of live streams.
//!
//! Each [`Recorder`] records one stream owner into hour-long segment files
//! under `<save_root>/<name>/<session label>`, keeps a `fileStatus.json`
//! next to them for the upload pipeline, and reports unexpected exits to
//! the scheduler as [`RecorderEvent::StreamDisconnect`].

pub mod capture;
pub mod config;
pub mod recorder;
pub mod status;
pub mod utils;

pub use config::{AppConfig, LogConfig, RecorderConfig};
pub use recorder::{
    CaptureTask, DirectoryClaims, Recorder, RecorderContext, RecorderEvent, RecorderState,
    UploadState, UploadStatusTable,
};
pub use status::{OwnerInfo, SessionStatus};
pub use utils::{RecorderError, RecorderResult};
