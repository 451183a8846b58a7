//! Recorder system module
//!
//! - `lifecycle`: the [`Recorder`] handle and its exit handling
//! - `path`: output directory resolution and segment numbering
//! - `ring`: bounded buffer of recent diagnostic lines
//! - `state`: state machine, capture task and events
//! - `tables`: process-wide directory claims and upload status

pub mod lifecycle;
pub mod path;
pub mod ring;
pub mod state;
pub mod tables;

pub use lifecycle::{Recorder, RecorderContext};
pub use path::{PathResolver, ResolvedPath};
pub use ring::DiagnosticRing;
pub use state::{CaptureTask, ExitSummary, RecorderEvent, RecorderState};
pub use tables::{DirectoryClaims, UploadState, UploadStatusTable};
