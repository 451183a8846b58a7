//! Per-session status records
//!
//! One `fileStatus.json` per output directory, shared with the upload
//! pipeline.

pub mod schema;
pub mod store;

pub use schema::{OwnerInfo, SessionStatus};
pub use store::{
    read_status, status_path, sync, write_or_update, StatusWrite, STATUS_FILE_NAME,
};
