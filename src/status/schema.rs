//! Session status schema
//!
//! These types match the `fileStatus.json` format read by the upload
//! pipeline, so field names follow that file rather than Rust naming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_delay_time() -> u64 {
    2
}

fn default_copyright() -> u8 {
    2
}

// =============================================================================
// Owner Info
// =============================================================================

/// Posting metadata for a stream owner.
///
/// The recorder never interprets these fields; they are copied into the
/// status record so the upload pipeline can find them next to the segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInfo {
    pub room_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Upload category id
    #[serde(default)]
    pub tid: u32,
    #[serde(default)]
    pub upload_local_file: bool,
    #[serde(default)]
    pub delete_local_file: bool,
    /// Minutes to wait before posting
    #[serde(default)]
    pub delay_time: Option<u64>,
    #[serde(default)]
    pub template_title: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dynamic: Option<String>,
    #[serde(default)]
    pub copyright: Option<u8>,
}

impl OwnerInfo {
    pub fn new(room_url: impl Into<String>) -> Self {
        Self {
            room_url: room_url.into(),
            tags: Vec::new(),
            tid: 0,
            upload_local_file: false,
            delete_local_file: false,
            delay_time: None,
            template_title: None,
            desc: None,
            source: None,
            dynamic: None,
            copyright: None,
        }
    }
}

// =============================================================================
// Session Status
// =============================================================================

/// Contents of one `fileStatus.json`.
///
/// `is_posted` belongs to the upload pipeline. The recorder writes it once,
/// as `false`, when the file is created and only reads it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStatus {
    pub path: String,
    pub recorder_name: String,
    pub recorder_link: String,
    pub tags: Vec<String>,
    pub tid: u32,
    pub start_record_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_record_time: Option<DateTime<Utc>>,
    pub upload_local_file: bool,
    pub delete_local_file: bool,
    #[serde(rename = "isPost", alias = "isPosted")]
    pub is_posted: bool,
    pub is_failed: bool,
    pub delay_time: u64,
    pub template_title: String,
    pub desc: String,
    pub source: String,
    pub dynamic: String,
    pub copyright: u8,
    #[serde(rename = "timeV")]
    pub session_label: String,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            path: String::new(),
            recorder_name: String::new(),
            recorder_link: String::new(),
            tags: Vec::new(),
            tid: 0,
            start_record_time: None,
            end_record_time: None,
            upload_local_file: false,
            delete_local_file: false,
            is_posted: false,
            is_failed: false,
            delay_time: default_delay_time(),
            template_title: String::new(),
            desc: String::new(),
            source: String::new(),
            dynamic: String::new(),
            copyright: default_copyright(),
            session_label: String::new(),
        }
    }
}

impl SessionStatus {
    /// Fresh record for a directory that has never been written to
    pub fn new(
        path: String,
        name: &str,
        session_label: &str,
        owner: &OwnerInfo,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            path,
            recorder_name: name.to_string(),
            recorder_link: owner.room_url.clone(),
            tags: owner.tags.clone(),
            tid: owner.tid,
            start_record_time: Some(started_at),
            end_record_time: None,
            upload_local_file: owner.upload_local_file,
            delete_local_file: owner.delete_local_file,
            is_posted: false,
            is_failed: false,
            delay_time: owner.delay_time.unwrap_or_else(default_delay_time),
            template_title: owner.template_title.clone().unwrap_or_default(),
            desc: owner.desc.clone().unwrap_or_default(),
            source: owner.source.clone().unwrap_or_default(),
            dynamic: owner.dynamic.clone().unwrap_or_default(),
            copyright: owner.copyright.unwrap_or_else(default_copyright),
            session_label: session_label.to_string(),
        }
    }
}
