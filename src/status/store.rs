//! Session status read/write operations
//!
//! Each output directory holds a single `fileStatus.json`. The recorder
//! creates it once; every later write is a read-merge-write that only
//! touches `endRecordTime`, so fields owned by other writers (notably
//! `isPost`) survive.

use super::schema::{OwnerInfo, SessionStatus};
use crate::utils::error::{RecorderError, RecorderResult};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Status file name inside every session directory
pub const STATUS_FILE_NAME: &str = "fileStatus.json";

/// Outcome of [`write_or_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    Created,
    Updated,
}

/// Path of the status file for a directory
pub fn status_path(dir: &Path) -> PathBuf {
    dir.join(STATUS_FILE_NAME)
}

/// Read the status record, `None` if the directory has none yet
pub fn read_status(dir: &Path) -> RecorderResult<Option<SessionStatus>> {
    let path = status_path(dir);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)?;
    let status = serde_json::from_str(&content)
        .map_err(|source| RecorderError::MalformedStatus { path, source })?;

    Ok(Some(status))
}

/// Whether the session in `dir` was already posted by the upload pipeline
pub fn sync(dir: &Path) -> RecorderResult<bool> {
    Ok(read_status(dir)?.map(|s| s.is_posted).unwrap_or(false))
}

/// Create the status record or stamp `endRecordTime` on the existing one
pub fn write_or_update(
    dir: &Path,
    name: &str,
    session_label: &str,
    owner: &OwnerInfo,
) -> RecorderResult<StatusWrite> {
    write_or_update_at(dir, name, session_label, owner, Utc::now())
}

pub(crate) fn write_or_update_at(
    dir: &Path,
    name: &str,
    session_label: &str,
    owner: &OwnerInfo,
    now: DateTime<Utc>,
) -> RecorderResult<StatusWrite> {
    let path = status_path(dir);

    if !path.exists() {
        let status = SessionStatus::new(
            dir.to_string_lossy().to_string(),
            name,
            session_label,
            owner,
            now,
        );
        let content = serde_json::to_string_pretty(&status)?;
        write_atomic(&path, &content)?;
        tracing::debug!("Created {:?}: {}", path, content);
        return Ok(StatusWrite::Created);
    }

    let content = fs::read_to_string(&path)?;
    let mut record: Value = serde_json::from_str(&content).map_err(|source| {
        RecorderError::MalformedStatus {
            path: path.clone(),
            source,
        }
    })?;

    let Some(fields) = record.as_object_mut() else {
        return Err(RecorderError::MalformedStatus {
            path,
            source: serde::de::Error::custom("status record is not a JSON object"),
        });
    };
    fields.insert("endRecordTime".to_string(), serde_json::to_value(now)?);

    let content = serde_json::to_string_pretty(&record)?;
    write_atomic(&path, &content)?;
    tracing::info!("Wrote endRecordTime to {:?}", path);

    Ok(StatusWrite::Updated)
}

fn write_atomic(path: &Path, content: &str) -> RecorderResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
