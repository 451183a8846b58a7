//! Tables shared between recorders and the upload pipeline
//!
//! Both are cheap cloneable handles over a lock-guarded map, so recorders
//! running on different runtime threads see one consistent view.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directories currently being written by a live capture process.
///
/// A path is present exactly while some recorder owns it and its process
/// is running.
#[derive(Debug, Clone, Default)]
pub struct DirectoryClaims {
    inner: Arc<RwLock<HashMap<PathBuf, ()>>>,
}

impl DirectoryClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, path: &Path) {
        self.inner.write().insert(path.to_path_buf(), ());
    }

    /// Returns whether a claim was present
    pub fn release(&self, path: &Path) -> bool {
        self.inner.write().remove(path).is_some()
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.inner.read().contains_key(path)
    }

    pub fn claimed_paths(&self) -> Vec<PathBuf> {
        self.inner.read().keys().cloned().collect()
    }
}

/// Upload progress of a session directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Uploading,
    Uploaded,
    Failed,
}

/// Upload progress per directory.
///
/// Written only by the upload pipeline; recorders read it to avoid
/// appending to a session that is being handed off.
#[derive(Debug, Clone, Default)]
pub struct UploadStatusTable {
    inner: Arc<RwLock<HashMap<PathBuf, UploadState>>>,
}

impl UploadStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &Path, state: UploadState) {
        self.inner.write().insert(path.to_path_buf(), state);
    }

    pub fn clear(&self, path: &Path) {
        self.inner.write().remove(path);
    }

    pub fn get(&self, path: &Path) -> Option<UploadState> {
        self.inner.read().get(path).copied()
    }

    pub fn is_uploading(&self, path: &Path) -> bool {
        self.get(path) == Some(UploadState::Uploading)
    }
}
