//! Output directory resolution
//!
//! Picks `<root>/<name>/<label>` for a session and decides whether to
//! resume into it or branch off to `<label> HH-MM` because the session
//! there has already been handed to the upload pipeline.

use super::tables::{DirectoryClaims, UploadStatusTable};
use crate::status;
use crate::utils::error::RecorderResult;
use chrono::NaiveTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a session writes and which segment number it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub dir: PathBuf,
    pub session_label: String,
    pub start_number: usize,
    /// The canonical directory belonged to a posted or uploading session
    pub collided: bool,
}

pub struct PathResolver<'a> {
    root: &'a Path,
    video_ext: &'a str,
    claims: &'a DirectoryClaims,
    uploads: &'a UploadStatusTable,
}

impl<'a> PathResolver<'a> {
    pub fn new(
        root: &'a Path,
        video_ext: &'a str,
        claims: &'a DirectoryClaims,
        uploads: &'a UploadStatusTable,
    ) -> Self {
        Self {
            root,
            video_ext,
            claims,
            uploads,
        }
    }

    /// Resolve and create the directory for `name`/`session_label`.
    ///
    /// `now` supplies the `HH-MM` suffix used when the canonical directory
    /// is taken by a finished session.
    pub fn resolve(
        &self,
        name: &str,
        session_label: &str,
        now: NaiveTime,
    ) -> RecorderResult<ResolvedPath> {
        let owner_dir = self.root.join(name);
        fs::create_dir_all(&owner_dir)?;

        let canonical = owner_dir.join(session_label);
        let posted = status::sync(&canonical)?;

        if !canonical.exists() {
            fs::create_dir(&canonical)?;
            tracing::debug!("Created session directory {:?}", canonical);
            return Ok(ResolvedPath {
                dir: canonical,
                session_label: session_label.to_string(),
                start_number: 0,
                collided: false,
            });
        }

        if posted || self.uploads.is_uploading(&canonical) {
            let label = format!("{} {}", session_label, now.format("%H-%M"));
            let dir = owner_dir.join(&label);
            tracing::info!(
                "{:?} already {}, recording into {:?}",
                canonical,
                if posted { "posted" } else { "uploading" },
                dir
            );

            self.claims.release(&canonical);
            fs::create_dir_all(&dir)?;
            // Same-minute restarts land here twice; never overwrite
            let start_number = count_segments(&dir, self.video_ext)?;

            return Ok(ResolvedPath {
                dir,
                session_label: label,
                start_number,
                collided: true,
            });
        }

        let start_number = count_segments(&canonical, self.video_ext)?;
        tracing::info!("Resuming {:?} at segment {}", canonical, start_number);

        Ok(ResolvedPath {
            dir: canonical,
            session_label: session_label.to_string(),
            start_number,
            collided: false,
        })
    }
}

/// Number of files in `dir` (not recursive) with extension `ext`
pub fn count_segments(dir: &Path, ext: &str) -> RecorderResult<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::tables::UploadState;
    use crate::status::{status_path, write_or_update, OwnerInfo};
    use tempfile::tempdir;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_fresh_directory_starts_at_zero() {
        let root = tempdir().unwrap();
        let claims = DirectoryClaims::new();
        let uploads = UploadStatusTable::new();
        let resolver = PathResolver::new(root.path(), "mp4", &claims, &uploads);

        let resolved = resolver.resolve("alice", "2024-05-01", at(9, 0)).unwrap();
        assert_eq!(resolved.dir, root.path().join("alice").join("2024-05-01"));
        assert!(resolved.dir.is_dir());
        assert_eq!(resolved.start_number, 0);
        assert_eq!(resolved.session_label, "2024-05-01");
        assert!(!resolved.collided);
    }

    #[test]
    fn test_resume_counts_existing_segments() {
        let root = tempdir().unwrap();
        let claims = DirectoryClaims::new();
        let uploads = UploadStatusTable::new();
        let dir = root.path().join("alice").join("2024-05-01");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("alice-2024-05-01-part-000.mp4"), b"").unwrap();
        fs::write(dir.join("alice-2024-05-01-part-001.mp4"), b"").unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();
        write_or_update(&dir, "alice", "2024-05-01", &OwnerInfo::new("room")).unwrap();

        let resolver = PathResolver::new(root.path(), "mp4", &claims, &uploads);
        let resolved = resolver.resolve("alice", "2024-05-01", at(9, 0)).unwrap();

        assert_eq!(resolved.dir, dir);
        assert_eq!(resolved.start_number, 2);
        assert!(!resolved.collided);
    }

    #[test]
    fn test_posted_session_branches_off() {
        let root = tempdir().unwrap();
        let claims = DirectoryClaims::new();
        let uploads = UploadStatusTable::new();
        let dir = root.path().join("alice").join("2024-05-01");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("alice-2024-05-01-part-000.mp4"), b"").unwrap();
        fs::write(status_path(&dir), r#"{ "isPost": true }"#).unwrap();
        claims.claim(&dir);

        let resolver = PathResolver::new(root.path(), "mp4", &claims, &uploads);
        let resolved = resolver.resolve("alice", "2024-05-01", at(14, 5)).unwrap();

        assert_eq!(resolved.session_label, "2024-05-01 14-05");
        assert_eq!(resolved.dir, root.path().join("alice").join("2024-05-01 14-05"));
        assert!(resolved.dir.is_dir());
        assert_eq!(resolved.start_number, 0);
        assert!(resolved.collided);
        assert!(!claims.is_claimed(&dir));
    }

    #[test]
    fn test_uploading_session_branches_off() {
        let root = tempdir().unwrap();
        let claims = DirectoryClaims::new();
        let uploads = UploadStatusTable::new();
        let dir = root.path().join("alice").join("2024-05-01");
        fs::create_dir_all(&dir).unwrap();
        uploads.set(&dir, UploadState::Uploading);

        let resolver = PathResolver::new(root.path(), "mp4", &claims, &uploads);
        let resolved = resolver.resolve("alice", "2024-05-01", at(23, 59)).unwrap();

        assert_eq!(resolved.session_label, "2024-05-01 23-59");
        assert!(resolved.collided);
    }

    #[test]
    fn test_malformed_status_fails_resolution() {
        let root = tempdir().unwrap();
        let claims = DirectoryClaims::new();
        let uploads = UploadStatusTable::new();
        let dir = root.path().join("alice").join("2024-05-01");
        fs::create_dir_all(&dir).unwrap();
        fs::write(status_path(&dir), "nope").unwrap();

        let resolver = PathResolver::new(root.path(), "mp4", &claims, &uploads);
        assert!(resolver.resolve("alice", "2024-05-01", at(9, 0)).is_err());
    }

    #[test]
    fn test_count_segments_ignores_other_extensions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), b"").unwrap();
        fs::write(dir.path().join("b.flv"), b"").unwrap();
        fs::create_dir(dir.path().join("c.mp4")).unwrap();

        assert_eq!(count_segments(dir.path(), "mp4").unwrap(), 1);
        assert_eq!(count_segments(dir.path(), "flv").unwrap(), 1);
    }
}
