//! Backup sessions and atomic file writes.
//!
//! One [`BackupSession`] exists per rewrite invocation. The timestamped
//! directory under the backup root is created lazily, the first time a file
//! actually changes, so a run with nothing to write leaves no trace.
//!
//! Layout: `<backup_root>/<YYYYmmdd_HHMMSS>/<project-relative path>`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Error Types
// ============================================================================

/// Errors from backup and write operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup root (or the session directory below it) cannot be created.
    #[error("backup directory not creatable: {path}")]
    RootNotCreatable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copying the original content into the backup tree failed.
    #[error("backup copy failed for {path}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing the new content failed (the backup copy was removed).
    #[error("write failed for {path}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

// ============================================================================
// Atomic File Operations
// ============================================================================

/// Write content to a file atomically using temp + rename.
///
/// Readers see either the old or the new content, never a partial write. The
/// temp file name includes PID and timestamp so concurrent writers never share
/// one.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    use std::time::UNIX_EPOCH;

    let pid = std::process::id();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let temp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        pid,
        timestamp
    ));
    if let Err(err) = fs::write(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    Ok(())
}

/// Turn a project-relative path into a path that stays inside the backup tree.
///
/// Parent components become `_up` and absolute prefixes are dropped.
pub fn backup_relative_path(relative: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => out.push("_up"),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Format the session stamp for a point in time (`YYYYmmdd_HHMMSS`, UTC).
pub fn format_stamp(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y%m%d_%H%M%S").to_string()
}

// ============================================================================
// Backup Session
// ============================================================================

/// One backup tree per invocation.
#[derive(Debug)]
pub struct BackupSession {
    root: PathBuf,
    stamp: String,
    dir: Option<PathBuf>,
}

impl BackupSession {
    /// Start a session stamped with the current time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BackupSession::with_stamp(root, format_stamp(SystemTime::now()))
    }

    /// Start a session with an explicit stamp.
    pub fn with_stamp(root: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        BackupSession {
            root: root.into(),
            stamp: stamp.into(),
            dir: None,
        }
    }

    /// The backup root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The session directory, once something has been backed up.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Create the session directory if it does not exist yet.
    ///
    /// A stamp that is already taken (two runs within one second) gets a
    /// numeric suffix.
    pub fn ensure_dir(&mut self) -> BackupResult<&Path> {
        if self.dir.is_none() {
            fs::create_dir_all(&self.root).map_err(|source| BackupError::RootNotCreatable {
                path: self.root.clone(),
                source,
            })?;

            let mut candidate = self.root.join(&self.stamp);
            let mut suffix = 2;
            while candidate.exists() {
                candidate = self.root.join(format!("{}_{}", self.stamp, suffix));
                suffix += 1;
            }
            fs::create_dir_all(&candidate).map_err(|source| BackupError::RootNotCreatable {
                path: candidate.clone(),
                source,
            })?;
            debug!(dir = %candidate.display(), "created backup session directory");
            self.dir = Some(candidate);
        }
        match self.dir.as_deref() {
            Some(dir) => Ok(dir),
            None => Err(BackupError::RootNotCreatable {
                path: self.root.clone(),
                source: io::Error::other("backup directory missing after creation"),
            }),
        }
    }

    /// Back up `original` under `relative`, then atomically replace
    /// `target` with `new_content`.
    ///
    /// If the write fails the backup copy for this file is removed and
    /// [`BackupError::WriteFailed`] is returned.
    pub fn commit_file(
        &mut self,
        target: &Path,
        relative: &Path,
        original: &[u8],
        new_content: &[u8],
    ) -> BackupResult<PathBuf> {
        let dir = self.ensure_dir()?.to_path_buf();
        let backup_path = dir.join(backup_relative_path(relative));

        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent).map_err(|source| BackupError::CopyFailed {
                path: target.to_path_buf(),
                source,
            })?;
        }
        fs::write(&backup_path, original).map_err(|source| BackupError::CopyFailed {
            path: target.to_path_buf(),
            source,
        })?;

        if let Err(source) = atomic_write(target, new_content) {
            warn!(file = %target.display(), error = %source, "write failed, removing backup copy");
            let _ = fs::remove_file(&backup_path);
            return Err(BackupError::WriteFailed {
                path: target.to_path_buf(),
                source,
            });
        }

        Ok(backup_path)
    }
}

// ============================================================================
// Tests
// ============================================================================
