//! Apply a [`RenamePlan`] to the files on disk.
//!
//! Each file is read fresh, patched in memory, and only written when its
//! content actually changed. The original bytes go into one backup tree per
//! run before the atomic write. Stale edits are skipped one at a time and
//! reported; a file that cannot be read or written is reported and the run
//! continues. Only a backup root that cannot be created stops the run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use tugbasic_core::backup::{BackupError, BackupSession};
use tugbasic_core::error::TugError;
use tugbasic_core::output::{warning_codes, Location, Warning};
use tugbasic_core::patch::ContentHash;
use tugbasic_core::progress::{Phase, ProgressSink};
use tugbasic_core::text::SourceText;

use crate::plan::{PlannedFile, RenamePlan};

/// Run-level apply failure.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl From<ApplyError> for TugError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Backup(err) => err.into(),
        }
    }
}

/// How to apply a plan.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Directory that receives the timestamped backup tree.
    pub backup_root: PathBuf,
    /// Compute everything, write nothing.
    pub dry_run: bool,
    /// Fixed session stamp (tests); the current time otherwise.
    pub stamp: Option<String>,
}

impl ApplyOptions {
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        ApplyOptions {
            backup_root: backup_root.into(),
            dry_run: false,
            stamp: None,
        }
    }
}

/// One file whose content changed.
#[derive(Debug, Clone, Serialize)]
pub struct WrittenFile {
    pub relative_path: String,
    pub edits_applied: usize,
    pub hash_before: ContentHash,
    pub hash_after: ContentHash,
}

/// An edit that was not applied.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEdit {
    pub file: String,
    pub line: u32,
    pub reason: String,
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub dry_run: bool,
    /// Files rewritten on disk. Always empty for a dry run.
    pub files_written: Vec<WrittenFile>,
    /// Files a dry run would rewrite.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_would_write: Vec<WrittenFile>,
    /// Files left alone (shared external, or no effective change).
    pub files_unchanged: Vec<String>,
    /// Edits applied, in memory only for a dry run.
    pub edits_applied: usize,
    pub skipped_edits: Vec<SkippedEdit>,
    pub backup_dir: Option<PathBuf>,
    pub warnings: Vec<Warning>,
}

/// Apply every file of `plan`.
pub fn apply_plan(
    plan: &RenamePlan,
    options: &ApplyOptions,
    progress: &dyn ProgressSink,
) -> Result<ApplyReport, ApplyError> {
    let mut session = match &options.stamp {
        Some(stamp) => BackupSession::with_stamp(&options.backup_root, stamp),
        None => BackupSession::new(&options.backup_root),
    };
    let mut report = ApplyReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    progress.phase_started(Phase::Apply, plan.files.len());
    for file in &plan.files {
        progress.item(Phase::Apply, &file.relative_path);
        if file.shared_external {
            debug!(file = %file.relative_path, "shared external file, not rewritten");
            report.files_unchanged.push(file.relative_path.clone());
            continue;
        }
        apply_file(file, options.dry_run, &mut session, &mut report, progress)?;
    }
    progress.phase_finished(Phase::Apply);

    report.backup_dir = session.dir().map(Path::to_path_buf);
    info!(
        written = report.files_written.len(),
        would_write = report.files_would_write.len(),
        edits = report.edits_applied,
        skipped = report.skipped_edits.len(),
        dry_run = options.dry_run,
        "rename plan applied"
    );
    Ok(report)
}

fn apply_file(
    file: &PlannedFile,
    dry_run: bool,
    session: &mut BackupSession,
    report: &mut ApplyReport,
    progress: &dyn ProgressSink,
) -> Result<(), ApplyError> {
    let original = match fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(err) => {
            let message = format!("cannot read {}: {}", file.path.display(), err);
            progress.warning(&message);
            report.warnings.push(Warning::with_location(
                warning_codes::FILE_UNREADABLE,
                message,
                Location::file(&file.relative_path),
            ));
            return Ok(());
        }
    };

    let mut text = SourceText::from_legacy_bytes(&original);
    let outcome = file.patch.apply_to(&mut text);
    for (edit, conflict) in outcome.skipped {
        warn!(file = %file.relative_path, line = edit.line, %conflict, "edit skipped");
        report.warnings.push(Warning::with_location(
            warning_codes::STALE_EDIT,
            conflict.to_string(),
            Location::line(&file.relative_path, edit.line),
        ));
        report.skipped_edits.push(SkippedEdit {
            file: file.relative_path.clone(),
            line: edit.line,
            reason: conflict.to_string(),
        });
    }

    let updated = text.to_legacy_bytes();
    if updated == original {
        report.files_unchanged.push(file.relative_path.clone());
        return Ok(());
    }

    if !dry_run {
        let relative = Path::new(&file.relative_path);
        match session.commit_file(&file.path, relative, &original, &updated) {
            Ok(_) => {}
            Err(err @ BackupError::RootNotCreatable { .. }) => return Err(err.into()),
            Err(err) => {
                let message = err.to_string();
                progress.warning(&message);
                report.warnings.push(Warning::with_location(
                    warning_codes::WRITE_FAILED,
                    message,
                    Location::file(&file.relative_path),
                ));
                return Ok(());
            }
        }
    }

    report.edits_applied += outcome.applied;
    let written = WrittenFile {
        relative_path: file.relative_path.clone(),
        edits_applied: outcome.applied,
        hash_before: ContentHash::compute(&original),
        hash_after: ContentHash::compute(&updated),
    };
    if dry_run {
        report.files_would_write.push(written);
    } else {
        report.files_written.push(written);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tugbasic_core::patch::{Edit, EditCategory, FilePatch, Span};
    use tugbasic_core::progress::SilentProgress;

    fn planned(dir: &Path, relative: &str, edits: Vec<Edit>) -> PlannedFile {
        let mut patch = FilePatch::new(relative);
        for e in edits {
            patch.push(e);
        }
        patch.normalize();
        PlannedFile {
            module: None,
            name: relative.to_string(),
            path: dir.join(relative),
            relative_path: relative.to_string(),
            shared_external: false,
            patch,
        }
    }

    fn rename(line: u32, start: usize, old: &str, new: &str) -> Edit {
        Edit::replace(
            line,
            Span::new(start, start + old.chars().count()),
            old,
            new,
            EditCategory::Reference,
        )
    }

    fn options(dir: &Path) -> ApplyOptions {
        ApplyOptions {
            backup_root: dir.join("backup"),
            dry_run: false,
            stamp: Some("20260101_000000".into()),
        }
    }

    #[test]
    fn writes_changed_files_and_backs_them_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Main.bas"), "Dim a_b\r\na_b = a_b\r\n").unwrap();
        let plan = RenamePlan {
            files: vec![planned(
                dir.path(),
                "Main.bas",
                vec![
                    rename(1, 4, "a_b", "aB"),
                    rename(2, 0, "a_b", "aB"),
                    rename(2, 6, "a_b", "aB"),
                ],
            )],
            warnings: Vec::new(),
        };

        let report = apply_plan(&plan, &options(dir.path()), &SilentProgress).unwrap();
        assert_eq!(report.edits_applied, 3);
        assert_eq!(
            fs::read_to_string(dir.path().join("Main.bas")).unwrap(),
            "Dim aB\r\naB = aB\r\n"
        );
        let backup = dir.path().join("backup/20260101_000000/Main.bas");
        assert_eq!(fs::read_to_string(backup).unwrap(), "Dim a_b\r\na_b = a_b\r\n");
        assert_ne!(report.files_written[0].hash_before, report.files_written[0].hash_after);
    }

    #[test]
    fn stale_edits_are_skipped_and_the_rest_apply() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Main.bas"), "x = other\ny = a_b\n").unwrap();
        let plan = RenamePlan {
            files: vec![planned(
                dir.path(),
                "Main.bas",
                vec![rename(1, 4, "a_b", "aB"), rename(2, 4, "a_b", "aB")],
            )],
            warnings: Vec::new(),
        };

        let report = apply_plan(&plan, &options(dir.path()), &SilentProgress).unwrap();
        assert_eq!(report.edits_applied, 1);
        assert_eq!(report.skipped_edits.len(), 1);
        assert_eq!(report.skipped_edits[0].line, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("Main.bas")).unwrap(),
            "x = other\ny = aB\n"
        );
    }

    #[test]
    fn dry_run_and_unchanged_files_write_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Main.bas"), "a_b = 1\n").unwrap();
        fs::write(dir.path().join("Same.bas"), "Foo = 1\n").unwrap();
        let plan = RenamePlan {
            files: vec![
                planned(dir.path(), "Main.bas", vec![rename(1, 0, "a_b", "aB")]),
                planned(dir.path(), "Same.bas", vec![rename(1, 0, "Foo", "FOO")]),
            ],
            warnings: Vec::new(),
        };

        let mut opts = options(dir.path());
        opts.dry_run = true;
        let report = apply_plan(&plan, &opts, &SilentProgress).unwrap();
        assert!(report.files_written.is_empty());
        let would: Vec<_> = report
            .files_would_write
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(would, vec!["Main.bas", "Same.bas"]);
        assert_eq!(report.edits_applied, 2);
        assert!(report.backup_dir.is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join("Main.bas")).unwrap(),
            "a_b = 1\n"
        );

        let plan = RenamePlan {
            files: vec![planned(dir.path(), "Same.bas", vec![rename(1, 0, "Foo", "Foo")])],
            warnings: Vec::new(),
        };
        let report = apply_plan(&plan, &options(dir.path()), &SilentProgress).unwrap();
        assert!(report.files_written.is_empty());
        assert_eq!(report.files_unchanged, vec!["Same.bas".to_string()]);
        assert!(!dir.path().join("backup").exists());
    }

    #[test]
    fn shared_external_files_are_never_touched() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Shared.bas"), "a_b = 1\n").unwrap();
        let mut file = planned(dir.path(), "Shared.bas", vec![rename(1, 0, "a_b", "aB")]);
        file.shared_external = true;
        let plan = RenamePlan {
            files: vec![file],
            warnings: Vec::new(),
        };
        let report = apply_plan(&plan, &options(dir.path()), &SilentProgress).unwrap();
        assert!(report.files_written.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("Shared.bas")).unwrap(),
            "a_b = 1\n"
        );
    }

    #[test]
    fn unreadable_files_become_warnings() {
        let dir = TempDir::new().unwrap();
        let plan = RenamePlan {
            files: vec![planned(dir.path(), "Missing.bas", vec![rename(1, 0, "a", "b")])],
            warnings: Vec::new(),
        };
        let report = apply_plan(&plan, &options(dir.path()), &SilentProgress).unwrap();
        assert_eq!(report.warnings[0].code, warning_codes::FILE_UNREADABLE);
    }
}
