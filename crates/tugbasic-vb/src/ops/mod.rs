//! Project operations framework.
//!
//! Each operation is one step of the pipeline and can be run on its own:
//!
//! 1. [`load_project`]: read the manifest or scan a directory, then parse
//!    every module (Phase A)
//! 2. [`analyze`]: resolve references and assign final names (Phase B)
//! 3. [`plan_renames`]: compute every edit
//! 4. [`apply_plan`]: write the edits with backups
//!
//! [`run_pipeline`] runs all of them in order.

pub mod analyze;
pub mod rename;

use std::path::{Path, PathBuf};

use tugbasic_core::config::ResolvedConfig;

use crate::naming::{NamingOptions, ReservedWords};

pub use crate::apply::{apply_plan, ApplyOptions, ApplyReport};
pub use analyze::{analyze, load_project, Analysis, AnalysisSummary, LoadedProject};
pub use rename::{plan_renames, run_pipeline, PipelineReport};

// ============================================================================
// Options
// ============================================================================

/// Inputs shared by every operation.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Glob patterns excluded from directory scans.
    pub exclude: Vec<String>,
    /// Extra reserved identifiers.
    pub reserved_words: Vec<String>,
    /// Names never renamed.
    pub keep_names: Vec<String>,
    /// Backup root; `<project root>/.tugbasic-backup` if unset.
    pub backup_root: Option<PathBuf>,
    /// Plan and report without writing.
    pub dry_run: bool,
}

impl PipelineOptions {
    /// Options from a resolved configuration.
    pub fn from_config(config: &ResolvedConfig, dry_run: bool) -> Self {
        PipelineOptions {
            exclude: config.exclude_patterns(),
            reserved_words: config.reserved_words(),
            keep_names: config.keep_names(),
            backup_root: Some(config.backup_dir.value.clone()),
            dry_run,
        }
    }

    /// Naming inputs: the default reserved set plus configured words.
    pub fn naming(&self) -> NamingOptions {
        NamingOptions {
            reserved: ReservedWords::default().with_words(&self.reserved_words),
            keep: self.keep_names.clone(),
        }
    }
}

/// Directory a manifest or source directory belongs to.
pub fn project_root(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
