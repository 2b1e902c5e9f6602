//! File filter for directory scans.
//!
//! When a project is loaded from a directory instead of a manifest, every
//! `.bas`/`.cls`/`.frm` file under the root is a candidate. Exclusion globs
//! (from `--exclude` or the project config) narrow the set.
//!
//! ## Semantics
//!
//! 1. Default exclusions (`.git`, the backup tree, etc.) always apply
//! 2. User exclusions are matched against root-relative paths
//! 3. Patterns prefixed with `!` are accepted and treated like plain ones

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use tugbasic_core::config::DEFAULT_BACKUP_DIR;

/// Default directory exclusions that always apply.
pub const DEFAULT_EXCLUSIONS: &[&str] = &["**/.git/**", "**/.svn/**", "**/target/**"];

/// Error type for file filter operations.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Invalid glob pattern syntax.
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Parsed exclusion filter.
#[derive(Debug)]
pub struct FileFilterSpec {
    /// Glob set for exclusion patterns (user-specified).
    exclusions: GlobSet,
    /// Glob set for default exclusions (always applied).
    default_exclusions: GlobSet,
}

impl FileFilterSpec {
    /// Build a filter from exclusion patterns.
    pub fn with_exclusions(patterns: &[String]) -> Result<Self, FilterError> {
        let exclusions: Vec<String> = patterns
            .iter()
            .map(|p| p.strip_prefix('!').unwrap_or(p).to_string())
            .collect();

        let mut defaults: Vec<String> = DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect();
        defaults.push(format!("**/{}/**", DEFAULT_BACKUP_DIR));

        Ok(FileFilterSpec {
            exclusions: build_glob_set(&exclusions)?,
            default_exclusions: build_glob_set(&defaults)?,
        })
    }

    /// Filter with only the default exclusions.
    pub fn default_all() -> Result<Self, FilterError> {
        Self::with_exclusions(&[])
    }

    /// Check if a root-relative path passes the filter.
    pub fn matches(&self, path: &Path) -> bool {
        if self.default_exclusions.is_match(path) {
            return false;
        }
        !self.exclusions.is_match(path)
    }

    /// Check if this filter has any user exclusion patterns.
    pub fn has_exclusions(&self) -> bool {
        !self.exclusions.is_empty()
    }
}

/// Build a GlobSet from a list of pattern strings.
fn build_glob_set(patterns: &[String]) -> Result<GlobSet, FilterError> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| FilterError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }

    builder.build().map_err(|e| FilterError::InvalidPattern {
        pattern: "<combined>".to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_exclude_vcs_and_backups() {
        let spec = FileFilterSpec::default_all().unwrap();
        assert!(!spec.has_exclusions());
        assert!(spec.matches(Path::new("src/Module1.bas")));
        assert!(!spec.matches(Path::new(".git/objects/Module1.bas")));
        assert!(!spec.matches(Path::new(".tugbasic-backup/20240101_000000/Module1.bas")));
    }

    #[test]
    fn user_exclusions_apply() {
        let spec =
            FileFilterSpec::with_exclusions(&["legacy/**".to_string(), "!**/Old*.cls".to_string()])
                .unwrap();
        assert!(spec.has_exclusions());
        assert!(!spec.matches(Path::new("legacy/Module1.bas")));
        assert!(!spec.matches(Path::new("classes/OldThing.cls")));
        assert!(spec.matches(Path::new("classes/NewThing.cls")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = FileFilterSpec::with_exclusions(&["[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("invalid glob pattern"));
    }
}
