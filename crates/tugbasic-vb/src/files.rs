//! Source file discovery and reading.
//!
//! Source files are decoded byte-for-byte from the legacy 8-bit code page so
//! that writing them back reproduces every untouched byte.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use tugbasic_core::text::SourceText;

use crate::filter::FileFilterSpec;
use crate::model::ModuleKind;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// File not found.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// File exists but could not be read (locked, permissions).
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

// ============================================================================
// File Collection
// ============================================================================

/// A source file selected for loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the project root, `/`-separated.
    pub relative_path: String,
    pub kind: ModuleKind,
    /// Name given by the manifest, if any.
    pub declared_name: Option<String>,
    /// Outside the project root.
    pub shared_external: bool,
}

impl SourceFile {
    /// Describe a file at `path` relative to `root`.
    pub fn new(root: &Path, path: &Path, kind: ModuleKind) -> Self {
        let normalized = normalize_path(path);
        let (relative_path, shared_external) = match normalized.strip_prefix(normalize_path(root))
        {
            Ok(rel) => (slash_path(rel), false),
            Err(_) => (slash_path(path), true),
        };
        SourceFile {
            path: normalized,
            relative_path,
            kind,
            declared_name: None,
            shared_external,
        }
    }

    /// Module name to use until a name directive says otherwise.
    pub fn default_name(&self) -> String {
        if let Some(name) = &self.declared_name {
            return name.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Collect source files by walking a directory.
///
/// Files are sorted by relative path so module order is deterministic.
pub fn collect_source_files(root: &Path, filter: &FileFilterSpec) -> Vec<SourceFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        // Filter on root-relative paths only
        let rel_path = match path.strip_prefix(root) {
            Ok(p) => p,
            Err(_) => continue,
        };

        let Some(kind) = path
            .extension()
            .and_then(|ext| ModuleKind::from_extension(&ext.to_string_lossy()))
        else {
            continue;
        };

        if !filter.matches(rel_path) {
            continue;
        }

        files.push(SourceFile::new(root, path, kind));
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    files
}

/// Read and decode a source file.
pub fn read_source(path: &Path) -> FileResult<SourceText> {
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            FileError::NotFound {
                path: path.display().to_string(),
            }
        } else {
            FileError::Unreadable {
                path: path.display().to_string(),
                source,
            }
        }
    })?;
    Ok(SourceText::from_legacy_bytes(&bytes))
}

/// Resolve `.` and `..` components lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn collects_sorted_sources_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("forms")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("Zeta.bas"), "").unwrap();
        fs::write(root.join("forms/frmMain.frm"), "").unwrap();
        fs::write(root.join("Alpha.cls"), "").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::write(root.join(".git/Hidden.bas"), "").unwrap();

        let filter = FileFilterSpec::default_all().unwrap();
        let files = collect_source_files(root, &filter);
        let names: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(names, vec!["Alpha.cls", "Zeta.bas", "forms/frmMain.frm"]);
        assert_eq!(files[2].kind, ModuleKind::Form);
        assert!(files.iter().all(|f| !f.shared_external));
    }

    #[test]
    fn files_outside_root_are_shared_external() {
        let root = Path::new("/proj/app");
        let file = SourceFile::new(root, &root.join("../shared/Util.bas"), ModuleKind::Standard);
        assert!(file.shared_external);
        assert_eq!(file.path, PathBuf::from("/proj/shared/Util.bas"));
        assert_eq!(file.default_name(), "Util");

        let inside = SourceFile::new(root, &root.join("./src/Main.bas"), ModuleKind::Standard);
        assert!(!inside.shared_external);
        assert_eq!(inside.relative_path, "src/Main.bas");
    }

    #[test]
    fn read_source_reports_missing_files() {
        let dir = TempDir::new().unwrap();
        let err = read_source(&dir.path().join("Nope.bas")).unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));

        fs::write(dir.path().join("Latin.bas"), b"s = \"caf\xe9\"\r\n").unwrap();
        let text = read_source(&dir.path().join("Latin.bas")).unwrap();
        assert_eq!(text.line(1), Some("s = \"caf\u{e9}\""));
    }
}
