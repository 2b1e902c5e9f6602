//! Project manifest (`.vbp`) loading.
//!
//! The manifest is a list of `Key=Value` lines. The keys that matter here:
//!
//! ```text
//! Name="Project1"
//! Startup="frmMain"
//! Module=Module1; Module1.bas
//! Class=ClsBar; ClsBar.cls
//! Form=frmMain.frm
//! ```
//!
//! Source paths are relative to the manifest's directory. Module and class
//! names, and the startup object, are recorded with their char spans so a
//! rename can rewrite the manifest in lockstep with the sources.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use winnow::ascii::space0;
use winnow::combinator::{delimited, terminated};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};
use winnow::ModalResult;

use tugbasic_core::text::{decode_legacy, SourceText};

use crate::model::{ManifestNameEntry, ModuleKind};

/// Error type for manifest loading.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest itself could not be read.
    #[error("cannot read manifest {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A source file listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: ModuleKind,
    /// Name given in the manifest (`Module=` and `Class=` only).
    pub name: Option<String>,
    /// Path as written, relative to the manifest directory.
    pub path: String,
    /// 1-indexed manifest line.
    pub line: u32,
}

/// A parsed manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub path: PathBuf,
    /// `Name=` value.
    pub name: Option<String>,
    pub entries: Vec<ManifestEntry>,
    /// Spans of module names and the startup object.
    pub name_entries: Vec<ManifestNameEntry>,
}

impl Manifest {
    /// Directory that source paths are relative to.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Project name: `Name=` value, else the manifest file stem.
    pub fn project_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Read and parse a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let bytes = fs::read(path).map_err(|source| ManifestError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    let mut manifest = parse_manifest(&decode_legacy(&bytes));
    manifest.path = path.to_path_buf();
    Ok(manifest)
}

/// Parse manifest text.
pub fn parse_manifest(text: &str) -> Manifest {
    let source = SourceText::parse(text);
    let mut manifest = Manifest::default();

    for (idx, line) in source.lines().iter().enumerate() {
        let line_no = idx as u32 + 1;
        let Some(parsed) = parse_line(line) else {
            continue;
        };
        match parsed {
            ManifestLine::Named { kind, name, path } => {
                manifest.name_entries.push(ManifestNameEntry {
                    line: line_no,
                    start: name.start,
                    end: name.end,
                    name: name.text.clone(),
                });
                manifest.entries.push(ManifestEntry {
                    kind,
                    name: Some(name.text),
                    path,
                    line: line_no,
                });
            }
            ManifestLine::Form { path } => {
                manifest.entries.push(ManifestEntry {
                    kind: ModuleKind::Form,
                    name: None,
                    path,
                    line: line_no,
                });
            }
            ManifestLine::Startup(name) => {
                manifest.name_entries.push(ManifestNameEntry {
                    line: line_no,
                    start: name.start,
                    end: name.end,
                    name: name.text,
                });
            }
            ManifestLine::ProjectName(name) => manifest.name = Some(name),
        }
    }

    manifest
}

// ============================================================================
// Line parser
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct SpannedName {
    text: String,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ManifestLine {
    Named {
        kind: ModuleKind,
        name: SpannedName,
        path: String,
    },
    Form {
        path: String,
    },
    Startup(SpannedName),
    ProjectName(String),
}

fn parse_line(line: &str) -> Option<ManifestLine> {
    let mut input = line;
    let key = parse_key(&mut input).ok()?;

    match key.to_ascii_lowercase().as_str() {
        "module" | "class" => {
            let kind = if key.eq_ignore_ascii_case("class") {
                ModuleKind::Class
            } else {
                ModuleKind::Standard
            };
            let start = char_offset(line, input);
            let name = parse_entry_name(&mut input).ok()?;
            let name = name.trim_end();
            if name.is_empty() {
                return None;
            }
            Some(ManifestLine::Named {
                kind,
                name: SpannedName {
                    text: name.to_string(),
                    start,
                    end: start + name.chars().count(),
                },
                path: input.trim().to_string(),
            })
        }
        "form" => {
            let path = input.trim();
            (!path.is_empty()).then(|| ManifestLine::Form {
                path: path.to_string(),
            })
        }
        "startup" => {
            let start = char_offset(line, input) + 1;
            let name = parse_quoted(&mut input).ok()?;
            if name.is_empty() || name.eq_ignore_ascii_case("Sub Main") {
                return None;
            }
            Some(ManifestLine::Startup(SpannedName {
                text: name.to_string(),
                start,
                end: start + name.chars().count(),
            }))
        }
        "name" => {
            let name = parse_quoted(&mut input)
                .map(str::to_string)
                .unwrap_or_else(|_| input.trim().to_string());
            Some(ManifestLine::ProjectName(name))
        }
        _ => None,
    }
}

/// Parse `Key =` and any spaces after it.
fn parse_key<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let (_, key, _, _, _) = (
        space0,
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_'),
        space0,
        '=',
        space0,
    )
        .parse_next(input)?;
    Ok(key)
}

/// Parse the `Name;` part of a `Module=` / `Class=` value.
fn parse_entry_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    terminated(take_till(1.., |c| c == ';'), (';', space0)).parse_next(input)
}

/// Parse a double-quoted string.
fn parse_quoted<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    delimited('"', take_till(0.., |c| c == '"'), '"').parse_next(input)
}

/// Char offset of the remaining input within `line`.
fn char_offset(line: &str, rest: &str) -> usize {
    line[..line.len() - rest.len()].chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Type=Exe\r\n\
Reference=*\\G{00020430-0000-0000-C000-000000000046}#2.0#0#stdole2.tlb#OLE Automation\r\n\
Form=frmMain.frm\r\n\
Module=Module1; Module1.bas\r\n\
Class=ClsBar; classes\\ClsBar.cls\r\n\
Module=Shared; ..\\shared\\Shared.bas\r\n\
Startup=\"frmMain\"\r\n\
Name=\"Inventory\"\r\n\
\r\n\
[MS Transaction Server]\r\n\
AutoRefresh=1\r\n";

    #[test]
    fn parses_entries_in_order() {
        let manifest = parse_manifest(SAMPLE);
        assert_eq!(manifest.name.as_deref(), Some("Inventory"));
        let entries: Vec<_> = manifest
            .entries
            .iter()
            .map(|e| (e.kind, e.name.as_deref(), e.path.as_str(), e.line))
            .collect();
        assert_eq!(
            entries,
            vec![
                (ModuleKind::Form, None, "frmMain.frm", 3),
                (ModuleKind::Standard, Some("Module1"), "Module1.bas", 4),
                (ModuleKind::Class, Some("ClsBar"), "classes\\ClsBar.cls", 5),
                (ModuleKind::Standard, Some("Shared"), "..\\shared\\Shared.bas", 6),
            ]
        );
    }

    #[test]
    fn records_name_spans() {
        let manifest = parse_manifest(SAMPLE);
        let spans: Vec<_> = manifest
            .name_entries
            .iter()
            .map(|e| (e.line, e.start, e.end, e.name.as_str()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (4, 7, 14, "Module1"),
                (5, 6, 12, "ClsBar"),
                (6, 7, 13, "Shared"),
                (7, 9, 16, "frmMain"),
            ]
        );
    }

    #[test]
    fn sub_main_startup_has_no_name_entry() {
        let manifest = parse_manifest("Startup=\"Sub Main\"\nModule=A; A.bas\n");
        assert_eq!(manifest.name_entries.len(), 1);
        assert_eq!(manifest.name_entries[0].name, "A");
    }

    #[test]
    fn project_name_falls_back_to_file_stem() {
        let mut manifest = parse_manifest("Module=A; A.bas\n");
        manifest.path = PathBuf::from("/work/Billing.vbp");
        assert_eq!(manifest.project_name(), "Billing");
        assert_eq!(manifest.dir(), Path::new("/work"));
    }
}
