//! Load and analyze a project.
//!
//! Loading never fails because of a single bad source file: a missing
//! manifest entry or an unreadable file becomes a warning and the rest of
//! the project is still analyzed. Only an unusable input path or a project
//! without any module is an error.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use tugbasic_core::error::{TugError, TugResult};
use tugbasic_core::output::{warning_codes, Location, Warning};
use tugbasic_core::progress::{Phase, ProgressSink};

use crate::files::{collect_source_files, read_source, normalize_path, SourceFile};
use crate::filter::FileFilterSpec;
use crate::manifest::{read_manifest, Manifest};
use crate::model::{ManifestFile, Project};
use crate::naming::{assign_names, ConventionOracle, NameTable, NamingOracle};
use crate::parser::parse_module;
use crate::resolve::{resolve_project, ResolveSummary};

use super::PipelineOptions;

/// A parsed project with the warnings collected while loading it.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub project: Project,
    pub warnings: Vec<Warning>,
}

/// Counts describing an analyzed project.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub project: String,
    pub modules: usize,
    pub symbols: usize,
    /// Symbols with at least one reference.
    pub referenced_symbols: usize,
    pub renames: usize,
    pub resolve: ResolveSummary,
}

/// A resolved project and its final names.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub project: Project,
    pub names: NameTable,
    pub summary: AnalysisSummary,
    pub warnings: Vec<Warning>,
}

// ============================================================================
// Phase A
// ============================================================================

/// Load a project from a `.vbp` manifest or a source directory.
pub fn load_project(
    path: &Path,
    options: &PipelineOptions,
    progress: &dyn ProgressSink,
) -> TugResult<LoadedProject> {
    if !path.exists() {
        return Err(TugError::file_not_found(path.display().to_string()));
    }

    let mut warnings = Vec::new();
    let (mut project, files) = if path.is_dir() {
        let mut exclude = options.exclude.clone();
        // A backup root inside the scanned tree must never be read back.
        if let Some(rel) = options
            .backup_root
            .as_deref()
            .and_then(|b| b.strip_prefix(path).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
        {
            exclude.push(format!("{}/**", rel.to_string_lossy().replace('\\', "/")));
        }
        let filter = FileFilterSpec::with_exclusions(&exclude)
            .map_err(|e| TugError::invalid_args(e.to_string()))?;
        let name = path
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "Project".to_string());
        let files = collect_source_files(path, &filter);
        (Project::new(name, path), files)
    } else {
        let manifest =
            read_manifest(path).map_err(|e| TugError::input(e.to_string(), path.display().to_string()))?;
        manifest_project(&manifest, &mut warnings)
    };

    if files.is_empty() {
        return Err(TugError::input(
            "no source modules found",
            path.display().to_string(),
        ));
    }

    progress.phase_started(Phase::Parse, files.len());
    for file in &files {
        progress.item(Phase::Parse, &file.relative_path);
        let lines = match read_source(&file.path) {
            Ok(text) => text.lines().to_vec(),
            Err(err) => {
                warn!(file = %file.relative_path, error = %err, "source file unreadable");
                progress.warning(&err.to_string());
                warnings.push(Warning::with_location(
                    warning_codes::FILE_UNREADABLE,
                    err.to_string(),
                    Location::file(&file.relative_path),
                ));
                Vec::new()
            }
        };

        let (mut module, issues) = parse_module(&file.default_name(), file.kind, lines);
        for issue in issues {
            warnings.push(Warning::with_location(
                warning_codes::UNMATCHED_BLOCK,
                issue.message,
                Location::line(&file.relative_path, issue.line),
            ));
        }
        module.path = file.path.clone();
        module.relative_path = file.relative_path.clone();
        module.shared_external = file.shared_external;
        debug!(module = %module.name, kind = %module.kind, lines = module.lines.len(), "parsed module");
        project.modules.push(module);
    }
    progress.phase_finished(Phase::Parse);

    info!(
        project = %project.name,
        modules = project.modules.len(),
        warnings = warnings.len(),
        "project loaded"
    );
    Ok(LoadedProject { project, warnings })
}

/// Source files listed by a manifest; missing entries become warnings.
fn manifest_project(manifest: &Manifest, warnings: &mut Vec<Warning>) -> (Project, Vec<SourceFile>) {
    let root = manifest.dir();
    let manifest_relative = manifest
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut project = Project::new(manifest.project_name(), root);
    project.manifest = Some(ManifestFile {
        path: manifest.path.clone(),
        relative_path: manifest_relative.clone(),
        name_entries: manifest.name_entries.clone(),
    });

    let mut files = Vec::new();
    for entry in &manifest.entries {
        let path = normalize_path(&root.join(entry.path.replace('\\', "/")));
        if !path.is_file() {
            warnings.push(Warning::with_location(
                warning_codes::MANIFEST_ENTRY,
                format!("listed file not found: {}", entry.path),
                Location::line(&manifest_relative, entry.line),
            ));
            continue;
        }
        let mut file = SourceFile::new(root, &path, entry.kind);
        file.declared_name = entry.name.clone();
        files.push(file);
    }
    (project, files)
}

// ============================================================================
// Phase B
// ============================================================================

/// Resolve references and assign final names with the default oracle.
pub fn analyze(loaded: LoadedProject, options: &PipelineOptions, progress: &dyn ProgressSink) -> Analysis {
    analyze_with(loaded, &ConventionOracle, options, progress)
}

/// Resolve references and assign final names with a custom oracle.
pub fn analyze_with(
    loaded: LoadedProject,
    oracle: &dyn NamingOracle,
    options: &PipelineOptions,
    progress: &dyn ProgressSink,
) -> Analysis {
    let LoadedProject {
        mut project,
        warnings,
    } = loaded;
    let resolve = resolve_project(&mut project, progress);

    let symbols = project.all_symbols();
    progress.phase_started(Phase::Name, symbols.len());
    let names = assign_names(&project, oracle, &options.naming());
    progress.phase_finished(Phase::Name);

    let referenced_symbols = symbols
        .iter()
        .filter(|s| project.symbol_references(**s).is_some_and(|r| !r.is_empty()))
        .count();
    let renames = symbols.iter().filter(|s| names.is_renamed(&project, **s)).count();
    let summary = AnalysisSummary {
        project: project.name.clone(),
        modules: project.modules.len(),
        symbols: symbols.len(),
        referenced_symbols,
        renames,
        resolve,
    };
    info!(symbols = summary.symbols, renames, "project analyzed");

    Analysis {
        project,
        names,
        summary,
        warnings,
    }
}
