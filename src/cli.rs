//! CLI front door.
//!
//! Provides the command implementations behind `tugb`:
//! - `analyze` - parse and resolve a project, report what would be renamed
//! - `rename` - run the whole pipeline and write the changes
//! - `export` - dump symbols, renames, edits or the dependency graph
//!
//! ## Configuration
//!
//! Every command resolves [`ResolvedConfig`] against the project root (the
//! manifest's directory, or the scanned directory) so `tugbasic.json`, the
//! environment and CLI flags are layered the same way for all of them.
//!
//! ## Error Handling
//!
//! All functions return `Result<T, TugError>`. The binary turns an error
//! into a JSON error response and its exit code.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use tugbasic_core::config::{CliOverrides, ResolvedConfig};
use tugbasic_core::error::{TugError, TugResult};
use tugbasic_core::output::{Warning, SCHEMA_VERSION};
use tugbasic_core::progress::ProgressSink;
use tugbasic_vb::export::{dependency_graph, edit_dump, rename_table, rename_view, symbol_dump};
use tugbasic_vb::naming::Rename;
use tugbasic_vb::ops::{
    analyze, load_project, plan_renames, project_root, run_pipeline, AnalysisSummary,
    PipelineOptions, PipelineReport,
};

// ============================================================================
// Responses
// ============================================================================

/// Response of `tugb analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub status: String,
    pub schema_version: String,
    pub summary: AnalysisSummary,
    pub renames: Vec<Rename>,
    pub warnings: Vec<Warning>,
}

/// Response of `tugb rename`.
#[derive(Debug, Clone, Serialize)]
pub struct RenameResponse {
    pub status: String,
    pub schema_version: String,
    pub dry_run: bool,
    #[serde(flatten)]
    pub report: PipelineReport,
}

/// What `tugb export` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// Full symbol model with final names.
    Symbols,
    /// Every changed name as JSON.
    Renames,
    /// Every changed name as CSV.
    Table,
    /// Every planned edit.
    Edits,
    /// Mermaid dependency diagram.
    Graph,
}

/// Response of `tugb export`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResponse {
    pub status: String,
    pub schema_version: String,
    pub what: ExportKind,
    /// File the export was written to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Inline export when no output file was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    pub warnings: Vec<Warning>,
}

// ============================================================================
// Commands
// ============================================================================

/// Layer `tugbasic.json`, the environment and CLI flags for a project path.
pub fn pipeline_options(
    path: &Path,
    overrides: &CliOverrides,
    dry_run: bool,
) -> TugResult<PipelineOptions> {
    let config = ResolvedConfig::resolve(&project_root(path), overrides)?;
    Ok(PipelineOptions::from_config(&config, dry_run))
}

/// Analyze a project without changing anything.
pub fn run_analyze(
    path: &Path,
    overrides: &CliOverrides,
    progress: &dyn ProgressSink,
) -> TugResult<AnalyzeResponse> {
    let options = pipeline_options(path, overrides, true)?;
    let loaded = load_project(path, &options, progress)?;
    let analysis = analyze(loaded, &options, progress);

    Ok(AnalyzeResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        renames: rename_view(&analysis.project, &analysis.names),
        summary: analysis.summary,
        warnings: analysis.warnings,
    })
}

/// Rename every non-conforming identifier of a project.
pub fn run_rename(
    path: &Path,
    overrides: &CliOverrides,
    dry_run: bool,
    progress: &dyn ProgressSink,
) -> TugResult<RenameResponse> {
    let options = pipeline_options(path, overrides, dry_run)?;
    let (_, _, report) = run_pipeline(path, &options, progress)?;
    Ok(RenameResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        dry_run,
        report,
    })
}

/// Produce one of the exports, inline or into `output`.
pub fn run_export(
    path: &Path,
    overrides: &CliOverrides,
    what: ExportKind,
    output: Option<&Path>,
    progress: &dyn ProgressSink,
) -> TugResult<ExportResponse> {
    let options = pipeline_options(path, overrides, true)?;
    let loaded = load_project(path, &options, progress)?;
    let analysis = analyze(loaded, &options, progress);
    let mut warnings = analysis.warnings.clone();

    let content = match what {
        ExportKind::Symbols => to_json(&symbol_dump(&analysis.project, &analysis.names))?,
        ExportKind::Renames => to_json(&rename_view(&analysis.project, &analysis.names))?,
        ExportKind::Table => {
            serde_json::Value::String(rename_table(&analysis.project, &analysis.names))
        }
        ExportKind::Edits => {
            let plan = plan_renames(&analysis, progress);
            warnings.extend(plan.warnings.iter().cloned());
            to_json(&edit_dump(&plan))?
        }
        ExportKind::Graph => serde_json::Value::String(dependency_graph(&analysis.project)),
    };

    let (output, content) = match output {
        Some(target) => {
            write_export(target, &content)?;
            info!(path = %target.display(), "export written");
            (Some(target.display().to_string()), None)
        }
        None => (None, Some(content)),
    };

    Ok(ExportResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        what,
        output,
        content,
        warnings,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn to_json<T: Serialize>(value: &T) -> TugResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| TugError::internal(format!("JSON serialization error: {}", e)))
}

/// Text exports are written verbatim, structured ones as pretty JSON.
fn write_export(target: &Path, content: &serde_json::Value) -> TugResult<()> {
    let text = match content {
        serde_json::Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other)
            .map_err(|e| TugError::internal(format!("JSON serialization error: {}", e)))?,
    };
    fs::write(target, text).map_err(|e| TugError::OutputError {
        path: target.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tugbasic_core::progress::SilentProgress;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Main.bas"),
            "Attribute VB_Name = \"Main\"\nPrivate item_count As Long\nSub Run()\n  item_count = 1\nEnd Sub\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn analyze_lists_renames_without_writing() {
        let dir = project();
        let response = run_analyze(dir.path(), &CliOverrides::default(), &SilentProgress).unwrap();
        assert_eq!(response.status, "ok");
        assert_eq!(response.renames.len(), 1);
        assert_eq!(response.renames[0].new_name, "itemCount");
        let text = fs::read_to_string(dir.path().join("Main.bas")).unwrap();
        assert!(text.contains("item_count"));
    }

    #[test]
    fn keep_flag_suppresses_a_rename() {
        let dir = project();
        let overrides = CliOverrides {
            keep_names: vec!["item_count".into()],
            ..Default::default()
        };
        let response = run_analyze(dir.path(), &overrides, &SilentProgress).unwrap();
        assert!(response.renames.is_empty());
    }

    #[test]
    fn export_writes_the_table_verbatim() {
        let dir = project();
        let target = dir.path().join("renames.csv");
        let response = run_export(
            dir.path(),
            &CliOverrides::default(),
            ExportKind::Table,
            Some(&target),
            &SilentProgress,
        )
        .unwrap();
        assert!(response.content.is_none());
        let csv = fs::read_to_string(target).unwrap();
        assert!(csv.starts_with("module,scope,kind,old_name,new_name\n"));
        assert!(csv.contains("Main,,variable,item_count,itemCount"));
    }

    #[test]
    fn rename_dry_run_reports_planned_edits() {
        let dir = project();
        let response =
            run_rename(dir.path(), &CliOverrides::default(), true, &SilentProgress).unwrap();
        assert!(response.dry_run);
        assert_eq!(response.report.edits_planned, 2);
        assert!(response.report.apply.is_none());
    }
}
