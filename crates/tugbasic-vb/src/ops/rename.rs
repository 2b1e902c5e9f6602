//! Rename operation: plan the edits for an analysis and apply them.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use tugbasic_core::error::TugResult;
use tugbasic_core::output::Warning;
use tugbasic_core::patch::EditCategory;
use tugbasic_core::progress::ProgressSink;

use crate::apply::{apply_plan, ApplyOptions, ApplyReport};
use crate::plan::{build_plan, RenamePlan};

use super::analyze::{analyze, load_project, Analysis, AnalysisSummary};
use super::{project_root, PipelineOptions};

/// What a full pipeline run did.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub summary: AnalysisSummary,
    pub files_planned: usize,
    pub edits_planned: usize,
    pub edits_by_category: Vec<(EditCategory, usize)>,
    /// `None` when nothing was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply: Option<ApplyReport>,
    pub warnings: Vec<Warning>,
}

/// Compute every edit for an analyzed project.
pub fn plan_renames(analysis: &Analysis, progress: &dyn ProgressSink) -> RenamePlan {
    build_plan(&analysis.project, &analysis.names, progress)
}

/// Parse, resolve, name, plan and (unless `dry_run`) apply.
pub fn run_pipeline(
    path: &Path,
    options: &PipelineOptions,
    progress: &dyn ProgressSink,
) -> TugResult<(Analysis, RenamePlan, PipelineReport)> {
    let loaded = load_project(path, options, progress)?;
    let analysis = analyze(loaded, options, progress);
    let plan = plan_renames(&analysis, progress);

    let mut warnings = analysis.warnings.clone();
    warnings.extend(plan.warnings.iter().cloned());

    let apply = if options.dry_run || plan.is_empty() {
        None
    } else {
        let backup_root = options
            .backup_root
            .clone()
            .unwrap_or_else(|| project_root(path).join(tugbasic_core::config::DEFAULT_BACKUP_DIR));
        let report = apply_plan(&plan, &ApplyOptions::new(backup_root), progress)?;
        warnings.extend(report.warnings.iter().cloned());
        Some(report)
    };

    let report = PipelineReport {
        summary: analysis.summary.clone(),
        files_planned: plan.files.len(),
        edits_planned: plan.edit_count(),
        edits_by_category: plan.category_counts(),
        apply,
        warnings,
    };
    info!(
        edits = report.edits_planned,
        written = report.apply.as_ref().map_or(0, |a| a.files_written.len()),
        "pipeline finished"
    );
    Ok((analysis, plan, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tugbasic_core::progress::SilentProgress;

    #[test]
    fn dry_run_plans_without_writing() {
        let dir = TempDir::new().unwrap();
        let src = "Private item_count As Long\nSub Run()\n  item_count = 1\nEnd Sub\n";
        fs::write(dir.path().join("Main.bas"), src).unwrap();

        let options = PipelineOptions {
            dry_run: true,
            ..Default::default()
        };
        let (_, plan, report) = run_pipeline(dir.path(), &options, &SilentProgress).unwrap();
        assert_eq!(plan.edit_count(), 2);
        assert!(report.apply.is_none());
        assert_eq!(fs::read_to_string(dir.path().join("Main.bas")).unwrap(), src);
    }

    #[test]
    fn applies_with_backup_under_the_project_root() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Main.bas"),
            "Private item_count As Long\nSub Run()\n  item_count = 1\nEnd Sub\n",
        )
        .unwrap();

        let (_, _, report) =
            run_pipeline(dir.path(), &PipelineOptions::default(), &SilentProgress).unwrap();
        let apply = report.apply.unwrap();
        assert_eq!(apply.edits_applied, 2);
        assert!(apply
            .backup_dir
            .unwrap()
            .starts_with(dir.path().join(".tugbasic-backup")));
        assert_eq!(
            fs::read_to_string(dir.path().join("Main.bas")).unwrap(),
            "Private itemCount As Long\nSub Run()\n  itemCount = 1\nEnd Sub\n"
        );
    }
}
