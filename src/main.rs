//! Binary entry point for the tugb CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Analyze a project (no files are changed)
//! tugb MyApp.vbp
//! tugb analyze MyApp.vbp --format summary
//!
//! # Rename every non-conforming identifier (applies changes by default)
//! tugb rename MyApp.vbp
//! tugb rename MyApp.vbp --dry-run --format json
//!
//! # Exports
//! tugb export MyApp.vbp --what table --output renames.csv
//! tugb export src/ --what graph
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use tugbasic::cli::{run_analyze, run_export, run_rename, AnalyzeResponse, ExportKind, RenameResponse};
use tugbasic_core::config::CliOverrides;
use tugbasic_core::error::{OutputErrorCode, TugError};
use tugbasic_core::output::{emit_response, ErrorResponse};
use tugbasic_core::progress::TracingProgress;

// ============================================================================
// CLI Structure
// ============================================================================

/// Project-wide identifier normalization for legacy Visual Basic 6 code.
///
/// Loads a `.vbp` manifest (or a directory of `.bas`/`.cls`/`.frm` files),
/// resolves every identifier across modules and renames them to one naming
/// convention. All structured output is JSON.
#[derive(Parser, Debug)]
#[command(
    name = "tugb",
    version,
    about = "Identifier normalization for VB6 projects",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Option<Command>,
    /// Manifest or source directory to analyze when no subcommand is given.
    path: Option<PathBuf>,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Exclude files matching a glob (directory scans; repeatable).
    #[arg(long, global = true)]
    exclude: Vec<String>,

    /// Never rename this identifier (repeatable).
    #[arg(long, global = true)]
    keep: Vec<String>,

    /// Treat this word as reserved (repeatable).
    #[arg(long, global = true)]
    reserved: Vec<String>,
}

impl GlobalArgs {
    fn overrides(&self, backup_dir: Option<PathBuf>) -> CliOverrides {
        CliOverrides {
            reserved_words: self.reserved.clone(),
            keep_names: self.keep.clone(),
            exclude_patterns: self.exclude.clone(),
            backup_dir,
        }
    }
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Output format for analyze command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum AnalyzeFormat {
    /// Full JSON response (default).
    #[default]
    Json,
    /// Brief text summary.
    Summary,
}

/// Output format for rename command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum RenameFormat {
    /// Human-readable text summary (default).
    #[default]
    Text,
    /// Full JSON response.
    Json,
}

/// Export selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportWhat {
    Symbols,
    Renames,
    Table,
    Edits,
    Graph,
}

impl From<ExportWhat> for ExportKind {
    fn from(what: ExportWhat) -> Self {
        match what {
            ExportWhat::Symbols => ExportKind::Symbols,
            ExportWhat::Renames => ExportKind::Renames,
            ExportWhat::Table => ExportKind::Table,
            ExportWhat::Edits => ExportKind::Edits,
            ExportWhat::Graph => ExportKind::Graph,
        }
    }
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a project without changing any file.
    Analyze {
        /// Manifest (`.vbp`) or source directory.
        path: PathBuf,
        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        format: AnalyzeFormat,
    },
    /// Rename every non-conforming identifier (apply-by-default).
    ///
    /// Use --dry-run to preview changes without modifying files.
    Rename {
        /// Manifest (`.vbp`) or source directory.
        path: PathBuf,
        /// Plan and report without writing.
        #[arg(long)]
        dry_run: bool,
        /// Backup root (default: `.tugbasic-backup` in the project root).
        #[arg(long)]
        backup_dir: Option<PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value = "text")]
        format: RenameFormat,
    },
    /// Export the symbol model, renames, edits or dependency graph.
    Export {
        /// Manifest (`.vbp`) or source directory.
        path: PathBuf,
        /// What to export.
        #[arg(long, value_enum)]
        what: ExportWhat,
        /// Write the export to this file instead of the response.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON like every other response
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), TugError> {
    match cli.command {
        Some(Command::Analyze { path, format }) => execute_analyze(&cli.global, path, format),
        Some(Command::Rename {
            path,
            dry_run,
            backup_dir,
            format,
        }) => execute_rename(&cli.global, path, dry_run, backup_dir, format),
        Some(Command::Export { path, what, output }) => {
            execute_export(&cli.global, path, what, output)
        }
        None => match cli.path {
            Some(path) => execute_analyze(&cli.global, path, AnalyzeFormat::Json),
            None => Err(TugError::invalid_args(
                "expected a manifest or directory; see `tugb --help`",
            )),
        },
    }
}

// ============================================================================
// Command Executors
// ============================================================================

fn execute_analyze(global: &GlobalArgs, path: PathBuf, format: AnalyzeFormat) -> Result<(), TugError> {
    let response = run_analyze(&path, &global.overrides(None), &TracingProgress)?;
    match format {
        AnalyzeFormat::Json => emit(&response),
        AnalyzeFormat::Summary => {
            output_analyze_summary(&response);
            Ok(())
        }
    }
}

fn execute_rename(
    global: &GlobalArgs,
    path: PathBuf,
    dry_run: bool,
    backup_dir: Option<PathBuf>,
    format: RenameFormat,
) -> Result<(), TugError> {
    let response = run_rename(&path, &global.overrides(backup_dir), dry_run, &TracingProgress)?;
    match format {
        RenameFormat::Json => emit(&response),
        RenameFormat::Text => {
            output_rename_summary(&response);
            Ok(())
        }
    }
}

fn execute_export(
    global: &GlobalArgs,
    path: PathBuf,
    what: ExportWhat,
    output: Option<PathBuf>,
) -> Result<(), TugError> {
    let response = run_export(
        &path,
        &global.overrides(None),
        what.into(),
        output.as_deref(),
        &TracingProgress,
    )?;
    emit(&response)
}

fn emit<T: serde::Serialize>(response: &T) -> Result<(), TugError> {
    emit_response(response, &mut io::stdout()).map_err(|e| TugError::internal(e.to_string()))?;
    let _ = io::stdout().flush();
    Ok(())
}

fn output_analyze_summary(response: &AnalyzeResponse) {
    let summary = &response.summary;
    println!(
        "Project '{}': {} module(s), {} symbol(s)",
        summary.project, summary.modules, summary.symbols
    );
    println!(
        "  {} referenced, {} to rename, {} call(s) resolved, {} unresolved",
        summary.referenced_symbols,
        summary.renames,
        summary.resolve.calls_resolved,
        summary.resolve.calls_unresolved
    );
    print_warnings(&response.warnings);
}

fn output_rename_summary(response: &RenameResponse) {
    let report = &response.report;
    match &report.apply {
        Some(apply) => {
            println!(
                "Renamed {} symbol(s) in project '{}'",
                report.summary.renames, report.summary.project
            );
            println!(
                "  {} file(s) modified, {} edit(s) applied",
                apply.files_written.len(),
                apply.edits_applied
            );
            if let Some(dir) = &apply.backup_dir {
                println!("  Backup: {}", dir.display());
            }
        }
        None if report.edits_planned == 0 => println!("No changes needed."),
        None => {
            println!(
                "Dry run: would rename {} symbol(s) in project '{}'",
                report.summary.renames, report.summary.project
            );
            println!(
                "  {} file(s) would be affected, {} edit(s)",
                report.files_planned, report.edits_planned
            );
        }
    }
    print_warnings(&report.warnings);
}

fn print_warnings(warnings: &[tugbasic_core::output::Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("  Warnings:");
    for warning in warnings {
        match &warning.location {
            Some(location) => println!("    - {}: {} ({})", warning.code, warning.message, location),
            None => println!("    - {}: {}", warning.code, warning.message),
        }
    }
}
