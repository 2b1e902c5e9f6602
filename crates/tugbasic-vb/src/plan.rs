//! Rename plan: the edits that apply a [`NameTable`] to the sources.
//!
//! Every edit targets one identifier token on one physical line, addressed by
//! its char span. Tokens are located by spelling and occurrence index, so
//! text in strings and comments is never touched; directive lines
//! (`Attribute VB_Name = "..."`) are handled explicitly.
//!
//! Per file, edits are de-duplicated, overlaps are dropped with a warning,
//! and the rest is sorted for bottom-to-top, right-to-left application.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use tugbasic_core::output::{warning_codes, Location, Warning};
use tugbasic_core::patch::{Edit, EditCategory, FilePatch, Span};
use tugbasic_core::progress::{Phase, ProgressSink};
use tugbasic_core::text::{caseless_eq, char_slice};

use crate::lexer::{string_ranges, tokenize, Token};
use crate::model::{ModuleId, Occurrences, Project, SymbolRef};
use crate::naming::NameTable;

/// Edits for one file.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedFile {
    /// Source module, or `None` for the manifest.
    #[serde(skip)]
    pub module: Option<ModuleId>,
    pub name: String,
    pub path: PathBuf,
    pub relative_path: String,
    pub shared_external: bool,
    pub patch: FilePatch,
}

/// Every edit of a rename run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenamePlan {
    pub files: Vec<PlannedFile>,
    pub warnings: Vec<Warning>,
}

impl RenamePlan {
    pub fn edit_count(&self) -> usize {
        self.files.iter().map(|f| f.patch.edits.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edit_count() == 0
    }

    /// Planned file for a module, by name.
    pub fn file(&self, name: &str) -> Option<&PlannedFile> {
        self.files.iter().find(|f| caseless_eq(&f.name, name))
    }

    /// Edit counts per category, for summaries.
    pub fn category_counts(&self) -> Vec<(EditCategory, usize)> {
        let mut counts: HashMap<EditCategory, usize> = HashMap::new();
        for edit in self.files.iter().flat_map(|f| &f.patch.edits) {
            *counts.entry(edit.category).or_default() += 1;
        }
        let mut out: Vec<_> = counts.into_iter().collect();
        out.sort();
        out
    }
}

/// Build the edits for every symbol whose name changes, plus every bare use
/// of an enum value that must be qualified.
pub fn build_plan(project: &Project, names: &NameTable, progress: &dyn ProgressSink) -> RenamePlan {
    let mut planner = Planner {
        project,
        names,
        patches: project
            .modules
            .iter()
            .map(|m| FilePatch::new(m.relative_path.clone()))
            .collect(),
        manifest: project
            .manifest
            .as_ref()
            .map(|m| FilePatch::new(m.relative_path.clone())),
        tokens: HashMap::new(),
    };

    progress.phase_started(Phase::Plan, project.modules.len());
    let symbols = project.all_symbols();
    for module in &project.modules {
        progress.item(Phase::Plan, &module.name);
    }
    for symbol in symbols {
        planner.symbol(symbol);
    }
    progress.phase_finished(Phase::Plan);

    let plan = planner.finish();
    info!(
        files = plan.files.len(),
        edits = plan.edit_count(),
        warnings = plan.warnings.len(),
        "rename plan built"
    );
    plan
}

struct Planner<'a> {
    project: &'a Project,
    names: &'a NameTable,
    patches: Vec<FilePatch>,
    manifest: Option<FilePatch>,
    tokens: HashMap<(ModuleId, u32), Vec<Token>>,
}

impl Planner<'_> {
    fn symbol(&mut self, symbol: SymbolRef) {
        let (project, names) = (self.project, self.names);
        let (Some(old), Some(new)) = (project.symbol_name(symbol), names.name(symbol)) else {
            return;
        };
        let renamed = old != new;
        let qualify = names.needs_qualification(symbol);
        if !renamed && !qualify {
            return;
        }
        let label = format!("{} {}", symbol.kind_label(), old);

        if renamed {
            self.declaration(symbol, old, new, &label);
        }
        self.references(symbol, old, new, qualify, &label);
    }

    fn declaration(&mut self, symbol: SymbolRef, old: &str, new: &str, label: &str) {
        let project = self.project;
        let m = symbol.module();
        let Some(module) = project.module(m) else {
            return;
        };
        match symbol {
            SymbolRef::Module(_) => {
                if let Some(line) = module.name_directive_line {
                    self.quoted(m, line, old, new, label);
                }
                if let Some(line) = module.form_begin_line {
                    self.last_token(m, line, old, new, EditCategory::Directive, label);
                }
                self.manifest_entries(old, new, label);
            }
            SymbolRef::Control(_, c) => {
                for &line in module.controls.get(c).map(|c| c.lines.as_slice()).unwrap_or(&[]) {
                    self.last_token(m, line, old, new, EditCategory::Control, label);
                }
            }
            _ => {
                let Some(decl) = project.symbol_decl(symbol) else {
                    return;
                };
                self.declared_token(m, decl.line, old, decl.occurrence, new, label);
                let header_end = match symbol {
                    SymbolRef::Procedure(_, i) => module.procedures.get(i).map(|p| p.header_end_line),
                    SymbolRef::Property(_, i) => module.properties.get(i).map(|p| p.header_end_line),
                    _ => None,
                };
                self.member_attributes(m, header_end.unwrap_or(decl.line), old, new, label);
            }
        }
    }

    /// `Attribute Name.VB_*` lines directly after a declaration.
    fn member_attributes(&mut self, m: ModuleId, after: u32, old: &str, new: &str, label: &str) {
        let mut line = after + 1;
        loop {
            let tokens = self.tokens(m, line);
            let is_attribute = tokens.first().is_some_and(|t| t.is_word("Attribute"));
            if !is_attribute {
                break;
            }
            let target = tokens.get(1).filter(|t| t.is_word(old)).cloned();
            let dotted = tokens.get(2).is_some_and(|t| t.is_punct('.'));
            if let (Some(token), true) = (target, dotted) {
                self.push(m, edit(line, &token, new, EditCategory::Directive, label));
            }
            line += 1;
        }
    }

    /// Name inside the quotes of a directive line.
    fn quoted(&mut self, m: ModuleId, line: u32, old: &str, new: &str, label: &str) {
        let project = self.project;
        let Some(text) = project.module(m).and_then(|module| module.line(line)) else {
            return;
        };
        for (start, end) in string_ranges(text) {
            let (inner_start, inner_end) = (start + 1, end.saturating_sub(1));
            if inner_end < inner_start {
                continue;
            }
            let matches = char_slice(text, inner_start, inner_end).is_some_and(|s| caseless_eq(s, old));
            if matches {
                let old_text = char_slice(text, inner_start, inner_end).unwrap_or(old).to_string();
                let e = Edit::replace(
                    line,
                    Span::new(inner_start, inner_end),
                    old_text,
                    new,
                    EditCategory::Directive,
                )
                .with_symbol(label);
                self.push(m, e);
                return;
            }
        }
    }

    /// Last identifier on a block-opening line (`Begin VB.Type name`).
    fn last_token(&mut self, m: ModuleId, line: u32, old: &str, new: &str, category: EditCategory, label: &str) {
        let token = self.tokens(m, line).iter().rev().find(|t| t.is_ident()).cloned();
        match token {
            Some(token) if token.is_word(old) => self.push(m, edit(line, &token, new, category, label)),
            _ => debug!(line, name = old, "block line does not end with the expected name"),
        }
    }

    fn declared_token(&mut self, m: ModuleId, line: u32, old: &str, occurrence: usize, new: &str, label: &str) {
        let token = self
            .tokens(m, line)
            .iter()
            .filter(|t| t.is_word(old))
            .nth(occurrence)
            .cloned();
        match token {
            Some(token) => self.push(m, edit(line, &token, new, EditCategory::Declaration, label)),
            None => debug!(line, occurrence, name = old, "declaration token not found"),
        }
    }

    fn references(&mut self, symbol: SymbolRef, old: &str, new: &str, qualify: bool, label: &str) {
        let (project, names) = (self.project, self.names);
        let Some(refs) = project.symbol_references(symbol) else {
            return;
        };
        let qualifier = match symbol {
            SymbolRef::EnumValue(m, e, _) if qualify => names.name(SymbolRef::Enum(m, e)),
            _ => None,
        };

        for reference in refs.iter() {
            let Some(target) = project.module_by_name(&reference.module) else {
                continue;
            };
            for (&line, occurrences) in &reference.lines {
                let hits = matching_tokens(self.tokens(target, line), old, symbol, occurrences);
                for (token, dotted) in hits {
                    let e = match qualifier {
                        Some(owner) if !dotted => edit(
                            line,
                            &token,
                            &format!("{owner}.{new}"),
                            EditCategory::Qualification,
                            label,
                        ),
                        _ => edit(line, &token, new, EditCategory::Reference, label),
                    };
                    self.push(target, e);
                }
            }
        }
    }

    fn manifest_entries(&mut self, old: &str, new: &str, label: &str) {
        let (Some(manifest), Some(patch)) = (&self.project.manifest, self.manifest.as_mut()) else {
            return;
        };
        for entry in manifest.name_entries.iter().filter(|e| caseless_eq(&e.name, old)) {
            patch.push(
                Edit::replace(
                    entry.line,
                    Span::new(entry.start, entry.end),
                    entry.name.clone(),
                    new,
                    EditCategory::Manifest,
                )
                .with_symbol(label),
            );
        }
    }

    fn tokens(&mut self, m: ModuleId, line: u32) -> &[Token] {
        let project = self.project;
        self.tokens.entry((m, line)).or_insert_with(|| {
            project
                .module(m)
                .and_then(|module| module.line(line))
                .map(tokenize)
                .unwrap_or_default()
        })
    }

    fn push(&mut self, m: ModuleId, edit: Edit) {
        if edit.old_text == edit.new_text {
            return;
        }
        if let Some(patch) = self.patches.get_mut(m.index()) {
            patch.push(edit);
        }
    }

    fn finish(self) -> RenamePlan {
        let mut plan = RenamePlan::default();
        let project = self.project;

        let manifest = project.manifest.as_ref().zip(self.manifest).map(|(file, patch)| PlannedFile {
            module: None,
            name: project.name.clone(),
            path: file.path.clone(),
            relative_path: file.relative_path.clone(),
            shared_external: false,
            patch,
        });
        let modules = self.patches.into_iter().enumerate().filter_map(|(i, patch)| {
            let module = project.modules.get(i)?;
            Some(PlannedFile {
                module: Some(ModuleId(i as u32)),
                name: module.name.clone(),
                path: module.path.clone(),
                relative_path: module.relative_path.clone(),
                shared_external: module.shared_external,
                patch,
            })
        });

        for mut file in modules.chain(manifest) {
            if !file.patch.has_edits() {
                continue;
            }
            for conflict in file.patch.normalize() {
                plan.warnings.push(Warning::with_location(
                    warning_codes::OVERLAPPING_EDIT,
                    conflict.to_string(),
                    Location::file(&file.relative_path),
                ));
            }
            plan.files.push(file);
        }
        plan
    }
}

fn edit(line: u32, token: &Token, new: &str, category: EditCategory, label: &str) -> Edit {
    Edit::replace(line, Span::new(token.start, token.end), token.text.clone(), new, category)
        .with_symbol(label)
}

/// Tokens on a line that a reference covers, each with whether it follows a
/// dot.
///
/// Lines recorded without occurrence indices match every spelling, except
/// that locals only match bare tokens and fields only dotted ones.
fn matching_tokens(tokens: &[Token], name: &str, symbol: SymbolRef, occurrences: &Occurrences) -> Vec<(Token, bool)> {
    let mut out = Vec::new();
    let mut n = 0;
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_word(name) {
            continue;
        }
        let occurrence = n;
        n += 1;
        if !occurrences.contains(occurrence) {
            continue;
        }
        let dotted = i > 0 && tokens[i - 1].is_punct('.');
        if *occurrences == Occurrences::Any {
            let local = matches!(
                symbol,
                SymbolRef::Local(..) | SymbolRef::Parameter(..) | SymbolRef::LocalConstant(..)
            );
            if (local && dotted) || (matches!(symbol, SymbolRef::Field(..)) && !dotted) {
                continue;
            }
        }
        out.push((token.clone(), dotted));
    }
    out
}
