//! Phase B: cross-file resolution.
//!
//! Every module is scanned against an immutable [`ProjectIndex`]; the
//! resulting hits are then applied to the model in one mutable pass. After
//! that come type-level usage, property group propagation, module usage and
//! dependency edges. Running resolution twice yields the same model:
//! references merge, call sites are matched before they are appended, and
//! derived data is recomputed from scratch.

pub mod scan;
pub mod types;

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use tugbasic_core::progress::{Phase, ProgressSink};
use tugbasic_core::text::{caseless_eq, caseless_key};

use crate::index::ProjectIndex;
use crate::model::{
    CallSite, CallTarget, DeclPos, DependencyEdge, MemberRef, ModuleId, Project, Site, SymbolRef,
};

use self::scan::{scan_module, Hit};
pub use self::types::{ResolvedType, TypeResolver};

/// Counts reported after resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveSummary {
    pub modules: usize,
    /// Identifier tokens resolved to a project symbol.
    pub references: usize,
    /// Declared types naming a project type.
    pub type_references: usize,
    pub calls_resolved: usize,
    pub calls_unresolved: usize,
    pub dependencies: usize,
}

/// Resolve every identifier of every module.
pub fn resolve_project(project: &mut Project, progress: &dyn ProgressSink) -> ResolveSummary {
    let index = ProjectIndex::build(project);
    progress.phase_started(Phase::Resolve, project.modules.len());

    let (scans, type_uses) = {
        let resolver = TypeResolver::new(project, &index);
        let mut scans = Vec::with_capacity(project.modules.len());
        for m in project.module_ids() {
            if let Some(module) = project.module(m) {
                progress.item(Phase::Resolve, &module.name);
            }
            let hits = scan_module(&resolver, m);
            debug!(module = m.0, hits = hits.len(), "scanned module");
            scans.push((m, hits));
        }
        (scans, type_usage(&resolver))
    };

    let mut summary = ResolveSummary {
        modules: project.modules.len(),
        ..Default::default()
    };
    for (m, hits) in scans {
        summary.references += hits.len();
        apply_hits(project, m, hits);
    }
    summary.type_references = type_uses.len();
    for (symbol, site) in &type_uses {
        project.record_use(*symbol, site);
    }

    propagate_property_groups(project);
    compute_module_usage(project);
    project.dependencies = dependency_edges(project);

    for module in &project.modules {
        for p in module.procedures.iter().chain(&module.properties) {
            for call in &p.calls {
                if call.target.is_some() {
                    summary.calls_resolved += 1;
                } else {
                    summary.calls_unresolved += 1;
                }
            }
        }
    }
    summary.dependencies = project.dependencies.len();

    progress.phase_finished(Phase::Resolve);
    info!(
        modules = summary.modules,
        references = summary.references,
        calls_resolved = summary.calls_resolved,
        calls_unresolved = summary.calls_unresolved,
        dependencies = summary.dependencies,
        "resolution complete"
    );
    summary
}

/// Record hits of module `m` and fill call sites.
fn apply_hits(project: &mut Project, m: ModuleId, hits: Vec<Hit>) {
    let Some(module_name) = project.module(m).map(|module| module.name.clone()) else {
        return;
    };

    for hit in hits {
        let procedure = hit
            .member
            .and_then(|member| project.module(m)?.member(member))
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let site = Site {
            module: module_name.clone(),
            procedure,
            line: hit.line,
            occurrence: Some(hit.occurrence),
        };
        project.record_use(hit.symbol, &site);

        let (Some(member), Some(call)) = (hit.member, hit.call) else {
            continue;
        };
        let Some(target) = call_target(project, hit.symbol) else {
            continue;
        };
        let is_self = match (member, hit.symbol) {
            (MemberRef::Procedure(i), SymbolRef::Procedure(sm, si)) => sm == m && si == i,
            (MemberRef::Property(i), SymbolRef::Property(sm, si)) => sm == m && si == i,
            _ => false,
        };
        let text = project
            .module(m)
            .and_then(|module| module.line(hit.line))
            .map(|l| l.trim().to_string())
            .unwrap_or_default();

        let Some(caller) = project.module_mut(m).and_then(|module| match member {
            MemberRef::Procedure(i) => module.procedures.get_mut(i),
            MemberRef::Property(i) => module.properties.get_mut(i),
            MemberRef::Event(_) => None,
        }) else {
            continue;
        };

        let existing = caller.calls.iter_mut().find(|site| {
            site.line == hit.line
                && caseless_eq(&site.name, &call.name)
                && receiver_eq(site.receiver.as_deref(), call.receiver.as_deref())
        });
        match existing {
            Some(site) => site.target = Some(target),
            None if !is_self => {
                let site = CallSite {
                    line: hit.line,
                    text,
                    receiver: call.receiver,
                    name: call.name,
                    target: Some(target),
                };
                let at = caller.calls.partition_point(|c| c.line <= site.line);
                caller.calls.insert(at, site);
            }
            None => {}
        }
    }
}

fn receiver_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => caseless_eq(a, b),
        _ => false,
    }
}

fn call_target(project: &Project, symbol: SymbolRef) -> Option<CallTarget> {
    let module = project.module(symbol.module())?;
    Some(CallTarget {
        module: module.name.clone(),
        member: project.symbol_name(symbol)?.to_string(),
    })
}

/// Declared types that name a project type, user type or enum.
fn type_usage(resolver: &TypeResolver) -> Vec<(SymbolRef, Site)> {
    let project = resolver.project;
    let mut out = Vec::new();

    for m in project.module_ids() {
        let Some(module) = project.module(m) else {
            continue;
        };
        let mut push = |type_text: &str, pos: Option<DeclPos>, procedure: &str| {
            let Some(pos) = pos else {
                return;
            };
            let symbol = match resolver.resolve_name(m, type_text) {
                ResolvedType::Module(t) => SymbolRef::Module(t),
                ResolvedType::UserType(t, i) => SymbolRef::UserType(t, i),
                ResolvedType::Enum(t, i) => SymbolRef::Enum(t, i),
                _ => return,
            };
            out.push((
                symbol,
                Site {
                    module: module.name.clone(),
                    procedure: procedure.to_string(),
                    line: pos.line,
                    occurrence: Some(pos.occurrence),
                },
            ));
        };

        for v in &module.variables {
            push(&v.type_name, v.type_pos, "");
        }
        for c in &module.constants {
            push(&c.type_name, c.type_pos, "");
        }
        for t in &module.types {
            for f in &t.fields {
                push(&f.type_name, f.type_pos, "");
            }
        }
        for e in &module.events {
            for p in &e.parameters {
                push(&p.type_name, p.type_pos, "");
            }
        }
        for p in module.procedures.iter().chain(&module.properties) {
            push(&p.return_type, p.return_type_pos, &p.name);
            for param in &p.parameters {
                push(&param.type_name, param.type_pos, &p.name);
            }
            for local in &p.locals {
                push(&local.type_name, local.type_pos, &p.name);
            }
            for c in &p.local_constants {
                push(&c.type_name, c.type_pos, &p.name);
            }
        }
    }
    out
}

/// Property Get/Let/Set of one name are used together.
fn propagate_property_groups(project: &mut Project) {
    for module in &mut project.modules {
        let mut used: HashMap<String, bool> = HashMap::new();
        for p in &module.properties {
            *used.entry(caseless_key(&p.name)).or_default() |= p.used;
        }
        for p in &mut module.properties {
            if used.get(&caseless_key(&p.name)).copied().unwrap_or(false) {
                p.used = true;
            }
        }
    }
}

/// Module `used` flags and `referenced_by` sets.
fn compute_module_usage(project: &mut Project) {
    let mut referenced_by: Vec<BTreeSet<String>> = vec![BTreeSet::new(); project.modules.len()];
    for symbol in project.all_symbols() {
        let m = symbol.module();
        let (Some(module), Some(refs)) = (project.module(m), project.symbol_references(symbol))
        else {
            continue;
        };
        for name in refs.modules() {
            if !caseless_eq(name, &module.name) {
                referenced_by[m.index()].insert(name.to_string());
            }
        }
    }

    for (module, by) in project.modules.iter_mut().zip(referenced_by) {
        module.referenced_by = by;
        module.used = !module.references.is_empty() || module.any_member_used();
    }
}

/// Cross-module call edges from resolved call sites.
fn dependency_edges(project: &Project) -> Vec<DependencyEdge> {
    let mut edges = BTreeSet::new();
    for module in &project.modules {
        for p in module.procedures.iter().chain(&module.properties) {
            for call in &p.calls {
                let Some(target) = &call.target else {
                    continue;
                };
                if caseless_eq(&target.module, &module.name) {
                    continue;
                }
                edges.insert(DependencyEdge {
                    caller_module: module.name.clone(),
                    caller_procedure: p.name.clone(),
                    callee_module: target.module.clone(),
                    callee_procedure: target.member.clone(),
                    text: call.text.clone(),
                });
            }
        }
    }
    edges.into_iter().collect()
}
