//! Report exporters.
//!
//! - [`symbol_dump`]: the whole model with final names, serializable
//! - [`rename_view`]: only the symbols whose names change
//! - [`rename_table`]: the same as CSV
//! - [`edit_dump`]: every planned edit
//! - [`dependency_graph`]: module-to-module calls as diagram text
//!
//! Collections are ordered by final name, case-insensitively. Parameters and
//! call lists keep source order.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use tugbasic_core::patch::EditCategory;
use tugbasic_core::text::caseless_key;

use crate::model::{
    CallSite, MemberRef, ModuleId, ModuleKind, Project, References, SymbolRef, Visibility,
};
use crate::naming::{NameTable, Rename};
use crate::plan::RenamePlan;

// ============================================================================
// Symbol dump
// ============================================================================

/// One named symbol.
#[derive(Debug, Serialize)]
pub struct SymbolEntry<'a> {
    pub name: &'a str,
    pub new_name: &'a str,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    pub used: bool,
    pub references: &'a References,
}

/// A symbol with nested members (enum values, fields).
#[derive(Debug, Serialize)]
pub struct ContainerEntry<'a> {
    #[serde(flatten)]
    pub symbol: SymbolEntry<'a>,
    pub members: Vec<SymbolEntry<'a>>,
}

/// A procedure, property or event.
#[derive(Debug, Serialize)]
pub struct MemberEntry<'a> {
    #[serde(flatten)]
    pub symbol: SymbolEntry<'a>,
    pub parameters: Vec<SymbolEntry<'a>>,
    pub locals: Vec<SymbolEntry<'a>>,
    pub constants: Vec<SymbolEntry<'a>>,
    pub calls: &'a [CallSite],
}

#[derive(Debug, Serialize)]
pub struct ModuleEntry<'a> {
    pub name: &'a str,
    pub new_name: &'a str,
    pub kind: ModuleKind,
    pub path: &'a str,
    pub shared_external: bool,
    pub used: bool,
    pub referenced_by: Vec<&'a str>,
    pub variables: Vec<SymbolEntry<'a>>,
    pub constants: Vec<SymbolEntry<'a>>,
    pub enums: Vec<ContainerEntry<'a>>,
    pub types: Vec<ContainerEntry<'a>>,
    pub events: Vec<MemberEntry<'a>>,
    pub controls: Vec<SymbolEntry<'a>>,
    pub procedures: Vec<MemberEntry<'a>>,
    pub properties: Vec<MemberEntry<'a>>,
}

#[derive(Debug, Serialize)]
pub struct SymbolDump<'a> {
    pub project: &'a str,
    pub modules: Vec<ModuleEntry<'a>>,
}

struct Dumper<'a> {
    project: &'a Project,
    names: &'a NameTable,
}

impl<'a> Dumper<'a> {
    fn entry(&self, symbol: SymbolRef, used: bool) -> Option<SymbolEntry<'a>> {
        let (project, names): (&'a Project, &'a NameTable) = (self.project, self.names);
        let module = project.module(symbol.module())?;
        let name = project.symbol_name(symbol)?;
        let (type_name, visibility) = match symbol {
            SymbolRef::Variable(_, i) => {
                let v = module.variables.get(i)?;
                (Some(v.type_name.as_str()), Some(v.visibility))
            }
            SymbolRef::Constant(_, i) => {
                let c = module.constants.get(i)?;
                (Some(c.type_name.as_str()), Some(c.visibility))
            }
            SymbolRef::Control(_, i) => (Some(module.controls.get(i)?.control_type.as_str()), None),
            SymbolRef::Enum(_, i) => (None, Some(module.enums.get(i)?.visibility)),
            SymbolRef::UserType(_, i) => (None, Some(module.types.get(i)?.visibility)),
            SymbolRef::Event(_, i) => (None, Some(module.events.get(i)?.visibility)),
            SymbolRef::Procedure(_, i) => {
                let p = module.procedures.get(i)?;
                (Some(p.return_type.as_str()), Some(p.visibility))
            }
            SymbolRef::Property(_, i) => {
                let p = module.properties.get(i)?;
                (Some(p.return_type.as_str()), Some(p.visibility))
            }
            SymbolRef::Field(_, t, f) => (Some(module.types.get(t)?.fields.get(f)?.type_name.as_str()), None),
            SymbolRef::Parameter(_, MemberRef::Event(e), i) => (
                Some(module.events.get(e)?.parameters.get(i)?.type_name.as_str()),
                None,
            ),
            SymbolRef::Parameter(_, owner, i) => {
                (Some(module.member(owner)?.parameters.get(i)?.type_name.as_str()), None)
            }
            SymbolRef::Local(_, owner, i) => {
                (Some(module.member(owner)?.locals.get(i)?.type_name.as_str()), None)
            }
            SymbolRef::LocalConstant(_, owner, i) => (
                Some(module.member(owner)?.local_constants.get(i)?.type_name.as_str()),
                None,
            ),
            SymbolRef::Module(_) | SymbolRef::EnumValue(..) => (None, None),
        };
        Some(SymbolEntry {
            name,
            new_name: names.name(symbol).unwrap_or(name),
            kind: symbol.kind_label(),
            type_name: type_name.filter(|t| !t.is_empty()),
            visibility,
            used,
            references: project.symbol_references(symbol)?,
        })
    }

    fn member(&self, m: ModuleId, owner: MemberRef, symbol: SymbolRef) -> Option<MemberEntry<'a>> {
        let project: &'a Project = self.project;
        let module = project.module(m)?;
        if let MemberRef::Event(e) = owner {
            let event = module.events.get(e)?;
            return Some(MemberEntry {
                symbol: self.entry(symbol, event.used)?,
                parameters: (0..event.parameters.len())
                    .filter_map(|i| self.entry(SymbolRef::Parameter(m, owner, i), event.parameters[i].used))
                    .collect(),
                locals: Vec::new(),
                constants: Vec::new(),
                calls: &[],
            });
        }
        let proc = module.member(owner)?;
        Some(MemberEntry {
            symbol: self.entry(symbol, proc.used)?,
            parameters: (0..proc.parameters.len())
                .filter_map(|i| self.entry(SymbolRef::Parameter(m, owner, i), proc.parameters[i].used))
                .collect(),
            locals: sorted(
                (0..proc.locals.len())
                    .filter_map(|i| self.entry(SymbolRef::Local(m, owner, i), proc.locals[i].used))
                    .collect(),
            ),
            constants: sorted(
                (0..proc.local_constants.len())
                    .filter_map(|i| {
                        self.entry(SymbolRef::LocalConstant(m, owner, i), proc.local_constants[i].used)
                    })
                    .collect(),
            ),
            calls: &proc.calls,
        })
    }

    fn module(&self, m: ModuleId) -> Option<ModuleEntry<'a>> {
        let (project, names): (&'a Project, &'a NameTable) = (self.project, self.names);
        let module = project.module(m)?;

        let variables = (0..module.variables.len())
            .filter_map(|i| self.entry(SymbolRef::Variable(m, i), module.variables[i].used))
            .collect();
        let constants = (0..module.constants.len())
            .filter_map(|i| self.entry(SymbolRef::Constant(m, i), module.constants[i].used))
            .collect();
        let enums = module
            .enums
            .iter()
            .enumerate()
            .filter_map(|(ei, e)| {
                Some(ContainerEntry {
                    symbol: self.entry(SymbolRef::Enum(m, ei), e.used)?,
                    members: sorted(
                        (0..e.values.len())
                            .filter_map(|v| self.entry(SymbolRef::EnumValue(m, ei, v), e.values[v].used))
                            .collect(),
                    ),
                })
            })
            .collect::<Vec<_>>();
        let types = module
            .types
            .iter()
            .enumerate()
            .filter_map(|(ti, t)| {
                Some(ContainerEntry {
                    symbol: self.entry(SymbolRef::UserType(m, ti), t.used)?,
                    members: sorted(
                        (0..t.fields.len())
                            .filter_map(|f| self.entry(SymbolRef::Field(m, ti, f), t.fields[f].used))
                            .collect(),
                    ),
                })
            })
            .collect::<Vec<_>>();
        let events = (0..module.events.len())
            .filter_map(|i| self.member(m, MemberRef::Event(i), SymbolRef::Event(m, i)))
            .collect::<Vec<_>>();
        let controls = (0..module.controls.len())
            .filter_map(|i| self.entry(SymbolRef::Control(m, i), module.controls[i].used))
            .collect();
        let procedures = (0..module.procedures.len())
            .filter_map(|i| self.member(m, MemberRef::Procedure(i), SymbolRef::Procedure(m, i)))
            .collect::<Vec<_>>();
        let properties = (0..module.properties.len())
            .filter_map(|i| self.member(m, MemberRef::Property(i), SymbolRef::Property(m, i)))
            .collect::<Vec<_>>();

        Some(ModuleEntry {
            name: &module.name,
            new_name: names.name(SymbolRef::Module(m)).unwrap_or(&module.name),
            kind: module.kind,
            path: &module.relative_path,
            shared_external: module.shared_external,
            used: module.used,
            referenced_by: module.referenced_by.iter().map(String::as_str).collect(),
            variables: sorted(variables),
            constants: sorted(constants),
            enums: sorted_by(enums, |e| e.symbol.new_name),
            types: sorted_by(types, |t| t.symbol.new_name),
            events: sorted_by(events, |e| e.symbol.new_name),
            controls: sorted(controls),
            procedures: sorted_by(procedures, |p| p.symbol.new_name),
            properties: sorted_by(properties, |p| p.symbol.new_name),
        })
    }
}

fn sorted(entries: Vec<SymbolEntry<'_>>) -> Vec<SymbolEntry<'_>> {
    sorted_by(entries, |e| e.new_name)
}

fn sorted_by<T>(mut items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    items.sort_by_cached_key(|item| caseless_key(key(item)));
    items
}

/// The whole model with final names.
pub fn symbol_dump<'a>(project: &'a Project, names: &'a NameTable) -> SymbolDump<'a> {
    let dumper = Dumper { project, names };
    let modules = project.module_ids().filter_map(|m| dumper.module(m)).collect();
    SymbolDump {
        project: &project.name,
        modules: sorted_by(modules, |m| m.new_name),
    }
}

// ============================================================================
// Renames
// ============================================================================

/// Symbols whose names change, in declaration order.
pub fn rename_view(project: &Project, names: &NameTable) -> Vec<Rename> {
    names.renames(project).into_iter().map(|(_, r)| r).collect()
}

/// Rename table as CSV: `module,scope,kind,old_name,new_name`.
pub fn rename_table(project: &Project, names: &NameTable) -> String {
    let mut out = String::from("module,scope,kind,old_name,new_name\n");
    for r in rename_view(project, names) {
        let kind = serde_json::to_value(r.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let fields = [
            r.module.as_str(),
            r.scope.as_str(),
            kind.as_str(),
            r.old_name.as_str(),
            r.new_name.as_str(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ============================================================================
// Edits
// ============================================================================

/// One planned edit, flattened for output.
#[derive(Debug, Clone, Serialize)]
pub struct EditRow {
    pub file: String,
    pub line: u32,
    pub start: usize,
    pub end: usize,
    pub old_text: String,
    pub new_text: String,
    pub category: EditCategory,
    pub symbol: String,
}

/// Every edit of a plan, by file then top to bottom.
pub fn edit_dump(plan: &RenamePlan) -> Vec<EditRow> {
    let mut rows: Vec<EditRow> = plan
        .files
        .iter()
        .flat_map(|f| {
            f.patch.edits.iter().map(|e| EditRow {
                file: f.relative_path.clone(),
                line: e.line,
                start: e.span.start,
                end: e.span.end,
                old_text: e.old_text.clone(),
                new_text: e.new_text.clone(),
                category: e.category,
                symbol: e.symbol.clone(),
            })
        })
        .collect();
    rows.sort_by(|a, b| (&a.file, a.line, a.start).cmp(&(&b.file, b.line, b.start)));
    rows
}

// ============================================================================
// Dependency graph
// ============================================================================

/// Cross-module calls as `caller --> callee` lines under one
/// `%% ModuleA -> ModuleB` header per module pair.
pub fn dependency_graph(project: &Project) -> String {
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for edge in &project.dependencies {
        let caller = qualified(&edge.caller_module, &edge.caller_procedure);
        let callee = qualified(&edge.callee_module, &edge.callee_procedure);
        let lines = groups
            .entry((edge.caller_module.clone(), edge.callee_module.clone()))
            .or_default();
        let line = format!("    {caller} --> {callee}");
        if !lines.contains(&line) {
            lines.push(line);
        }
    }

    let mut out = String::from("graph LR\n");
    for ((from, to), mut lines) in groups {
        lines.sort_by_key(|l| caseless_key(l));
        let _ = writeln!(out, "%% {from} -> {to}");
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
    }
    out
}

fn qualified(module: &str, procedure: &str) -> String {
    if procedure.is_empty() {
        module.to_string()
    } else {
        format!("{module}.{procedure}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{assign_names, ConventionOracle, NamingOptions};
    use crate::parser::parse_module;
    use crate::plan::build_plan;
    use crate::resolve::resolve_project;
    use tugbasic_core::progress::SilentProgress;

    fn analyzed() -> (Project, NameTable) {
        let main = "Private z_count As Long\nPrivate a_flag As Boolean\n\nSub Run()\n  ClsBar_Helper.do_thing\n  z_count = 1\nEnd Sub";
        let helper = "Public Sub do_thing()\nEnd Sub";
        let mut project = Project::new("Test", "/tmp");
        for (name, kind, src) in [
            ("Main", ModuleKind::Standard, main),
            ("ClsBar_Helper", ModuleKind::Standard, helper),
        ] {
            let lines = src.lines().map(str::to_string).collect();
            let mut module = parse_module(name, kind, lines).0;
            module.relative_path = format!("{name}.bas");
            project.modules.push(module);
        }
        resolve_project(&mut project, &SilentProgress);
        let names = assign_names(&project, &ConventionOracle, &NamingOptions::default());
        (project, names)
    }

    #[test]
    fn dump_orders_by_final_name() {
        let (project, names) = analyzed();
        let dump = symbol_dump(&project, &names);
        let main = dump.modules.iter().find(|m| m.name == "Main").unwrap();
        let vars: Vec<_> = main.variables.iter().map(|v| v.new_name).collect();
        assert_eq!(vars, vec!["aFlag", "zCount"]);
        assert!(main.variables[1].used);

        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["project"], "Test");
    }

    #[test]
    fn rename_table_lists_changes() {
        let (project, names) = analyzed();
        let csv = rename_table(&project, &names);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("module,scope,kind,old_name,new_name"));
        assert!(csv.contains("Main,,variable,z_count,zCount\n"));
        assert!(csv.contains("ClsBar_Helper,,module,ClsBar_Helper,ClsBarHelper\n"));
        assert!(!csv.contains(",Run,"));
    }

    #[test]
    fn graph_groups_calls_by_module_pair() {
        let (project, _) = analyzed();
        let graph = dependency_graph(&project);
        assert_eq!(
            graph,
            "graph LR\n%% Main -> ClsBar_Helper\n    Main.Run --> ClsBar_Helper.do_thing\n"
        );
    }

    #[test]
    fn edit_rows_run_top_to_bottom() {
        let (project, names) = analyzed();
        let plan = build_plan(&project, &names, &SilentProgress);
        let rows = edit_dump(&plan);
        let main: Vec<_> = rows
            .iter()
            .filter(|r| r.file == "Main.bas")
            .map(|r| (r.line, r.start))
            .collect();
        let mut ordered = main.clone();
        ordered.sort();
        assert_eq!(main, ordered);
        assert!(rows.iter().any(|r| r.category == EditCategory::Reference && r.new_text == "DoThing"));
    }
}
