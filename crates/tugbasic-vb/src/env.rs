//! Name-to-type environments used while resolving receivers.
//!
//! A module environment is seeded from declarations and then refined by
//! `Set x = ...` assignments to module-scope variables found anywhere in the
//! module. A procedure
//! environment starts from its module's and adds parameters, locals and the
//! assignments inside the procedure. Later bindings win.

use std::collections::HashMap;

use tugbasic_core::text::{caseless_eq, caseless_key};

use crate::continuation::LogicalLine;
use crate::lexer::code_end;
use crate::model::{MemberRef, ModuleId, ModuleKind, Procedure, SymbolRef};
use crate::resolve::types::{ResolvedType, TypeResolver};

mod patterns {
    use std::sync::LazyLock;

    /// `Set x = New Type`
    pub static SET_NEW: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)^\s*Set\s+(\p{L}[\p{L}\p{N}_]*)\s*=\s*New\s+(\p{L}[\p{L}\p{N}_.]*)")
            .unwrap()
    });

    /// `Set x = source`, `Set x = source(args)`, `Set x = source.member`
    pub static SET_ALIAS: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(
            r"(?i)^\s*Set\s+(\p{L}[\p{L}\p{N}_]*)\s*=\s*(\p{L}[\p{L}\p{N}_]*)(?:\s*\([^)]*\))?(?:\.(\p{L}[\p{L}\p{N}_]*))?\s*$",
        )
        .unwrap()
    });
}

/// One recognized object assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Assignment {
    New { target: String, type_name: String },
    Alias {
        target: String,
        source: String,
        member: Option<String>,
    },
}

impl Assignment {
    fn target(&self) -> &str {
        match self {
            Assignment::New { target, .. } | Assignment::Alias { target, .. } => target,
        }
    }

    fn source(&self) -> Option<&str> {
        match self {
            Assignment::New { .. } => None,
            Assignment::Alias { source, .. } => Some(source),
        }
    }
}

/// Whether a procedure declares `name` as a parameter or local.
fn declares(proc: &Procedure, name: &str) -> bool {
    proc.parameters.iter().any(|p| caseless_eq(&p.name, name))
        || proc.locals.iter().any(|l| caseless_eq(&l.name, name))
}

fn parse_assignment(statement: &str) -> Option<Assignment> {
    if let Some(caps) = patterns::SET_NEW.captures(statement) {
        return Some(Assignment::New {
            target: caps[1].to_string(),
            type_name: caps[2].to_string(),
        });
    }
    let caps = patterns::SET_ALIAS.captures(statement)?;
    Some(Assignment::Alias {
        target: caps[1].to_string(),
        source: caps[2].to_string(),
        member: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

/// Code statements of a logical line, split on `:` outside strings.
fn statements(line: &LogicalLine) -> Vec<String> {
    let code: String = line.text.chars().take(code_end(&line.text)).collect();
    if code.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_string = !in_string;
                current.push(c);
            }
            ':' if !in_string && chars.peek() != Some(&'=') => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

/// Lower-cased name to type bindings.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    bindings: HashMap<String, ResolvedType>,
}

impl TypeEnv {
    pub fn get(&self, name: &str) -> Option<ResolvedType> {
        self.bindings.get(&caseless_key(name)).copied()
    }

    pub fn bind(&mut self, name: &str, ty: ResolvedType) {
        self.bindings.insert(caseless_key(name), ty);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Environment for module-level code of `module`.
    pub fn for_module(resolver: &TypeResolver, module: ModuleId, lines: &[LogicalLine]) -> Self {
        let mut env = TypeEnv::default();
        let project = resolver.project;

        for (mi, other) in project.modules.iter().enumerate() {
            let m = ModuleId(mi as u32);
            if m == module || other.kind != ModuleKind::Standard {
                continue;
            }
            for (i, v) in other.variables.iter().enumerate() {
                if v.visibility.is_public() {
                    env.bind(&v.name, resolver.declared(SymbolRef::Variable(m, i)));
                }
            }
        }
        let own = project.module(module);
        if let Some(own) = own {
            for (i, v) in own.variables.iter().enumerate() {
                env.bind(&v.name, resolver.declared(SymbolRef::Variable(module, i)));
            }
        }

        // Inside a procedure only assignments to module-scope variables count.
        let module_scope = env.clone();
        env.scan_assignments(resolver, module, lines, |assignment, line| {
            let Some(proc) = own.and_then(|m| m.member(m.member_at(line)?)) else {
                return true;
            };
            module_scope.get(assignment.target()).is_some()
                && !declares(proc, assignment.target())
                && assignment.source().is_none_or(|source| !declares(proc, source))
        });
        env
    }

    /// Environment for the body of a procedure or property.
    pub fn for_member(
        &self,
        resolver: &TypeResolver,
        module: ModuleId,
        member: MemberRef,
        lines: &[LogicalLine],
    ) -> Self {
        let mut env = self.clone();
        let Some(proc) = resolver
            .project
            .module(module)
            .and_then(|m| m.member(member))
        else {
            return env;
        };

        for (i, param) in proc.parameters.iter().enumerate() {
            env.bind(&param.name, resolver.declared(SymbolRef::Parameter(module, member, i)));
        }
        for (i, local) in proc.locals.iter().enumerate() {
            env.bind(&local.name, resolver.declared(SymbolRef::Local(module, member, i)));
        }

        let body: Vec<LogicalLine> = lines
            .iter()
            .filter(|l| proc.contains_line(l.start_line()))
            .cloned()
            .collect();
        env.scan_assignments(resolver, module, &body, |_, _| true);
        env
    }

    /// Refine bindings from accepted `Set` assignments, in source order.
    fn scan_assignments(
        &mut self,
        resolver: &TypeResolver,
        module: ModuleId,
        lines: &[LogicalLine],
        accept: impl Fn(&Assignment, u32) -> bool,
    ) {
        for line in lines {
            for statement in statements(line) {
                let Some(assignment) = parse_assignment(&statement) else {
                    continue;
                };
                if !accept(&assignment, line.start_line()) {
                    continue;
                }
                let (target, ty) = match assignment {
                    Assignment::New { target, type_name } => {
                        let ty = resolver.resolve_name(module, &type_name);
                        (target, ty)
                    }
                    Assignment::Alias {
                        target,
                        source,
                        member,
                    } => {
                        let Some(mut ty) = self.source_type(resolver, module, &source) else {
                            continue;
                        };
                        if let Some(member) = member {
                            ty = match resolver.member(module, ty, &member) {
                                Some(symbol) => resolver.declared(symbol),
                                None if ty.is_opaque() => ResolvedType::External,
                                None => ResolvedType::Unknown,
                            };
                        }
                        (target, ty)
                    }
                };
                if ty != ResolvedType::Unknown {
                    self.bind(&target, ty);
                }
            }
        }
    }

    /// Type of the right-hand side of an alias assignment.
    fn source_type(&self, resolver: &TypeResolver, module: ModuleId, source: &str) -> Option<ResolvedType> {
        if caseless_eq(source, "Nothing") {
            return None;
        }
        if caseless_eq(source, "Me") {
            return Some(ResolvedType::Module(module));
        }
        if let Some(ty) = self.get(source) {
            return Some(ty);
        }
        if let Some(symbol) = resolver.module_member(module, source) {
            if matches!(symbol, SymbolRef::Procedure(..) | SymbolRef::Property(..)) {
                return Some(resolver.declared(symbol));
            }
        }
        if let Some(m) = resolver.index.module(source) {
            return Some(ResolvedType::Module(m));
        }
        resolver
            .index
            .global(resolver.project, module, source)
            .map(|symbol| resolver.declared(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::normalize_lines;
    use crate::index::ProjectIndex;
    use crate::model::Project;
    use crate::parser::parse_module;

    fn project(sources: &[(&str, ModuleKind, &str)]) -> Project {
        let mut project = Project::new("Test", "/tmp");
        for (name, kind, src) in sources {
            let lines = src.lines().map(str::to_string).collect();
            project.modules.push(parse_module(name, *kind, lines).0);
        }
        project
    }

    #[test]
    fn splits_statements_outside_strings() {
        let line = &normalize_lines(&["a = \"x:y\": Set b = c ' z".to_string()])[0];
        assert_eq!(statements(line), vec!["a = \"x:y\"", " Set b = c "]);
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_assignment("Set obj = New ClsBar"),
            Some(Assignment::New {
                target: "obj".into(),
                type_name: "ClsBar".into()
            })
        );
        assert_eq!(
            parse_assignment("  set a = Factory(1, 2).Item"),
            Some(Assignment::Alias {
                target: "a".into(),
                source: "Factory".into(),
                member: Some("Item".into())
            })
        );
        assert_eq!(parse_assignment("x = 1"), None);
    }

    #[test]
    fn assignments_refine_untyped_variables() {
        let main = "Dim a As Object\nDim b\n\nSub Run()\n  Dim c As Variant\n  Set a = New ClsBar\n  Set c = a\n  Set b = Nothing\nEnd Sub";
        let p = project(&[
            ("Main", ModuleKind::Standard, main),
            ("ClsBar", ModuleKind::Class, "Public Sub DoThing()\nEnd Sub"),
        ]);
        let index = ProjectIndex::build(&p);
        let resolver = TypeResolver::new(&p, &index);
        let m = ModuleId(0);
        let lines = normalize_lines(&p.modules[0].lines);

        let module_env = TypeEnv::for_module(&resolver, m, &lines);
        assert_eq!(module_env.get("A"), Some(ResolvedType::Module(ModuleId(1))));
        assert_eq!(module_env.get("b"), Some(ResolvedType::Unknown));

        let proc_env = module_env.for_member(&resolver, m, MemberRef::Procedure(0), &lines);
        assert_eq!(proc_env.get("c"), Some(ResolvedType::Module(ModuleId(1))));
    }

    #[test]
    fn procedure_locals_do_not_retype_module_variables() {
        let main = "Dim x As Object\nDim y As Object\n\nSub Build()\n  Dim x As Object\n  Set x = New ClsBar\nEnd Sub\n\nSub Wire(ByVal y As Object)\n  Set y = New ClsBar\nEnd Sub\n\nSub Other()\n  x.DoThing\nEnd Sub";
        let p = project(&[
            ("Main", ModuleKind::Standard, main),
            ("ClsBar", ModuleKind::Class, "Public Sub DoThing()\nEnd Sub"),
        ]);
        let index = ProjectIndex::build(&p);
        let resolver = TypeResolver::new(&p, &index);
        let m = ModuleId(0);
        let lines = normalize_lines(&p.modules[0].lines);

        let module_env = TypeEnv::for_module(&resolver, m, &lines);
        assert_eq!(module_env.get("x"), Some(ResolvedType::Unknown));
        assert_eq!(module_env.get("y"), Some(ResolvedType::Unknown));

        let build = module_env.for_member(&resolver, m, MemberRef::Procedure(0), &lines);
        assert_eq!(build.get("x"), Some(ResolvedType::Module(ModuleId(1))));
        let other = module_env.for_member(&resolver, m, MemberRef::Procedure(2), &lines);
        assert_eq!(other.get("x"), Some(ResolvedType::Unknown));
    }
}
