//! Project-wide name index.
//!
//! Built once after Phase A and never mutated during resolution. Every map is
//! keyed by the lower-cased identifier and lists candidates in module order,
//! so "first match" is deterministic.

use std::collections::HashMap;

use tugbasic_core::text::caseless_key;

use crate::model::{ModuleId, ModuleKind, Project, SymbolRef};

type Candidates = HashMap<String, Vec<SymbolRef>>;

/// Case-insensitive lookup tables over a parsed project.
#[derive(Debug, Default)]
pub struct ProjectIndex {
    modules: HashMap<String, ModuleId>,
    class_like: HashMap<String, ModuleId>,
    procedures: Candidates,
    properties: Candidates,
    types: Candidates,
    enums: Candidates,
    enum_values: Candidates,
    public_variables: Candidates,
    public_constants: Candidates,
}

fn push(map: &mut Candidates, name: &str, symbol: SymbolRef) {
    map.entry(caseless_key(name)).or_default().push(symbol);
}

fn get<'a>(map: &'a Candidates, name: &str) -> &'a [SymbolRef] {
    map.get(&caseless_key(name))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

impl ProjectIndex {
    /// Index every declaration of a parsed project.
    pub fn build(project: &Project) -> Self {
        let mut index = ProjectIndex::default();

        for (mi, module) in project.modules.iter().enumerate() {
            let m = ModuleId(mi as u32);
            let key = caseless_key(&module.name);
            index.modules.entry(key.clone()).or_insert(m);
            if module.kind.is_class_like() {
                index.class_like.entry(key).or_insert(m);
            }

            for (i, p) in module.procedures.iter().enumerate() {
                push(&mut index.procedures, &p.name, SymbolRef::Procedure(m, i));
            }
            for (i, p) in module.properties.iter().enumerate() {
                push(&mut index.properties, &p.name, SymbolRef::Property(m, i));
            }
            for (i, t) in module.types.iter().enumerate() {
                push(&mut index.types, &t.name, SymbolRef::UserType(m, i));
            }
            for (ei, e) in module.enums.iter().enumerate() {
                push(&mut index.enums, &e.name, SymbolRef::Enum(m, ei));
                for (vi, v) in e.values.iter().enumerate() {
                    push(&mut index.enum_values, &v.name, SymbolRef::EnumValue(m, ei, vi));
                }
            }
            for (i, v) in module.variables.iter().enumerate() {
                if v.visibility.is_public() {
                    push(&mut index.public_variables, &v.name, SymbolRef::Variable(m, i));
                }
            }
            for (i, c) in module.constants.iter().enumerate() {
                if c.visibility.is_public() {
                    push(&mut index.public_constants, &c.name, SymbolRef::Constant(m, i));
                }
            }
        }

        index
    }

    /// Module by name.
    pub fn module(&self, name: &str) -> Option<ModuleId> {
        self.modules.get(&caseless_key(name)).copied()
    }

    /// Class or form module by name.
    pub fn class_module(&self, name: &str) -> Option<ModuleId> {
        self.class_like.get(&caseless_key(name)).copied()
    }

    pub fn procedures(&self, name: &str) -> &[SymbolRef] {
        get(&self.procedures, name)
    }

    pub fn properties(&self, name: &str) -> &[SymbolRef] {
        get(&self.properties, name)
    }

    pub fn types(&self, name: &str) -> &[SymbolRef] {
        get(&self.types, name)
    }

    pub fn enums(&self, name: &str) -> &[SymbolRef] {
        get(&self.enums, name)
    }

    pub fn enum_values(&self, name: &str) -> &[SymbolRef] {
        get(&self.enum_values, name)
    }

    pub fn public_variables(&self, name: &str) -> &[SymbolRef] {
        get(&self.public_variables, name)
    }

    pub fn public_constants(&self, name: &str) -> &[SymbolRef] {
        get(&self.public_constants, name)
    }

    /// Project-wide lookup of a bare name from module `from`.
    ///
    /// Procedures, properties, variables and constants are global only when
    /// public in a standard module. Public enums, their values, and public
    /// user types are global from any module.
    pub fn global(&self, project: &Project, from: ModuleId, name: &str) -> Option<SymbolRef> {
        let is_standard = |m: ModuleId| {
            project
                .module(m)
                .is_some_and(|module| module.kind == ModuleKind::Standard)
        };
        let callable_visible = |symbol: &SymbolRef| {
            let m = symbol.module();
            if m == from {
                return false;
            }
            let Some(module) = project.module(m) else {
                return false;
            };
            let visibility = match *symbol {
                SymbolRef::Procedure(_, i) => module.procedures.get(i).map(|p| p.visibility),
                SymbolRef::Property(_, i) => module.properties.get(i).map(|p| p.visibility),
                _ => None,
            };
            is_standard(m) && visibility.is_some_and(|v| v.is_public())
        };

        if let Some(found) = self.procedures(name).iter().find(|s| callable_visible(*s)) {
            return Some(*found);
        }
        if let Some(found) = self.properties(name).iter().find(|s| callable_visible(*s)) {
            return Some(*found);
        }
        let from_standard = |s: &&SymbolRef| s.module() != from && is_standard(s.module());
        if let Some(found) = self.public_variables(name).iter().find(from_standard) {
            return Some(*found);
        }
        if let Some(found) = self.public_constants(name).iter().find(from_standard) {
            return Some(*found);
        }

        let enum_public = |s: &&SymbolRef| match **s {
            SymbolRef::EnumValue(m, e, _) | SymbolRef::Enum(m, e) => project
                .module(m)
                .and_then(|module| module.enums.get(e))
                .is_some_and(|en| en.visibility.is_public()),
            _ => false,
        };
        if let Some(found) = self.enum_values(name).iter().find(enum_public) {
            return Some(*found);
        }
        if let Some(found) = self.enums(name).iter().find(enum_public) {
            return Some(*found);
        }
        self.types(name)
            .iter()
            .find(|s| match **s {
                SymbolRef::UserType(m, t) => project
                    .module(m)
                    .and_then(|module| module.types.get(t))
                    .is_some_and(|ty| ty.visibility.is_public()),
                _ => false,
            })
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn project(sources: &[(&str, ModuleKind, &str)]) -> Project {
        let mut project = Project::new("Test", "/tmp");
        for (name, kind, src) in sources {
            let lines = src.lines().map(str::to_string).collect();
            let (module, _) = parse_module(name, *kind, lines);
            project.modules.push(module);
        }
        project
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let p = project(&[
            ("Module1", ModuleKind::Standard, "Public Sub DoWork()\nEnd Sub"),
            ("ClsBar", ModuleKind::Class, "Public Sub DoWork()\nEnd Sub"),
        ]);
        let index = ProjectIndex::build(&p);
        assert_eq!(index.module("module1"), Some(ModuleId(0)));
        assert_eq!(index.class_module("CLSBAR"), Some(ModuleId(1)));
        assert_eq!(index.class_module("Module1"), None);
        assert_eq!(index.procedures("dowork").len(), 2);
    }

    #[test]
    fn global_lookup_respects_module_kind_and_visibility() {
        let p = project(&[
            ("Main", ModuleKind::Standard, "Sub Run()\nEnd Sub"),
            (
                "Util",
                ModuleKind::Standard,
                "Public Counter As Long\nPrivate Hidden As Long\nPublic Enum Mode\n  ModeFast\nEnd Enum\nPublic Sub Helper()\nEnd Sub",
            ),
            ("ClsBar", ModuleKind::Class, "Public Sub Helper2()\nEnd Sub"),
        ]);
        let index = ProjectIndex::build(&p);
        let from = ModuleId(0);
        assert_eq!(
            index.global(&p, from, "helper"),
            Some(SymbolRef::Procedure(ModuleId(1), 0))
        );
        assert_eq!(
            index.global(&p, from, "Counter"),
            Some(SymbolRef::Variable(ModuleId(1), 0))
        );
        assert_eq!(index.global(&p, from, "Hidden"), None);
        assert_eq!(index.global(&p, from, "Helper2"), None);
        assert_eq!(
            index.global(&p, from, "ModeFast"),
            Some(SymbolRef::EnumValue(ModuleId(1), 0, 0))
        );
    }
}
