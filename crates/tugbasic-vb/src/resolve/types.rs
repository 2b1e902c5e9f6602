//! Type names and member lookup.
//!
//! A receiver's type decides where `.member` is looked up. Types declared in
//! the project resolve to the declaring symbol; everything else is either
//! [`ResolvedType::External`] (a real type that lives outside the project,
//! like `Collection` or `ADODB.Recordset`) or [`ResolvedType::Unknown`]
//! (`Object`, `Variant`, untyped, or an unresolved receiver).

use tugbasic_core::text::caseless_eq;

use crate::index::ProjectIndex;
use crate::model::{MemberRef, ModuleId, ProcedureKind, Project, SymbolRef};
use crate::parser::type_leaf;

/// Global objects provided by the runtime.
pub const BUILTIN_OBJECTS: &[&str] = &[
    "App", "Clipboard", "Debug", "Err", "Forms", "Global", "Printer", "Printers", "Screen", "VB",
    "VBA",
];

/// Declared types that say nothing about the members available.
const GENERIC_TYPES: &[&str] = &[
    "", "Object", "Variant", "Form", "Control", "MDIForm", "UserControl",
];

/// What a receiver is known to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedType {
    /// Instance of a class or form, or a module name used as receiver.
    Module(ModuleId),
    UserType(ModuleId, usize),
    Enum(ModuleId, usize),
    Control(ModuleId, usize),
    /// A type outside the project. Members are never resolved.
    External,
    /// Untyped or late-bound. Members fall back to the procedure index.
    Unknown,
}

impl ResolvedType {
    /// Whether the type comes from outside the project.
    pub fn is_opaque(&self) -> bool {
        matches!(self, ResolvedType::External | ResolvedType::Control(..))
    }
}

/// Whether a bare name is a runtime global object.
pub fn is_builtin_object(name: &str) -> bool {
    BUILTIN_OBJECTS.iter().any(|b| caseless_eq(b, name))
}

/// Type and member queries over the immutable declarations.
#[derive(Clone, Copy)]
pub struct TypeResolver<'a> {
    pub project: &'a Project,
    pub index: &'a ProjectIndex,
}

impl<'a> TypeResolver<'a> {
    pub fn new(project: &'a Project, index: &'a ProjectIndex) -> Self {
        TypeResolver { project, index }
    }

    /// Resolve a declared type name as seen from module `from`.
    pub fn resolve_name(&self, from: ModuleId, type_name: &str) -> ResolvedType {
        let leaf = type_leaf(type_name.trim());
        if GENERIC_TYPES.iter().any(|g| caseless_eq(g, leaf)) {
            return ResolvedType::Unknown;
        }
        if let Some(module) = self.project.module(from) {
            if let Some(t) = module.types.iter().position(|t| caseless_eq(&t.name, leaf)) {
                return ResolvedType::UserType(from, t);
            }
            if let Some(e) = module.enums.iter().position(|e| caseless_eq(&e.name, leaf)) {
                return ResolvedType::Enum(from, e);
            }
        }
        if let Some(m) = self.index.class_module(leaf) {
            return ResolvedType::Module(m);
        }
        if let Some(symbol) = self.visible_type(leaf) {
            return symbol;
        }
        // Named after a project file but not a known class: late-bound.
        if self.module_by_file(leaf).is_some() {
            return ResolvedType::Unknown;
        }
        ResolvedType::External
    }

    /// Module whose source file stem equals `stem`.
    fn module_by_file(&self, stem: &str) -> Option<ModuleId> {
        self.project
            .modules
            .iter()
            .position(|module| {
                module
                    .path
                    .file_stem()
                    .is_some_and(|s| caseless_eq(&s.to_string_lossy(), stem))
            })
            .map(|i| ModuleId(i as u32))
    }

    /// Public user type or enum declared anywhere.
    fn visible_type(&self, name: &str) -> Option<ResolvedType> {
        for symbol in self.index.types(name) {
            if let SymbolRef::UserType(m, t) = *symbol {
                let public = self
                    .project
                    .module(m)
                    .and_then(|module| module.types.get(t))
                    .is_some_and(|ty| ty.visibility.is_public());
                if public {
                    return Some(ResolvedType::UserType(m, t));
                }
            }
        }
        for symbol in self.index.enums(name) {
            if let SymbolRef::Enum(m, e) = *symbol {
                let public = self
                    .project
                    .module(m)
                    .and_then(|module| module.enums.get(e))
                    .is_some_and(|en| en.visibility.is_public());
                if public {
                    return Some(ResolvedType::Enum(m, e));
                }
            }
        }
        None
    }

    /// Declared type text of a symbol, if it has one.
    pub fn type_text(&self, symbol: SymbolRef) -> Option<&'a str> {
        let module = self.project.module(symbol.module())?;
        let text = match symbol {
            SymbolRef::Variable(_, i) => &module.variables.get(i)?.type_name,
            SymbolRef::Constant(_, i) => &module.constants.get(i)?.type_name,
            SymbolRef::Field(_, t, f) => &module.types.get(t)?.fields.get(f)?.type_name,
            SymbolRef::Procedure(_, i) => &module.procedures.get(i)?.return_type,
            SymbolRef::Property(_, i) => &module.properties.get(i)?.return_type,
            SymbolRef::Parameter(_, MemberRef::Event(e), i) => {
                &module.events.get(e)?.parameters.get(i)?.type_name
            }
            SymbolRef::Parameter(_, owner, i) => &module.member(owner)?.parameters.get(i)?.type_name,
            SymbolRef::Local(_, owner, i) => &module.member(owner)?.locals.get(i)?.type_name,
            SymbolRef::LocalConstant(_, owner, i) => {
                &module.member(owner)?.local_constants.get(i)?.type_name
            }
            _ => return None,
        };
        Some(text.as_str())
    }

    /// Type a symbol evaluates to when used as a receiver.
    pub fn declared(&self, symbol: SymbolRef) -> ResolvedType {
        match symbol {
            SymbolRef::Module(m) => ResolvedType::Module(m),
            SymbolRef::UserType(m, t) => ResolvedType::UserType(m, t),
            SymbolRef::Enum(m, e) => ResolvedType::Enum(m, e),
            SymbolRef::Control(m, c) => ResolvedType::Control(m, c),
            SymbolRef::EnumValue(..) | SymbolRef::Event(..) => ResolvedType::External,
            SymbolRef::Procedure(m, i) => {
                let is_sub = self
                    .project
                    .module(m)
                    .and_then(|module| module.procedures.get(i))
                    .is_some_and(|p| {
                        matches!(p.kind, ProcedureKind::Sub | ProcedureKind::DeclareSub)
                    });
                if is_sub {
                    return ResolvedType::External;
                }
                self.resolve_name(m, self.type_text(symbol).unwrap_or(""))
            }
            _ => self.resolve_name(symbol.module(), self.type_text(symbol).unwrap_or("")),
        }
    }

    /// Look up `.name` on a receiver of type `receiver`, seen from module
    /// `from`.
    pub fn member(&self, from: ModuleId, receiver: ResolvedType, name: &str) -> Option<SymbolRef> {
        match receiver {
            ResolvedType::Module(m) => self.module_member(m, name),
            ResolvedType::UserType(m, t) => {
                let ty = self.project.module(m)?.types.get(t)?;
                ty.fields
                    .iter()
                    .position(|f| caseless_eq(&f.name, name))
                    .map(|f| SymbolRef::Field(m, t, f))
            }
            ResolvedType::Enum(m, e) => {
                let en = self.project.module(m)?.enums.get(e)?;
                en.values
                    .iter()
                    .position(|v| caseless_eq(&v.name, name))
                    .map(|v| SymbolRef::EnumValue(m, e, v))
            }
            ResolvedType::Control(..) | ResolvedType::External => None,
            ResolvedType::Unknown => self.fallback_member(from, name, None),
        }
    }

    /// Member of a module in receiver priority order: property, procedure,
    /// variable, control, event, enum value, then constants, enums and types.
    pub fn module_member(&self, m: ModuleId, name: &str) -> Option<SymbolRef> {
        let module = self.project.module(m)?;
        if let Some(i) = position_of(module.properties.iter().map(|p| p.name.as_str()), name) {
            return Some(SymbolRef::Property(m, i));
        }
        if let Some(i) = position_of(module.procedures.iter().map(|p| p.name.as_str()), name) {
            return Some(SymbolRef::Procedure(m, i));
        }
        if let Some(i) = position_of(module.variables.iter().map(|v| v.name.as_str()), name) {
            return Some(SymbolRef::Variable(m, i));
        }
        if let Some(i) = position_of(module.controls.iter().map(|c| c.name.as_str()), name) {
            return Some(SymbolRef::Control(m, i));
        }
        if let Some(i) = position_of(module.events.iter().map(|e| e.name.as_str()), name) {
            return Some(SymbolRef::Event(m, i));
        }
        for (ei, en) in module.enums.iter().enumerate() {
            if let Some(vi) = position_of(en.values.iter().map(|v| v.name.as_str()), name) {
                return Some(SymbolRef::EnumValue(m, ei, vi));
            }
        }
        if let Some(i) = position_of(module.constants.iter().map(|c| c.name.as_str()), name) {
            return Some(SymbolRef::Constant(m, i));
        }
        if let Some(i) = position_of(module.enums.iter().map(|e| e.name.as_str()), name) {
            return Some(SymbolRef::Enum(m, i));
        }
        position_of(module.types.iter().map(|t| t.name.as_str()), name).map(|i| SymbolRef::UserType(m, i))
    }

    /// Late-bound receiver.
    ///
    /// The project-wide property and procedure index decides first: the
    /// only match, or on ambiguity the match declared in the file named like
    /// the receiver's declared type, else the first match. Failing that, a
    /// module-level variable of module `from`.
    pub fn fallback_member(
        &self,
        from: ModuleId,
        name: &str,
        type_hint: Option<&str>,
    ) -> Option<SymbolRef> {
        let candidates: Vec<SymbolRef> = self
            .index
            .properties(name)
            .iter()
            .chain(self.index.procedures(name))
            .copied()
            .collect();
        let preferred = match (candidates.len(), type_hint) {
            (n, Some(hint)) if n > 1 => {
                let owner = self.module_by_file(type_leaf(hint.trim()));
                candidates.iter().copied().find(|s| Some(s.module()) == owner)
            }
            _ => None,
        };
        if let Some(symbol) = preferred.or_else(|| candidates.first().copied()) {
            return Some(symbol);
        }
        let module = self.project.module(from)?;
        position_of(module.variables.iter().map(|v| v.name.as_str()), name)
            .map(|i| SymbolRef::Variable(from, i))
    }
}

/// Index of the first name equal to `name`, ignoring case.
pub(crate) fn position_of<'n>(mut names: impl Iterator<Item = &'n str>, name: &str) -> Option<usize> {
    names.position(|n| caseless_eq(n, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModuleKind;
    use std::path::PathBuf;
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
    fn resolves_declared_and_external_types() {
        let p = project(&[
            (
                "Main",
                ModuleKind::Standard,
                "Private Type Pt\n  X As Long\nEnd Type\nDim a As Pt\nDim b As ClsBar\nDim c As ADODB.Recordset\nDim d As Object",
            ),
            ("ClsBar", ModuleKind::Class, "Public Sub DoThing()\nEnd Sub"),
        ]);
        let index = ProjectIndex::build(&p);
        let r = TypeResolver::new(&p, &index);
        let m = ModuleId(0);
        assert_eq!(r.resolve_name(m, "pt"), ResolvedType::UserType(m, 0));
        assert_eq!(r.resolve_name(m, "ClsBar"), ResolvedType::Module(ModuleId(1)));
        assert_eq!(r.resolve_name(m, "ADODB.Recordset"), ResolvedType::External);
        assert_eq!(r.resolve_name(m, "Object"), ResolvedType::Unknown);
        assert_eq!(r.resolve_name(m, ""), ResolvedType::Unknown);

        assert_eq!(
            r.declared(SymbolRef::Variable(m, 1)),
            ResolvedType::Module(ModuleId(1))
        );
        assert_eq!(
            r.member(m, ResolvedType::Module(ModuleId(1)), "dothing"),
            Some(SymbolRef::Procedure(ModuleId(1), 0))
        );
        assert_eq!(
            r.member(m, ResolvedType::UserType(m, 0), "x"),
            Some(SymbolRef::Field(m, 0, 0))
        );
        assert_eq!(r.member(m, ResolvedType::External, "DoThing"), None);
        assert_eq!(
            r.member(m, ResolvedType::Unknown, "DoThing"),
            Some(SymbolRef::Procedure(ModuleId(1), 0))
        );
    }

    #[test]
    fn late_bound_receivers_use_the_procedure_index() {
        let mut p = project(&[
            ("Alpha", ModuleKind::Standard, "Public Sub do_thing()\nEnd Sub"),
            (
                "ClsWorker",
                ModuleKind::Class,
                "Attribute VB_Name = \"ClsWorker\"\nPublic Sub do_thing()\nEnd Sub",
            ),
            ("Main", ModuleKind::Standard, "Dim handler As Object\nDim worker As worker_impl"),
        ]);
        p.modules[0].path = PathBuf::from("/tmp/Alpha.bas");
        p.modules[1].path = PathBuf::from("/tmp/worker_impl.cls");
        let index = ProjectIndex::build(&p);
        let r = TypeResolver::new(&p, &index);
        let main = ModuleId(2);

        // A file stem that is not a class name stays late-bound.
        assert_eq!(r.resolve_name(main, "worker_impl"), ResolvedType::Unknown);

        // Ambiguous: the first match, unless the declared type names a file.
        assert_eq!(
            r.fallback_member(main, "DO_THING", Some("Object")),
            Some(SymbolRef::Procedure(ModuleId(0), 0))
        );
        assert_eq!(
            r.fallback_member(main, "do_thing", Some("worker_impl")),
            Some(SymbolRef::Procedure(ModuleId(1), 0))
        );

        // No procedure of that name: a variable of the current module.
        assert_eq!(
            r.fallback_member(main, "handler", None),
            Some(SymbolRef::Variable(main, 0))
        );
        assert_eq!(r.fallback_member(main, "missing", None), None);
    }

    #[test]
    fn property_wins_over_variable() {
        let p = project(&[(
            "ClsItem",
            ModuleKind::Class,
            "Private Value As Long\nPublic Property Get Value() As Long\nEnd Property",
        )]);
        let index = ProjectIndex::build(&p);
        let r = TypeResolver::new(&p, &index);
        assert_eq!(
            r.module_member(ModuleId(0), "Value"),
            Some(SymbolRef::Property(ModuleId(0), 0))
        );
    }
}
