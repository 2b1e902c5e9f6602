//! Symbol model.
//!
//! The project owns its modules; each module owns its members. Cross-module
//! mutation (a call in module A marks a procedure in module B as used) goes
//! through [`SymbolRef`] indices resolved against the owning module, never
//! through shared pointers.
//!
//! Lifecycle: built once by the parser (Phase A), mutated in place by the
//! resolver (usage flags, references, call targets), read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use tugbasic_core::text::{caseless_eq, caseless_key};

// ============================================================================
// Small enums
// ============================================================================

/// Kind of source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// `.bas` standard module.
    Standard,
    /// `.cls` class module.
    Class,
    /// `.frm` form.
    Form,
}

impl ModuleKind {
    /// Kind implied by a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "bas" => Some(ModuleKind::Standard),
            "cls" => Some(ModuleKind::Class),
            "frm" => Some(ModuleKind::Form),
            _ => None,
        }
    }

    /// Classes and forms can be instantiated and used as types.
    pub fn is_class_like(&self) -> bool {
        matches!(self, ModuleKind::Class | ModuleKind::Form)
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::Standard => "standard",
            ModuleKind::Class => "class",
            ModuleKind::Form => "form",
        };
        write!(f, "{}", name)
    }
}

/// Declared visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Friend,
}

impl Visibility {
    /// Parse a visibility keyword (`Global` is `Public`).
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "public" | "global" => Some(Visibility::Public),
            "private" | "dim" => Some(Visibility::Private),
            "friend" => Some(Visibility::Friend),
            _ => None,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::Friend)
    }
}

/// How a parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Passing {
    /// No keyword (by reference).
    Default,
    ByVal,
    ByRef,
}

/// Declared kind of a procedure or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
    DeclareSub,
    DeclareFunction,
}

/// Terminator family of a procedure body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcFamily {
    Sub,
    Function,
    Property,
}

impl ProcedureKind {
    /// The `End ...` keyword family that closes this kind, if it has a body.
    pub fn family(&self) -> Option<ProcFamily> {
        match self {
            ProcedureKind::Sub => Some(ProcFamily::Sub),
            ProcedureKind::Function => Some(ProcFamily::Function),
            ProcedureKind::PropertyGet | ProcedureKind::PropertyLet | ProcedureKind::PropertySet => {
                Some(ProcFamily::Property)
            }
            ProcedureKind::DeclareSub | ProcedureKind::DeclareFunction => None,
        }
    }

    pub fn is_property(&self) -> bool {
        self.family() == Some(ProcFamily::Property)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ProcedureKind::DeclareSub | ProcedureKind::DeclareFunction)
    }
}

impl ProcFamily {
    /// Parse the word after `End`.
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "sub" => Some(ProcFamily::Sub),
            "function" => Some(ProcFamily::Function),
            "property" => Some(ProcFamily::Property),
            _ => None,
        }
    }
}

// ============================================================================
// References
// ============================================================================

/// Occurrences of a symbol on one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Occurrences {
    /// Every matching token on the line.
    Any,
    /// Only the listed occurrence indices.
    Indexed(BTreeSet<usize>),
}

impl Occurrences {
    fn merge(&mut self, occurrence: Option<usize>) {
        match (self, occurrence) {
            (Occurrences::Any, _) => {}
            (slot @ Occurrences::Indexed(_), None) => *slot = Occurrences::Any,
            (Occurrences::Indexed(set), Some(n)) => {
                set.insert(n);
            }
        }
    }

    fn from_occurrence(occurrence: Option<usize>) -> Self {
        match occurrence {
            Some(n) => Occurrences::Indexed(BTreeSet::from([n])),
            None => Occurrences::Any,
        }
    }

    /// Whether occurrence `n` is included.
    pub fn contains(&self, n: usize) -> bool {
        match self {
            Occurrences::Any => true,
            Occurrences::Indexed(set) => set.contains(&n),
        }
    }
}

/// All uses of a symbol from one `(module, procedure)` scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Referencing module name.
    pub module: String,
    /// Referencing procedure or property name; empty for module-level code.
    pub procedure: String,
    /// Physical line numbers with their occurrence indices.
    pub lines: BTreeMap<u32, Occurrences>,
}

/// Inbound references of one symbol, keyed case-insensitively by
/// `(module, procedure)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct References(Vec<Reference>);

impl References {
    /// Record a use. Repeated hits in the same scope merge into one entry.
    pub fn add(&mut self, module: &str, procedure: &str, line: u32, occurrence: Option<usize>) {
        let existing = self
            .0
            .iter_mut()
            .find(|r| caseless_eq(&r.module, module) && caseless_eq(&r.procedure, procedure));
        match existing {
            Some(reference) => match reference.lines.get_mut(&line) {
                Some(occ) => occ.merge(occurrence),
                None => {
                    reference
                        .lines
                        .insert(line, Occurrences::from_occurrence(occurrence));
                }
            },
            None => {
                let mut lines = BTreeMap::new();
                lines.insert(line, Occurrences::from_occurrence(occurrence));
                self.0.push(Reference {
                    module: module.to_string(),
                    procedure: procedure.to_string(),
                    lines,
                });
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reference> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total number of referenced lines.
    pub fn line_count(&self) -> usize {
        self.0.iter().map(|r| r.lines.len()).sum()
    }

    /// Referencing module names.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|r| r.module.as_str())
    }
}

// ============================================================================
// Members
// ============================================================================

/// Where a name token sits: physical line plus occurrence index of that
/// spelling among the code tokens of the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DeclPos {
    pub line: u32,
    pub occurrence: usize,
}

/// Module variable, local variable or `Static` local.
#[derive(Debug, Clone, Serialize)]
pub struct Variable {
    pub name: String,
    /// Declared type text; empty when not declared.
    pub type_name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_array: bool,
    pub with_events: bool,
    pub as_new: bool,
    pub decl: DeclPos,
    /// Position of the type name token, when declared.
    #[serde(skip)]
    pub type_pos: Option<DeclPos>,
    pub used: bool,
    pub references: References,
}

/// Procedure, property or event parameter.
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
    pub passing: Passing,
    pub optional: bool,
    pub param_array: bool,
    pub is_array: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub decl: DeclPos,
    #[serde(skip)]
    pub type_pos: Option<DeclPos>,
    pub used: bool,
    pub references: References,
}

/// Module or local constant.
#[derive(Debug, Clone, Serialize)]
pub struct Constant {
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub visibility: Visibility,
    pub decl: DeclPos,
    #[serde(skip)]
    pub type_pos: Option<DeclPos>,
    pub used: bool,
    pub references: References,
}

/// User-type field.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub is_array: bool,
    pub decl: DeclPos,
    #[serde(skip)]
    pub type_pos: Option<DeclPos>,
    pub used: bool,
    pub references: References,
}

/// `Type ... End Type` block.
#[derive(Debug, Clone, Serialize)]
pub struct UserType {
    pub name: String,
    pub visibility: Visibility,
    pub fields: Vec<Field>,
    pub decl: DeclPos,
    pub end_line: u32,
    pub used: bool,
    pub references: References,
}

/// Enumeration member.
#[derive(Debug, Clone, Serialize)]
pub struct EnumValue {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub decl: DeclPos,
    pub used: bool,
    pub references: References,
}

/// `Enum ... End Enum` block.
#[derive(Debug, Clone, Serialize)]
pub struct Enumeration {
    pub name: String,
    pub visibility: Visibility,
    pub values: Vec<EnumValue>,
    pub decl: DeclPos,
    pub end_line: u32,
    pub used: bool,
    pub references: References,
}

/// `Event` declaration.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub name: String,
    pub visibility: Visibility,
    pub parameters: Vec<Parameter>,
    pub decl: DeclPos,
    pub used: bool,
    pub references: References,
}

/// Form control. Control arrays open one block per element.
#[derive(Debug, Clone, Serialize)]
pub struct Control {
    pub name: String,
    /// Designer type, e.g. `VB.TextBox`.
    pub control_type: String,
    /// Every block-opening line.
    pub lines: Vec<u32>,
    /// `Index` values of control-array elements.
    pub indices: Vec<i64>,
    pub used: bool,
    pub references: References,
}

impl Control {
    pub fn is_array(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Resolved target of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallTarget {
    pub module: String,
    pub member: String,
}

/// A call discovered in a procedure body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub line: u32,
    /// Trimmed statement text.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<CallTarget>,
}

/// Sub, function, property procedure or `Declare` external.
#[derive(Debug, Clone, Serialize)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub visibility: Visibility,
    pub is_static: bool,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    #[serde(skip)]
    pub return_type_pos: Option<DeclPos>,
    /// Library of a `Declare` external.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    pub locals: Vec<Variable>,
    pub local_constants: Vec<Constant>,
    pub calls: Vec<CallSite>,
    pub decl: DeclPos,
    pub start_line: u32,
    /// Last line of a continued header.
    pub header_end_line: u32,
    pub end_line: u32,
    pub used: bool,
    pub references: References,
}

impl Procedure {
    /// Whether a physical line lies inside this procedure's span.
    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Parameter, local or local constant declared with this name.
    pub fn declares_local(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| caseless_eq(&p.name, name))
            || self.locals.iter().any(|v| caseless_eq(&v.name, name))
            || self.local_constants.iter().any(|c| caseless_eq(&c.name, name))
    }
}

/// `Implements` clause.
#[derive(Debug, Clone, Serialize)]
pub struct Implements {
    pub name: String,
    pub decl: DeclPos,
}

// ============================================================================
// Module and Project
// ============================================================================

/// Index of a module in [`Project::modules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One source file.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub name: String,
    pub kind: ModuleKind,
    #[serde(skip)]
    pub path: PathBuf,
    /// Path relative to the project root.
    pub relative_path: String,
    /// Outside the project tree: read, never rewritten.
    pub shared_external: bool,
    /// Line of `Attribute VB_Name = "..."`.
    pub name_directive_line: Option<u32>,
    /// Line of the form's top-level `Begin` block.
    pub form_begin_line: Option<u32>,
    pub variables: Vec<Variable>,
    pub constants: Vec<Constant>,
    pub types: Vec<UserType>,
    pub enums: Vec<Enumeration>,
    pub events: Vec<Event>,
    pub controls: Vec<Control>,
    pub procedures: Vec<Procedure>,
    pub properties: Vec<Procedure>,
    pub implements: Vec<Implements>,
    pub used: bool,
    pub references: References,
    /// Names of other modules referencing any member. Computed once after
    /// resolution.
    pub referenced_by: BTreeSet<String>,
    /// Physical source lines.
    #[serde(skip)]
    pub lines: Vec<String>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Module {
            name: name.into(),
            kind,
            path: PathBuf::new(),
            relative_path: String::new(),
            shared_external: false,
            name_directive_line: None,
            form_begin_line: None,
            variables: Vec::new(),
            constants: Vec::new(),
            types: Vec::new(),
            enums: Vec::new(),
            events: Vec::new(),
            controls: Vec::new(),
            procedures: Vec::new(),
            properties: Vec::new(),
            implements: Vec::new(),
            used: false,
            references: References::default(),
            referenced_by: BTreeSet::new(),
            lines: Vec::new(),
        }
    }

    /// Physical line by 1-indexed number.
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        self.lines.get(idx).map(String::as_str)
    }

    /// The procedure or property whose span contains `line`.
    pub fn member_at(&self, line: u32) -> Option<MemberRef> {
        if let Some(i) = self.procedures.iter().position(|p| {
            p.kind.family().is_some() && p.contains_line(line)
        }) {
            return Some(MemberRef::Procedure(i));
        }
        self.properties
            .iter()
            .position(|p| p.contains_line(line))
            .map(MemberRef::Property)
    }

    /// Procedure or property by member reference.
    pub fn member(&self, member: MemberRef) -> Option<&Procedure> {
        match member {
            MemberRef::Procedure(i) => self.procedures.get(i),
            MemberRef::Property(i) => self.properties.get(i),
            MemberRef::Event(_) => None,
        }
    }

    fn member_mut(&mut self, member: MemberRef) -> Option<&mut Procedure> {
        match member {
            MemberRef::Procedure(i) => self.procedures.get_mut(i),
            MemberRef::Property(i) => self.properties.get_mut(i),
            MemberRef::Event(_) => None,
        }
    }

    /// Whether any member is marked used.
    pub fn any_member_used(&self) -> bool {
        self.variables.iter().any(|v| v.used)
            || self.constants.iter().any(|c| c.used)
            || self.types.iter().any(|t| t.used || t.fields.iter().any(|f| f.used))
            || self
                .enums
                .iter()
                .any(|e| e.used || e.values.iter().any(|v| v.used))
            || self.events.iter().any(|e| e.used)
            || self.controls.iter().any(|c| c.used)
            || self.procedures.iter().any(|p| p.used)
            || self.properties.iter().any(|p| p.used)
    }
}

/// Derived call edge between two modules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DependencyEdge {
    pub caller_module: String,
    pub caller_procedure: String,
    pub callee_module: String,
    pub callee_procedure: String,
    pub text: String,
}

/// A project manifest line naming a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestNameEntry {
    /// 1-indexed line in the manifest.
    pub line: u32,
    /// Char span of the module name on that line.
    pub start: usize,
    pub end: usize,
    /// Name as written.
    pub name: String,
}

/// The loaded manifest, kept for rewriting module names.
#[derive(Debug, Clone, Default)]
pub struct ManifestFile {
    pub path: PathBuf,
    pub relative_path: String,
    /// `Module=` / `Class=` / `Startup=` name spans.
    pub name_entries: Vec<ManifestNameEntry>,
}

/// The whole program.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub modules: Vec<Module>,
    /// Derived from resolved call sites.
    pub dependencies: Vec<DependencyEdge>,
    pub manifest: Option<ManifestFile>,
}

// ============================================================================
// Symbol references
// ============================================================================

/// Owner of a parameter or local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberRef {
    Procedure(usize),
    Property(usize),
    Event(usize),
}

/// Arena index of any symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolRef {
    Module(ModuleId),
    Variable(ModuleId, usize),
    Constant(ModuleId, usize),
    UserType(ModuleId, usize),
    Field(ModuleId, usize, usize),
    Enum(ModuleId, usize),
    EnumValue(ModuleId, usize, usize),
    Event(ModuleId, usize),
    Control(ModuleId, usize),
    Procedure(ModuleId, usize),
    Property(ModuleId, usize),
    Parameter(ModuleId, MemberRef, usize),
    Local(ModuleId, MemberRef, usize),
    LocalConstant(ModuleId, MemberRef, usize),
}

impl SymbolRef {
    /// Owning module.
    pub fn module(&self) -> ModuleId {
        match *self {
            SymbolRef::Module(m)
            | SymbolRef::Variable(m, _)
            | SymbolRef::Constant(m, _)
            | SymbolRef::UserType(m, _)
            | SymbolRef::Field(m, _, _)
            | SymbolRef::Enum(m, _)
            | SymbolRef::EnumValue(m, _, _)
            | SymbolRef::Event(m, _)
            | SymbolRef::Control(m, _)
            | SymbolRef::Procedure(m, _)
            | SymbolRef::Property(m, _)
            | SymbolRef::Parameter(m, _, _)
            | SymbolRef::Local(m, _, _)
            | SymbolRef::LocalConstant(m, _, _) => m,
        }
    }

    /// Short kind label for reports.
    pub fn kind_label(&self) -> &'static str {
        match self {
            SymbolRef::Module(_) => "module",
            SymbolRef::Variable(..) => "variable",
            SymbolRef::Constant(..) => "constant",
            SymbolRef::UserType(..) => "type",
            SymbolRef::Field(..) => "field",
            SymbolRef::Enum(..) => "enum",
            SymbolRef::EnumValue(..) => "enum_value",
            SymbolRef::Event(..) => "event",
            SymbolRef::Control(..) => "control",
            SymbolRef::Procedure(..) => "procedure",
            SymbolRef::Property(..) => "property",
            SymbolRef::Parameter(..) => "parameter",
            SymbolRef::Local(..) => "local",
            SymbolRef::LocalConstant(..) => "local_constant",
        }
    }
}

/// Where a use was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub module: String,
    /// Enclosing procedure or property; empty at module level.
    pub procedure: String,
    pub line: u32,
    pub occurrence: Option<usize>,
}

/// Mutable view of the usage state shared by every symbol kind.
struct UsageSlot<'a> {
    used: &'a mut bool,
    references: &'a mut References,
}

macro_rules! slot {
    ($sym:expr) => {{
        let s = $sym;
        UsageSlot {
            used: &mut s.used,
            references: &mut s.references,
        }
    }};
}

impl Project {
    /// Create an empty project.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Project {
            name: name.into(),
            root: root.into(),
            modules: Vec::new(),
            dependencies: Vec::new(),
            manifest: None,
        }
    }

    /// Ids of all modules, in order.
    pub fn module_ids(&self) -> impl Iterator<Item = ModuleId> {
        (0..self.modules.len() as u32).map(ModuleId)
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.index())
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.index())
    }

    /// Find a module by name (case-insensitive).
    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        let key = caseless_key(name);
        self.modules
            .iter()
            .position(|m| caseless_key(&m.name) == key)
            .map(|i| ModuleId(i as u32))
    }

    /// Mark a symbol used and record one reference at `site`.
    ///
    /// Returns `false` if the symbol reference is stale.
    pub fn record_use(&mut self, symbol: SymbolRef, site: &Site) -> bool {
        let Some(slot) = self.usage_slot(symbol) else {
            return false;
        };
        *slot.used = true;
        slot.references
            .add(&site.module, &site.procedure, site.line, site.occurrence);
        true
    }

    fn usage_slot(&mut self, symbol: SymbolRef) -> Option<UsageSlot<'_>> {
        let module = self.modules.get_mut(symbol.module().index())?;
        let slot = match symbol {
            SymbolRef::Module(_) => slot!(module),
            SymbolRef::Variable(_, i) => slot!(module.variables.get_mut(i)?),
            SymbolRef::Constant(_, i) => slot!(module.constants.get_mut(i)?),
            SymbolRef::UserType(_, i) => slot!(module.types.get_mut(i)?),
            SymbolRef::Field(_, t, f) => slot!(module.types.get_mut(t)?.fields.get_mut(f)?),
            SymbolRef::Enum(_, i) => slot!(module.enums.get_mut(i)?),
            SymbolRef::EnumValue(_, e, v) => slot!(module.enums.get_mut(e)?.values.get_mut(v)?),
            SymbolRef::Event(_, i) => slot!(module.events.get_mut(i)?),
            SymbolRef::Control(_, i) => slot!(module.controls.get_mut(i)?),
            SymbolRef::Procedure(_, i) => slot!(module.procedures.get_mut(i)?),
            SymbolRef::Property(_, i) => slot!(module.properties.get_mut(i)?),
            SymbolRef::Parameter(_, MemberRef::Event(e), i) => {
                slot!(module.events.get_mut(e)?.parameters.get_mut(i)?)
            }
            SymbolRef::Parameter(_, owner, i) => {
                slot!(module.member_mut(owner)?.parameters.get_mut(i)?)
            }
            SymbolRef::Local(_, owner, i) => slot!(module.member_mut(owner)?.locals.get_mut(i)?),
            SymbolRef::LocalConstant(_, owner, i) => {
                slot!(module.member_mut(owner)?.local_constants.get_mut(i)?)
            }
        };
        Some(slot)
    }

    /// Raw name of a symbol.
    pub fn symbol_name(&self, symbol: SymbolRef) -> Option<&str> {
        let module = self.module(symbol.module())?;
        let name = match symbol {
            SymbolRef::Module(_) => &module.name,
            SymbolRef::Variable(_, i) => &module.variables.get(i)?.name,
            SymbolRef::Constant(_, i) => &module.constants.get(i)?.name,
            SymbolRef::UserType(_, i) => &module.types.get(i)?.name,
            SymbolRef::Field(_, t, f) => &module.types.get(t)?.fields.get(f)?.name,
            SymbolRef::Enum(_, i) => &module.enums.get(i)?.name,
            SymbolRef::EnumValue(_, e, v) => &module.enums.get(e)?.values.get(v)?.name,
            SymbolRef::Event(_, i) => &module.events.get(i)?.name,
            SymbolRef::Control(_, i) => &module.controls.get(i)?.name,
            SymbolRef::Procedure(_, i) => &module.procedures.get(i)?.name,
            SymbolRef::Property(_, i) => &module.properties.get(i)?.name,
            SymbolRef::Parameter(_, MemberRef::Event(e), i) => {
                &module.events.get(e)?.parameters.get(i)?.name
            }
            SymbolRef::Parameter(_, owner, i) => &module.member(owner)?.parameters.get(i)?.name,
            SymbolRef::Local(_, owner, i) => &module.member(owner)?.locals.get(i)?.name,
            SymbolRef::LocalConstant(_, owner, i) => {
                &module.member(owner)?.local_constants.get(i)?.name
            }
        };
        Some(name)
    }

    /// Inbound references of a symbol.
    pub fn symbol_references(&self, symbol: SymbolRef) -> Option<&References> {
        let module = self.module(symbol.module())?;
        let refs = match symbol {
            SymbolRef::Module(_) => &module.references,
            SymbolRef::Variable(_, i) => &module.variables.get(i)?.references,
            SymbolRef::Constant(_, i) => &module.constants.get(i)?.references,
            SymbolRef::UserType(_, i) => &module.types.get(i)?.references,
            SymbolRef::Field(_, t, f) => &module.types.get(t)?.fields.get(f)?.references,
            SymbolRef::Enum(_, i) => &module.enums.get(i)?.references,
            SymbolRef::EnumValue(_, e, v) => &module.enums.get(e)?.values.get(v)?.references,
            SymbolRef::Event(_, i) => &module.events.get(i)?.references,
            SymbolRef::Control(_, i) => &module.controls.get(i)?.references,
            SymbolRef::Procedure(_, i) => &module.procedures.get(i)?.references,
            SymbolRef::Property(_, i) => &module.properties.get(i)?.references,
            SymbolRef::Parameter(_, MemberRef::Event(e), i) => {
                &module.events.get(e)?.parameters.get(i)?.references
            }
            SymbolRef::Parameter(_, owner, i) => {
                &module.member(owner)?.parameters.get(i)?.references
            }
            SymbolRef::Local(_, owner, i) => &module.member(owner)?.locals.get(i)?.references,
            SymbolRef::LocalConstant(_, owner, i) => {
                &module.member(owner)?.local_constants.get(i)?.references
            }
        };
        Some(refs)
    }

    /// Declaration position of a symbol. Modules and controls have none.
    pub fn symbol_decl(&self, symbol: SymbolRef) -> Option<DeclPos> {
        let module = self.module(symbol.module())?;
        let decl = match symbol {
            SymbolRef::Module(_) | SymbolRef::Control(..) => return None,
            SymbolRef::Variable(_, i) => module.variables.get(i)?.decl,
            SymbolRef::Constant(_, i) => module.constants.get(i)?.decl,
            SymbolRef::UserType(_, i) => module.types.get(i)?.decl,
            SymbolRef::Field(_, t, f) => module.types.get(t)?.fields.get(f)?.decl,
            SymbolRef::Enum(_, i) => module.enums.get(i)?.decl,
            SymbolRef::EnumValue(_, e, v) => module.enums.get(e)?.values.get(v)?.decl,
            SymbolRef::Event(_, i) => module.events.get(i)?.decl,
            SymbolRef::Procedure(_, i) => module.procedures.get(i)?.decl,
            SymbolRef::Property(_, i) => module.properties.get(i)?.decl,
            SymbolRef::Parameter(_, MemberRef::Event(e), i) => {
                module.events.get(e)?.parameters.get(i)?.decl
            }
            SymbolRef::Parameter(_, owner, i) => module.member(owner)?.parameters.get(i)?.decl,
            SymbolRef::Local(_, owner, i) => module.member(owner)?.locals.get(i)?.decl,
            SymbolRef::LocalConstant(_, owner, i) => {
                module.member(owner)?.local_constants.get(i)?.decl
            }
        };
        Some(decl)
    }

    /// Every symbol in the project, in declaration order.
    pub fn all_symbols(&self) -> Vec<SymbolRef> {
        let mut out = Vec::new();
        for (mi, module) in self.modules.iter().enumerate() {
            let m = ModuleId(mi as u32);
            out.push(SymbolRef::Module(m));
            out.extend((0..module.variables.len()).map(|i| SymbolRef::Variable(m, i)));
            out.extend((0..module.constants.len()).map(|i| SymbolRef::Constant(m, i)));
            for (ei, e) in module.enums.iter().enumerate() {
                out.push(SymbolRef::Enum(m, ei));
                out.extend((0..e.values.len()).map(|v| SymbolRef::EnumValue(m, ei, v)));
            }
            for (ti, t) in module.types.iter().enumerate() {
                out.push(SymbolRef::UserType(m, ti));
                out.extend((0..t.fields.len()).map(|f| SymbolRef::Field(m, ti, f)));
            }
            for (ei, e) in module.events.iter().enumerate() {
                out.push(SymbolRef::Event(m, ei));
                let owner = MemberRef::Event(ei);
                out.extend((0..e.parameters.len()).map(|p| SymbolRef::Parameter(m, owner, p)));
            }
            out.extend((0..module.controls.len()).map(|i| SymbolRef::Control(m, i)));
            for (pi, p) in module.procedures.iter().enumerate() {
                out.push(SymbolRef::Procedure(m, pi));
                push_member_locals(&mut out, m, MemberRef::Procedure(pi), p);
            }
            for (pi, p) in module.properties.iter().enumerate() {
                out.push(SymbolRef::Property(m, pi));
                push_member_locals(&mut out, m, MemberRef::Property(pi), p);
            }
        }
        out
    }
}

fn push_member_locals(out: &mut Vec<SymbolRef>, m: ModuleId, owner: MemberRef, p: &Procedure) {
    out.extend((0..p.parameters.len()).map(|i| SymbolRef::Parameter(m, owner, i)));
    out.extend((0..p.locals.len()).map(|i| SymbolRef::Local(m, owner, i)));
    out.extend((0..p.local_constants.len()).map(|i| SymbolRef::LocalConstant(m, owner, i)));
}

#[cfg(test)]
mod tests {
    use super::*;

    mod reference_tests {
        use super::*;

        #[test]
        fn merges_by_scope_case_insensitively() {
            let mut refs = References::default();
            refs.add("Module1", "Main", 10, Some(0));
            refs.add("MODULE1", "main", 12, Some(0));
            refs.add("Module1", "Main", 10, Some(1));
            refs.add("Module1", "Main", 10, Some(0));
            refs.add("Module1", "", 3, Some(0));

            assert_eq!(refs.len(), 2);
            let main = refs.iter().next().unwrap();
            assert_eq!(main.lines.len(), 2);
            assert_eq!(
                main.lines[&10],
                Occurrences::Indexed(BTreeSet::from([0, 1]))
            );
            assert_eq!(refs.line_count(), 3);
        }

        #[test]
        fn any_absorbs_indexed() {
            let mut refs = References::default();
            refs.add("M", "P", 1, Some(2));
            refs.add("M", "P", 1, None);
            refs.add("M", "P", 1, Some(3));
            let r = refs.iter().next().unwrap();
            assert_eq!(r.lines[&1], Occurrences::Any);
            assert!(r.lines[&1].contains(7));
        }
    }

    #[test]
    fn record_use_reaches_nested_symbols() {
        let mut project = Project::new("P", "/tmp");
        let mut module = Module::new("Colors", ModuleKind::Standard);
        module.enums.push(Enumeration {
            name: "Color".into(),
            visibility: Visibility::Public,
            values: vec![EnumValue {
                name: "Red".into(),
                value: None,
                decl: DeclPos::default(),
                used: false,
                references: References::default(),
            }],
            decl: DeclPos::default(),
            end_line: 3,
            used: false,
            references: References::default(),
        });
        project.modules.push(module);

        let value = SymbolRef::EnumValue(ModuleId(0), 0, 0);
        let site = Site {
            module: "Main".into(),
            procedure: "Run".into(),
            line: 7,
            occurrence: Some(0),
        };
        assert!(project.record_use(value, &site));
        assert!(project.modules[0].enums[0].values[0].used);
        assert_eq!(project.symbol_name(value), Some("Red"));
        assert_eq!(project.symbol_references(value).unwrap().len(), 1);

        assert!(!project.record_use(SymbolRef::EnumValue(ModuleId(0), 0, 5), &site));
    }

    #[test]
    fn procedure_kind_families() {
        assert_eq!(ProcedureKind::PropertyLet.family(), Some(ProcFamily::Property));
        assert_eq!(ProcedureKind::DeclareFunction.family(), None);
        assert!(ProcedureKind::PropertySet.is_property());
        assert!(!ProcedureKind::Function.is_property());
    }
}
