//! Normalized names.
//!
//! A [`NamingOracle`] maps each raw name to its normalized form; the
//! conflict resolver here makes the results unique per scope. Scopes are
//! settled in a fixed order:
//!
//! 1. **Global**: module names, public members of standard modules, public
//!    enums and user types.
//! 2. **Module**: every other module-level member. Names of symbols from
//!    other modules that this module references are avoided.
//! 3. **Enum**, **Type** and **Event** scopes: values, fields, event
//!    parameters.
//! 4. **Procedure**: parameters, locals and local constants. Names of outer
//!    symbols referenced from the procedure are avoided, so a local never
//!    captures a reference that used to reach an outer symbol.
//!
//! Inside a scope, names that are already in normal form claim their slot
//! first. A colliding name gets a numeric suffix (`2`, `3`, ...). A name that
//! would become a reserved word keeps its raw form.
//!
//! Event handlers (`owner_Event`) and interface implementations
//! (`IFace_Member`) are never normalized directly; they are derived from the
//! new names of their owner and event in a final sweep.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use serde::Serialize;

use tugbasic_core::text::{caseless_eq, caseless_key};

use crate::index::ProjectIndex;
use crate::model::{MemberRef, ModuleId, ModuleKind, Project, SymbolRef, Visibility};
use crate::resolve::types::{ResolvedType, TypeResolver};

// ============================================================================
// Oracle
// ============================================================================

/// What kind of symbol a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Module,
    Variable,
    Constant,
    Enum,
    EnumValue,
    UserType,
    Field,
    Event,
    Control,
    Procedure,
    Property,
    Parameter,
    Local,
}

impl NameKind {
    /// Kind used to normalize a symbol.
    pub fn of(symbol: SymbolRef) -> Self {
        match symbol {
            SymbolRef::Module(_) => NameKind::Module,
            SymbolRef::Variable(..) => NameKind::Variable,
            SymbolRef::Constant(..) | SymbolRef::LocalConstant(..) => NameKind::Constant,
            SymbolRef::UserType(..) => NameKind::UserType,
            SymbolRef::Field(..) => NameKind::Field,
            SymbolRef::Enum(..) => NameKind::Enum,
            SymbolRef::EnumValue(..) => NameKind::EnumValue,
            SymbolRef::Event(..) => NameKind::Event,
            SymbolRef::Control(..) => NameKind::Control,
            SymbolRef::Procedure(..) => NameKind::Procedure,
            SymbolRef::Property(..) => NameKind::Property,
            SymbolRef::Parameter(..) => NameKind::Parameter,
            SymbolRef::Local(..) => NameKind::Local,
        }
    }
}

/// Extra facts an oracle may use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameAttrs {
    pub visibility: Option<Visibility>,
    pub module_kind: Option<ModuleKind>,
}

/// Maps a raw identifier to its normalized form.
///
/// Implementations must be idempotent: normalizing a normalized name returns
/// it unchanged.
pub trait NamingOracle {
    fn normalize(&self, kind: NameKind, raw: &str, attrs: &NameAttrs) -> String;
}

/// PascalCase for modules, procedures, properties, events, types, fields,
/// enums and enum values; camelCase for variables, parameters, locals and
/// controls; UPPER_SNAKE_CASE for constants.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionOracle;

impl NamingOracle for ConventionOracle {
    fn normalize(&self, kind: NameKind, raw: &str, _attrs: &NameAttrs) -> String {
        let words = split_words(raw);
        if words.is_empty() {
            return raw.to_string();
        }
        match kind {
            NameKind::Variable | NameKind::Parameter | NameKind::Local | NameKind::Control => {
                camel_case(&words)
            }
            NameKind::Constant => upper_snake_case(&words),
            _ => pascal_case(&words),
        }
    }
}

/// Split an identifier into words at underscores, case changes, acronym
/// boundaries and digit-to-letter boundaries.
pub fn split_words(raw: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in raw.split(|c: char| !c.is_alphanumeric()) {
        let chars: Vec<char> = chunk.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && !current.is_empty() {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();
                let boundary = (prev.is_lowercase() && c.is_uppercase())
                    || (prev.is_numeric() && c.is_alphabetic())
                    || (prev.is_uppercase()
                        && c.is_uppercase()
                        && next.is_some_and(|n| n.is_lowercase()));
                if boundary {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn pascal_case(words: &[String]) -> String {
    words.iter().map(|w| capitalized(w)).collect()
}

fn camel_case(words: &[String]) -> String {
    let mut out = words[0].to_lowercase();
    out.extend(words[1..].iter().map(|w| capitalized(w)));
    out
}

fn upper_snake_case(words: &[String]) -> String {
    words
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

// ============================================================================
// Reserved words and options
// ============================================================================

static DEFAULT_RESERVED: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let basic = [
        "AddressOf", "Alias", "And", "As", "Attribute", "Boolean", "ByRef", "Byte", "ByVal",
        "Call", "Case", "Const", "Currency", "Date", "Declare", "Dim", "Do", "Double", "Each",
        "Else", "ElseIf", "Empty", "End", "Enum", "Eqv", "Erase", "Error", "Event", "Exit",
        "False", "For", "Friend", "Function", "Get", "Global", "GoSub", "GoTo", "If", "Imp",
        "Implements", "In", "Integer", "Is", "Let", "Lib", "Like", "Long", "Loop", "LSet", "Me",
        "Mod", "New", "Next", "Not", "Nothing", "Null", "Object", "On", "Option", "Optional",
        "Or", "ParamArray", "Preserve", "Private", "Property", "Public", "RaiseEvent", "ReDim",
        "Rem", "Resume", "Return", "RSet", "Select", "Set", "Single", "Static", "Step", "Stop",
        "String", "Sub", "Then", "To", "True", "Type", "TypeOf", "Until", "Variant", "Wend",
        "While", "With", "WithEvents", "Xor",
    ];
    let target = [
        "abstract", "base", "bool", "break", "char", "checked", "class", "continue", "decimal",
        "default", "delegate", "event", "explicit", "extern", "finally", "fixed", "float",
        "foreach", "goto", "implicit", "interface", "internal", "lock", "namespace", "null",
        "operator", "out", "override", "params", "protected", "readonly", "ref", "sbyte",
        "sealed", "short", "sizeof", "stackalloc", "struct", "switch", "this", "throw", "try",
        "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual", "void",
        "volatile", "AndAlso", "CType", "DirectCast", "Inherits", "Module", "MustInherit",
        "MustOverride", "MyBase", "MyClass", "Namespace", "NotInheritable", "Overloads",
        "Overrides", "Partial", "Shadows", "Shared", "TryCast", "Using",
    ];
    basic.into_iter().chain(target).collect()
});

/// Identifiers a normalized name must never become.
#[derive(Debug, Clone)]
pub struct ReservedWords {
    words: HashSet<String>,
}

impl Default for ReservedWords {
    fn default() -> Self {
        ReservedWords {
            words: DEFAULT_RESERVED.iter().map(|w| caseless_key(w)).collect(),
        }
    }
}

impl ReservedWords {
    /// Only the given words.
    pub fn empty() -> Self {
        ReservedWords {
            words: HashSet::new(),
        }
    }

    /// Add more words.
    pub fn with_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.words
            .extend(words.into_iter().map(|w| caseless_key(w.as_ref())));
        self
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&caseless_key(word))
    }
}

/// Naming inputs beyond the oracle.
#[derive(Debug, Clone, Default)]
pub struct NamingOptions {
    pub reserved: ReservedWords,
    /// Names never renamed (case-insensitive).
    pub keep: Vec<String>,
}

impl NamingOptions {
    fn keeps(&self, raw: &str) -> bool {
        self.keep.iter().any(|k| caseless_eq(k, raw))
    }
}

// ============================================================================
// Name table
// ============================================================================

/// Final name of every symbol.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<SymbolRef, String>,
    qualify: HashSet<SymbolRef>,
}

/// One symbol whose name changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub module: String,
    /// Owning procedure, type, enum or event; empty at module level.
    pub scope: String,
    pub kind: NameKind,
    pub old_name: String,
    pub new_name: String,
}

impl NameTable {
    /// Final name, or `None` if the symbol was never named.
    pub fn name(&self, symbol: SymbolRef) -> Option<&str> {
        self.names.get(&symbol).map(String::as_str)
    }

    /// Enum value whose bare uses must become `Enum.Value`.
    pub fn needs_qualification(&self, symbol: SymbolRef) -> bool {
        self.qualify.contains(&symbol)
    }

    /// Whether the final name differs from the raw one (case-sensitive).
    pub fn is_renamed(&self, project: &Project, symbol: SymbolRef) -> bool {
        match (self.name(symbol), project.symbol_name(symbol)) {
            (Some(new), Some(old)) => new != old,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Every renamed symbol, in declaration order.
    pub fn renames(&self, project: &Project) -> Vec<(SymbolRef, Rename)> {
        project
            .all_symbols()
            .into_iter()
            .filter(|s| self.is_renamed(project, *s))
            .filter_map(|s| {
                let module = project.module(s.module())?;
                Some((
                    s,
                    Rename {
                        module: module.name.clone(),
                        scope: scope_label(project, s),
                        kind: NameKind::of(s),
                        old_name: project.symbol_name(s)?.to_string(),
                        new_name: self.name(s)?.to_string(),
                    },
                ))
            })
            .collect()
    }

    fn set(&mut self, symbol: SymbolRef, name: String) {
        self.names.insert(symbol, name);
    }
}

/// Name of the scope owning a symbol; empty at module level.
pub fn scope_label(project: &Project, symbol: SymbolRef) -> String {
    let Some(module) = project.module(symbol.module()) else {
        return String::new();
    };
    let name = match symbol {
        SymbolRef::Field(_, t, _) => module.types.get(t).map(|t| t.name.as_str()),
        SymbolRef::EnumValue(_, e, _) => module.enums.get(e).map(|e| e.name.as_str()),
        SymbolRef::Parameter(_, MemberRef::Event(e), _) => {
            module.events.get(e).map(|e| e.name.as_str())
        }
        SymbolRef::Parameter(_, owner, _)
        | SymbolRef::Local(_, owner, _)
        | SymbolRef::LocalConstant(_, owner, _) => module.member(owner).map(|p| p.name.as_str()),
        _ => None,
    };
    name.unwrap_or_default().to_string()
}

// ============================================================================
// Conflict resolution
// ============================================================================

/// One naming slot. Property groups share one entry.
struct Entry {
    symbols: Vec<SymbolRef>,
    raw: String,
    normalized: String,
    fixed: bool,
    /// Names this entry alone must not take.
    avoid: HashSet<String>,
}

impl Entry {
    fn allows(&self, name: &str) -> bool {
        !self.avoid.contains(&caseless_key(name))
    }
}

/// Names claimed in one scope, lower-cased.
#[derive(Default)]
struct Scope {
    taken: HashSet<String>,
}

impl Scope {
    fn is_free(&self, name: &str, avoid: &HashSet<String>) -> bool {
        let key = caseless_key(name);
        !self.taken.contains(&key) && !avoid.contains(&key)
    }

    fn claim(&mut self, name: &str) {
        self.taken.insert(caseless_key(name));
    }

    /// Settle a scope's entries and record them in `table`.
    fn settle(
        &mut self,
        entries: Vec<Entry>,
        avoid: &HashSet<String>,
        reserved: &ReservedWords,
        table: &mut NameTable,
    ) {
        let mut settled: Vec<Option<String>> = vec![None; entries.len()];

        for (slot, entry) in settled.iter_mut().zip(&entries) {
            let claims = entry.fixed
                || (entry.raw == entry.normalized
                    && self.is_free(&entry.raw, avoid)
                    && entry.allows(&entry.raw));
            if claims {
                self.claim(&entry.raw);
                *slot = Some(entry.raw.clone());
            }
        }

        for (slot, entry) in settled.iter_mut().zip(&entries) {
            if slot.is_some() {
                continue;
            }
            let name = if reserved.contains(&entry.normalized) {
                entry.raw.clone()
            } else {
                let mut candidate = entry.normalized.clone();
                let mut n = 2;
                while !self.is_free(&candidate, avoid) || !entry.allows(&candidate) {
                    candidate = format!("{}{}", entry.normalized, n);
                    n += 1;
                }
                candidate
            };
            self.claim(&name);
            *slot = Some(name);
        }

        for (entry, name) in entries.iter().zip(settled) {
            let name = name.unwrap_or_else(|| entry.raw.clone());
            for symbol in &entry.symbols {
                table.set(*symbol, name.clone());
            }
        }
    }
}

/// Assign a final name to every symbol of a resolved project.
pub fn assign_names(
    project: &Project,
    oracle: &dyn NamingOracle,
    options: &NamingOptions,
) -> NameTable {
    let index = ProjectIndex::build(project);
    let resolver = TypeResolver::new(project, &index);
    let handlers = find_handlers(project, &index);
    let mut builder = Builder {
        project,
        oracle,
        options,
        handlers: &handlers,
        table: NameTable::default(),
    };

    builder.global_scope();
    for m in project.module_ids() {
        builder.module_scope(m);
    }
    for m in project.module_ids() {
        builder.member_scopes(m);
    }
    builder.derive_handlers(&resolver);
    builder.mark_qualified();
    builder.table
}

struct Builder<'a> {
    project: &'a Project,
    oracle: &'a dyn NamingOracle,
    options: &'a NamingOptions,
    handlers: &'a HashMap<SymbolRef, Handler>,
    table: NameTable,
}

impl Builder<'_> {
    fn entry(&self, symbol: SymbolRef, fixed: bool) -> Option<Entry> {
        let raw = self.project.symbol_name(symbol)?.to_string();
        let module = self.project.module(symbol.module())?;
        let attrs = NameAttrs {
            visibility: visibility_of(self.project, symbol),
            module_kind: Some(module.kind),
        };
        let fixed = fixed || self.options.keeps(&raw);
        let normalized = if fixed {
            raw.clone()
        } else {
            self.oracle.normalize(NameKind::of(symbol), &raw, &attrs)
        };
        Some(Entry {
            symbols: vec![symbol],
            raw,
            normalized,
            fixed,
            avoid: HashSet::new(),
        })
    }

    /// Property entries grouped by name, first entry first.
    fn property_groups(&self, m: ModuleId, filter: impl Fn(SymbolRef) -> bool) -> Vec<Entry> {
        let Some(module) = self.project.module(m) else {
            return Vec::new();
        };
        let mut groups: Vec<Entry> = Vec::new();
        for i in 0..module.properties.len() {
            let symbol = SymbolRef::Property(m, i);
            if !filter(symbol) || self.handlers.contains_key(&symbol) {
                continue;
            }
            let raw = &module.properties[i].name;
            if let Some(group) = groups.iter_mut().find(|g| caseless_eq(&g.raw, raw)) {
                group.symbols.push(symbol);
            } else if let Some(entry) = self.entry(symbol, false) {
                groups.push(entry);
            }
        }
        groups
    }

    /// Module names in their own scope, then the globally visible members
    /// of each module in that module's scope.
    ///
    /// Equal raw names in different modules keep their names. A renamed
    /// global only steers clear of names other modules' globals hold under a
    /// different raw name, since sharing those would make bare uses
    /// ambiguous.
    fn global_scope(&mut self) {
        let project = self.project;
        let modules = project
            .module_ids()
            .filter_map(|m| self.entry(SymbolRef::Module(m), false))
            .collect();
        Scope::default().settle(modules, &HashSet::new(), &self.options.reserved, &mut self.table);

        let per_module: Vec<Vec<Entry>> = project
            .module_ids()
            .map(|m| self.module_members(m, |s| is_global(project, s)))
            .collect();

        // New name to the raw names holding it.
        let mut held: HashMap<String, HashSet<String>> = HashMap::new();
        for entry in per_module.iter().flatten() {
            if entry.fixed || entry.raw == entry.normalized {
                held.entry(caseless_key(&entry.raw))
                    .or_default()
                    .insert(caseless_key(&entry.raw));
            }
        }

        for mut entries in per_module {
            let mut settled = Vec::with_capacity(entries.len());
            for entry in &mut entries {
                let raw = caseless_key(&entry.raw);
                entry.avoid = held
                    .iter()
                    .filter(|(_, raws)| raws.iter().any(|r| *r != raw))
                    .map(|(name, _)| name.clone())
                    .collect();
                if let Some(&symbol) = entry.symbols.first() {
                    settled.push((symbol, raw));
                }
            }
            Scope::default().settle(entries, &HashSet::new(), &self.options.reserved, &mut self.table);
            for (symbol, raw) in settled {
                if let Some(name) = self.table.name(symbol) {
                    held.entry(caseless_key(name)).or_default().insert(raw);
                }
            }
        }
    }

    /// Module-level members of `m` selected by `filter`, in scope order.
    fn module_members(&self, m: ModuleId, filter: impl Fn(SymbolRef) -> bool + Copy) -> Vec<Entry> {
        let Some(module) = self.project.module(m) else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        let add = |symbol: SymbolRef, fixed: bool, entries: &mut Vec<Entry>| {
            if filter(symbol) && !self.handlers.contains_key(&symbol) {
                entries.extend(self.entry(symbol, fixed));
            }
        };
        for i in 0..module.variables.len() {
            add(SymbolRef::Variable(m, i), false, &mut entries);
        }
        for i in 0..module.constants.len() {
            add(SymbolRef::Constant(m, i), false, &mut entries);
        }
        for i in 0..module.enums.len() {
            add(SymbolRef::Enum(m, i), false, &mut entries);
        }
        for i in 0..module.types.len() {
            add(SymbolRef::UserType(m, i), false, &mut entries);
        }
        for i in 0..module.events.len() {
            add(SymbolRef::Event(m, i), false, &mut entries);
        }
        for i in 0..module.controls.len() {
            add(SymbolRef::Control(m, i), false, &mut entries);
        }
        for (i, p) in module.procedures.iter().enumerate() {
            add(SymbolRef::Procedure(m, i), p.kind.is_external(), &mut entries);
        }
        entries.extend(self.property_groups(m, filter));
        entries
    }

    fn module_scope(&mut self, m: ModuleId) {
        let project = self.project;
        let mut scope = Scope::default();
        // Members settled globally keep their names but occupy the scope.
        for symbol in module_level_symbols(project, m) {
            if let Some(name) = self.table.name(symbol) {
                scope.claim(name);
            }
        }
        let settled = &self.table;
        let entries = self.module_members(m, |s| settled.name(s).is_none());
        let avoid = self.referenced_names(m, None);
        scope.settle(entries, &avoid, &self.options.reserved, &mut self.table);
    }

    fn member_scopes(&mut self, m: ModuleId) {
        let project = self.project;
        let Some(module) = project.module(m) else {
            return;
        };

        let mut module_names = HashSet::new();
        for symbol in module_level_symbols(project, m) {
            if let Some(name) = self.table.name(symbol) {
                module_names.insert(caseless_key(name));
            }
        }
        for (ei, e) in module.enums.iter().enumerate() {
            let entries = (0..e.values.len())
                .filter_map(|v| self.entry(SymbolRef::EnumValue(m, ei, v), false))
                .collect();
            Scope::default().settle(entries, &module_names, &self.options.reserved, &mut self.table);
        }
        for (ti, t) in module.types.iter().enumerate() {
            let entries = (0..t.fields.len())
                .filter_map(|f| self.entry(SymbolRef::Field(m, ti, f), false))
                .collect();
            Scope::default().settle(entries, &HashSet::new(), &self.options.reserved, &mut self.table);
        }
        for (ei, e) in module.events.iter().enumerate() {
            let owner = MemberRef::Event(ei);
            let entries = (0..e.parameters.len())
                .filter_map(|p| self.entry(SymbolRef::Parameter(m, owner, p), false))
                .collect();
            Scope::default().settle(entries, &HashSet::new(), &self.options.reserved, &mut self.table);
        }

        let members = (0..module.procedures.len())
            .map(MemberRef::Procedure)
            .chain((0..module.properties.len()).map(MemberRef::Property));
        for member in members {
            let Some(proc) = module.member(member) else {
                continue;
            };
            let fixed = proc.kind.is_external();
            let mut entries = Vec::new();
            for i in 0..proc.parameters.len() {
                entries.extend(self.entry(SymbolRef::Parameter(m, member, i), fixed));
            }
            for i in 0..proc.locals.len() {
                entries.extend(self.entry(SymbolRef::Local(m, member, i), false));
            }
            for i in 0..proc.local_constants.len() {
                entries.extend(self.entry(SymbolRef::LocalConstant(m, member, i), false));
            }
            let avoid = self.referenced_names(m, Some(&proc.name));
            Scope::default().settle(entries, &avoid, &self.options.reserved, &mut self.table);
        }
    }

    /// New names of outer symbols that code in module `m` (optionally in one
    /// procedure) may reference by bare name.
    fn referenced_names(&self, m: ModuleId, procedure: Option<&str>) -> HashSet<String> {
        let project = self.project;
        let Some(module) = project.module(m) else {
            return HashSet::new();
        };
        let mut out = HashSet::new();
        for symbol in project.all_symbols() {
            let same_module = symbol.module() == m;
            let relevant = match procedure {
                // Procedure scope: own module-level members and globals.
                Some(_) => {
                    (same_module && is_module_level(symbol)) || (!same_module && is_global(project, symbol))
                }
                // Module scope: globals from other modules.
                None => !same_module && is_global(project, symbol),
            };
            if !relevant {
                continue;
            }
            let Some(refs) = project.symbol_references(symbol) else {
                continue;
            };
            let referenced = refs.iter().any(|r| {
                caseless_eq(&r.module, &module.name)
                    && procedure.is_none_or(|p| caseless_eq(&r.procedure, p))
            });
            if referenced {
                if let Some(name) = self.table.name(symbol) {
                    out.insert(caseless_key(name));
                }
            }
        }
        out
    }

    /// Name handlers after their owners.
    fn derive_handlers(&mut self, resolver: &TypeResolver) {
        let project = self.project;
        let handlers = self.handlers;
        for (&symbol, handler) in handlers {
            let Some(raw) = project.symbol_name(symbol) else {
                continue;
            };
            let name = match handler.owner {
                HandlerOwner::Builtin => raw.to_string(),
                HandlerOwner::Control(c) => {
                    let owner = self
                        .table
                        .name(SymbolRef::Control(symbol.module(), c))
                        .unwrap_or(&handler.owner_raw);
                    format!("{}_{}", owner, handler.rest)
                }
                HandlerOwner::Variable(v) => {
                    let var = SymbolRef::Variable(symbol.module(), v);
                    let owner = self.table.name(var).unwrap_or(&handler.owner_raw);
                    let event = match resolver.declared(var) {
                        ResolvedType::Module(class) => project
                            .module(class)
                            .and_then(|c| c.events.iter().position(|e| caseless_eq(&e.name, &handler.rest)))
                            .and_then(|e| self.table.name(SymbolRef::Event(class, e))),
                        _ => None,
                    };
                    format!("{}_{}", owner, event.unwrap_or(&handler.rest))
                }
                HandlerOwner::Interface(iface) => {
                    let owner = self
                        .table
                        .name(SymbolRef::Module(iface))
                        .unwrap_or(&handler.owner_raw);
                    let member = resolver
                        .module_member(iface, &handler.rest)
                        .filter(|s| matches!(s, SymbolRef::Procedure(..) | SymbolRef::Property(..)))
                        .and_then(|s| self.table.name(s));
                    format!("{}_{}", owner, member.unwrap_or(&handler.rest))
                }
            };
            self.table.set(symbol, name);
        }
    }

    /// Enum values whose raw name appears in more than one enum.
    fn mark_qualified(&mut self) {
        let mut counts: HashMap<String, HashSet<(ModuleId, usize)>> = HashMap::new();
        for (mi, module) in self.project.modules.iter().enumerate() {
            for (ei, e) in module.enums.iter().enumerate() {
                for v in &e.values {
                    counts
                        .entry(caseless_key(&v.name))
                        .or_default()
                        .insert((ModuleId(mi as u32), ei));
                }
            }
        }
        for (mi, module) in self.project.modules.iter().enumerate() {
            let m = ModuleId(mi as u32);
            for (ei, e) in module.enums.iter().enumerate() {
                for (vi, v) in e.values.iter().enumerate() {
                    let shared = counts.get(&caseless_key(&v.name)).is_some_and(|s| s.len() > 1);
                    if shared {
                        self.table.qualify.insert(SymbolRef::EnumValue(m, ei, vi));
                    }
                }
            }
        }
    }
}

fn visibility_of(project: &Project, symbol: SymbolRef) -> Option<Visibility> {
    let module = project.module(symbol.module())?;
    Some(match symbol {
        SymbolRef::Variable(_, i) => module.variables.get(i)?.visibility,
        SymbolRef::Constant(_, i) => module.constants.get(i)?.visibility,
        SymbolRef::UserType(_, i) => module.types.get(i)?.visibility,
        SymbolRef::Enum(_, i) => module.enums.get(i)?.visibility,
        SymbolRef::Event(_, i) => module.events.get(i)?.visibility,
        SymbolRef::Procedure(_, i) => module.procedures.get(i)?.visibility,
        SymbolRef::Property(_, i) => module.properties.get(i)?.visibility,
        _ => return None,
    })
}

fn is_module_level(symbol: SymbolRef) -> bool {
    matches!(
        symbol,
        SymbolRef::Variable(..)
            | SymbolRef::Constant(..)
            | SymbolRef::UserType(..)
            | SymbolRef::Enum(..)
            | SymbolRef::EnumValue(..)
            | SymbolRef::Event(..)
            | SymbolRef::Control(..)
            | SymbolRef::Procedure(..)
            | SymbolRef::Property(..)
    )
}

/// Whether a symbol can be named bare from any module.
fn is_global(project: &Project, symbol: SymbolRef) -> bool {
    let Some(module) = project.module(symbol.module()) else {
        return false;
    };
    let public = visibility_of(project, symbol).is_some_and(|v| v.is_public());
    match symbol {
        SymbolRef::Module(_) => true,
        SymbolRef::Enum(..) | SymbolRef::UserType(..) => public,
        SymbolRef::Variable(..)
        | SymbolRef::Constant(..)
        | SymbolRef::Procedure(..)
        | SymbolRef::Property(..) => public && module.kind == ModuleKind::Standard,
        _ => false,
    }
}

fn module_level_symbols(project: &Project, m: ModuleId) -> Vec<SymbolRef> {
    project
        .all_symbols()
        .into_iter()
        .filter(|s| s.module() == m && is_module_level(*s) && !matches!(s, SymbolRef::EnumValue(..)))
        .collect()
}

// ============================================================================
// Event handlers
// ============================================================================

/// Built-in event owners of a form or class module.
const BUILTIN_OWNERS: &[&str] = &["Form", "MDIForm", "Class", "UserControl", "UserDocument"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerOwner {
    Builtin,
    Control(usize),
    Variable(usize),
    Interface(ModuleId),
}

#[derive(Debug, Clone)]
struct Handler {
    owner: HandlerOwner,
    owner_raw: String,
    rest: String,
}

/// Procedures and properties named `owner_Member`.
fn find_handlers(project: &Project, index: &ProjectIndex) -> HashMap<SymbolRef, Handler> {
    let mut out = HashMap::new();
    for (mi, module) in project.modules.iter().enumerate() {
        let m = ModuleId(mi as u32);
        let mut owners: Vec<(String, HandlerOwner)> = Vec::new();
        for (i, c) in module.controls.iter().enumerate() {
            owners.push((c.name.clone(), HandlerOwner::Control(i)));
        }
        for (i, v) in module.variables.iter().enumerate() {
            if v.with_events {
                owners.push((v.name.clone(), HandlerOwner::Variable(i)));
            }
        }
        for imp in &module.implements {
            if let Some(iface) = index.module(&imp.name) {
                owners.push((imp.name.clone(), HandlerOwner::Interface(iface)));
            }
        }
        if module.kind.is_class_like() {
            for b in BUILTIN_OWNERS {
                owners.push((b.to_string(), HandlerOwner::Builtin));
            }
        }

        let members = module
            .procedures
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.kind.is_external())
            .map(|(i, p)| (SymbolRef::Procedure(m, i), &p.name))
            .chain(
                module
                    .properties
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (SymbolRef::Property(m, i), &p.name)),
            );
        for (symbol, name) in members {
            let best = owners
                .iter()
                .filter(|(owner, _)| {
                    name.len() > owner.len() + 1
                        && name.as_bytes().get(owner.len()) == Some(&b'_')
                        && name.get(..owner.len()).is_some_and(|head| caseless_eq(head, owner))
                })
                .max_by_key(|(owner, _)| owner.len());
            if let Some((owner, kind)) = best {
                out.insert(
                    symbol,
                    Handler {
                        owner: *kind,
                        owner_raw: owner.clone(),
                        rest: name[owner.len() + 1..].to_string(),
                    },
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::resolve::resolve_project;
    use tugbasic_core::progress::SilentProgress;

    fn project(sources: &[(&str, ModuleKind, &str)]) -> Project {
        let mut project = Project::new("Test", "/tmp");
        for (name, kind, src) in sources {
            let lines = src.lines().map(str::to_string).collect();
            project.modules.push(parse_module(name, *kind, lines).0);
        }
        resolve_project(&mut project, &SilentProgress);
        project
    }

    fn names(sources: &[(&str, ModuleKind, &str)]) -> (Project, NameTable) {
        let p = project(sources);
        let table = assign_names(&p, &ConventionOracle, &NamingOptions::default());
        (p, table)
    }

    mod oracle_tests {
        use super::*;

        #[test]
        fn splits_on_case_acronyms_digits_and_underscores() {
            assert_eq!(split_words("HTTPServer"), vec!["HTTP", "Server"]);
            assert_eq!(split_words("m_itemCount"), vec!["m", "item", "Count"]);
            assert_eq!(split_words("cmdOK"), vec!["cmd", "OK"]);
            assert_eq!(split_words("x2y"), vec!["x2", "y"]);
            assert_eq!(split_words("MAX_ROWS"), vec!["MAX", "ROWS"]);
        }

        #[test]
        fn conventions_per_kind() {
            let o = ConventionOracle;
            let a = NameAttrs::default();
            assert_eq!(o.normalize(NameKind::Procedure, "do_thing", &a), "DoThing");
            assert_eq!(o.normalize(NameKind::Variable, "ObjFoo", &a), "objFoo");
            assert_eq!(o.normalize(NameKind::Constant, "maxRows", &a), "MAX_ROWS");
            assert_eq!(o.normalize(NameKind::EnumValue, "NONE", &a), "None");
            assert_eq!(o.normalize(NameKind::Control, "cmdOK", &a), "cmdOk");
        }

        #[test]
        fn normalization_is_idempotent() {
            let o = ConventionOracle;
            let a = NameAttrs::default();
            let kinds = [NameKind::Module, NameKind::Local, NameKind::Constant];
            for raw in ["HTTPServer", "m_itemCount", "x2y", "MAX_ROWS", "getURLPath2Go", "A1B"] {
                for kind in kinds {
                    let once = o.normalize(kind, raw, &a);
                    assert_eq!(o.normalize(kind, &once, &a), once, "{raw} as {kind:?}");
                }
            }
        }

        #[test]
        fn reserved_words_are_configurable() {
            let words = ReservedWords::empty().with_words(["Widget"]);
            assert!(words.contains("widget"));
            assert!(!words.contains("lock"));
            assert!(ReservedWords::default().contains("LOCK"));
        }
    }

    mod conflict_tests {
        use super::*;

        #[test]
        fn collisions_get_numeric_suffixes() {
            let src = "Private item_count As Long\nPrivate ItemCount_ As Long\nPrivate itemCount As Long";
            let (_, t) = names(&[("Main", ModuleKind::Standard, src)]);
            let m = ModuleId(0);
            assert_eq!(t.name(SymbolRef::Variable(m, 2)), Some("itemCount"));
            assert_eq!(t.name(SymbolRef::Variable(m, 0)), Some("itemCount2"));
            assert_eq!(t.name(SymbolRef::Variable(m, 1)), Some("itemCount3"));
        }

        #[test]
        fn reserved_result_keeps_raw_name() {
            let src = "Private Lock_ As Long";
            let (_, t) = names(&[("Main", ModuleKind::Standard, src)]);
            assert_eq!(t.name(SymbolRef::Variable(ModuleId(0), 0)), Some("Lock_"));
        }

        #[test]
        fn externals_and_keep_list_are_fixed() {
            let src = "Private Declare Function get_tick Lib \"kernel32\" (ByVal some_arg As Long) As Long\nPublic Sub do_work()\nEnd Sub";
            let p = project(&[("Main", ModuleKind::Standard, src)]);
            let options = NamingOptions {
                keep: vec!["DO_WORK".into()],
                ..Default::default()
            };
            let t = assign_names(&p, &ConventionOracle, &options);
            let m = ModuleId(0);
            assert_eq!(t.name(SymbolRef::Procedure(m, 0)), Some("get_tick"));
            assert_eq!(
                t.name(SymbolRef::Parameter(m, MemberRef::Procedure(0), 0)),
                Some("some_arg")
            );
            assert_eq!(t.name(SymbolRef::Procedure(m, 1)), Some("do_work"));
        }

        #[test]
        fn locals_avoid_referenced_outer_names() {
            let src = "Private m_total As Long\n\nSub Run()\n  Dim mTotal As Long\n  mTotal = m_total\nEnd Sub";
            let (_, t) = names(&[("Main", ModuleKind::Standard, src)]);
            let m = ModuleId(0);
            assert_eq!(t.name(SymbolRef::Variable(m, 0)), Some("mTotal"));
            assert_eq!(
                t.name(SymbolRef::Local(m, MemberRef::Procedure(0), 0)),
                Some("mTotal2")
            );
        }

        #[test]
        fn equal_globals_in_different_modules_keep_their_names() {
            let (p, t) = names(&[
                ("A", ModuleKind::Standard, "Public Sub Init()\nEnd Sub\nPublic Sub A()\nEnd Sub"),
                ("B", ModuleKind::Standard, "Public Sub Init()\nEnd Sub"),
            ]);
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(0), 0)), Some("Init"));
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(1), 0)), Some("Init"));
            // A module and a member may share a name.
            assert_eq!(t.name(SymbolRef::Module(ModuleId(0))), Some("A"));
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(0), 1)), Some("A"));
            assert!(t.renames(&p).is_empty());
        }

        #[test]
        fn renamed_globals_avoid_names_held_elsewhere() {
            let (_, t) = names(&[
                ("A", ModuleKind::Standard, "Public Sub do_init()\nEnd Sub"),
                ("B", ModuleKind::Standard, "Public Sub DoInit()\nEnd Sub"),
                ("C", ModuleKind::Standard, "Public Sub load_all()\nEnd Sub"),
                ("D", ModuleKind::Standard, "Public Sub load_all()\nEnd Sub"),
            ]);
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(1), 0)), Some("DoInit"));
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(0), 0)), Some("DoInit2"));
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(2), 0)), Some("LoadAll"));
            assert_eq!(t.name(SymbolRef::Procedure(ModuleId(3), 0)), Some("LoadAll"));
        }

        #[test]
        fn property_group_shares_one_name() {
            let src = "Public Property Get item_name() As String\nEnd Property\nPublic Property Let item_name(ByVal v As String)\nEnd Property";
            let (_, t) = names(&[("ClsItem", ModuleKind::Class, src)]);
            let m = ModuleId(0);
            assert_eq!(t.name(SymbolRef::Property(m, 0)), Some("ItemName"));
            assert_eq!(t.name(SymbolRef::Property(m, 1)), Some("ItemName"));
        }
    }

    #[test]
    fn handlers_follow_their_owners() {
        let form = "Attribute VB_Name = \"frmMain\"\nPrivate WithEvents m_worker As ClsWorker\n\nPrivate Sub Form_Load()\nEnd Sub\n\nPrivate Sub m_worker_job_done()\nEnd Sub";
        let worker = "Attribute VB_Name = \"ClsWorker\"\nPublic Event job_done()";
        let (p, t) = names(&[
            ("frmMain", ModuleKind::Form, form),
            ("ClsWorker", ModuleKind::Class, worker),
        ]);
        let m = ModuleId(0);
        assert_eq!(t.name(SymbolRef::Variable(m, 0)), Some("mWorker"));
        assert_eq!(t.name(SymbolRef::Procedure(m, 0)), Some("Form_Load"));
        assert_eq!(t.name(SymbolRef::Procedure(m, 1)), Some("mWorker_JobDone"));
        assert!(!t.is_renamed(&p, SymbolRef::Procedure(m, 0)));
    }

    #[test]
    fn shared_enum_values_need_qualification() {
        let src = "Public Enum Mode\n  NONE\n  Fast\nEnd Enum\nPublic Enum Shade\n  NONE\nEnd Enum";
        let (p, t) = names(&[("Defs", ModuleKind::Standard, src)]);
        let m = ModuleId(0);
        assert_eq!(t.name(SymbolRef::EnumValue(m, 0, 0)), Some("None"));
        assert_eq!(t.name(SymbolRef::EnumValue(m, 1, 0)), Some("None"));
        assert!(t.needs_qualification(SymbolRef::EnumValue(m, 0, 0)));
        assert!(!t.needs_qualification(SymbolRef::EnumValue(m, 0, 1)));

        let renames = t.renames(&p);
        let none = renames
            .iter()
            .find(|(s, _)| *s == SymbolRef::EnumValue(m, 1, 0))
            .map(|(_, r)| r.clone())
            .unwrap();
        assert_eq!(none.scope, "Shade");
        assert_eq!(none.kind, NameKind::EnumValue);
    }
}
