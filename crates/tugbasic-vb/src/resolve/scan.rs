//! Body scanner.
//!
//! Walks the code lines of one module and classifies every identifier token
//! as a dotted member, a `With` member, or a bare name. Each classification
//! that lands on a project symbol becomes a [`Hit`]. The scanner only reads
//! the model; hits are applied by the caller.

use std::collections::HashSet;

use tugbasic_core::text::caseless_eq;

use crate::continuation::{normalize_lines, LogicalLine};
use crate::env::TypeEnv;
use crate::lexer::{is_keyword, occurrence_index, tokenize, Token, TokenKind};
use crate::model::{DeclPos, MemberRef, Module, ModuleId, Procedure, SymbolRef};
use crate::resolve::types::{is_builtin_object, position_of, ResolvedType, TypeResolver};

/// A symbol used at one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub symbol: SymbolRef,
    pub line: u32,
    pub occurrence: usize,
    /// Enclosing procedure or property.
    pub member: Option<MemberRef>,
    /// Set when the symbol is callable.
    pub call: Option<CallHit>,
}

/// Call observed at a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHit {
    pub receiver: Option<String>,
    pub name: String,
}

/// A token with its physical address.
#[derive(Clone, Copy)]
struct Tok<'t> {
    token: &'t Token,
    line: u32,
    occurrence: usize,
}

impl Tok<'_> {
    fn pos(&self) -> DeclPos {
        DeclPos {
            line: self.line,
            occurrence: self.occurrence,
        }
    }
}

/// Scan every code line of a module.
pub fn scan_module(resolver: &TypeResolver, module_id: ModuleId) -> Vec<Hit> {
    let Some(module) = resolver.project.module(module_id) else {
        return Vec::new();
    };
    let tokens: Vec<Vec<Token>> = module.lines.iter().map(|l| tokenize(l)).collect();
    let logical = normalize_lines(&module.lines);
    let module_env = TypeEnv::for_module(resolver, module_id, &logical);

    let mut scanner = Scanner {
        resolver,
        module_id,
        module,
        skip: declaration_positions(module),
        env: module_env.clone(),
        module_env,
        member: None,
        with_stack: Vec::new(),
        hits: Vec::new(),
    };

    let first_code_line = module.name_directive_line.map_or(1, |l| l + 1);
    for line in &logical {
        if line.start_line() < first_code_line || is_attribute_line(&line.text) {
            continue;
        }
        let member = module.member_at(line.start_line());
        if member != scanner.member {
            scanner.enter(member, &logical);
        }
        let stream = physical_tokens(&tokens, line);
        scanner.logical_line(&stream);
    }

    scanner.hits
}

fn is_attribute_line(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed
        .get(..10)
        .is_some_and(|head| head.eq_ignore_ascii_case("attribute "))
}

/// Tokens of every physical line of a logical line, continuation markers
/// dropped.
fn physical_tokens<'t>(tokens: &'t [Vec<Token>], line: &LogicalLine) -> Vec<Tok<'t>> {
    let mut out = Vec::new();
    let last = line.end_line();
    for physical in line.start_line()..=last {
        let Some(line_tokens) = (physical as usize)
            .checked_sub(1)
            .and_then(|idx| tokens.get(idx))
        else {
            continue;
        };
        for (i, token) in line_tokens.iter().enumerate() {
            let marker = physical < last && i + 1 == line_tokens.len() && token.is_punct('_');
            if marker {
                continue;
            }
            out.push(Tok {
                token,
                line: physical,
                occurrence: occurrence_index(line_tokens, i),
            });
        }
    }
    out
}

/// Every declared name and declared type token of a module.
fn declaration_positions(module: &Module) -> HashSet<DeclPos> {
    let mut skip = HashSet::new();
    let typed = |skip: &mut HashSet<DeclPos>, decl: DeclPos, type_pos: Option<DeclPos>| {
        skip.insert(decl);
        skip.extend(type_pos);
    };

    for v in &module.variables {
        typed(&mut skip, v.decl, v.type_pos);
    }
    for c in &module.constants {
        typed(&mut skip, c.decl, c.type_pos);
    }
    for t in &module.types {
        skip.insert(t.decl);
        for f in &t.fields {
            typed(&mut skip, f.decl, f.type_pos);
        }
    }
    for e in &module.enums {
        skip.insert(e.decl);
        skip.extend(e.values.iter().map(|v| v.decl));
    }
    for e in &module.events {
        skip.insert(e.decl);
        for p in &e.parameters {
            typed(&mut skip, p.decl, p.type_pos);
        }
    }
    for p in module.procedures.iter().chain(&module.properties) {
        typed(&mut skip, p.decl, p.return_type_pos);
        for param in &p.parameters {
            typed(&mut skip, param.decl, param.type_pos);
        }
        for local in &p.locals {
            typed(&mut skip, local.decl, local.type_pos);
        }
        for c in &p.local_constants {
            typed(&mut skip, c.decl, c.type_pos);
        }
    }
    skip
}

struct Scanner<'a> {
    resolver: &'a TypeResolver<'a>,
    module_id: ModuleId,
    module: &'a Module,
    skip: HashSet<DeclPos>,
    module_env: TypeEnv,
    env: TypeEnv,
    member: Option<MemberRef>,
    with_stack: Vec<ResolvedType>,
    hits: Vec<Hit>,
}

/// Per-statement state.
struct Statement {
    types: Vec<Option<ResolvedType>>,
    parens: Vec<Option<usize>>,
    last_callable: Option<SymbolRef>,
}

impl<'a> Scanner<'a> {
    fn enter(&mut self, member: Option<MemberRef>, logical: &[LogicalLine]) {
        self.member = member;
        self.with_stack.clear();
        self.env = match member {
            Some(m) => self
                .module_env
                .for_member(self.resolver, self.module_id, m, logical),
            None => self.module_env.clone(),
        };
    }

    fn procedure(&self) -> Option<&'a Procedure> {
        self.member.and_then(|m| self.module.member(m))
    }

    fn logical_line(&mut self, stream: &[Tok]) {
        let mut start = 0;
        let mut first = true;
        for i in 0..=stream.len() {
            let at_colon = stream.get(i).is_some_and(|t| t.token.is_punct(':'));
            if i < stream.len() && !at_colon {
                continue;
            }
            let statement = &stream[start..i];
            let is_label = first && at_colon && statement.len() == 1;
            if !statement.is_empty() && !is_label {
                self.statement(statement);
            }
            first = false;
            start = i + 1;
        }
    }

    fn statement(&mut self, toks: &[Tok]) {
        if toks.len() >= 2 && toks[0].token.is_word("End") && toks[1].token.is_word("With") {
            self.with_stack.pop();
            return;
        }

        let mut state = Statement {
            types: vec![None; toks.len()],
            parens: Vec::new(),
            last_callable: None,
        };
        for (i, tok) in toks.iter().enumerate() {
            match tok.token.kind {
                TokenKind::Punct('(') => {
                    let owner = i
                        .checked_sub(1)
                        .filter(|&p| toks[p].token.is_ident() || toks[p].token.is_punct(')'));
                    state.parens.push(owner);
                }
                TokenKind::Punct(')') => {
                    if let Some(owner) = state.parens.pop() {
                        state.types[i] = owner.and_then(|o| state.types[o]);
                    }
                }
                TokenKind::Ident => self.ident(toks, i, &mut state),
                _ => {}
            }
        }

        if toks[0].token.is_word("With") {
            let target = state.types.last().copied().flatten();
            self.with_stack.push(target.unwrap_or(ResolvedType::Unknown));
        }
    }

    fn ident(&mut self, toks: &[Tok], i: usize, state: &mut Statement) {
        let tok = toks[i];
        let name = tok.token.text.as_str();
        let prev = i.checked_sub(1).map(|p| toks[p].token);
        let next = toks.get(i + 1).map(|t| t.token);

        if prev.is_some_and(|p| p.is_punct('!')) || self.skip.contains(&tok.pos()) {
            return;
        }
        if prev.is_some_and(|p| p.is_word("GoTo") || p.is_word("GoSub") || p.is_word("Resume")) {
            return;
        }

        if prev.is_some_and(|p| p.is_punct('.')) {
            self.member_access(toks, i, state);
            return;
        }

        if caseless_eq(name, "Me") {
            state.types[i] = Some(ResolvedType::Module(self.module_id));
            return;
        }
        if is_keyword(name) {
            return;
        }
        if next.is_some_and(|n| n.kind == TokenKind::ColonEq) {
            if let Some(param) = state.last_callable.and_then(|c| self.named_argument(c, name)) {
                self.record(tok, param, None);
            }
            return;
        }

        let after_raise = prev.is_some_and(|p| p.is_word("RaiseEvent"));
        let followed_by_dot = next.is_some_and(|n| n.is_punct('.'));
        let Some(symbol) = self.lookup_bare(name, after_raise, followed_by_dot) else {
            state.types[i] = Some(if is_builtin_object(name) {
                ResolvedType::External
            } else {
                ResolvedType::Unknown
            });
            return;
        };

        state.types[i] = Some(self.type_of(symbol, name));
        if is_callable(symbol) {
            state.last_callable = Some(symbol);
        }
        let call = is_callable(symbol).then(|| CallHit {
            receiver: None,
            name: name.to_string(),
        });
        self.record(tok, symbol, call);
    }

    fn member_access(&mut self, toks: &[Tok], i: usize, state: &mut Statement) {
        let tok = toks[i];
        let name = tok.token.text.as_str();
        let receiver_idx = i.checked_sub(2).filter(|&r| {
            let t = toks[r].token;
            t.is_punct(')') || (t.is_ident() && (!is_keyword(&t.text) || t.is_word("Me")))
        });

        let receiver_type = match receiver_idx {
            Some(r) => state.types[r].unwrap_or(ResolvedType::Unknown),
            None => self
                .with_stack
                .last()
                .copied()
                .unwrap_or(ResolvedType::Unknown),
        };

        let lookup = match receiver_type {
            ResolvedType::Unknown => {
                let hint = receiver_idx
                    .map(|r| toks[r].token)
                    .filter(|t| t.is_ident())
                    .and_then(|t| self.lookup_bare(&t.text, false, false))
                    .and_then(|s| self.resolver.type_text(s));
                self.resolver.fallback_member(self.module_id, name, hint)
            }
            ty => self.resolver.member(self.module_id, ty, name),
        };
        let Some(symbol) = lookup else {
            state.types[i] = Some(if receiver_type.is_opaque() {
                ResolvedType::External
            } else {
                ResolvedType::Unknown
            });
            return;
        };

        state.types[i] = Some(self.resolver.declared(symbol));
        if is_callable(symbol) {
            state.last_callable = Some(symbol);
        }
        let call = is_callable(symbol).then(|| CallHit {
            receiver: receiver_idx
                .map(|r| toks[r].token)
                .filter(|t| t.is_ident())
                .map(|t| t.text.clone()),
            name: name.to_string(),
        });
        self.record(tok, symbol, call);
    }

    /// Scope chain for a bare name.
    fn lookup_bare(&self, name: &str, after_raise: bool, followed_by_dot: bool) -> Option<SymbolRef> {
        let m = self.module_id;

        if let (Some(member), Some(proc)) = (self.member, self.procedure()) {
            if let Some(i) = proc.parameters.iter().position(|p| caseless_eq(&p.name, name)) {
                return Some(SymbolRef::Parameter(m, member, i));
            }
            if let Some(i) = proc.locals.iter().position(|v| caseless_eq(&v.name, name)) {
                return Some(SymbolRef::Local(m, member, i));
            }
            if let Some(i) = proc.local_constants.iter().position(|c| caseless_eq(&c.name, name)) {
                return Some(SymbolRef::LocalConstant(m, member, i));
            }
        }

        if let Some(symbol) = self.own_member(name, after_raise) {
            return Some(symbol);
        }

        let index = self.resolver.index;
        if followed_by_dot {
            if let Some(module) = index.module(name) {
                return Some(SymbolRef::Module(module));
            }
        }
        if let Some(symbol) = index.global(self.resolver.project, m, name) {
            return Some(symbol);
        }
        index.module(name).map(SymbolRef::Module)
    }

    /// Current module members in bare-name order.
    fn own_member(&self, name: &str, after_raise: bool) -> Option<SymbolRef> {
        let m = self.module_id;
        let module = self.module;
        if after_raise {
            return position_of(module.events.iter().map(|e| e.name.as_str()), name)
                .map(|i| SymbolRef::Event(m, i));
        }
        if let Some(i) = position_of(module.variables.iter().map(|v| v.name.as_str()), name) {
            return Some(SymbolRef::Variable(m, i));
        }
        if let Some(i) = position_of(module.constants.iter().map(|c| c.name.as_str()), name) {
            return Some(SymbolRef::Constant(m, i));
        }
        if let Some(i) = position_of(module.procedures.iter().map(|p| p.name.as_str()), name) {
            return Some(SymbolRef::Procedure(m, i));
        }
        if let Some(i) = position_of(module.properties.iter().map(|p| p.name.as_str()), name) {
            return Some(SymbolRef::Property(m, i));
        }
        if let Some(i) = position_of(module.controls.iter().map(|c| c.name.as_str()), name) {
            return Some(SymbolRef::Control(m, i));
        }
        for (ei, en) in module.enums.iter().enumerate() {
            if let Some(vi) = position_of(en.values.iter().map(|v| v.name.as_str()), name) {
                return Some(SymbolRef::EnumValue(m, ei, vi));
            }
        }
        if let Some(i) = position_of(module.enums.iter().map(|e| e.name.as_str()), name) {
            return Some(SymbolRef::Enum(m, i));
        }
        position_of(module.types.iter().map(|t| t.name.as_str()), name)
            .map(|i| SymbolRef::UserType(m, i))
    }

    /// Parameter of `callable` matching a `name:=` argument.
    fn named_argument(&self, callable: SymbolRef, name: &str) -> Option<SymbolRef> {
        let project = self.resolver.project;
        let (m, owner) = match callable {
            SymbolRef::Procedure(m, i) => (m, MemberRef::Procedure(i)),
            SymbolRef::Property(m, i) => (m, MemberRef::Property(i)),
            SymbolRef::Event(m, i) => (m, MemberRef::Event(i)),
            _ => return None,
        };
        let module = project.module(m)?;
        let params = match owner {
            MemberRef::Event(e) => &module.events.get(e)?.parameters,
            member => &module.member(member)?.parameters,
        };
        params
            .iter()
            .position(|p| caseless_eq(&p.name, name))
            .map(|i| SymbolRef::Parameter(m, owner, i))
    }

    /// Receiver type of a bare symbol, refined by assignments.
    fn type_of(&self, symbol: SymbolRef, name: &str) -> ResolvedType {
        let refinable = matches!(
            symbol,
            SymbolRef::Variable(..) | SymbolRef::Parameter(..) | SymbolRef::Local(..)
        );
        if refinable {
            if let Some(ty) = self.env.get(name) {
                return ty;
            }
        }
        self.resolver.declared(symbol)
    }

    fn record(&mut self, tok: Tok, symbol: SymbolRef, call: Option<CallHit>) {
        self.hits.push(Hit {
            symbol,
            line: tok.line,
            occurrence: tok.occurrence,
            member: self.member,
            call,
        });
    }
}

fn is_callable(symbol: SymbolRef) -> bool {
    matches!(
        symbol,
        SymbolRef::Procedure(..) | SymbolRef::Property(..) | SymbolRef::Event(..)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ProjectIndex;
    use crate::model::{ModuleKind, Project};
    use crate::parser::parse_module;

    fn project(sources: &[(&str, ModuleKind, &str)]) -> Project {
        let mut project = Project::new("Test", "/tmp");
        for (name, kind, src) in sources {
            let lines = src.lines().map(str::to_string).collect();
            project.modules.push(parse_module(name, *kind, lines).0);
        }
        project
    }

    fn hits(p: &Project, module: u32) -> Vec<Hit> {
        let index = ProjectIndex::build(p);
        let resolver = TypeResolver::new(p, &index);
        scan_module(&resolver, ModuleId(module))
    }

    fn at(hits: &[Hit], line: u32) -> Vec<(SymbolRef, usize)> {
        hits.iter()
            .filter(|h| h.line == line)
            .map(|h| (h.symbol, h.occurrence))
            .collect()
    }

    mod scope_tests {
        use super::*;

        #[test]
        fn locals_shadow_module_names() {
            let src = "Attribute VB_Name = \"Main\"\nDim Count As Long\n\nSub Run()\n  Dim Count As Long\n  Count = Count + 1\nEnd Sub\n\nSub Other()\n  Count = 2\nEnd Sub";
            let p = project(&[("Main", ModuleKind::Standard, src)]);
            let hits = hits(&p, 0);
            let m = ModuleId(0);
            let local = SymbolRef::Local(m, MemberRef::Procedure(0), 0);
            assert_eq!(at(&hits, 6), vec![(local, 0), (local, 1)]);
            assert_eq!(at(&hits, 10), vec![(SymbolRef::Variable(m, 0), 0)]);
        }

        #[test]
        fn declarations_and_labels_are_not_references() {
            let src = "Sub Run(ByVal n As Long)\n  Dim x As Long\n  x = n\nRetry:\n  If x = 0 Then GoTo Retry\nEnd Sub";
            let p = project(&[("Main", ModuleKind::Standard, src)]);
            let hits = hits(&p, 0);
            let m = ModuleId(0);
            let owner = MemberRef::Procedure(0);
            assert!(at(&hits, 1).is_empty());
            assert!(at(&hits, 2).is_empty());
            assert_eq!(
                at(&hits, 3),
                vec![
                    (SymbolRef::Local(m, owner, 0), 0),
                    (SymbolRef::Parameter(m, owner, 0), 0)
                ]
            );
            assert!(at(&hits, 4).is_empty());
            assert_eq!(at(&hits, 5), vec![(SymbolRef::Local(m, owner, 0), 0)]);
        }

        #[test]
        fn strings_and_comments_are_ignored() {
            let src = "Sub Run()\n  Dim s As String\n  s = \"s\" ' s\nEnd Sub";
            let p = project(&[("Main", ModuleKind::Standard, src)]);
            let hits = hits(&p, 0);
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].line, 3);
        }
    }

    mod receiver_tests {
        use super::*;

        #[test]
        fn typed_variable_receiver_resolves_member() {
            let main = "Dim objFoo As ClsBar\n\nSub Run()\n  objFoo.DoThing\n  Call objFoo.DoThing()\nEnd Sub";
            let p = project(&[
                ("Main", ModuleKind::Standard, main),
                ("ClsBar", ModuleKind::Class, "Public Sub DoThing()\nEnd Sub"),
            ]);
            let hits = hits(&p, 0);
            let target = SymbolRef::Procedure(ModuleId(1), 0);
            let on_4: Vec<_> = hits.iter().filter(|h| h.line == 4).collect();
            assert_eq!(on_4.len(), 2);
            assert_eq!(on_4[1].symbol, target);
            assert_eq!(
                on_4[1].call,
                Some(CallHit {
                    receiver: Some("objFoo".into()),
                    name: "DoThing".into()
                })
            );
            assert!(hits.iter().any(|h| h.line == 5 && h.symbol == target));
        }

        #[test]
        fn with_blocks_and_enum_qualifiers() {
            let main = "Public Type Pt\n  X As Long\nEnd Type\nPublic Enum Color\n  Red\nEnd Enum\n\nSub Run()\n  Dim p As Pt\n  With p\n    .X = Color.Red\n  End With\nEnd Sub";
            let p = project(&[("Main", ModuleKind::Standard, main)]);
            let hits = hits(&p, 0);
            let m = ModuleId(0);
            assert_eq!(
                at(&hits, 11),
                vec![
                    (SymbolRef::Field(m, 0, 0), 0),
                    (SymbolRef::Enum(m, 0), 0),
                    (SymbolRef::EnumValue(m, 0, 0), 0)
                ]
            );
        }

        #[test]
        fn external_receivers_stay_unresolved() {
            let main = "Dim rs As ADODB.Recordset\n\nSub Run()\n  rs.MoveNext\n  Debug.Print rs!Total\nEnd Sub";
            let p = project(&[
                ("Main", ModuleKind::Standard, main),
                ("ClsBar", ModuleKind::Class, "Public Sub MoveNext()\nEnd Sub\nPublic Sub Total()\nEnd Sub"),
            ]);
            let hits = hits(&p, 0);
            let rs = SymbolRef::Variable(ModuleId(0), 0);
            assert_eq!(at(&hits, 4), vec![(rs, 0)]);
            assert_eq!(at(&hits, 5), vec![(rs, 0)]);
        }

        #[test]
        fn late_bound_receiver_falls_back_to_project_procedures() {
            let main = "Dim o As Object\n\nSub Run()\n  o.do_thing\n  Set o = Nothing\nEnd Sub";
            let p = project(&[
                ("Main", ModuleKind::Standard, main),
                ("Other", ModuleKind::Standard, "Public Sub do_thing()\nEnd Sub"),
            ]);
            let hits = hits(&p, 0);
            let o = SymbolRef::Variable(ModuleId(0), 0);
            let target = SymbolRef::Procedure(ModuleId(1), 0);
            assert_eq!(at(&hits, 4), vec![(o, 0), (target, 0)]);
            let call = hits.iter().find(|h| h.symbol == target).unwrap();
            assert_eq!(
                call.call,
                Some(CallHit {
                    receiver: Some("o".into()),
                    name: "do_thing".into()
                })
            );
        }

        #[test]
        fn named_arguments_bind_to_parameters() {
            let main = "Sub Run()\n  Util.Configure Size:=3\nEnd Sub";
            let util = "Public Sub Configure(ByVal Size As Long)\nEnd Sub";
            let p = project(&[
                ("Main", ModuleKind::Standard, main),
                ("Util", ModuleKind::Standard, util),
            ]);
            let hits = hits(&p, 0);
            let u = ModuleId(1);
            assert_eq!(
                at(&hits, 2),
                vec![
                    (SymbolRef::Module(u), 0),
                    (SymbolRef::Procedure(u, 0), 0),
                    (SymbolRef::Parameter(u, MemberRef::Procedure(0), 0), 0)
                ]
            );
        }
    }

    #[test]
    fn continued_statements_keep_physical_positions() {
        let main = "Sub Run(ByVal a As Long, ByVal b As Long)\n  Total a, _\n    b\nEnd Sub\nSub Total(ByVal x As Long, ByVal y As Long)\nEnd Sub";
        let p = project(&[("Main", ModuleKind::Standard, main)]);
        let hits = hits(&p, 0);
        let m = ModuleId(0);
        let owner = MemberRef::Procedure(0);
        assert_eq!(
            at(&hits, 2),
            vec![
                (SymbolRef::Procedure(m, 1), 0),
                (SymbolRef::Parameter(m, owner, 0), 0)
            ]
        );
        assert_eq!(at(&hits, 3), vec![(SymbolRef::Parameter(m, owner, 1), 0)]);
    }
}
