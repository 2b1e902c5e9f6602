//! Phase A: build a [`Module`] from physical source lines.
//!
//! Runs the continuation normalizer and the declaration recognizer, maps each
//! declared name back to its physical `(line, occurrence)` position, attaches
//! locals and constants to the open procedure, and discovers parse-time call
//! sites. Malformed structure never fails the parse: a header without its
//! terminator is clamped and reported as a [`ParseIssue`].

use tracing::warn;

use tugbasic_core::text::caseless_eq;

use crate::continuation::{normalize_lines, LogicalLine};
use crate::lexer::{is_keyword, occurrence_index, token_at, tokenize, Token, TokenKind};
use crate::model::{
    CallSite, Constant, Control, DeclPos, EnumValue, Enumeration, Event, Field, Implements,
    MemberRef, Module, ModuleKind, Parameter, Procedure, References, UserType, Variable, Visibility,
};
use crate::recognizer::{
    ConstDecl, Declaration, ParamDecl, ProcHeader, Recognizer, TypeRef, VarDecl,
};

/// A structural problem found while parsing. The module is still usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub line: u32,
    pub message: String,
}

/// Parse one module.
///
/// `default_name` is used unless the source carries a name directive.
pub fn parse_module(
    default_name: &str,
    kind: ModuleKind,
    lines: Vec<String>,
) -> (Module, Vec<ParseIssue>) {
    let mut builder = ModuleBuilder::new(default_name, kind, &lines);
    for logical in normalize_lines(&lines) {
        builder.feed(&logical);
    }
    let (mut module, issues) = builder.finish();
    module.lines = lines;
    discover_calls(&mut module);
    (module, issues)
}

struct ModuleBuilder {
    module: Module,
    tokens: Vec<Vec<Token>>,
    line_count: u32,
    recognizer: Recognizer,
    open_procedure: Option<MemberRef>,
    open_type: Option<usize>,
    open_enum: Option<usize>,
    control_stack: Vec<usize>,
    issues: Vec<ParseIssue>,
}

impl ModuleBuilder {
    fn new(default_name: &str, kind: ModuleKind, lines: &[String]) -> Self {
        ModuleBuilder {
            module: Module::new(default_name, kind),
            tokens: lines.iter().map(|l| tokenize(l)).collect(),
            line_count: lines.len() as u32,
            recognizer: Recognizer::new(),
            open_procedure: None,
            open_type: None,
            open_enum: None,
            control_stack: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Physical position of a name at a logical column.
    fn pos(&self, logical: &LogicalLine, column: usize) -> DeclPos {
        let (line, physical_column) = logical.physical_at(column);
        let occurrence = line
            .checked_sub(1)
            .and_then(|idx| self.tokens.get(idx as usize))
            .and_then(|tokens| {
                token_at(tokens, physical_column).map(|i| occurrence_index(tokens, i))
            })
            .unwrap_or(0);
        DeclPos { line, occurrence }
    }

    fn type_pos(&self, logical: &LogicalLine, type_ref: &Option<TypeRef>) -> Option<DeclPos> {
        type_ref.as_ref().map(|t| self.pos(logical, t.column))
    }

    fn issue(&mut self, line: u32, message: String) {
        warn!(module = %self.module.name, line, "{}", message);
        self.issues.push(ParseIssue { line, message });
    }

    fn feed(&mut self, logical: &LogicalLine) {
        let Some(decl) = self.recognizer.recognize(&logical.text) else {
            return;
        };
        let line = logical.start_line();

        match decl {
            Declaration::ModuleName(name) => {
                self.module.name = name.text;
                self.module.name_directive_line = Some(line);
            }
            Declaration::FormBegin { .. } => {
                self.module.form_begin_line = Some(line);
            }
            Declaration::ControlBegin { type_name, name } => {
                let existing = self
                    .module
                    .controls
                    .iter()
                    .position(|c| caseless_eq(&c.name, &name.text));
                let idx = match existing {
                    Some(idx) => {
                        self.module.controls[idx].lines.push(line);
                        idx
                    }
                    None => {
                        self.module.controls.push(Control {
                            name: name.text,
                            control_type: type_name,
                            lines: vec![line],
                            indices: Vec::new(),
                            used: false,
                            references: References::default(),
                        });
                        self.module.controls.len() - 1
                    }
                };
                self.control_stack.push(idx);
            }
            Declaration::ControlIndex(index) => {
                if let Some(&idx) = self.control_stack.last() {
                    self.module.controls[idx].indices.push(index);
                }
            }
            Declaration::BlockEnd => {
                self.control_stack.pop();
            }
            Declaration::ProcedureStart(header) => {
                if let Some(open) = self.open_procedure.take() {
                    let clamp_to = line.saturating_sub(1);
                    self.close_procedure(open, clamp_to);
                    let name = self.member_name(open);
                    self.issue(
                        line,
                        format!(
                            "'{}' has no terminator before the next procedure; span clamped to line {}",
                            name, clamp_to
                        ),
                    );
                }
                let procedure = self.procedure_from_header(logical, header);
                let member = if procedure.kind.is_property() {
                    self.module.properties.push(procedure);
                    MemberRef::Property(self.module.properties.len() - 1)
                } else {
                    self.module.procedures.push(procedure);
                    MemberRef::Procedure(self.module.procedures.len() - 1)
                };
                self.open_procedure = Some(member);
            }
            Declaration::ProcedureEnd(_) => {
                if let Some(open) = self.open_procedure.take() {
                    self.close_procedure(open, logical.end_line());
                }
            }
            Declaration::External(header) => {
                let procedure = self.procedure_from_header(logical, header);
                self.module.procedures.push(procedure);
            }
            Declaration::TypeStart { name, visibility } => {
                self.module.types.push(UserType {
                    decl: self.pos(logical, name.column),
                    name: name.text,
                    visibility,
                    fields: Vec::new(),
                    end_line: line,
                    used: false,
                    references: References::default(),
                });
                self.open_type = Some(self.module.types.len() - 1);
            }
            Declaration::Field(var) => {
                let field = Field {
                    decl: self.pos(logical, var.name.column),
                    type_pos: self.type_pos(logical, &var.type_ref),
                    type_name: type_text(&var.type_ref),
                    name: var.name.text,
                    is_array: var.is_array,
                    used: false,
                    references: References::default(),
                };
                if let Some(t) = self.open_type.and_then(|i| self.module.types.get_mut(i)) {
                    t.fields.push(field);
                }
            }
            Declaration::TypeEnd => {
                if let Some(t) = self.open_type.take().and_then(|i| self.module.types.get_mut(i)) {
                    t.end_line = line;
                }
            }
            Declaration::EnumStart { name, visibility } => {
                self.module.enums.push(Enumeration {
                    decl: self.pos(logical, name.column),
                    name: name.text,
                    visibility,
                    values: Vec::new(),
                    end_line: line,
                    used: false,
                    references: References::default(),
                });
                self.open_enum = Some(self.module.enums.len() - 1);
            }
            Declaration::EnumValue { name, value } => {
                let value = EnumValue {
                    decl: self.pos(logical, name.column),
                    name: name.text,
                    value,
                    used: false,
                    references: References::default(),
                };
                if let Some(e) = self.open_enum.and_then(|i| self.module.enums.get_mut(i)) {
                    e.values.push(value);
                }
            }
            Declaration::EnumEnd => {
                if let Some(e) = self.open_enum.take().and_then(|i| self.module.enums.get_mut(i)) {
                    e.end_line = line;
                }
            }
            Declaration::Event {
                name,
                visibility,
                params,
            } => {
                let parameters = params.into_iter().map(|p| self.parameter(logical, p)).collect();
                self.module.events.push(Event {
                    decl: self.pos(logical, name.column),
                    name: name.text,
                    visibility,
                    parameters,
                    used: false,
                    references: References::default(),
                });
            }
            Declaration::Implements(name) => {
                self.module.implements.push(Implements {
                    decl: self.pos(logical, name.column),
                    name: name.text,
                });
            }
            Declaration::Variables {
                visibility,
                is_static,
                vars,
            } => {
                for var in vars {
                    let variable = self.variable(logical, var, visibility, is_static);
                    match self.open_procedure_mut() {
                        Some(p) => p.locals.push(variable),
                        None => self.module.variables.push(variable),
                    }
                }
            }
            Declaration::Constants { visibility, consts } => {
                for c in consts {
                    let constant = self.constant(logical, c, visibility);
                    match self.open_procedure_mut() {
                        Some(p) => p.local_constants.push(constant),
                        None => self.module.constants.push(constant),
                    }
                }
            }
            Declaration::MemberAttribute { .. } => {}
        }
    }

    fn finish(mut self) -> (Module, Vec<ParseIssue>) {
        let last = self.line_count;
        if let Some(open) = self.open_procedure.take() {
            self.close_procedure(open, last);
            let name = self.member_name(open);
            self.issue(
                last,
                format!("'{}' has no terminator; span clamped to end of file", name),
            );
        }
        if let Some(i) = self.open_type.take() {
            let name = self.module.types[i].name.clone();
            self.module.types[i].end_line = last;
            self.issue(last, format!("type '{}' has no End Type", name));
        }
        if let Some(i) = self.open_enum.take() {
            let name = self.module.enums[i].name.clone();
            self.module.enums[i].end_line = last;
            self.issue(last, format!("enum '{}' has no End Enum", name));
        }
        (self.module, self.issues)
    }

    fn open_procedure_mut(&mut self) -> Option<&mut Procedure> {
        match self.open_procedure? {
            MemberRef::Procedure(i) => self.module.procedures.get_mut(i),
            MemberRef::Property(i) => self.module.properties.get_mut(i),
            MemberRef::Event(_) => None,
        }
    }

    fn member_name(&self, member: MemberRef) -> String {
        self.module
            .member(member)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    fn close_procedure(&mut self, member: MemberRef, end_line: u32) {
        let procedure = match member {
            MemberRef::Procedure(i) => self.module.procedures.get_mut(i),
            MemberRef::Property(i) => self.module.properties.get_mut(i),
            MemberRef::Event(_) => None,
        };
        if let Some(p) = procedure {
            p.end_line = end_line.max(p.header_end_line);
        }
    }

    fn procedure_from_header(&self, logical: &LogicalLine, header: ProcHeader) -> Procedure {
        let parameters = header
            .params
            .into_iter()
            .map(|p| self.parameter(logical, p))
            .collect();
        Procedure {
            decl: self.pos(logical, header.name.column),
            name: header.name.text,
            kind: header.kind,
            visibility: header.visibility,
            is_static: header.is_static,
            parameters,
            return_type_pos: self.type_pos(logical, &header.return_type),
            return_type: type_text(&header.return_type),
            library: header.library,
            locals: Vec::new(),
            local_constants: Vec::new(),
            calls: Vec::new(),
            start_line: logical.start_line(),
            header_end_line: logical.end_line(),
            end_line: logical.end_line(),
            used: false,
            references: References::default(),
        }
    }

    fn parameter(&self, logical: &LogicalLine, p: ParamDecl) -> Parameter {
        Parameter {
            decl: self.pos(logical, p.name.column),
            type_pos: self.type_pos(logical, &p.type_ref),
            type_name: type_text(&p.type_ref),
            name: p.name.text,
            passing: p.passing,
            optional: p.optional,
            param_array: p.param_array,
            is_array: p.is_array,
            default_value: p.default_value,
            used: false,
            references: References::default(),
        }
    }

    fn variable(
        &self,
        logical: &LogicalLine,
        var: VarDecl,
        visibility: Visibility,
        is_static: bool,
    ) -> Variable {
        Variable {
            decl: self.pos(logical, var.name.column),
            type_pos: self.type_pos(logical, &var.type_ref),
            type_name: type_text(&var.type_ref),
            name: var.name.text,
            visibility,
            is_static,
            is_array: var.is_array,
            with_events: var.with_events,
            as_new: var.as_new,
            used: false,
            references: References::default(),
        }
    }

    fn constant(
        &self,
        logical: &LogicalLine,
        c: ConstDecl,
        visibility: Visibility,
    ) -> Constant {
        Constant {
            decl: self.pos(logical, c.name.column),
            type_pos: self.type_pos(logical, &c.type_ref),
            type_name: type_text(&c.type_ref),
            name: c.name.text,
            value: c.value,
            visibility,
            used: false,
            references: References::default(),
        }
    }
}

fn type_text(type_ref: &Option<TypeRef>) -> String {
    type_ref.as_ref().map(|t| t.text.clone()).unwrap_or_default()
}

/// Last segment of a possibly dotted type name.
pub fn type_leaf(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

// ============================================================================
// Parse-time call sites
// ============================================================================

/// Find `Call X`, `X(...)` and `recv.X(...)` in every procedure body.
///
/// Names of parameters, locals and module variables are skipped: a
/// parenthesized use of those is an array access.
fn discover_calls(module: &mut Module) {
    let module_vars: Vec<String> = module
        .variables
        .iter()
        .map(|v| v.name.clone())
        .chain(module.constants.iter().map(|c| c.name.clone()))
        .collect();
    let lines = module.lines.clone();
    let tokens: Vec<Vec<Token>> = lines.iter().map(|l| tokenize(l)).collect();

    let bodies = module
        .procedures
        .iter_mut()
        .chain(module.properties.iter_mut())
        .filter(|p| p.kind.family().is_some());

    for procedure in bodies {
        let mut calls = Vec::new();
        for line in procedure.header_end_line + 1..procedure.end_line {
            let Some(line_tokens) = tokens.get(line as usize - 1) else {
                continue;
            };
            let text = lines[line as usize - 1].trim().to_string();
            for (receiver, name) in calls_on_line(line_tokens) {
                if receiver.is_none()
                    && (procedure.declares_local(&name)
                        || module_vars.iter().any(|v| caseless_eq(v, &name)))
                {
                    continue;
                }
                let site = CallSite {
                    line,
                    text: text.clone(),
                    receiver,
                    name,
                    target: None,
                };
                if !calls.contains(&site) {
                    calls.push(site);
                }
            }
        }
        procedure.calls = calls;
    }
}

/// `(receiver, name)` pairs that syntactically look like calls.
fn calls_on_line(tokens: &[Token]) -> Vec<(Option<String>, String)> {
    let mut out = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !token.is_ident() {
            continue;
        }
        let after_call = i > 0 && tokens[i - 1].is_word("Call");
        let before_paren = tokens.get(i + 1).is_some_and(|t| t.is_punct('('));
        let dotted = i > 0 && tokens[i - 1].is_punct('.');
        let followed_by_dot = tokens.get(i + 1).is_some_and(|t| t.is_punct('.'));

        if followed_by_dot || is_keyword(&token.text) {
            continue;
        }
        if !(after_call || before_paren) {
            continue;
        }
        let receiver = if dotted {
            match i.checked_sub(2).and_then(|r| tokens.get(r)) {
                Some(t) if t.kind == TokenKind::Ident => Some(t.text.clone()),
                _ => continue,
            }
        } else {
            None
        };
        out.push((receiver, token.text.clone()));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcedureKind;

    fn parse(src: &str) -> (Module, Vec<ParseIssue>) {
        let lines = src.lines().map(str::to_string).collect();
        parse_module("Default", ModuleKind::Standard, lines)
    }

    mod span_tests {
        use super::*;

        #[test]
        fn kind_specific_terminators_and_no_overlap() {
            let (module, issues) = parse(
                "Attribute VB_Name = \"Module1\"\n\
                 Public Function A() As Long\n\
                 \x20 If True Then\n\
                 \x20 End If\n\
                 \x20 With x\n\
                 \x20 End With\n\
                 End Function\n\
                 Private Sub B()\n\
                 End Sub\n\
                 Property Get C() As Long\n\
                 End Property",
            );
            assert!(issues.is_empty());
            assert_eq!(module.name, "Module1");
            assert_eq!(module.name_directive_line, Some(1));
            let a = &module.procedures[0];
            assert_eq!((a.start_line, a.end_line), (2, 7));
            let b = &module.procedures[1];
            assert_eq!((b.start_line, b.end_line), (8, 9));
            assert_eq!(b.visibility, Visibility::Private);
            let c = &module.properties[0];
            assert_eq!((c.start_line, c.end_line), (10, 11));
        }

        #[test]
        fn missing_terminator_clamps_before_next_header() {
            let (module, issues) = parse("Sub A()\n  x = 1\nSub B()\nEnd Sub\nSub C()\n  y = 2");
            assert_eq!(module.procedures[0].end_line, 2);
            assert_eq!(module.procedures[1].end_line, 4);
            assert_eq!(module.procedures[2].end_line, 6);
            assert_eq!(issues.len(), 2);
            assert_eq!(issues[0].line, 3);
        }
    }

    mod declaration_tests {
        use super::*;

        #[test]
        fn continued_header_maps_parameter_positions() {
            let (module, _) = parse(
                "Public Sub Save(ByVal a As Widget, _\n        ByVal b As Widget)\nEnd Sub",
            );
            let p = &module.procedures[0];
            assert_eq!(p.header_end_line, 2);
            assert_eq!(p.end_line, 3);
            assert_eq!(p.parameters[1].decl, DeclPos { line: 2, occurrence: 0 });
            assert_eq!(p.parameters[0].type_pos, Some(DeclPos { line: 1, occurrence: 0 }));
            assert_eq!(p.parameters[1].type_pos, Some(DeclPos { line: 2, occurrence: 0 }));
        }

        #[test]
        fn same_type_twice_on_one_line_gets_distinct_occurrences() {
            let (module, _) = parse("Sub F(a As Foo, b As Foo)\nEnd Sub");
            let p = &module.procedures[0];
            assert_eq!(p.parameters[0].type_pos.unwrap().occurrence, 0);
            assert_eq!(p.parameters[1].type_pos.unwrap().occurrence, 1);
        }

        #[test]
        fn locals_attach_to_open_procedure() {
            let (module, _) = parse(
                "Dim counter As Long\n\
                 Const LIMIT = 5\n\
                 Sub Run()\n\
                 \x20 Dim counter As Integer\n\
                 \x20 Static calls As Long\n\
                 \x20 Const STEP_SIZE = 2\n\
                 End Sub",
            );
            assert_eq!(module.variables.len(), 1);
            assert_eq!(module.constants.len(), 1);
            let run = &module.procedures[0];
            assert_eq!(run.locals.len(), 2);
            assert!(run.locals[1].is_static);
            assert_eq!(run.local_constants[0].name, "STEP_SIZE");
        }

        #[test]
        fn externals_and_types() {
            let (module, _) = parse(
                "Private Declare Sub Sleep Lib \"kernel32\" (ByVal ms As Long)\n\
                 Public Type Point\n\
                 \x20 X As Long\n\
                 \x20 Y As Long\n\
                 End Type",
            );
            assert_eq!(module.procedures[0].kind, ProcedureKind::DeclareSub);
            assert_eq!(module.procedures[0].parameters[0].name, "ms");
            let t = &module.types[0];
            assert_eq!(t.fields.len(), 2);
            assert_eq!(t.end_line, 5);
            assert_eq!(t.fields[1].decl, DeclPos { line: 4, occurrence: 0 });
        }

        #[test]
        fn control_arrays_collect_every_block() {
            let (module, _) = parse(
                "Begin VB.Form frmMain\n\
                 \x20 Begin VB.TextBox txtName\n\
                 \x20    Index = 0\n\
                 \x20 End\n\
                 \x20 Begin VB.TextBox txtName\n\
                 \x20    Index = 1\n\
                 \x20 End\n\
                 End\n\
                 Attribute VB_Name = \"frmMain\"",
            );
            assert_eq!(module.form_begin_line, Some(1));
            assert_eq!(module.controls.len(), 1);
            assert_eq!(module.controls[0].lines, vec![2, 5]);
            assert_eq!(module.controls[0].indices, vec![0, 1]);
        }
    }

    mod call_tests {
        use super::*;

        #[test]
        fn parse_time_call_sites() {
            let (module, _) = parse(
                "Sub Run()\n\
                 \x20 Dim arr(5) As Long\n\
                 \x20 Call Helper\n\
                 \x20 x = Compute(arr(1))\n\
                 \x20 obj.Refresh(1)\n\
                 \x20 If Ready() Then Go\n\
                 End Sub",
            );
            let calls: Vec<_> = module.procedures[0]
                .calls
                .iter()
                .map(|c| (c.receiver.clone(), c.name.clone(), c.line))
                .collect();
            assert_eq!(
                calls,
                vec![
                    (None, "Helper".to_string(), 3),
                    (None, "Compute".to_string(), 4),
                    (Some("obj".to_string()), "Refresh".to_string(), 5),
                    (None, "Ready".to_string(), 6),
                ]
            );
        }
    }
}
